//! Translation of validated strata state into [ash]'s vulkan types. Everything in here is a pure function, creating
//! the actual vulkan objects is left to the backend that owns an [ash::Device].

use ash::vk;
use smallvec::SmallVec;

use crate::resources::{
    BindingInfo, BindingType, BufferDescriptor, BufferUsage, FilterMode, SamplerDescriptor,
    ShaderStages, TextureDescriptor, TextureDimension, TextureFormat, TextureUsage,
    MAX_BINDINGS_PER_GROUP,
};

pub fn descriptor_type(ty: BindingType) -> vk::DescriptorType {
    match ty {
        BindingType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        BindingType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        BindingType::Sampler => vk::DescriptorType::SAMPLER,
        BindingType::SampledTexture => vk::DescriptorType::SAMPLED_IMAGE,
    }
}

pub fn shader_stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStages::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

///Mapping happens through staging copies, so map-read buffers are copy destinations and map-write buffers copy sources.
pub fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.intersects(BufferUsage::TRANSFER_SRC | BufferUsage::MAP_WRITE) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.intersects(BufferUsage::TRANSFER_DST | BufferUsage::MAP_READ) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    flags
}

///Output attachments become color or depth-stencil attachments depending on `format`. Presenting has no usage flag of
/// its own.
pub fn image_usage(usage: TextureUsage, format: TextureFormat) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::TRANSFER_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::TRANSFER_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUsage::SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::STORAGE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::OUTPUT_ATTACHMENT) {
        if format.is_depth_stencil() {
            flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
    }
    flags
}

pub fn format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::R8G8Unorm => vk::Format::R8G8_UNORM,
        TextureFormat::R8Unorm => vk::Format::R8_UNORM,
        TextureFormat::R8G8B8A8Uint => vk::Format::R8G8B8A8_UINT,
        TextureFormat::R8G8Uint => vk::Format::R8G8_UINT,
        TextureFormat::R8Uint => vk::Format::R8_UINT,
        TextureFormat::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

pub fn filter(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

pub fn mipmap_mode(mode: FilterMode) -> vk::SamplerMipmapMode {
    match mode {
        FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn image_type(dimension: TextureDimension) -> vk::ImageType {
    match dimension {
        TextureDimension::D1 => vk::ImageType::TYPE_1D,
        TextureDimension::D2 => vk::ImageType::TYPE_2D,
        TextureDimension::D3 => vk::ImageType::TYPE_3D,
    }
}

///One layout binding per slot of `info`, in slot order.
pub fn layout_bindings(
    info: &BindingInfo,
) -> SmallVec<[vk::DescriptorSetLayoutBinding<'static>; MAX_BINDINGS_PER_GROUP as usize]> {
    info.mask
        .iter()
        .map(|slot| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(slot)
                .descriptor_type(descriptor_type(info.types[slot as usize]))
                .descriptor_count(1)
                .stage_flags(shader_stages(info.visibilities[slot as usize]))
        })
        .collect()
}

///Descriptors needed to allocate `sets` bind groups of layout `info`. At most one entry per descriptor type.
pub fn descriptor_pool_sizes(info: &BindingInfo, sets: u32) -> SmallVec<[vk::DescriptorPoolSize; 4]> {
    info.mask.iter().fold(SmallVec::new(), |mut sizes, slot| {
        let ty = descriptor_type(info.types[slot as usize]);
        if let Some(size) = sizes.iter_mut().find(|s: &&mut vk::DescriptorPoolSize| s.ty == ty) {
            size.descriptor_count += sets;
        } else {
            sizes.push(vk::DescriptorPoolSize {
                ty,
                descriptor_count: sets,
            });
        }
        sizes
    })
}

pub fn buffer_create_info(desc: &BufferDescriptor) -> vk::BufferCreateInfo<'static> {
    vk::BufferCreateInfo::default()
        .size(desc.size)
        .usage(buffer_usage(desc.allowed_usage))
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
}

pub fn image_create_info(desc: &TextureDescriptor) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo::default()
        .image_type(image_type(desc.dimension))
        .format(format(desc.format))
        .extent(vk::Extent3D {
            width: desc.extent.width,
            height: desc.extent.height,
            depth: desc.extent.depth,
        })
        .mip_levels(desc.mip_levels)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(image_usage(desc.allowed_usage, desc.format))
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

pub fn sampler_create_info(desc: &SamplerDescriptor) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(filter(desc.mag_filter))
        .min_filter(filter(desc.min_filter))
        .mipmap_mode(mipmap_mode(desc.mipmap_filter))
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .max_lod(vk::LOD_CLAMP_NONE)
}
