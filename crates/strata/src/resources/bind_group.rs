use std::sync::Arc;

use crate::{
    backend::NativeObject,
    builder::{Builder, ObjectKind, Property, PropertySet},
    context::Device,
    error::{RequiredUsage, Result},
    lifetime::ObjectId,
    util::is_aligned,
    UsageError, ValidationError,
};

use super::{
    descriptor::check_slot_range, BindGroupLayout, BindingMask, BindingResource, BindingType,
    BufferUsage, BufferView, Sampler, TextureUsage, TextureView, BIND_GROUP_OFFSET_ALIGNMENT,
    MAX_BINDINGS_PER_GROUP,
};

const SLOTS: usize = MAX_BINDINGS_PER_GROUP as usize;

///How a bind group is expected to be used by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindGroupUsage {
    ///Created once, never updated.
    Frozen,
    ///May be rebound frequently.
    Dynamic,
}

///Validated bind group state handed to the backend. Every slot of `mask` holds a matching resource.
#[derive(Debug, Clone)]
pub struct BindGroupState {
    pub layout: Arc<BindGroupLayout>,
    pub usage: BindGroupUsage,
    pub mask: BindingMask,
    pub bindings: [Option<BindingResource>; SLOTS],
}

///Immutable set of bound resources. Keeps its layout and every bound resource alive.
#[derive(Debug)]
pub struct BindGroup {
    id: ObjectId,
    state: BindGroupState,
    native: Box<dyn NativeObject>,
}

impl BindGroup {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn layout(&self) -> &Arc<BindGroupLayout> {
        &self.state.layout
    }

    pub fn usage(&self) -> BindGroupUsage {
        self.state.usage
    }

    pub fn state(&self) -> &BindGroupState {
        &self.state
    }

    pub fn binding(&self, slot: u32) -> Option<&BindingResource> {
        self.state.bindings.get(slot as usize)?.as_ref()
    }

    pub fn binding_as_buffer_view(&self, slot: u32) -> Option<&Arc<BufferView>> {
        match self.binding(slot)? {
            BindingResource::BufferView(view) => Some(view),
            _ => None,
        }
    }

    pub fn binding_as_sampler(&self, slot: u32) -> Option<&Arc<Sampler>> {
        match self.binding(slot)? {
            BindingResource::Sampler(sampler) => Some(sampler),
            _ => None,
        }
    }

    pub fn binding_as_texture_view(&self, slot: u32) -> Option<&Arc<TextureView>> {
        match self.binding(slot)? {
            BindingResource::TextureView(view) => Some(view),
            _ => None,
        }
    }

    pub fn native<T: 'static>(&self) -> Option<&T> {
        (*self.native).as_any().downcast_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindGroupProperty {
    Usage,
    Layout,
}

impl Property for BindGroupProperty {
    const OBJECT: ObjectKind = ObjectKind::BindGroup;
    fn bit(self) -> u32 {
        match self {
            BindGroupProperty::Usage => 0x1,
            BindGroupProperty::Layout => 0x2,
        }
    }
    fn name(self) -> &'static str {
        match self {
            BindGroupProperty::Usage => "usage",
            BindGroupProperty::Layout => "layout",
        }
    }
}

///Checks a single resource against the slot type it is bound to.
fn check_resource(slot: u32, expected: BindingType, resource: &BindingResource) -> Result<()> {
    if expected.category() != resource.category() {
        return Err(ValidationError::TypeMismatch {
            slot,
            expected,
            found: resource.category(),
        }
        .into());
    }

    match (expected, resource) {
        (BindingType::UniformBuffer | BindingType::StorageBuffer, BindingResource::BufferView(view)) => {
            let required = if expected == BindingType::UniformBuffer {
                BufferUsage::UNIFORM
            } else {
                BufferUsage::STORAGE
            };
            if !view.buffer().allowed_usage().contains(required) {
                return Err(ValidationError::UsageMismatch {
                    slot,
                    required: RequiredUsage::Buffer(required),
                }
                .into());
            }
            if !is_aligned(view.offset(), BIND_GROUP_OFFSET_ALIGNMENT) {
                return Err(ValidationError::MisalignedOffset {
                    slot,
                    offset: view.offset(),
                    alignment: BIND_GROUP_OFFSET_ALIGNMENT,
                }
                .into());
            }
        }
        (BindingType::SampledTexture, BindingResource::TextureView(view)) => {
            if !view.texture().allowed_usage().contains(TextureUsage::SAMPLED) {
                return Err(ValidationError::UsageMismatch {
                    slot,
                    required: RequiredUsage::Texture(TextureUsage::SAMPLED),
                }
                .into());
            }
        }
        _ => {}
    }

    Ok(())
}

///Builds a [BindGroup] for a fixed layout. Bindings are validated against the layout as they are set, so the layout
/// has to be set first.
pub struct BindGroupBuilder<'d> {
    device: &'d Device,
    properties: PropertySet<BindGroupProperty>,
    usage: BindGroupUsage,
    layout: Option<Arc<BindGroupLayout>>,
    mask: BindingMask,
    bindings: [Option<BindingResource>; SLOTS],
}

impl std::fmt::Debug for BindGroupBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindGroupBuilder")
            .field("device", &self.device.label())
            .field("properties", &self.properties)
            .field("usage", &self.usage)
            .field("layout", &self.layout)
            .field("mask", &self.mask)
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl<'d> BindGroupBuilder<'d> {
    pub(crate) fn new(device: &'d Device) -> Self {
        BindGroupBuilder {
            device,
            properties: PropertySet::default(),
            usage: BindGroupUsage::Frozen,
            layout: None,
            mask: BindingMask::empty(),
            bindings: Default::default(),
        }
    }

    pub fn set_usage(&mut self, usage: BindGroupUsage) -> Result<&mut Self> {
        self.properties.mark(BindGroupProperty::Usage)?;
        self.usage = usage;
        Ok(self)
    }

    pub fn set_layout(&mut self, layout: &Arc<BindGroupLayout>) -> Result<&mut Self> {
        self.properties.mark(BindGroupProperty::Layout)?;
        self.layout = Some(layout.clone());
        Ok(self)
    }

    ///Binds `resources` to the slots `start..start+resources.len()`. Either all resources are bound, or none.
    pub fn set_bindings(&mut self, start: u32, resources: &[BindingResource]) -> Result<&mut Self> {
        let count = u32::try_from(resources.len()).unwrap_or(u32::MAX);
        check_slot_range(start, count)?;
        let layout = self.layout.as_ref().ok_or(UsageError::LayoutNotSet)?;

        for slot in start..start + count {
            if self.mask.contains(slot) {
                return Err(UsageError::SlotAlreadyBound { slot }.into());
            }
            if !layout.mask().contains(slot) {
                return Err(ValidationError::SlotNotInLayout { slot }.into());
            }
        }

        for (slot, resource) in (start..).zip(resources) {
            let expected = layout.info().types[slot as usize];
            check_resource(slot, expected, resource)?;
        }

        for (slot, resource) in (start..).zip(resources) {
            self.mask.insert(slot);
            self.bindings[slot as usize] = Some(resource.clone());
        }
        Ok(self)
    }

    pub fn set_buffer_views(&mut self, start: u32, views: &[Arc<BufferView>]) -> Result<&mut Self> {
        let resources = views
            .iter()
            .cloned()
            .map(BindingResource::BufferView)
            .collect::<Vec<_>>();
        self.set_bindings(start, &resources)
    }

    pub fn set_samplers(&mut self, start: u32, samplers: &[Arc<Sampler>]) -> Result<&mut Self> {
        let resources = samplers
            .iter()
            .cloned()
            .map(BindingResource::Sampler)
            .collect::<Vec<_>>();
        self.set_bindings(start, &resources)
    }

    pub fn set_texture_views(
        &mut self,
        start: u32,
        views: &[Arc<TextureView>],
    ) -> Result<&mut Self> {
        let resources = views
            .iter()
            .cloned()
            .map(BindingResource::TextureView)
            .collect::<Vec<_>>();
        self.set_bindings(start, &resources)
    }
}

impl Builder for BindGroupBuilder<'_> {
    type Product = Arc<BindGroup>;

    fn finish(self) -> Result<Arc<BindGroup>> {
        self.device.check_alive()?;
        self.properties
            .require(&[BindGroupProperty::Usage, BindGroupProperty::Layout])?;
        let layout = self.layout.ok_or(UsageError::LayoutNotSet)?;

        if self.mask != layout.mask() {
            return Err(ValidationError::IncompleteConfiguration {
                object: ObjectKind::BindGroup,
                reason: format!(
                    "bound slots {:#018b} do not match the layout's {:#018b}",
                    self.mask.bits(),
                    layout.mask().bits()
                ),
            }
            .into());
        }

        let state = BindGroupState {
            layout,
            usage: self.usage,
            mask: self.mask,
            bindings: self.bindings,
        };
        let native = self.device.backend().create_bind_group(&state)?;
        let group = Arc::new(BindGroup {
            id: ObjectId::next(),
            state,
            native,
        });

        self.device.register_bind_group(&group);

        #[cfg(feature = "logging")]
        log::trace!(
            "Created bind group {} with {} bindings",
            group.id,
            group.state.mask.count()
        );

        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::null::NullBackend,
        resources::{Buffer, ShaderStages, Texture, TextureDimension, TextureFormat},
        StrataError,
    };
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(BindGroup: Send, Sync);
        assert_impl_all!(BindGroupState: Send, Sync);
    }

    fn buffer(device: &Device, usage: BufferUsage) -> Arc<Buffer> {
        let mut builder = device.create_buffer_builder();
        builder
            .set_size(1024)
            .unwrap()
            .set_allowed_usage(usage)
            .unwrap();
        builder.finish().unwrap()
    }

    fn view(device: &Device, buffer: &Arc<Buffer>, offset: u64) -> Arc<BufferView> {
        let mut builder = device.create_buffer_view_builder(buffer);
        builder.set_extent(offset, 64).unwrap();
        builder.finish().unwrap()
    }

    fn texture_view(device: &Device, usage: TextureUsage) -> Arc<TextureView> {
        let mut builder = device.create_texture_builder();
        builder
            .set_dimension(TextureDimension::D2)
            .unwrap()
            .set_extent(8, 8, 1)
            .unwrap()
            .set_format(TextureFormat::R8G8B8A8Unorm)
            .unwrap()
            .set_mip_levels(1)
            .unwrap()
            .set_allowed_usage(usage)
            .unwrap();
        let texture: Arc<Texture> = builder.finish().unwrap();
        device.create_texture_view_builder(&texture).finish().unwrap()
    }

    fn layout(device: &Device, types: &[BindingType]) -> Arc<BindGroupLayout> {
        let mut builder = device.create_bind_group_layout_builder();
        for (slot, ty) in types.iter().enumerate() {
            builder
                .set_bindings_type(ShaderStages::all(), *ty, slot as u32, 1)
                .unwrap();
        }
        builder.finish().unwrap()
    }

    fn group_builder<'d>(device: &'d Device, layout: &Arc<BindGroupLayout>) -> BindGroupBuilder<'d> {
        let mut builder = device.create_bind_group_builder();
        builder
            .set_usage(BindGroupUsage::Frozen)
            .unwrap()
            .set_layout(layout)
            .unwrap();
        builder
    }

    #[test]
    fn layout_must_come_first() {
        let device = NullBackend::device();
        let b = buffer(&device, BufferUsage::UNIFORM);
        let mut builder = device.create_bind_group_builder();
        assert_eq!(
            builder.set_buffer_views(0, &[view(&device, &b, 0)]).unwrap_err(),
            StrataError::Usage(UsageError::LayoutNotSet)
        );
        //range is checked before the layout
        assert!(matches!(
            builder.set_buffer_views(16, &[view(&device, &b, 0)]),
            Err(StrataError::Validation(ValidationError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn slot_checks() {
        let device = NullBackend::device();
        let layout = layout(&device, &[BindingType::UniformBuffer]);
        let b = buffer(&device, BufferUsage::UNIFORM);
        let mut builder = group_builder(&device, &layout);

        assert_eq!(
            builder.set_buffer_views(1, &[view(&device, &b, 0)]).unwrap_err(),
            StrataError::Validation(ValidationError::SlotNotInLayout { slot: 1 })
        );
        builder.set_buffer_views(0, &[view(&device, &b, 0)]).unwrap();
        assert_eq!(
            builder.set_buffer_views(0, &[view(&device, &b, 256)]).unwrap_err(),
            StrataError::Usage(UsageError::SlotAlreadyBound { slot: 0 })
        );
        builder.finish().unwrap();
    }

    #[test]
    fn type_and_usage_checks() {
        let device = NullBackend::device();
        let layout = layout(
            &device,
            &[
                BindingType::UniformBuffer,
                BindingType::StorageBuffer,
                BindingType::SampledTexture,
            ],
        );
        let uniform = buffer(&device, BufferUsage::UNIFORM);
        let mut builder = group_builder(&device, &layout);

        let sampler = device.create_sampler_builder().finish().unwrap();
        assert_eq!(
            builder.set_samplers(0, &[sampler]).unwrap_err(),
            StrataError::Validation(ValidationError::TypeMismatch {
                slot: 0,
                expected: BindingType::UniformBuffer,
                found: crate::resources::ResourceCategory::Sampler
            })
        );
        assert_eq!(
            builder.set_buffer_views(1, &[view(&device, &uniform, 0)]).unwrap_err(),
            StrataError::Validation(ValidationError::UsageMismatch {
                slot: 1,
                required: RequiredUsage::Buffer(BufferUsage::STORAGE)
            })
        );
        assert_eq!(
            builder
                .set_texture_views(2, &[texture_view(&device, TextureUsage::STORAGE)])
                .unwrap_err(),
            StrataError::Validation(ValidationError::UsageMismatch {
                slot: 2,
                required: RequiredUsage::Texture(TextureUsage::SAMPLED)
            })
        );
    }

    #[test]
    fn offset_alignment() {
        let device = NullBackend::device();
        let layout = layout(&device, &[BindingType::UniformBuffer]);
        let b = buffer(&device, BufferUsage::UNIFORM);

        let mut builder = group_builder(&device, &layout);
        assert_eq!(
            builder.set_buffer_views(0, &[view(&device, &b, 255)]).unwrap_err(),
            StrataError::Validation(ValidationError::MisalignedOffset {
                slot: 0,
                offset: 255,
                alignment: 256
            })
        );
        builder.set_buffer_views(0, &[view(&device, &b, 256)]).unwrap();
        let group = builder.finish().unwrap();
        assert_eq!(group.binding_as_buffer_view(0).unwrap().offset(), 256);
    }

    #[test]
    fn failed_set_binds_nothing() {
        let device = NullBackend::device();
        let layout = layout(
            &device,
            &[BindingType::UniformBuffer, BindingType::UniformBuffer],
        );
        let b = buffer(&device, BufferUsage::UNIFORM);
        let mut builder = group_builder(&device, &layout);

        //second view is misaligned, first must not be bound either
        assert!(builder
            .set_buffer_views(0, &[view(&device, &b, 0), view(&device, &b, 8)])
            .is_err());
        builder
            .set_buffer_views(0, &[view(&device, &b, 0), view(&device, &b, 512)])
            .unwrap();
        builder.finish().unwrap();
    }

    #[test]
    fn incomplete_mask() {
        let device = NullBackend::device();
        let layout = layout(&device, &[BindingType::UniformBuffer, BindingType::Sampler]);
        let b = buffer(&device, BufferUsage::UNIFORM);

        let mut builder = group_builder(&device, &layout);
        builder.set_buffer_views(0, &[view(&device, &b, 0)]).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(StrataError::Validation(ValidationError::IncompleteConfiguration {
                object: ObjectKind::BindGroup,
                ..
            }))
        ));

        let mut builder = device.create_bind_group_builder();
        builder.set_layout(&layout).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(StrataError::Validation(ValidationError::IncompleteConfiguration { .. }))
        ));
    }

    #[test]
    fn accessors_match_binding_kind() {
        let device = NullBackend::device();
        let layout = layout(&device, &[BindingType::Sampler, BindingType::SampledTexture]);
        let sampler = device.create_sampler_builder().finish().unwrap();
        let texture = texture_view(&device, TextureUsage::SAMPLED);

        let mut builder = group_builder(&device, &layout);
        builder
            .set_bindings(0, &[sampler.clone().into(), texture.clone().into()])
            .unwrap();
        let group = builder.finish().unwrap();

        assert!(Arc::ptr_eq(group.binding_as_sampler(0).unwrap(), &sampler));
        assert!(group.binding_as_buffer_view(0).is_none());
        assert!(Arc::ptr_eq(group.binding_as_texture_view(1).unwrap(), &texture));
        assert!(group.binding(5).is_none());
        assert!(group.binding(99).is_none());
    }
}
