use std::sync::Arc;

use bitflags::bitflags;

use crate::{
    backend::NativeObject,
    builder::{Builder, ObjectKind, Property, PropertySet},
    context::Device,
    error::Result,
    lifetime::ObjectId,
    util::max_mip_levels,
    ValidationError,
};

bitflags! {
    ///Ways a texture may be used. Fixed at creation time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const OUTPUT_ATTACHMENT = 1 << 4;
        const PRESENT = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8G8B8A8Unorm,
    R8G8Unorm,
    R8Unorm,
    R8G8B8A8Uint,
    R8G8Uint,
    R8Uint,
    B8G8R8A8Unorm,
    D32FloatS8Uint,
}

impl TextureFormat {
    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, TextureFormat::D32FloatS8Uint)
    }

    ///Size of a single texel in bytes.
    pub fn texel_size(&self) -> u32 {
        match self {
            TextureFormat::R8G8B8A8Unorm
            | TextureFormat::R8G8B8A8Uint
            | TextureFormat::B8G8R8A8Unorm => 4,
            TextureFormat::R8G8Unorm | TextureFormat::R8G8Uint => 2,
            TextureFormat::R8Unorm | TextureFormat::R8Uint => 1,
            TextureFormat::D32FloatS8Uint => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

///Validated texture state handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub dimension: TextureDimension,
    pub extent: Extent3d,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub allowed_usage: TextureUsage,
    pub initial_usage: TextureUsage,
}

#[derive(Debug)]
pub struct Texture {
    id: ObjectId,
    desc: TextureDescriptor,
    native: Box<dyn NativeObject>,
}

impl Texture {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn desc(&self) -> &TextureDescriptor {
        &self.desc
    }

    pub fn allowed_usage(&self) -> TextureUsage {
        self.desc.allowed_usage
    }

    pub fn native<T: 'static>(&self) -> Option<&T> {
        (*self.native).as_any().downcast_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureProperty {
    Dimension,
    Extent,
    Format,
    MipLevels,
    AllowedUsage,
    InitialUsage,
}

impl Property for TextureProperty {
    const OBJECT: ObjectKind = ObjectKind::Texture;
    fn bit(self) -> u32 {
        match self {
            TextureProperty::Dimension => 0x1,
            TextureProperty::Extent => 0x2,
            TextureProperty::Format => 0x4,
            TextureProperty::MipLevels => 0x8,
            TextureProperty::AllowedUsage => 0x10,
            TextureProperty::InitialUsage => 0x20,
        }
    }
    fn name(self) -> &'static str {
        match self {
            TextureProperty::Dimension => "dimension",
            TextureProperty::Extent => "extent",
            TextureProperty::Format => "format",
            TextureProperty::MipLevels => "mip levels",
            TextureProperty::AllowedUsage => "allowed usage",
            TextureProperty::InitialUsage => "initial usage",
        }
    }
}

const REQUIRED_TEXTURE_PROPERTIES: &[TextureProperty] = &[
    TextureProperty::Dimension,
    TextureProperty::Extent,
    TextureProperty::Format,
    TextureProperty::MipLevels,
    TextureProperty::AllowedUsage,
];

pub struct TextureBuilder<'d> {
    device: &'d Device,
    properties: PropertySet<TextureProperty>,
    dimension: TextureDimension,
    extent: Extent3d,
    format: TextureFormat,
    mip_levels: u32,
    allowed_usage: TextureUsage,
    initial_usage: TextureUsage,
}

impl<'d> TextureBuilder<'d> {
    pub(crate) fn new(device: &'d Device) -> Self {
        TextureBuilder {
            device,
            properties: PropertySet::default(),
            dimension: TextureDimension::D2,
            extent: Extent3d {
                width: 0,
                height: 0,
                depth: 0,
            },
            format: TextureFormat::R8G8B8A8Unorm,
            mip_levels: 0,
            allowed_usage: TextureUsage::empty(),
            initial_usage: TextureUsage::empty(),
        }
    }

    pub fn set_dimension(&mut self, dimension: TextureDimension) -> Result<&mut Self> {
        self.properties.mark(TextureProperty::Dimension)?;
        self.dimension = dimension;
        Ok(self)
    }

    pub fn set_extent(&mut self, width: u32, height: u32, depth: u32) -> Result<&mut Self> {
        self.properties.mark(TextureProperty::Extent)?;
        self.extent = Extent3d {
            width,
            height,
            depth,
        };
        Ok(self)
    }

    pub fn set_format(&mut self, format: TextureFormat) -> Result<&mut Self> {
        self.properties.mark(TextureProperty::Format)?;
        self.format = format;
        Ok(self)
    }

    pub fn set_mip_levels(&mut self, mip_levels: u32) -> Result<&mut Self> {
        self.properties.mark(TextureProperty::MipLevels)?;
        self.mip_levels = mip_levels;
        Ok(self)
    }

    pub fn set_allowed_usage(&mut self, usage: TextureUsage) -> Result<&mut Self> {
        self.properties.mark(TextureProperty::AllowedUsage)?;
        self.allowed_usage = usage;
        Ok(self)
    }

    pub fn set_initial_usage(&mut self, usage: TextureUsage) -> Result<&mut Self> {
        self.properties.mark(TextureProperty::InitialUsage)?;
        self.initial_usage = usage;
        Ok(self)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let Extent3d {
            width,
            height,
            depth,
        } = self.extent;
        if width == 0 || height == 0 || depth == 0 {
            return Err(format!("extent {}x{}x{} has a zero axis", width, height, depth));
        }

        match self.dimension {
            TextureDimension::D1 if height != 1 || depth != 1 => {
                return Err("1D textures must have a height and depth of 1".to_owned());
            }
            TextureDimension::D2 if depth != 1 => {
                return Err("2D textures must have a depth of 1".to_owned());
            }
            _ => {}
        }

        let max_levels = max_mip_levels(width.max(height));
        if self.mip_levels == 0 || self.mip_levels > max_levels {
            return Err(format!(
                "mip level count {} not in 1..={}",
                self.mip_levels, max_levels
            ));
        }

        if !self.allowed_usage.contains(self.initial_usage) {
            return Err("initial usage must be part of the allowed usage".to_owned());
        }

        Ok(())
    }
}

impl Builder for TextureBuilder<'_> {
    type Product = Arc<Texture>;

    fn finish(self) -> Result<Arc<Texture>> {
        self.device.check_alive()?;
        self.properties.require(REQUIRED_TEXTURE_PROPERTIES)?;
        self.validate()
            .map_err(|reason| ValidationError::InvalidDescriptor {
                object: ObjectKind::Texture,
                reason,
            })?;

        let desc = TextureDescriptor {
            dimension: self.dimension,
            extent: self.extent,
            format: self.format,
            mip_levels: self.mip_levels,
            allowed_usage: self.allowed_usage,
            initial_usage: self.initial_usage,
        };
        let native = self.device.backend().create_texture(&desc)?;

        Ok(Arc::new(Texture {
            id: ObjectId::next(),
            desc,
            native,
        }))
    }
}

///Validated texture view state handed to the backend.
#[derive(Debug, Clone)]
pub struct TextureViewDescriptor {
    pub texture: Arc<Texture>,
}

///View of a whole texture. Keeps its texture alive.
#[derive(Debug)]
pub struct TextureView {
    id: ObjectId,
    desc: TextureViewDescriptor,
    native: Box<dyn NativeObject>,
}

impl TextureView {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn texture(&self) -> &Arc<Texture> {
        &self.desc.texture
    }

    pub fn native<T: 'static>(&self) -> Option<&T> {
        (*self.native).as_any().downcast_ref()
    }
}

///Texture views have no settable properties yet. The builder still goes through the backend factory and the
/// device-lost check like every other builder.
pub struct TextureViewBuilder<'d> {
    device: &'d Device,
    texture: Arc<Texture>,
}

impl<'d> TextureViewBuilder<'d> {
    pub(crate) fn new(device: &'d Device, texture: Arc<Texture>) -> Self {
        TextureViewBuilder { device, texture }
    }
}

impl Builder for TextureViewBuilder<'_> {
    type Product = Arc<TextureView>;

    fn finish(self) -> Result<Arc<TextureView>> {
        self.device.check_alive()?;
        let desc = TextureViewDescriptor {
            texture: self.texture,
        };
        let native = self.device.backend().create_texture_view(&desc)?;
        Ok(Arc::new(TextureView {
            id: ObjectId::next(),
            desc,
            native,
        }))
    }
}
