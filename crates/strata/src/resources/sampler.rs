use std::sync::Arc;

use crate::{
    backend::NativeObject,
    builder::{Builder, ObjectKind, Property, PropertySet},
    context::Device,
    error::Result,
    lifetime::ObjectId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SamplerDescriptor {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
}

#[derive(Debug)]
pub struct Sampler {
    id: ObjectId,
    desc: SamplerDescriptor,
    native: Box<dyn NativeObject>,
}

impl Sampler {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn desc(&self) -> &SamplerDescriptor {
        &self.desc
    }

    pub fn native<T: 'static>(&self) -> Option<&T> {
        (*self.native).as_any().downcast_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerProperty {
    FilterMode,
}

impl Property for SamplerProperty {
    const OBJECT: ObjectKind = ObjectKind::Sampler;
    fn bit(self) -> u32 {
        0x1
    }
    fn name(self) -> &'static str {
        "filter mode"
    }
}

///Sampler builder. Every filter defaults to [FilterMode::Nearest].
pub struct SamplerBuilder<'d> {
    device: &'d Device,
    properties: PropertySet<SamplerProperty>,
    desc: SamplerDescriptor,
}

impl<'d> SamplerBuilder<'d> {
    pub(crate) fn new(device: &'d Device) -> Self {
        SamplerBuilder {
            device,
            properties: PropertySet::default(),
            desc: SamplerDescriptor::default(),
        }
    }

    pub fn set_filter_mode(
        &mut self,
        mag: FilterMode,
        min: FilterMode,
        mipmap: FilterMode,
    ) -> Result<&mut Self> {
        self.properties.mark(SamplerProperty::FilterMode)?;
        self.desc = SamplerDescriptor {
            mag_filter: mag,
            min_filter: min,
            mipmap_filter: mipmap,
        };
        Ok(self)
    }
}

impl Builder for SamplerBuilder<'_> {
    type Product = Arc<Sampler>;

    fn finish(self) -> Result<Arc<Sampler>> {
        self.device.check_alive()?;
        let native = self.device.backend().create_sampler(&self.desc)?;
        Ok(Arc::new(Sampler {
            id: ObjectId::next(),
            desc: self.desc,
            native,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::null::NullBackend, StrataError, UsageError};

    #[test]
    fn defaults_to_nearest() {
        let device = NullBackend::device();
        let sampler = device.create_sampler_builder().finish().unwrap();
        assert_eq!(sampler.desc(), &SamplerDescriptor::default());
        assert_eq!(sampler.desc().mipmap_filter, FilterMode::Nearest);
    }

    #[test]
    fn filter_mode_once() {
        let device = NullBackend::device();
        let mut builder = device.create_sampler_builder();
        builder
            .set_filter_mode(FilterMode::Linear, FilterMode::Linear, FilterMode::Nearest)
            .unwrap();
        assert!(matches!(
            builder.set_filter_mode(FilterMode::Nearest, FilterMode::Nearest, FilterMode::Nearest),
            Err(StrataError::Usage(UsageError::DuplicateProperty { .. }))
        ));
        let sampler = builder.finish().unwrap();
        assert_eq!(sampler.desc().mag_filter, FilterMode::Linear);
    }
}
