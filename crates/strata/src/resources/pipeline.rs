//! Pipeline layouts. A pipeline layout is the ordered list of bind group layouts a pipeline is going to use.

use std::sync::Arc;

use crate::{
    backend::NativeObject,
    builder::{Builder, ObjectKind},
    context::Device,
    error::Result,
    lifetime::ObjectId,
    UsageError, ValidationError,
};

use super::BindGroupLayout;

///Maximum number of bind groups a pipeline layout can reference.
pub const MAX_BIND_GROUPS: u32 = 4;

///Validated pipeline layout handed to the backend. Every index is populated, unused ones with the device's empty
/// layout.
#[derive(Debug, Clone)]
pub struct PipelineLayoutDescriptor {
    pub bind_group_layouts: [Arc<BindGroupLayout>; MAX_BIND_GROUPS as usize],
}

#[derive(Debug)]
pub struct PipelineLayout {
    id: ObjectId,
    desc: PipelineLayoutDescriptor,
    native: Box<dyn NativeObject>,
}

impl PipelineLayout {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn bind_group_layout(&self, index: u32) -> Option<&Arc<BindGroupLayout>> {
        self.desc.bind_group_layouts.get(index as usize)
    }

    pub fn desc(&self) -> &PipelineLayoutDescriptor {
        &self.desc
    }

    pub fn native<T: 'static>(&self) -> Option<&T> {
        (*self.native).as_any().downcast_ref()
    }
}

pub struct PipelineLayoutBuilder<'d> {
    device: &'d Device,
    layouts: [Option<Arc<BindGroupLayout>>; MAX_BIND_GROUPS as usize],
}

impl<'d> PipelineLayoutBuilder<'d> {
    pub(crate) fn new(device: &'d Device) -> Self {
        PipelineLayoutBuilder {
            device,
            layouts: Default::default(),
        }
    }

    ///Sets the layout of bind group `index`. Each index can be set once.
    pub fn set_bind_group_layout(
        &mut self,
        index: u32,
        layout: &Arc<BindGroupLayout>,
    ) -> Result<&mut Self> {
        let Some(entry) = self.layouts.get_mut(index as usize) else {
            return Err(ValidationError::OutOfRange {
                start: index,
                count: 1,
                max: MAX_BIND_GROUPS,
            }
            .into());
        };
        if entry.is_some() {
            #[cfg(feature = "logging")]
            log::warn!("Bind group layout {} set multiple times", index);
            return Err(UsageError::DuplicateProperty {
                object: ObjectKind::PipelineLayout,
                property: "bind group layout",
            }
            .into());
        }
        *entry = Some(layout.clone());
        Ok(self)
    }
}

impl Builder for PipelineLayoutBuilder<'_> {
    type Product = Arc<PipelineLayout>;

    fn finish(self) -> Result<Arc<PipelineLayout>> {
        self.device.check_alive()?;
        let empty = self.device.empty_bind_group_layout();
        let desc = PipelineLayoutDescriptor {
            bind_group_layouts: self
                .layouts
                .map(|layout| layout.unwrap_or_else(|| empty.clone())),
        };
        let native = self.device.backend().create_pipeline_layout(&desc)?;
        Ok(Arc::new(PipelineLayout {
            id: ObjectId::next(),
            desc,
            native,
        }))
    }
}
