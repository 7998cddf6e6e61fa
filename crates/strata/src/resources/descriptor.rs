use std::sync::{Arc, Weak};

use ahash::AHashMap;
use bitflags::bitflags;

use crate::{
    backend::{NativeObject, NativeResult},
    builder::Builder,
    context::Device,
    error::Result,
    lifetime::ObjectId,
    UsageError, ValidationError,
};

use super::{BufferView, Sampler, TextureView};

///Maximum number of bindings a single bind group (layout) can hold.
pub const MAX_BINDINGS_PER_GROUP: u32 = 16;
///Required alignment of buffer view offsets bound to a bind group.
pub const BIND_GROUP_OFFSET_ALIGNMENT: u64 = 256;

const SLOTS: usize = MAX_BINDINGS_PER_GROUP as usize;

bitflags! {
    ///Shader stages a binding is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingType {
    #[default]
    UniformBuffer,
    StorageBuffer,
    Sampler,
    SampledTexture,
}

impl BindingType {
    ///Category of resource that can be bound to a slot of this type.
    pub fn category(&self) -> ResourceCategory {
        match self {
            BindingType::UniformBuffer | BindingType::StorageBuffer => ResourceCategory::BufferView,
            BindingType::Sampler => ResourceCategory::Sampler,
            BindingType::SampledTexture => ResourceCategory::TextureView,
        }
    }
}

///Kind of a [BindingResource].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    BufferView,
    Sampler,
    TextureView,
}

///Set of binding slots. Bit `n` represents slot `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BindingMask(u32);

impl BindingMask {
    pub const fn empty() -> Self {
        BindingMask(0)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, slot: u32) -> bool {
        slot < MAX_BINDINGS_PER_GROUP && self.0 & (1 << slot) != 0
    }

    pub(crate) fn insert(&mut self, slot: u32) {
        debug_assert!(slot < MAX_BINDINGS_PER_GROUP);
        self.0 |= 1 << slot;
    }

    ///Iterates all set slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..MAX_BINDINGS_PER_GROUP).filter(|slot| self.contains(*slot))
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }
}

///Checks that `start..start+count` lies within the binding slots.
pub(crate) fn check_slot_range(start: u32, count: u32) -> Result<()> {
    let in_range = start
        .checked_add(count)
        .map(|end| end <= MAX_BINDINGS_PER_GROUP)
        .unwrap_or(false);
    if in_range {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            start,
            count,
            max: MAX_BINDINGS_PER_GROUP,
        }
        .into())
    }
}

///Validated description of a bind group layout. Slots not part of the `mask` always hold default values, so two
/// layouts describing the same bindings compare (and hash) equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingInfo {
    pub mask: BindingMask,
    pub types: [BindingType; SLOTS],
    pub visibilities: [ShaderStages; SLOTS],
}

impl Default for BindingInfo {
    fn default() -> Self {
        BindingInfo {
            mask: BindingMask::empty(),
            types: [BindingType::default(); SLOTS],
            visibilities: [ShaderStages::empty(); SLOTS],
        }
    }
}

impl BindingInfo {
    pub fn binding_type(&self, slot: u32) -> Option<BindingType> {
        if self.mask.contains(slot) {
            Some(self.types[slot as usize])
        } else {
            None
        }
    }

    pub fn visibility(&self, slot: u32) -> Option<ShaderStages> {
        if self.mask.contains(slot) {
            Some(self.visibilities[slot as usize])
        } else {
            None
        }
    }
}

///Resource that can be bound to a bind group slot. Holds a strong reference.
#[derive(Debug, Clone)]
pub enum BindingResource {
    BufferView(Arc<BufferView>),
    Sampler(Arc<Sampler>),
    TextureView(Arc<TextureView>),
}

impl BindingResource {
    pub fn category(&self) -> ResourceCategory {
        match self {
            BindingResource::BufferView(_) => ResourceCategory::BufferView,
            BindingResource::Sampler(_) => ResourceCategory::Sampler,
            BindingResource::TextureView(_) => ResourceCategory::TextureView,
        }
    }

    ///Id of the underlying resource. For views this is the viewed buffer or texture.
    pub fn resource_id(&self) -> ObjectId {
        match self {
            BindingResource::BufferView(view) => view.buffer().id(),
            BindingResource::Sampler(sampler) => sampler.id(),
            BindingResource::TextureView(view) => view.texture().id(),
        }
    }
}

impl From<Arc<BufferView>> for BindingResource {
    fn from(value: Arc<BufferView>) -> Self {
        BindingResource::BufferView(value)
    }
}

impl From<Arc<Sampler>> for BindingResource {
    fn from(value: Arc<Sampler>) -> Self {
        BindingResource::Sampler(value)
    }
}

impl From<Arc<TextureView>> for BindingResource {
    fn from(value: Arc<TextureView>) -> Self {
        BindingResource::TextureView(value)
    }
}

///Immutable bind group layout. Layouts with equal [BindingInfo] are shared by the device, unless deduplication is
/// disabled.
#[derive(Debug)]
pub struct BindGroupLayout {
    id: ObjectId,
    info: BindingInfo,
    native: Box<dyn NativeObject>,
}

impl BindGroupLayout {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn info(&self) -> &BindingInfo {
        &self.info
    }

    pub fn mask(&self) -> BindingMask {
        self.info.mask
    }

    pub fn native<T: 'static>(&self) -> Option<&T> {
        (*self.native).as_any().downcast_ref()
    }
}

///Per device cache of created layouts. Only holds weak references, dropped layouts get recreated.
#[derive(Default)]
pub(crate) struct LayoutCache {
    layouts: AHashMap<BindingInfo, Weak<BindGroupLayout>>,
}

impl LayoutCache {
    ///Returns the cached layout for `info`, or creates a new one using `create`.
    pub(crate) fn get_or_create(
        &mut self,
        info: BindingInfo,
        deduplicate: bool,
        create: impl FnOnce(&BindingInfo) -> NativeResult,
    ) -> Result<Arc<BindGroupLayout>> {
        if deduplicate {
            if let Some(layout) = self.layouts.get(&info).and_then(Weak::upgrade) {
                #[cfg(feature = "logging")]
                log::trace!("Reusing bind group layout {}", layout.id);
                return Ok(layout);
            }
        }

        let native = create(&info)?;
        let layout = Arc::new(BindGroupLayout {
            id: ObjectId::next(),
            info,
            native,
        });

        if deduplicate {
            self.layouts.retain(|_, w| w.strong_count() > 0);
            self.layouts
                .insert(layout.info.clone(), Arc::downgrade(&layout));
        }

        Ok(layout)
    }

    pub(crate) fn len(&self) -> usize {
        self.layouts.len()
    }
}

///Builds a [BindGroupLayout]. Each slot can be described at most once.
pub struct BindGroupLayoutBuilder<'d> {
    device: &'d Device,
    info: BindingInfo,
}

impl std::fmt::Debug for BindGroupLayoutBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindGroupLayoutBuilder")
            .field("device", &self.device.label())
            .field("info", &self.info)
            .finish()
    }
}

impl<'d> BindGroupLayoutBuilder<'d> {
    pub(crate) fn new(device: &'d Device) -> Self {
        BindGroupLayoutBuilder {
            device,
            info: BindingInfo::default(),
        }
    }

    ///Declares `count` slots starting at `start` to be of type `ty`, visible to `stages`.
    pub fn set_bindings_type(
        &mut self,
        stages: ShaderStages,
        ty: BindingType,
        start: u32,
        count: u32,
    ) -> Result<&mut Self> {
        check_slot_range(start, count)?;
        if let Some(slot) = (start..start + count).find(|s| self.info.mask.contains(*s)) {
            #[cfg(feature = "logging")]
            log::warn!("Layout binding {} declared multiple times", slot);
            return Err(UsageError::SlotAlreadyBound { slot }.into());
        }

        for slot in start..start + count {
            self.info.mask.insert(slot);
            self.info.types[slot as usize] = ty;
            self.info.visibilities[slot as usize] = stages;
        }
        Ok(self)
    }
}

impl Builder for BindGroupLayoutBuilder<'_> {
    type Product = Arc<BindGroupLayout>;

    fn finish(self) -> Result<Arc<BindGroupLayout>> {
        self.device.check_alive()?;
        self.device.bind_group_layout_for(self.info)
    }
}
