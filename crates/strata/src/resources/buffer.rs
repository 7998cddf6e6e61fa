use std::sync::{Arc, Mutex, PoisonError};

use bitflags::bitflags;

use crate::{
    backend::NativeObject,
    builder::{Builder, ObjectKind, Property, PropertySet},
    context::Device,
    error::Result,
    lifetime::ObjectId,
    UsageError, ValidationError,
};

bitflags! {
    ///Ways a buffer may be used. Fixed at creation time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const MAP_READ = 1 << 0;
        const MAP_WRITE = 1 << 1;
        const TRANSFER_SRC = 1 << 2;
        const TRANSFER_DST = 1 << 3;
        const INDEX = 1 << 4;
        const VERTEX = 1 << 5;
        const UNIFORM = 1 << 6;
        const STORAGE = 1 << 7;
    }
}

///Validated buffer state handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub size: u64,
    pub allowed_usage: BufferUsage,
    pub initial_usage: BufferUsage,
}

///Proof of a map request. Only the latest request of a buffer can complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapStatus {
    Unmapped,
    Pending,
    Mapped,
}

#[derive(Debug)]
struct MapState {
    generation: u64,
    status: MapStatus,
}

///Immutable buffer. The only mutable state is whether it is currently mapped by the host.
#[derive(Debug)]
pub struct Buffer {
    id: ObjectId,
    desc: BufferDescriptor,
    map: Mutex<MapState>,
    native: Box<dyn NativeObject>,
}

impl Buffer {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn desc(&self) -> &BufferDescriptor {
        &self.desc
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn allowed_usage(&self) -> BufferUsage {
        self.desc.allowed_usage
    }

    ///Backend payload, if it is of type `T`.
    pub fn native<T: 'static>(&self) -> Option<&T> {
        (*self.native).as_any().downcast_ref()
    }

    ///Marks the buffer as having a pending map request. Fails if the buffer is mapped already, or another request is pending.
    pub fn begin_map(&self) -> Result<MapTicket> {
        let mut state = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        if state.status != MapStatus::Unmapped {
            return Err(UsageError::BufferAlreadyMapped.into());
        }
        state.generation += 1;
        state.status = MapStatus::Pending;
        Ok(MapTicket(state.generation))
    }

    ///Completes the request identified by `ticket`. Returns false if the request was cancelled by an [unmap](Buffer::unmap) in the meantime.
    pub fn complete_map(&self, ticket: MapTicket) -> bool {
        let mut state = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        if state.status == MapStatus::Pending && state.generation == ticket.0 {
            state.status = MapStatus::Mapped;
            true
        } else {
            false
        }
    }

    ///Withdraws the pending request identified by `ticket`. Returns false, and leaves the buffer untouched, if that request
    /// is no longer the buffer's current one.
    pub fn cancel_map(&self, ticket: MapTicket) -> bool {
        let mut state = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        if state.status == MapStatus::Pending && state.generation == ticket.0 {
            state.status = MapStatus::Unmapped;
            state.generation += 1;
            true
        } else {
            false
        }
    }

    ///Unmaps the buffer, or cancels its pending map request.
    pub fn unmap(&self) -> Result<()> {
        let mut state = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        if state.status == MapStatus::Unmapped {
            return Err(UsageError::BufferNotMapped.into());
        }
        state.status = MapStatus::Unmapped;
        state.generation += 1;
        Ok(())
    }

    pub fn is_mapped(&self) -> bool {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).status == MapStatus::Mapped
    }

    pub fn has_pending_map(&self) -> bool {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).status == MapStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferProperty {
    Size,
    AllowedUsage,
    InitialUsage,
}

impl Property for BufferProperty {
    const OBJECT: ObjectKind = ObjectKind::Buffer;
    fn bit(self) -> u32 {
        match self {
            BufferProperty::Size => 0x1,
            BufferProperty::AllowedUsage => 0x2,
            BufferProperty::InitialUsage => 0x4,
        }
    }
    fn name(self) -> &'static str {
        match self {
            BufferProperty::Size => "size",
            BufferProperty::AllowedUsage => "allowed usage",
            BufferProperty::InitialUsage => "initial usage",
        }
    }
}

pub struct BufferBuilder<'d> {
    device: &'d Device,
    properties: PropertySet<BufferProperty>,
    size: u64,
    allowed_usage: BufferUsage,
    initial_usage: BufferUsage,
}

impl<'d> BufferBuilder<'d> {
    pub(crate) fn new(device: &'d Device) -> Self {
        BufferBuilder {
            device,
            properties: PropertySet::default(),
            size: 0,
            allowed_usage: BufferUsage::empty(),
            initial_usage: BufferUsage::empty(),
        }
    }

    pub fn set_size(&mut self, size: u64) -> Result<&mut Self> {
        self.properties.mark(BufferProperty::Size)?;
        self.size = size;
        Ok(self)
    }

    pub fn set_allowed_usage(&mut self, usage: BufferUsage) -> Result<&mut Self> {
        self.properties.mark(BufferProperty::AllowedUsage)?;
        self.allowed_usage = usage;
        Ok(self)
    }

    pub fn set_initial_usage(&mut self, usage: BufferUsage) -> Result<&mut Self> {
        self.properties.mark(BufferProperty::InitialUsage)?;
        self.initial_usage = usage;
        Ok(self)
    }

    fn invalid(reason: &str) -> crate::StrataError {
        ValidationError::InvalidDescriptor {
            object: ObjectKind::Buffer,
            reason: reason.to_owned(),
        }
        .into()
    }
}

impl Builder for BufferBuilder<'_> {
    type Product = Arc<Buffer>;

    fn finish(self) -> Result<Arc<Buffer>> {
        self.device.check_alive()?;
        self.properties
            .require(&[BufferProperty::Size, BufferProperty::AllowedUsage])?;

        if self.size == 0 {
            return Err(Self::invalid("size must not be 0"));
        }
        if !self.allowed_usage.contains(self.initial_usage) {
            return Err(Self::invalid("initial usage must be part of the allowed usage"));
        }
        if self
            .allowed_usage
            .contains(BufferUsage::MAP_READ | BufferUsage::MAP_WRITE)
        {
            return Err(Self::invalid(
                "buffer can not be mapped for reading and writing",
            ));
        }

        let desc = BufferDescriptor {
            size: self.size,
            allowed_usage: self.allowed_usage,
            initial_usage: self.initial_usage,
        };
        let native = self.device.backend().create_buffer(&desc)?;

        let buffer = Arc::new(Buffer {
            id: ObjectId::next(),
            desc,
            map: Mutex::new(MapState {
                generation: 0,
                status: MapStatus::Unmapped,
            }),
            native,
        });

        #[cfg(feature = "logging")]
        log::trace!(
            "Created buffer {} of size {} with {:?}",
            buffer.id,
            buffer.desc.size,
            buffer.desc.allowed_usage
        );

        Ok(buffer)
    }
}

///Validated buffer view state handed to the backend.
#[derive(Debug, Clone)]
pub struct BufferViewDescriptor {
    pub buffer: Arc<Buffer>,
    pub offset: u64,
    pub size: u64,
}

///Byte range of a buffer. Keeps its buffer alive.
#[derive(Debug)]
pub struct BufferView {
    id: ObjectId,
    desc: BufferViewDescriptor,
    native: Box<dyn NativeObject>,
}

impl BufferView {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.desc.buffer
    }

    pub fn offset(&self) -> u64 {
        self.desc.offset
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn native<T: 'static>(&self) -> Option<&T> {
        (*self.native).as_any().downcast_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferViewProperty {
    Extent,
}

impl Property for BufferViewProperty {
    const OBJECT: ObjectKind = ObjectKind::BufferView;
    fn bit(self) -> u32 {
        0x1
    }
    fn name(self) -> &'static str {
        "extent"
    }
}

pub struct BufferViewBuilder<'d> {
    device: &'d Device,
    buffer: Arc<Buffer>,
    properties: PropertySet<BufferViewProperty>,
    offset: u64,
    size: u64,
}

impl<'d> BufferViewBuilder<'d> {
    pub(crate) fn new(device: &'d Device, buffer: Arc<Buffer>) -> Self {
        BufferViewBuilder {
            device,
            buffer,
            properties: PropertySet::default(),
            offset: 0,
            size: 0,
        }
    }

    pub fn set_extent(&mut self, offset: u64, size: u64) -> Result<&mut Self> {
        self.properties.mark(BufferViewProperty::Extent)?;
        self.offset = offset;
        self.size = size;
        Ok(self)
    }
}

impl Builder for BufferViewBuilder<'_> {
    type Product = Arc<BufferView>;

    fn finish(self) -> Result<Arc<BufferView>> {
        self.device.check_alive()?;
        self.properties.require(&[BufferViewProperty::Extent])?;

        let in_bounds = self
            .offset
            .checked_add(self.size)
            .map(|end| end <= self.buffer.size())
            .unwrap_or(false);
        if !in_bounds {
            return Err(ValidationError::RangeOutOfBounds {
                offset: self.offset,
                size: self.size,
                limit: self.buffer.size(),
            }
            .into());
        }

        let desc = BufferViewDescriptor {
            buffer: self.buffer,
            offset: self.offset,
            size: self.size,
        };
        let native = self.device.backend().create_buffer_view(&desc)?;

        Ok(Arc::new(BufferView {
            id: ObjectId::next(),
            desc,
            native,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::null::NullBackend, StrataError};
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Buffer: Send, Sync);
        assert_impl_all!(BufferView: Send, Sync);
    }

    fn buffer(device: &Device, size: u64, usage: BufferUsage) -> Arc<Buffer> {
        let mut builder = device.create_buffer_builder();
        builder.set_size(size).unwrap().set_allowed_usage(usage).unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn required_properties() {
        let device = NullBackend::device();
        let mut builder = device.create_buffer_builder();
        builder.set_size(16).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(StrataError::Validation(ValidationError::IncompleteConfiguration { .. }))
        ));

        let b = buffer(&device, 16, BufferUsage::UNIFORM);
        assert_eq!(b.size(), 16);
        assert_eq!(b.desc().initial_usage, BufferUsage::empty());
    }

    #[test]
    fn duplicate_size() {
        let device = NullBackend::device();
        let mut builder = device.create_buffer_builder();
        builder.set_size(16).unwrap();
        builder.set_allowed_usage(BufferUsage::UNIFORM).unwrap();
        assert!(matches!(
            builder.set_size(32),
            Err(StrataError::Usage(UsageError::DuplicateProperty { .. }))
        ));
        //failed set keeps the first value
        assert_eq!(builder.finish().unwrap().size(), 16);
    }

    #[test]
    fn rejects_inconsistent_usage() {
        let device = NullBackend::device();
        let mut builder = device.create_buffer_builder();
        builder
            .set_size(4)
            .unwrap()
            .set_allowed_usage(BufferUsage::UNIFORM)
            .unwrap()
            .set_initial_usage(BufferUsage::STORAGE)
            .unwrap();
        assert!(builder.finish().is_err());

        let mut builder = device.create_buffer_builder();
        builder
            .set_size(4)
            .unwrap()
            .set_allowed_usage(BufferUsage::MAP_READ | BufferUsage::MAP_WRITE)
            .unwrap();
        assert!(builder.finish().is_err());

        let mut builder = device.create_buffer_builder();
        builder
            .set_size(0)
            .unwrap()
            .set_allowed_usage(BufferUsage::UNIFORM)
            .unwrap();
        assert!(builder.finish().is_err());
    }

    #[test]
    fn view_extent_in_bounds() {
        let device = NullBackend::device();
        let b = buffer(&device, 512, BufferUsage::UNIFORM);

        let mut builder = device.create_buffer_view_builder(&b);
        builder.set_extent(256, 256).unwrap();
        let view = builder.finish().unwrap();
        assert_eq!(view.offset(), 256);
        assert!(Arc::ptr_eq(view.buffer(), &b));

        let mut builder = device.create_buffer_view_builder(&b);
        builder.set_extent(256, 257).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(StrataError::Validation(ValidationError::RangeOutOfBounds { .. }))
        ));

        let mut builder = device.create_buffer_view_builder(&b);
        builder.set_extent(u64::MAX, 2).unwrap();
        assert!(builder.finish().is_err());
    }

    #[test]
    fn map_state_machine() {
        let device = NullBackend::device();
        let b = buffer(&device, 64, BufferUsage::MAP_READ);

        assert!(b.unmap().is_err());
        let first = b.begin_map().unwrap();
        assert!(b.has_pending_map());
        assert_eq!(
            b.begin_map().unwrap_err(),
            StrataError::Usage(UsageError::BufferAlreadyMapped)
        );

        //cancel, then a new request
        b.unmap().unwrap();
        let second = b.begin_map().unwrap();
        assert!(!b.complete_map(first));
        assert!(b.complete_map(second));
        assert!(b.is_mapped());
        b.unmap().unwrap();
        assert!(!b.is_mapped());
    }

    #[test]
    fn stale_ticket_does_not_cancel() {
        let device = NullBackend::device();
        let b = buffer(&device, 64, BufferUsage::MAP_READ);

        let stale = b.begin_map().unwrap();
        b.unmap().unwrap();
        let current = b.begin_map().unwrap();

        assert!(!b.cancel_map(stale));
        assert!(b.has_pending_map());
        assert!(b.cancel_map(current));
        assert!(!b.has_pending_map());
        assert!(!b.cancel_map(current));
        assert!(!b.complete_map(current));
    }
}
