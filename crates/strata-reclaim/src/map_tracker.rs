use std::sync::Arc;

use slotmap::SlotMap;
use strata::{
    context::Device,
    resources::{Buffer, BufferUsage, MapTicket},
    sync::{Reclaimer, Serial, SerialQueue},
    DeviceError, Result, ValidationError,
};

slotmap::new_key_type! {
    ///Handle of a map request issued through a [MapRequestTracker].
    pub struct MapRequestId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    Read,
    Write,
}

impl MapMode {
    ///Usage a buffer needs to be mapped in this mode.
    pub fn required_usage(&self) -> BufferUsage {
        match self {
            MapMode::Read => BufferUsage::MAP_READ,
            MapMode::Write => BufferUsage::MAP_WRITE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapStatus {
    ///The range is mapped and can be accessed until the buffer is unmapped.
    Success,
    ///The request was cancelled, either through [MapRequestTracker::cancel] or by unmapping the buffer.
    Cancelled,
}

///Passed to the callback of a map request once it resolved.
#[derive(Debug)]
pub struct MapCompletion<'a> {
    pub id: MapRequestId,
    pub buffer: &'a Arc<Buffer>,
    pub mode: MapMode,
    pub offset: u64,
    pub size: u64,
    pub status: MapStatus,
}

pub type MapCallback = Box<dyn FnOnce(MapCompletion<'_>) + Send + 'static>;

struct MapRequest {
    buffer: Arc<Buffer>,
    ticket: MapTicket,
    mode: MapMode,
    offset: u64,
    size: u64,
    callback: MapCallback,
}

impl MapRequest {
    fn resolve(self, id: MapRequestId, status: MapStatus) {
        let MapRequest {
            buffer,
            mode,
            offset,
            size,
            callback,
            ..
        } = self;
        callback(MapCompletion {
            id,
            buffer: &buffer,
            mode,
            offset,
            size,
            status,
        });
    }
}

///Tracks buffer map requests until the GPU finished all work that was pending when the request was issued.
///
/// The tracker is driven by passing it to [Device::tick_with].
#[derive(Default)]
pub struct MapRequestTracker {
    requests: SlotMap<MapRequestId, MapRequest>,
    queue: SerialQueue<MapRequestId>,
}

impl MapRequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    ///Requests `size` bytes at `offset` of `buffer` to be mapped in `mode`. `callback` runs exactly once, either on the
    /// tick that observes the device's current pending serial as finished, or when the request gets cancelled.
    pub fn request(
        &mut self,
        device: &Device,
        buffer: &Arc<Buffer>,
        mode: MapMode,
        offset: u64,
        size: u64,
        callback: impl FnOnce(MapCompletion<'_>) + Send + 'static,
    ) -> Result<MapRequestId> {
        if let Some(reason) = device.lost_reason() {
            return Err(DeviceError::Lost {
                reason: reason.to_owned(),
            }
            .into());
        }

        let required = mode.required_usage();
        if !buffer.allowed_usage().contains(required) {
            return Err(ValidationError::MissingUsage { required }.into());
        }

        let in_bounds = offset
            .checked_add(size)
            .map(|end| end <= buffer.size())
            .unwrap_or(false);
        if !in_bounds {
            return Err(ValidationError::RangeOutOfBounds {
                offset,
                size,
                limit: buffer.size(),
            }
            .into());
        }

        let ticket = buffer.begin_map()?;
        let serial = device.pending_serial();
        let id = self.requests.insert(MapRequest {
            buffer: buffer.clone(),
            ticket,
            mode,
            offset,
            size,
            callback: Box::new(callback),
        });
        self.queue.enqueue(serial, id);

        #[cfg(feature = "logging")]
        log::trace!(
            "Map request {:?} of buffer {} waits for {}",
            id,
            buffer.id(),
            serial
        );

        Ok(id)
    }

    ///Cancels a request that did not resolve yet. Its callback runs immediately with [MapStatus::Cancelled].
    ///
    /// Returns false if `id` is unknown or already resolved.
    pub fn cancel(&mut self, id: MapRequestId) -> bool {
        let Some(request) = self.requests.remove(id) else {
            return false;
        };
        self.queue.retain(|queued| *queued != id);

        //an unmap may already have withdrawn the request, the buffer then belongs to whoever mapped it since
        let withdrawn = request.buffer.cancel_map(request.ticket);
        #[cfg(feature = "logging")]
        log::warn!(
            "Cancelled map request {:?} (buffer {} {})",
            id,
            request.buffer.id(),
            if withdrawn { "unmapped" } else { "left as is" }
        );
        #[cfg(not(feature = "logging"))]
        let _ = withdrawn;

        request.resolve(id, MapStatus::Cancelled);
        true
    }

    ///Number of requests that did not resolve yet.
    pub fn pending(&self) -> usize {
        self.requests.len()
    }

    pub fn is_pending(&self, id: MapRequestId) -> bool {
        self.requests.contains_key(id)
    }
}

impl Reclaimer for MapRequestTracker {
    fn oldest_serial(&self) -> Option<Serial> {
        self.queue.oldest_serial()
    }

    fn reclaim(&mut self, serial: Serial) {
        for id in self.queue.take_up_to(serial) {
            let Some(request) = self.requests.remove(id) else {
                continue;
            };

            let status = if request.buffer.complete_map(request.ticket) {
                MapStatus::Success
            } else {
                #[cfg(feature = "logging")]
                log::warn!(
                    "Buffer {} was unmapped before map request {:?} resolved",
                    request.buffer.id(),
                    id
                );
                MapStatus::Cancelled
            };
            request.resolve(id, status);
        }
    }
}
