use std::sync::Arc;

use bytemuck::Pod;
use strata::{
    context::Device,
    resources::{Buffer, BufferUsage},
    sync::{Reclaimer, Serial, SerialQueue},
    Result, ValidationError,
};

///Host memory holding data on its way to the GPU.
#[derive(Debug)]
pub struct StagingChunk {
    data: Vec<u8>,
}

impl StagingChunk {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}

///Hands out staging chunks and takes them back once the submission that read them finished.
///
/// Chunks are at least `chunk_size` bytes big. At most `max_free` retired chunks are kept for reuse, everything beyond
/// is freed.
pub struct UploadRecycler {
    chunk_size: usize,
    max_free: usize,
    free: Vec<Vec<u8>>,
    in_flight: SerialQueue<Vec<u8>>,
    allocations: usize,
}

impl UploadRecycler {
    pub fn new(chunk_size: usize, max_free: usize) -> Self {
        UploadRecycler {
            chunk_size,
            max_free,
            free: Vec::with_capacity(max_free),
            in_flight: SerialQueue::new(),
            allocations: 0,
        }
    }

    ///Copies `data` into a staging chunk, reusing a free chunk if one is big enough.
    pub fn stage<T: Pod>(&mut self, data: &[T]) -> StagingChunk {
        let bytes: &[u8] = bytemuck::cast_slice(data);

        let mut chunk = match self.free.iter().position(|c| c.capacity() >= bytes.len()) {
            Some(idx) => self.free.swap_remove(idx),
            None => {
                self.allocations += 1;
                Vec::with_capacity(bytes.len().max(self.chunk_size))
            }
        };
        chunk.clear();
        chunk.extend_from_slice(bytes);
        StagingChunk { data: chunk }
    }

    ///Keeps `chunk` alive until `serial` finished. It is recycled on the tick that observes that.
    pub fn retire(&mut self, chunk: StagingChunk, serial: Serial) {
        self.in_flight.enqueue(serial, chunk.data);
    }

    fn recycle(&mut self, chunk: Vec<u8>) {
        if self.free.len() < self.max_free {
            self.free.push(chunk);
        }
    }

    ///Records an upload of `data` into `dst` at `offset` into the device's pending command buffer. Returns the serial
    /// the upload is going to be submitted with.
    pub fn upload_to_buffer<T: Pod>(
        &mut self,
        device: &mut Device,
        dst: &Arc<Buffer>,
        offset: u64,
        data: &[T],
    ) -> Result<Serial> {
        if !dst.allowed_usage().contains(BufferUsage::TRANSFER_DST) {
            return Err(ValidationError::MissingUsage {
                required: BufferUsage::TRANSFER_DST,
            }
            .into());
        }

        let size = std::mem::size_of_val(data) as u64;
        let in_bounds = offset
            .checked_add(size)
            .map(|end| end <= dst.size())
            .unwrap_or(false);
        if !in_bounds {
            return Err(ValidationError::RangeOutOfBounds {
                offset,
                size,
                limit: dst.size(),
            }
            .into());
        }

        let commands = device.pending_commands()?;
        let chunk = self.stage(data);
        if let Err(e) = commands.copy_staging_to_buffer(chunk.as_bytes(), dst, offset) {
            self.recycle(chunk.data);
            return Err(e.into());
        }

        let serial = commands.serial();
        #[cfg(feature = "logging")]
        log::trace!(
            "Staged {} bytes for buffer {} at {}",
            chunk.len(),
            dst.id(),
            serial
        );
        self.retire(chunk, serial);
        Ok(serial)
    }

    ///Retired chunks ready for reuse.
    pub fn free_chunks(&self) -> usize {
        self.free.len()
    }

    ///Chunks waiting for their submission to finish.
    pub fn in_flight_chunks(&self) -> usize {
        self.in_flight.len()
    }

    ///Number of chunks allocated over the lifetime of this recycler.
    pub fn allocations(&self) -> usize {
        self.allocations
    }
}

impl Reclaimer for UploadRecycler {
    fn oldest_serial(&self) -> Option<Serial> {
        self.in_flight.oldest_serial()
    }

    fn reclaim(&mut self, serial: Serial) {
        for chunk in self.in_flight.take_up_to(serial) {
            self.recycle(chunk);
        }
    }
}
