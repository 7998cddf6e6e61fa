//! # Strata-Reclaim
//!
//! Consumers of finished serials. Each of them owns its data and registers work at a serial, the device releases that work
//! through [Device::tick_with](strata::context::Device::tick_with) once the GPU is done.
//!
//! - [MapRequestTracker] resolves buffer map requests.
//! - [UploadRecycler] stages host data for uploads and recycles the staging memory.
//!
//! ```
//! use strata::{backend::null::NullBackend, builder::Builder, context::DeviceBuilder, resources::BufferUsage};
//! use strata_reclaim::{MapRequestTracker, UploadRecycler};
//!
//! let (backend, queue) = NullBackend::new();
//! let mut device = DeviceBuilder::new(backend).build().unwrap();
//! let mut builder = device.create_buffer_builder();
//! builder.set_size(16).unwrap().set_allowed_usage(BufferUsage::TRANSFER_DST).unwrap();
//! let buffer = builder.finish().unwrap();
//!
//! let mut maps = MapRequestTracker::new();
//! let mut uploads = UploadRecycler::new(1024, 4);
//! uploads.upload_to_buffer(&mut device, &buffer, 0, &[1.0f32, 2.0]).unwrap();
//! let serial = device.submit_pending_commands().unwrap();
//!
//! queue.complete_up_to(serial);
//! device.tick_with(&mut [&mut maps, &mut uploads]).unwrap();
//! assert_eq!(uploads.free_chunks(), 1);
//! ```

mod map_tracker;
pub use map_tracker::{
    MapCallback, MapCompletion, MapMode, MapRequestId, MapRequestTracker, MapStatus,
};

mod upload;
pub use upload::{StagingChunk, UploadRecycler};
