//! ## Context
//!
//! The [Device] is the entry point for everything strata does. It owns the [Backend](crate::backend::Backend) that creates
//! native objects and executes work, hands out builders for every object kind, and tracks submissions to its queue.
//!
//! Object creation only needs a shared reference to the device. Recording, submitting and [ticking](Device::tick) needs
//! exclusive access, which keeps the pending command buffer and the serial bookkeeping on a single owner thread.
//!
//! # Example
//!
//! ```
//! use strata::{backend::null::NullBackend, builder::Builder, context::DeviceBuilder, resources::BufferUsage};
//!
//! let (backend, queue) = NullBackend::new();
//! let mut device = DeviceBuilder::new(backend)
//!     .with(|b| b.label = "example".to_owned())
//!     .build()
//!     .unwrap();
//!
//! let mut builder = device.create_buffer_builder();
//! builder.set_size(256).unwrap().set_allowed_usage(BufferUsage::UNIFORM).unwrap();
//! let _buffer = builder.finish().unwrap();
//!
//! device.pending_commands().unwrap();
//! let serial = device.submit_pending_commands().unwrap();
//! queue.complete_up_to(serial);
//! assert_eq!(device.tick().unwrap(), serial);
//! ```

mod device;
pub use device::{Device, DeviceBuilder};

mod submission;
pub use submission::PendingCommands;
