//! # Strata
//!
//! Backend independent frontend of a GPU abstraction. Strata validates everything the application describes before a
//! native backend ever sees it, and keeps track of when the GPU is done with submitted work.
//!
//! # Usage
//!
//! Every object is created through a [builder](builder). A builder is requested from the [Device](context::Device), its
//! properties are set exactly once each and [finish](builder::Builder::finish) validates the configuration and asks the
//! device's [Backend](backend::Backend) for the native object. The result is an immutable object behind an [Arc](std::sync::Arc).
//!
//! Work is recorded into the device's pending command buffer and submitted with a [Serial](sync::Serial). Anything that
//! has to wait for the GPU, like reading back a mapped buffer or recycling staging memory, is registered at a serial and
//! released by [tick](context::Device::tick) once that serial finished.
//!
//! Two backends are provided. The [null](backend::null) backend runs in-process and is used for testing. The
//! [vulkan](backend::vulkan) module translates validated state into ash's vulkan types.

#[cfg(feature = "vulkan")]
pub use ash;

///Backend interface, and the provided backends.
pub mod backend;

///Two phase object construction.
pub mod builder;

///[Device](context::Device) creation, submission and reclamation.
pub mod context;

///Identity of objects and weak back references between them.
pub mod lifetime;

///Buffers, textures, samplers, bind groups and their layouts.
pub mod resources;

///Serials, completion signals and deferred reclamation.
pub mod sync;

mod error;
pub use error::{
    BackendError, DeviceError, RequiredUsage, Result, StrataError, UsageError, ValidationError,
};

pub mod util;
