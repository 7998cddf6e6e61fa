use thiserror::Error;

use crate::{
    builder::ObjectKind,
    resources::{BindingType, BufferUsage, ResourceCategory, TextureUsage},
};

///Caller errors. Reported at the call that triggered them, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("{object} property `{property}` set multiple times")]
    DuplicateProperty {
        object: ObjectKind,
        property: &'static str,
    },
    #[error("Bind group layout must be set before any binding")]
    LayoutNotSet,
    #[error("Binding {slot} is already set")]
    SlotAlreadyBound { slot: u32 },
    #[error("No pending command buffer was opened since the last submission")]
    NothingToSubmit,
    #[error("Buffer is already mapped or has a pending map request")]
    BufferAlreadyMapped,
    #[error("Buffer is not mapped")]
    BufferNotMapped,
}

///Usage bit a binding requires from the bound resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredUsage {
    Buffer(BufferUsage),
    Texture(TextureUsage),
}

///Rejected configuration. Nothing gets created, the caller may retry with corrected input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{object} is incomplete: {reason}")]
    IncompleteConfiguration {
        object: ObjectKind,
        reason: String,
    },
    #[error("Bindings {start}..{start}+{count} exceed the maximum of {max} bindings")]
    OutOfRange { start: u32, count: u32, max: u32 },
    #[error("Binding {slot} is not present in the layout")]
    SlotNotInLayout { slot: u32 },
    #[error("Binding {slot} expects {expected:?}, got a {found:?}")]
    TypeMismatch {
        slot: u32,
        expected: BindingType,
        found: ResourceCategory,
    },
    #[error("Binding {slot} needs a resource allowing {required:?}")]
    UsageMismatch { slot: u32, required: RequiredUsage },
    #[error("Buffer view offset {offset} of binding {slot} is not {alignment}-byte aligned")]
    MisalignedOffset {
        slot: u32,
        offset: u64,
        alignment: u64,
    },
    #[error("Invalid {object}: {reason}")]
    InvalidDescriptor {
        object: ObjectKind,
        reason: String,
    },
    #[error("Buffer does not allow {required:?}")]
    MissingUsage { required: BufferUsage },
    #[error("Range {offset}+{size} exceeds {limit}")]
    RangeOutOfBounds { offset: u64, size: u64, limit: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device is lost: {reason}")]
    Lost { reason: String },
}

///Failure reported by backend translation code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Translation failed: {0}")]
    Translation(String),
    #[error("Submitting to queue failed: {0}")]
    Submission(String),
    #[cfg(feature = "vulkan")]
    #[error("Vulkan error: {0}")]
    VkError(#[from] ash::vk::Result),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrataError {
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl StrataError {
    pub fn is_device_lost(&self) -> bool {
        matches!(self, StrataError::Device(DeviceError::Lost { .. }))
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
