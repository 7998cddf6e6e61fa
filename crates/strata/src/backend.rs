//! # Backends
//!
//! A [Backend] turns fully validated descriptors into native objects and executes recorded command buffers. One
//! implementation exists per native API. The device picks its backend at construction time and talks to it through
//! dynamic dispatch only.
//!
//! Backend code receives state that already passed all of strata's checks and must not validate again.

use std::{any::Any, fmt::Debug};

use crate::{
    error::BackendError,
    resources::{
        BindGroupState, BindingInfo, Buffer, BufferDescriptor, BufferViewDescriptor,
        PipelineLayoutDescriptor, SamplerDescriptor, TextureDescriptor, TextureViewDescriptor,
    },
    sync::{CompletionSignal, Serial},
};

///Ready made in-process backend, mostly useful for tests and headless tooling.
pub mod null;

///Translation helpers from validated state to ash's vulkan types.
#[cfg(feature = "vulkan")]
pub mod vulkan;

///Backend specific payload of a frontend object.
pub trait NativeObject: Any + Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + Debug> NativeObject for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

///Result of a backend factory.
pub type NativeResult = Result<Box<dyn NativeObject>, BackendError>;

///Native command buffer currently being recorded.
pub trait NativeCommandBuffer: Any + Send + Debug {
    ///Number of commands recorded so far.
    fn command_count(&self) -> usize;

    ///Records a copy of host `data` into `dst` at `offset`. The range is validated by the caller.
    fn copy_staging_to_buffer(
        &mut self,
        data: &[u8],
        dst: &std::sync::Arc<Buffer>,
        offset: u64,
    ) -> Result<(), BackendError>;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    ///Converts into [Any], used by backends to get their own type back on submission.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

///Capability interface every native backend implements.
pub trait Backend: Send + Sync {
    ///Human readable name, used for logging.
    fn name(&self) -> &str;

    fn create_buffer(&self, desc: &BufferDescriptor) -> NativeResult;
    fn create_buffer_view(&self, desc: &BufferViewDescriptor) -> NativeResult;
    fn create_texture(&self, desc: &TextureDescriptor) -> NativeResult;
    fn create_texture_view(&self, desc: &TextureViewDescriptor) -> NativeResult;
    fn create_sampler(&self, desc: &SamplerDescriptor) -> NativeResult;
    fn create_bind_group_layout(&self, info: &BindingInfo) -> NativeResult;
    fn create_bind_group(&self, state: &BindGroupState) -> NativeResult;
    fn create_pipeline_layout(&self, desc: &PipelineLayoutDescriptor) -> NativeResult;

    ///Opens a new command buffer for recording.
    fn new_command_buffer(&mut self) -> Result<Box<dyn NativeCommandBuffer>, BackendError>;

    ///Queues `commands` for execution. Once the device finished them, `signal` must be raised to (at least) `serial`,
    /// either from a completion handler or from [poll](Backend::poll).
    ///
    /// An error is treated as fatal, the device becomes lost.
    fn submit(
        &mut self,
        commands: Box<dyn NativeCommandBuffer>,
        serial: Serial,
        signal: &CompletionSignal,
    ) -> Result<(), BackendError>;

    ///Gives polling based backends the chance to raise `signal`. Must not block.
    fn poll(&mut self, _signal: &CompletionSignal) {}
}
