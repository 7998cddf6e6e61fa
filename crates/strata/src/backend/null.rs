//! In-process backend without any GPU. Buffers are plain host memory, recorded copies are applied when their
//! submission completes.
//!
//! Completion is driven by the host through the [NullQueueControl] returned by [NullBackend::new], which makes it
//! possible to observe every intermediate state of the submission pipeline. A backend built with
//! [auto_complete](NullBackend::auto_complete) finishes every submission immediately instead.

use std::{
    any::Any,
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    builder::ObjectKind,
    error::BackendError,
    resources::{
        BindGroupState, BindingInfo, Buffer, BufferDescriptor, BufferViewDescriptor,
        PipelineLayoutDescriptor, SamplerDescriptor, TextureDescriptor, TextureViewDescriptor,
    },
    sync::{CompletionSignal, Serial},
};

#[cfg(test)]
use crate::context::{Device, DeviceBuilder};

use super::{Backend, NativeCommandBuffer, NativeResult};

///Host side storage of a buffer created by the [NullBackend].
#[derive(Debug)]
pub struct NullBuffer {
    contents: Mutex<Vec<u8>>,
}

impl NullBuffer {
    ///Copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self, offset: u64, data: &[u8]) {
        let mut contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
        let start = offset as usize;
        if let Some(target) = contents.get_mut(start..start + data.len()) {
            target.copy_from_slice(data);
        }
    }
}

///Payload of every other object created by the [NullBackend].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullObject {
    pub kind: ObjectKind,
}

#[derive(Debug)]
pub enum NullCommand {
    CopyToBuffer {
        data: Vec<u8>,
        dst: Arc<Buffer>,
        offset: u64,
    },
}

impl NullCommand {
    fn apply(self) {
        match self {
            NullCommand::CopyToBuffer { data, dst, offset } => {
                if let Some(buffer) = dst.native::<NullBuffer>() {
                    buffer.write(offset, &data);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct NullCommandBuffer {
    commands: Vec<NullCommand>,
}

impl NullCommandBuffer {
    pub fn commands(&self) -> &[NullCommand] {
        &self.commands
    }
}

impl NativeCommandBuffer for NullCommandBuffer {
    fn command_count(&self) -> usize {
        self.commands.len()
    }

    fn copy_staging_to_buffer(
        &mut self,
        data: &[u8],
        dst: &Arc<Buffer>,
        offset: u64,
    ) -> Result<(), BackendError> {
        if dst.native::<NullBuffer>().is_none() {
            return Err(BackendError::Translation(format!(
                "buffer {} was not created by the null backend",
                dst.id()
            )));
        }
        self.commands.push(NullCommand::CopyToBuffer {
            data: data.to_vec(),
            dst: dst.clone(),
            offset,
        });
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

#[derive(Default)]
struct NullQueue {
    submitted: Vec<Serial>,
    in_flight: VecDeque<(Serial, Vec<NullCommand>)>,
    completed: Serial,
    fail_next: Option<String>,
}

impl NullQueue {
    ///Completes in flight work up to `serial`. Serials that were not submitted yet are never completed.
    fn complete_up_to(&mut self, serial: Serial) {
        let last = self.submitted.last().copied().unwrap_or(Serial::ZERO);
        let serial = serial.min(last);
        while let Some((front, _)) = self.in_flight.front() {
            if *front > serial {
                break;
            }
            if let Some((_, commands)) = self.in_flight.pop_front() {
                for command in commands {
                    command.apply();
                }
            }
        }
        self.completed = self.completed.max(serial);
    }
}

///Host side handle to the queue of a [NullBackend].
#[derive(Clone)]
pub struct NullQueueControl {
    queue: Arc<Mutex<NullQueue>>,
}

impl NullQueueControl {
    fn lock(&self) -> MutexGuard<'_, NullQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    ///Finishes all submissions up to and including `serial`. The device observes this on its next tick.
    ///
    /// Only serials submitted so far are affected. Completing a serial ahead of the queue has no effect on later
    /// submissions.
    pub fn complete_up_to(&self, serial: Serial) {
        self.lock().complete_up_to(serial);
    }

    ///Finishes everything submitted so far.
    pub fn complete_all(&self) {
        let mut queue = self.lock();
        if let Some(last) = queue.submitted.last().copied() {
            queue.complete_up_to(last);
        }
    }

    ///Serials of all submissions, in submission order.
    pub fn submitted(&self) -> Vec<Serial> {
        self.lock().submitted.clone()
    }

    ///Number of submissions that did not complete yet.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn completed(&self) -> Serial {
        self.lock().completed
    }

    ///Makes the next submission fail with `reason`.
    pub fn fail_next_submit(&self, reason: impl Into<String>) {
        self.lock().fail_next = Some(reason.into());
    }
}

pub struct NullBackend {
    queue: Arc<Mutex<NullQueue>>,
    auto_complete: bool,
}

impl NullBackend {
    pub fn new() -> (NullBackend, NullQueueControl) {
        let queue = Arc::new(Mutex::new(NullQueue::default()));
        (
            NullBackend {
                queue: queue.clone(),
                auto_complete: false,
            },
            NullQueueControl { queue },
        )
    }

    ///Completes every submission right away.
    pub fn auto_complete(mut self) -> Self {
        self.auto_complete = true;
        self
    }

    #[cfg(test)]
    pub(crate) fn device() -> Device {
        DeviceBuilder::new(NullBackend::new().0)
            .build()
            .unwrap()
    }

    fn lock(&self) -> MutexGuard<'_, NullQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn object(kind: ObjectKind) -> NativeResult {
        Ok(Box::new(NullObject { kind }))
    }
}

impl Backend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> NativeResult {
        let size = usize::try_from(desc.size).map_err(|_| {
            BackendError::Translation(format!("buffer size {} exceeds host memory", desc.size))
        })?;
        Ok(Box::new(NullBuffer {
            contents: Mutex::new(vec![0; size]),
        }))
    }

    fn create_buffer_view(&self, _desc: &BufferViewDescriptor) -> NativeResult {
        Self::object(ObjectKind::BufferView)
    }

    fn create_texture(&self, _desc: &TextureDescriptor) -> NativeResult {
        Self::object(ObjectKind::Texture)
    }

    fn create_texture_view(&self, _desc: &TextureViewDescriptor) -> NativeResult {
        Self::object(ObjectKind::TextureView)
    }

    fn create_sampler(&self, _desc: &SamplerDescriptor) -> NativeResult {
        Self::object(ObjectKind::Sampler)
    }

    fn create_bind_group_layout(&self, _info: &BindingInfo) -> NativeResult {
        Self::object(ObjectKind::BindGroupLayout)
    }

    fn create_bind_group(&self, _state: &BindGroupState) -> NativeResult {
        Self::object(ObjectKind::BindGroup)
    }

    fn create_pipeline_layout(&self, _desc: &PipelineLayoutDescriptor) -> NativeResult {
        Self::object(ObjectKind::PipelineLayout)
    }

    fn new_command_buffer(&mut self) -> Result<Box<dyn NativeCommandBuffer>, BackendError> {
        Ok(Box::new(NullCommandBuffer::default()))
    }

    fn submit(
        &mut self,
        commands: Box<dyn NativeCommandBuffer>,
        serial: Serial,
        signal: &CompletionSignal,
    ) -> Result<(), BackendError> {
        let auto_complete = self.auto_complete;
        let mut queue = self.lock();
        if let Some(reason) = queue.fail_next.take() {
            return Err(BackendError::Submission(reason));
        }

        let commands = commands
            .into_any()
            .downcast::<NullCommandBuffer>()
            .map_err(|_| {
                BackendError::Submission("command buffer was not recorded by the null backend".to_owned())
            })?;

        queue.submitted.push(serial);
        queue.in_flight.push_back((serial, commands.commands));
        if auto_complete {
            queue.complete_up_to(serial);
            signal.complete(serial);
        }
        Ok(())
    }

    fn poll(&mut self, signal: &CompletionSignal) {
        signal.complete(self.lock().completed);
    }
}
