use std::sync::{Arc, Mutex, PoisonError};

use smallvec::SmallVec;

use crate::{
    backend::Backend,
    error::Result,
    lifetime::{DependentIndex, ObjectId},
    resources::{
        descriptor::LayoutCache, BindGroup, BindGroupBuilder, BindGroupLayout,
        BindGroupLayoutBuilder, BindingInfo, Buffer, BufferBuilder, BufferViewBuilder,
        PipelineLayoutBuilder, SamplerBuilder, Texture, TextureBuilder, TextureViewBuilder,
    },
    sync::{Reclaimer, Serial},
    DeviceError, StrataError,
};

use super::submission::{PendingCommands, SubmissionTracker};

///Configures a [Device]. All fields are public, use [with](DeviceBuilder::with) to change them inline.
pub struct DeviceBuilder {
    pub backend: Box<dyn Backend>,
    ///Name used in log messages.
    pub label: String,
    ///If set, bind group layouts with equal bindings are shared instead of created multiple times.
    pub deduplicate_layouts: bool,
    ///Initial capacity of the device's reclamation queue.
    pub reclamation_capacity: usize,
}

impl DeviceBuilder {
    pub fn new(backend: impl Backend + 'static) -> Self {
        DeviceBuilder {
            backend: Box::new(backend),
            label: String::from("device"),
            deduplicate_layouts: true,
            reclamation_capacity: 16,
        }
    }

    pub fn with(mut self, mut mapping: impl FnMut(&mut DeviceBuilder)) -> Self {
        mapping(&mut self);
        self
    }

    pub fn build(self) -> Result<Device> {
        let DeviceBuilder {
            backend,
            label,
            deduplicate_layouts,
            reclamation_capacity,
        } = self;

        let mut layouts = LayoutCache::default();
        let empty_layout = layouts.get_or_create(BindingInfo::default(), deduplicate_layouts, |info| {
            backend.create_bind_group_layout(info)
        })?;

        #[cfg(feature = "logging")]
        log::trace!("Created device \"{}\" on backend {}", label, backend.name());

        Ok(Device {
            label,
            backend,
            deduplicate_layouts,
            empty_layout,
            layouts: Mutex::new(layouts),
            relations: Mutex::new(DependentIndex::default()),
            submission: SubmissionTracker::new(reclamation_capacity),
            lost: None,
        })
    }
}

///Frontend device. Creates objects through its backend and tracks the work submitted to its queue.
///
/// Once a submission fails the device is *lost*. Every fallible operation then returns [DeviceError::Lost].
pub struct Device {
    label: String,
    backend: Box<dyn Backend>,
    deduplicate_layouts: bool,
    empty_layout: Arc<BindGroupLayout>,
    layouts: Mutex<LayoutCache>,
    relations: Mutex<DependentIndex<BindGroup>>,
    submission: SubmissionTracker,
    lost: Option<String>,
}

impl Device {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub(crate) fn check_alive(&self) -> Result<()> {
        match &self.lost {
            Some(reason) => Err(DeviceError::Lost {
                reason: reason.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }

    fn lose(&mut self, reason: String) {
        #[cfg(feature = "logging")]
        log::error!("Device \"{}\" lost: {}", self.label, reason);
        self.lost = Some(reason);
    }

    pub fn is_lost(&self) -> bool {
        self.lost.is_some()
    }

    pub fn lost_reason(&self) -> Option<&str> {
        self.lost.as_deref()
    }

    pub fn create_buffer_builder(&self) -> BufferBuilder<'_> {
        BufferBuilder::new(self)
    }

    pub fn create_buffer_view_builder(&self, buffer: &Arc<Buffer>) -> BufferViewBuilder<'_> {
        BufferViewBuilder::new(self, buffer.clone())
    }

    pub fn create_texture_builder(&self) -> TextureBuilder<'_> {
        TextureBuilder::new(self)
    }

    pub fn create_texture_view_builder(&self, texture: &Arc<Texture>) -> TextureViewBuilder<'_> {
        TextureViewBuilder::new(self, texture.clone())
    }

    pub fn create_sampler_builder(&self) -> SamplerBuilder<'_> {
        SamplerBuilder::new(self)
    }

    pub fn create_bind_group_layout_builder(&self) -> BindGroupLayoutBuilder<'_> {
        BindGroupLayoutBuilder::new(self)
    }

    pub fn create_bind_group_builder(&self) -> BindGroupBuilder<'_> {
        BindGroupBuilder::new(self)
    }

    pub fn create_pipeline_layout_builder(&self) -> PipelineLayoutBuilder<'_> {
        PipelineLayoutBuilder::new(self)
    }

    ///Layout without any binding. Used for every unset bind group of a pipeline layout.
    pub fn empty_bind_group_layout(&self) -> &Arc<BindGroupLayout> {
        &self.empty_layout
    }

    pub(crate) fn bind_group_layout_for(&self, info: BindingInfo) -> Result<Arc<BindGroupLayout>> {
        let mut layouts = self.layouts.lock().unwrap_or_else(PoisonError::into_inner);
        layouts.get_or_create(info, self.deduplicate_layouts, |info| {
            self.backend.create_bind_group_layout(info)
        })
    }

    ///Number of distinct layouts currently known to the layout cache.
    pub fn cached_layouts(&self) -> usize {
        self.layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    ///Records which resources `group` uses, without keeping the group alive.
    pub(crate) fn register_bind_group(&self, group: &Arc<BindGroup>) {
        let mut ids = group
            .state()
            .bindings
            .iter()
            .flatten()
            .map(|resource| resource.resource_id())
            .collect::<SmallVec<[ObjectId; 16]>>();
        ids.sort_unstable();
        ids.dedup();

        let mut relations = self.relations.lock().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            relations.insert(id, group);
        }
    }

    ///All living bind groups that bind the buffer, texture or sampler `resource`.
    pub fn bind_groups_using(&self, resource: ObjectId) -> Vec<Arc<BindGroup>> {
        self.relations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dependents(resource)
    }

    ///Number of resources with recorded bind group relations, including ones that are not pruned yet.
    pub fn tracked_relations(&self) -> usize {
        self.relations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tracked_resources()
    }

    ///Returns the command buffer that is going to be submitted next. Opens it if needed.
    pub fn pending_commands(&mut self) -> Result<&mut PendingCommands> {
        self.check_alive()?;
        Ok(self.submission.pending_commands(self.backend.as_mut())?)
    }

    ///Serial the pending command buffer is going to be submitted with.
    pub fn pending_serial(&self) -> Serial {
        self.submission.pending_serial()
    }

    pub fn finished_serial(&self) -> Serial {
        self.submission.finished_serial()
    }

    pub fn last_submitted_serial(&self) -> Serial {
        self.submission.last_submitted_serial()
    }

    ///Submits the pending command buffer and returns its serial.
    ///
    /// Fails with [NothingToSubmit](crate::UsageError::NothingToSubmit) if no command buffer was opened since the last
    /// submission. A failing backend submission makes the device lost.
    pub fn submit_pending_commands(&mut self) -> Result<Serial> {
        self.check_alive()?;
        match self.submission.submit(self.backend.as_mut()) {
            Err(StrataError::Backend(e)) => {
                self.lose(e.to_string());
                Err(e.into())
            }
            other => other,
        }
    }

    ///Runs `callback` once the work of `serial` has finished, on the first [tick](Device::tick) that observes it.
    ///
    /// Fails on a lost device, its callbacks would never run.
    pub fn defer_until(
        &mut self,
        serial: Serial,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        self.check_alive()?;
        self.submission.defer_until(serial, Box::new(callback));
        Ok(())
    }

    ///Number of callbacks registered through [defer_until](Device::defer_until) that did not run yet.
    pub fn outstanding_reclamations(&self) -> usize {
        self.submission.outstanding_callbacks()
    }

    ///Polls the backend and releases every deferred callback whose serial has finished. Never blocks.
    pub fn tick(&mut self) -> Result<Serial> {
        self.tick_with(&mut [])
    }

    ///Like [tick](Device::tick), but additionally drains `consumers`. Across all of them, and the device's own callbacks,
    /// work is released in serial order.
    pub fn tick_with(&mut self, consumers: &mut [&mut dyn Reclaimer]) -> Result<Serial> {
        self.check_alive()?;
        let finished = self.submission.tick(self.backend.as_mut(), consumers);
        self.relations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .prune();
        Ok(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::null::NullBackend, builder::Builder, UsageError};
    use static_assertions::assert_impl_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn impl_send() {
        assert_impl_all!(Device: Send);
        assert_impl_all!(DeviceBuilder: Send);
    }

    #[test]
    fn builder_defaults() {
        let (backend, _queue) = NullBackend::new();
        let device = DeviceBuilder::new(backend)
            .with(|b| b.label = "test".to_owned())
            .build()
            .unwrap();
        assert_eq!(device.label(), "test");
        assert_eq!(device.pending_serial(), Serial::new(1));
        assert_eq!(device.finished_serial(), Serial::ZERO);
        assert_eq!(device.last_submitted_serial(), Serial::ZERO);
        assert!(!device.is_lost());
        assert_eq!(device.cached_layouts(), 1);
    }

    #[test]
    fn nothing_to_submit() {
        let (backend, _queue) = NullBackend::new();
        let mut device = DeviceBuilder::new(backend).build().unwrap();
        assert_eq!(
            device.submit_pending_commands().unwrap_err(),
            StrataError::Usage(UsageError::NothingToSubmit)
        );
        assert_eq!(device.pending_serial(), Serial::new(1));

        //an opened but empty buffer still consumes a serial
        assert_eq!(device.pending_commands().unwrap().command_count(), 0);
        assert_eq!(device.submit_pending_commands().unwrap(), Serial::new(1));
        assert_eq!(device.pending_serial(), Serial::new(2));
        assert!(device.submit_pending_commands().is_err());
    }

    #[test]
    fn pending_commands_is_stable() {
        let mut device = NullBackend::device();
        assert_eq!(device.pending_commands().unwrap().serial(), Serial::new(1));
        assert_eq!(device.pending_commands().unwrap().serial(), Serial::new(1));
        device.submit_pending_commands().unwrap();
        assert_eq!(device.pending_commands().unwrap().serial(), Serial::new(2));
    }

    #[test]
    fn deferred_callbacks_wait_for_completion() {
        let (backend, queue) = NullBackend::new();
        let mut device = DeviceBuilder::new(backend).build().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        device.pending_commands().unwrap();
        let serial = device.submit_pending_commands().unwrap();
        let counter = fired.clone();
        device.defer_until(serial, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(device.outstanding_reclamations(), 1);

        device.tick().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        queue.complete_up_to(serial);
        assert_eq!(device.tick().unwrap(), serial);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        device.tick().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(device.outstanding_reclamations(), 0);
    }

    #[test]
    fn finished_is_clamped_to_submitted() {
        let (backend, queue) = NullBackend::new();
        let mut device = DeviceBuilder::new(backend).build().unwrap();
        device.pending_commands().unwrap();
        device.submit_pending_commands().unwrap();

        queue.complete_up_to(Serial::new(10));
        assert_eq!(device.tick().unwrap(), Serial::new(1));
    }

    #[test]
    fn failed_submission_loses_device() {
        let (backend, queue) = NullBackend::new();
        let mut device = DeviceBuilder::new(backend).build().unwrap();
        queue.fail_next_submit("out of memory");
        device.pending_commands().unwrap();
        assert!(matches!(
            device.submit_pending_commands(),
            Err(StrataError::Backend(_))
        ));
        assert!(device.is_lost());
        assert!(device.lost_reason().unwrap().contains("out of memory"));

        assert!(device.tick().unwrap_err().is_device_lost());
        assert!(device.pending_commands().unwrap_err().is_device_lost());
        assert!(device
            .create_sampler_builder()
            .finish()
            .unwrap_err()
            .is_device_lost());
    }
}
