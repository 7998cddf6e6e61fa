use std::{fmt::Debug, sync::Arc};

use crate::{
    backend::{Backend, NativeCommandBuffer},
    error::{BackendError, Result},
    resources::Buffer,
    sync::{reclaim_in_order, CompletionSignal, ReclaimCallback, Reclaimer, Serial, SerialQueue},
    UsageError,
};

///The command buffer currently being recorded. It is submitted with the serial it was opened for.
pub struct PendingCommands {
    serial: Serial,
    native: Box<dyn NativeCommandBuffer>,
}

impl Debug for PendingCommands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCommands")
            .field("serial", &self.serial)
            .field("commands", &self.native.command_count())
            .finish()
    }
}

impl PendingCommands {
    ///Serial these commands will be submitted with.
    pub fn serial(&self) -> Serial {
        self.serial
    }

    pub fn command_count(&self) -> usize {
        self.native.command_count()
    }

    ///Records a copy of `data` into `dst` at `offset`. Range and usage must have been validated by the caller.
    pub fn copy_staging_to_buffer(
        &mut self,
        data: &[u8],
        dst: &Arc<Buffer>,
        offset: u64,
    ) -> std::result::Result<(), BackendError> {
        self.native.copy_staging_to_buffer(data, dst, offset)
    }

    ///Native command buffer, if it is of type `T`.
    pub fn native_mut<T: 'static>(&mut self) -> Option<&mut T> {
        (*self.native).as_any_mut().downcast_mut()
    }
}

///Serial bookkeeping of a device's queue.
pub(crate) struct SubmissionTracker {
    signal: CompletionSignal,
    pending: Serial,
    finished: Serial,
    commands: Option<PendingCommands>,
    callbacks: SerialQueue<ReclaimCallback>,
}

impl SubmissionTracker {
    pub(crate) fn new(reclamation_capacity: usize) -> Self {
        SubmissionTracker {
            signal: CompletionSignal::new(),
            pending: Serial::new(1),
            finished: Serial::ZERO,
            commands: None,
            callbacks: SerialQueue::with_capacity(reclamation_capacity),
        }
    }

    pub(crate) fn pending_serial(&self) -> Serial {
        self.pending
    }

    pub(crate) fn finished_serial(&self) -> Serial {
        self.finished
    }

    pub(crate) fn last_submitted_serial(&self) -> Serial {
        Serial::new(self.pending.get() - 1)
    }

    pub(crate) fn outstanding_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    ///Returns the open command buffer, opening one through `backend` if needed.
    pub(crate) fn pending_commands(
        &mut self,
        backend: &mut dyn Backend,
    ) -> std::result::Result<&mut PendingCommands, BackendError> {
        let commands = match self.commands.take() {
            Some(commands) => commands,
            None => {
                let native = backend.new_command_buffer()?;
                #[cfg(feature = "logging")]
                log::trace!("Opened command buffer for {}", self.pending);
                PendingCommands {
                    serial: self.pending,
                    native,
                }
            }
        };
        Ok(self.commands.insert(commands))
    }

    ///Submits the open command buffer. Backend failures are returned as [StrataError::Backend](crate::StrataError::Backend), the
    /// pending serial does not advance in that case.
    pub(crate) fn submit(&mut self, backend: &mut dyn Backend) -> Result<Serial> {
        let Some(commands) = self.commands.take() else {
            #[cfg(feature = "logging")]
            log::warn!("Submit without any pending commands, ignoring");
            return Err(UsageError::NothingToSubmit.into());
        };

        let serial = commands.serial;
        debug_assert_eq!(serial, self.pending);

        #[cfg(feature = "logging")]
        log::trace!(
            "Submitting {} commands as {}",
            commands.native.command_count(),
            serial
        );

        self.signal.mark_submitted(serial);
        backend.submit(commands.native, serial, &self.signal)?;
        self.pending = serial.next();
        Ok(serial)
    }

    pub(crate) fn defer_until(&mut self, serial: Serial, callback: ReclaimCallback) {
        self.callbacks.enqueue(serial, callback);
    }

    ///Moves the finished watermark forward and drains everything up to it from the callback queue and `consumers`.
    pub(crate) fn tick(
        &mut self,
        backend: &mut dyn Backend,
        consumers: &mut [&mut dyn Reclaimer],
    ) -> Serial {
        backend.poll(&self.signal);

        //never trust the signal beyond what was actually submitted
        let observed = self.signal.completed().min(self.last_submitted_serial());
        if observed > self.finished {
            self.finished = observed;
        }

        let mut reclaimers: Vec<&mut dyn Reclaimer> = Vec::with_capacity(consumers.len() + 1);
        reclaimers.push(&mut self.callbacks);
        for consumer in consumers.iter_mut() {
            reclaimers.push(&mut **consumer);
        }

        let drained = reclaim_in_order(self.finished, &mut reclaimers);

        #[cfg(feature = "logging")]
        if drained > 0 {
            log::trace!("Tick at {} drained {} serials", self.finished, drained);
        }
        #[cfg(not(feature = "logging"))]
        let _ = drained;

        self.finished
    }
}
