//! # Serials
//!
//! Every submission to a device's queue is tagged with a [Serial]. Serials are handed out strictly increasing, starting
//! at 1, and are never reused. The device keeps two of them:
//!
//! - the *pending* serial: the one the currently recorded command buffer will carry once submitted,
//! - the *finished* serial: the highest serial the backend has reported complete.
//!
//! Work that must wait for the GPU (completing a map request, recycling staging memory) registers itself at a serial and
//! is released by the next `tick` that observes that serial as finished. See [SerialQueue] and [Reclaimer].
//!
//! ## Completion signal
//!
//! Backends report completion through a [CompletionSignal]. It may be raised from a driver thread. The only thing it does is
//! to move an atomic watermark forward, the owner thread picks that value up on its next tick.

use std::{
    collections::VecDeque,
    fmt::Display,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use smallvec::SmallVec;

///Submission point on a device's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Serial(u64);

impl Serial {
    ///Serial before any submission.
    pub const ZERO: Serial = Serial(0);

    pub const fn new(value: u64) -> Self {
        Serial(value)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }

    pub const fn next(&self) -> Serial {
        Serial(self.0 + 1)
    }
}

impl From<u64> for Serial {
    fn from(value: u64) -> Self {
        Serial(value)
    }
}

impl Display for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Serial({})", self.0)
    }
}

///Watermark a backend raises once the work of a serial has completed. Cheap to clone, can be moved into
/// completion handlers that run on other threads.
///
/// The watermark never passes the highest serial marked as submitted. Completions reported for later serials are cut
/// down to that bound when they are raised.
#[derive(Debug, Clone, Default)]
pub struct CompletionSignal {
    completed: Arc<AtomicU64>,
    submitted: Arc<AtomicU64>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    ///Marks `serial` as handed to the queue. Must happen before the backend may complete it.
    pub fn mark_submitted(&self, serial: Serial) {
        self.submitted.fetch_max(serial.get(), Ordering::Release);
    }

    ///Highest serial marked as submitted.
    pub fn submitted(&self) -> Serial {
        Serial(self.submitted.load(Ordering::Acquire))
    }

    ///Marks all work up to and including `serial` as complete. Lower values than the current one are ignored, higher
    /// values than the submitted bound are clamped to it.
    pub fn complete(&self, serial: Serial) {
        let bound = self.submitted.load(Ordering::Acquire);
        #[cfg(feature = "logging")]
        if serial.get() > bound {
            log::warn!("{} reported complete, but only up to Serial({}) was submitted", serial, bound);
        }
        self.completed
            .fetch_max(serial.get().min(bound), Ordering::Release);
    }

    ///Highest serial signaled so far.
    pub fn completed(&self) -> Serial {
        Serial(self.completed.load(Ordering::Acquire))
    }
}

///Values keyed by serial, drained once their serial is finished.
///
/// Entries are kept sorted by serial. Values sharing a serial are kept in insertion order, but no order is promised to consumers.
pub struct SerialQueue<T> {
    buckets: VecDeque<(Serial, SmallVec<[T; 4]>)>,
    len: usize,
}

impl<T> Default for SerialQueue<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<T> SerialQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        SerialQueue {
            buckets: VecDeque::with_capacity(capacity),
            len: 0,
        }
    }

    pub fn enqueue(&mut self, serial: Serial, value: T) {
        self.len += 1;
        //common case: serials arrive in non decreasing order
        if let Some((last, bucket)) = self.buckets.back_mut() {
            if *last == serial {
                bucket.push(value);
                return;
            }
            if *last < serial {
                self.buckets.push_back((serial, smallvec::smallvec![value]));
                return;
            }
        } else {
            self.buckets.push_back((serial, smallvec::smallvec![value]));
            return;
        }

        match self.buckets.binary_search_by(|(s, _)| s.cmp(&serial)) {
            Ok(idx) => self.buckets[idx].1.push(value),
            Err(idx) => self
                .buckets
                .insert(idx, (serial, smallvec::smallvec![value])),
        }
    }

    ///Lowest serial that still has values.
    pub fn oldest_serial(&self) -> Option<Serial> {
        self.buckets.front().map(|(s, _)| *s)
    }

    ///Removes and returns all values registered at a serial lower or equal to `serial`, lowest serial first.
    pub fn take_up_to(&mut self, serial: Serial) -> Vec<T> {
        let mut taken = Vec::new();
        while let Some((front, _)) = self.buckets.front() {
            if *front > serial {
                break;
            }
            if let Some((_, bucket)) = self.buckets.pop_front() {
                taken.extend(bucket);
            }
        }
        self.len -= taken.len();
        taken
    }

    ///Iterates all queued values together with their serial.
    pub fn iter(&self) -> impl Iterator<Item = (Serial, &T)> {
        self.buckets
            .iter()
            .flat_map(|(s, bucket)| bucket.iter().map(move |v| (*s, v)))
    }

    ///Removes all values for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        for (_, bucket) in self.buckets.iter_mut() {
            bucket.retain(|v| keep(v));
        }
        self.buckets.retain(|(_, bucket)| !bucket.is_empty());
        self.len = self.buckets.iter().map(|(_, b)| b.len()).sum();
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

///Consumer of finished serials. Implemented by anything that defers work until the GPU is done with it, while keeping its own data.
///
/// The device drives all reclaimers passed to [tick_with](crate::context::Device::tick_with) together with its own callback queue,
/// always releasing the lowest outstanding serial first. Reclaiming is expected to succeed, a failure in here is a bug.
pub trait Reclaimer {
    ///Lowest serial this reclaimer still holds work for.
    fn oldest_serial(&self) -> Option<Serial>;
    ///Releases all work registered at a serial lower or equal to `serial`.
    fn reclaim(&mut self, serial: Serial);
}

///Deferred callback registered through [defer_until](crate::context::Device::defer_until).
pub type ReclaimCallback = Box<dyn FnOnce() + Send + 'static>;

impl Reclaimer for SerialQueue<ReclaimCallback> {
    fn oldest_serial(&self) -> Option<Serial> {
        SerialQueue::oldest_serial(self)
    }

    fn reclaim(&mut self, serial: Serial) {
        for callback in self.take_up_to(serial) {
            callback();
        }
    }
}

///Releases everything up to `finished` from all `reclaimers`, globally ordered by serial.
///
/// Returns the number of reclaim steps that were executed.
pub fn reclaim_in_order(finished: Serial, reclaimers: &mut [&mut dyn Reclaimer]) -> usize {
    let mut steps = 0;
    loop {
        let mut next: Option<(Serial, usize)> = None;
        for (idx, reclaimer) in reclaimers.iter().enumerate() {
            if let Some(serial) = reclaimer.oldest_serial() {
                let lower = match next {
                    Some((best, _)) => serial < best,
                    None => true,
                };
                if serial <= finished && lower {
                    next = Some((serial, idx));
                }
            }
        }

        let Some((serial, idx)) = next else {
            break;
        };

        #[cfg(feature = "logging")]
        log::trace!("Reclaiming {} on consumer {}", serial, idx);

        reclaimers[idx].reclaim(serial);
        steps += 1;
    }
    steps
}
