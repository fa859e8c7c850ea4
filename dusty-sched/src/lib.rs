//! Contract for the cooperative task scheduler the dusty driver crates run
//! under.
//!
//! The embedding firmware owns a single-threaded scheduler that invokes
//! registered tasks at planned ticks. Drivers never block: a driver that has
//! to wait for its device plans a future invocation of one of its tasks and
//! returns control. This crate defines only the seam (the [`Scheduler`]
//! trait, the millisecond [`Tick`] clock, and the [`TICK_INFINITY`] "never
//! run" sentinel) so that drivers can be written and tested without any
//! concrete executor.
//!
//! Task dispatch is the embedder's job: [`Scheduler::register`] hands out a
//! [`TaskId`], and when that task's planned tick arrives the embedder calls
//! back into whichever driver entry point it mapped the id to.
#![deny(unsafe_code, missing_docs)]
#![no_std]

#[cfg(feature = "mock")]
extern crate std;

#[cfg(feature = "mock")]
pub mod mock;

/// A point in scheduler time, in milliseconds since boot.
pub type Tick = u64;

/// Sentinel tick meaning "never run".
///
/// Plans and intervals saturate: adding any delay to [`TICK_INFINITY`]
/// stays at [`TICK_INFINITY`].
pub const TICK_INFINITY: Tick = Tick::MAX;

/// Opaque handle of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(usize);

impl TaskId {
    /// Wrap a raw slot index. Meant for `Scheduler` implementations;
    /// drivers treat the id as opaque.
    #[inline]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// The raw slot index this id wraps.
    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }
}

/// A cooperative, single-threaded task scheduler.
///
/// All tasks execute on one logical thread with no preemption; a running
/// task may therefore mutate state shared with other tasks of the same
/// driver without locking. The `plan_current_*` methods address the task
/// that is currently executing and may only be called from inside a task
/// invocation.
pub trait Scheduler {
    /// Register a new task, initially planned `initial_delay` from now.
    ///
    /// Pass [`TICK_INFINITY`] to register a task that stays dormant until
    /// planned explicitly.
    fn register(&mut self, initial_delay: Tick) -> TaskId;

    /// Plan `task` to run on the next scheduling pass.
    fn plan_now(&mut self, task: TaskId);

    /// Plan `task` to run `delay` after the current time.
    fn plan_from_now(&mut self, task: TaskId, delay: Tick);

    /// Plan `task` to run at the absolute tick `at`.
    fn plan_absolute(&mut self, task: TaskId, at: Tick);

    /// Plan the currently running task `delay` after the tick it was
    /// planned to fire at. Repeated use yields a drift-free period.
    fn plan_current_relative(&mut self, delay: Tick);

    /// Plan the currently running task `delay` after the current time.
    fn plan_current_from_now(&mut self, delay: Tick);
}
