//! The one-task-at-a-time operation coordinator
//!
//! Every asynchronous GATT/GAP operation - connect, the three discovery
//! flavours, read, write, notify toggle, bonding - runs as the single
//! active task. Starting a second task while one is active is rejected;
//! callers serialize. Completion and failure reports must name the task
//! kind they believe is active: a mismatch means a stray event from an
//! earlier operation and is ignored.
//!
//! The one sanctioned exception to "one operation, one task" is the
//! same-layer hand-off: descriptor discovery does not complete the caller's
//! subscribe operation but switches directly into the notify-toggle task,
//! so one logical operation spans two protocol exchanges. The legal
//! hand-offs live in [`TaskKind::handoff`].

use crate::constants::{MAX_DISCOVERED_CHARACTERISTICS, MAX_DISCOVERED_SERVICES, MAX_EVENT_PAYLOAD};
use crate::gatt::{CharacteristicInfo, ServiceInfo};
use crate::uuid::UuidFilter;
use heapless::Vec;

/// The kinds of asynchronous operation the coordinator serializes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskKind {
    /// Open a central connection
    Connect,
    /// Discover primary services
    PrimaryServiceDiscovery,
    /// Discover characteristics within a service
    CharacteristicDiscovery,
    /// Discover the notification-configuration descriptor of a
    /// characteristic (first half of a subscribe)
    DescriptorDiscovery,
    /// Read a characteristic value
    CharacteristicRead,
    /// Write a characteristic value
    CharacteristicWrite,
    /// Write the notification-configuration descriptor (second half of a
    /// subscribe, or an unsubscribe)
    NotifyToggle,
    /// Secure/bond the link
    Bonding,
}

impl TaskKind {
    /// The task kind this one may hand off into without completing,
    /// if any
    #[must_use]
    pub const fn handoff(self) -> Option<TaskKind> {
        match self {
            TaskKind::DescriptorDiscovery => Some(TaskKind::NotifyToggle),
            _ => None,
        }
    }
}

/// Context and result accumulator of the active task
#[derive(Debug)]
pub struct ActiveTask {
    /// What the task is
    pub kind: TaskKind,
    /// Link handle the task runs on; `None` until a connect resolves
    pub conn: Option<u16>,
    /// UUID filter for a discovery task
    pub filter: UuidFilter,
    /// Last handle of the range a characteristic discovery covers
    pub final_handle: u16,
    /// Characteristic being read/written/subscribed
    pub target: Option<CharacteristicInfo>,
    /// Accumulated services (primary service discovery)
    pub services: Vec<ServiceInfo, MAX_DISCOVERED_SERVICES>,
    /// Accumulated characteristics (characteristic discovery)
    pub characteristics: Vec<CharacteristicInfo, MAX_DISCOVERED_CHARACTERISTICS>,
}

impl ActiveTask {
    /// A task with empty context
    #[must_use]
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            conn: None,
            filter: UuidFilter::Any,
            final_handle: 0,
            target: None,
            services: Vec::new(),
            characteristics: Vec::new(),
        }
    }

    /// Attach the link handle the task runs on
    #[must_use]
    pub fn on_link(mut self, conn: u16) -> Self {
        self.conn = Some(conn);
        self
    }

    /// Attach a discovery filter
    #[must_use]
    pub fn with_filter(mut self, filter: UuidFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Attach the final handle of the discovery range
    #[must_use]
    pub fn until_handle(mut self, final_handle: u16) -> Self {
        self.final_handle = final_handle;
        self
    }

    /// Attach the characteristic the task operates on
    #[must_use]
    pub fn with_target(mut self, target: CharacteristicInfo) -> Self {
        self.target = Some(target);
        self
    }
}

/// Why a task failed: a short classification plus the raw status code when
/// the radio stack supplied one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskFailure {
    /// Human-readable classification
    pub message: &'static str,
    /// Raw status code from the radio stack, if any
    pub status: Option<u32>,
}

impl TaskFailure {
    /// A failure with no stack status attached
    #[must_use]
    pub const fn new(message: &'static str) -> Self {
        Self {
            message,
            status: None,
        }
    }

    /// A failure caused by a radio stack rejection
    #[must_use]
    pub const fn from_radio(error: crate::radio::RadioError) -> Self {
        Self {
            message: "Radio stack error",
            status: Some(error.status),
        }
    }
}

/// Result value a finished task resolves with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    /// Nothing beyond success itself (write, notify toggle, bonding)
    Done,
    /// A central link came up; slot index into the registry
    CentralLink {
        /// Registry slot of the new link
        index: u8,
        /// Link handle
        handle: u16,
    },
    /// Unfiltered service discovery result, ascending handle order
    Services(Vec<ServiceInfo, MAX_DISCOVERED_SERVICES>),
    /// Filtered service discovery result
    Service(ServiceInfo),
    /// Unfiltered characteristic discovery result, ascending handle order
    Characteristics(Vec<CharacteristicInfo, MAX_DISCOVERED_CHARACTERISTICS>),
    /// Filtered characteristic discovery result, or a completed subscribe
    Characteristic(CharacteristicInfo),
    /// A read characteristic value
    Value(Vec<u8, MAX_EVENT_PAYLOAD>),
}

/// A resolved task: what it was and how it ended
#[derive(Debug)]
pub struct TaskOutcome {
    /// Kind of the task that resolved
    pub kind: TaskKind,
    /// Success value or failure classification
    pub result: Result<TaskResult, TaskFailure>,
}

/// Rejection returned when a task is started while one is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRejected;

/// An operation waiting to be re-issued after a transient busy rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRetry {
    /// The operation to re-issue
    pub op: RetryOp,
    /// Radio ticks until the retry fires
    pub ticks_left: u16,
}

/// Operations the busy-retry policy knows how to re-issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOp {
    /// Re-issue `discover_primary_services` from handle 1
    PrimaryServiceDiscovery {
        /// Link handle the discovery runs on
        conn: u16,
    },
}

/// Serializes the asynchronous operations: at most one task is active
#[derive(Debug, Default)]
pub struct TaskCoordinator {
    active: Option<ActiveTask>,
}

impl TaskCoordinator {
    /// A coordinator with no active task
    #[must_use]
    pub const fn new() -> Self {
        Self { active: None }
    }

    /// Is no task active?
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Kind of the active task, if any
    #[must_use]
    pub fn current_kind(&self) -> Option<TaskKind> {
        self.active.as_ref().map(|task| task.kind)
    }

    /// Is a task of `kind` active?
    #[must_use]
    pub fn in_task(&self, kind: TaskKind) -> bool {
        self.current_kind() == Some(kind)
    }

    /// Borrow the active task
    #[must_use]
    pub fn active(&self) -> Option<&ActiveTask> {
        self.active.as_ref()
    }

    /// Mutably borrow the active task
    pub fn active_mut(&mut self) -> Option<&mut ActiveTask> {
        self.active.as_mut()
    }

    /// Start a task.
    ///
    /// # Errors
    /// Rejected when a task is already active; the active task is left
    /// untouched.
    pub fn start(&mut self, task: ActiveTask) -> Result<(), TaskRejected> {
        if self.active.is_some() {
            return Err(TaskRejected);
        }
        self.active = Some(task);
        Ok(())
    }

    /// Hand the active task off into its continuation kind, keeping its
    /// context.
    ///
    /// Only the transitions listed in [`TaskKind::handoff`] are legal;
    /// anything else is ignored and reported as `false`.
    pub fn switch_to(&mut self, next: TaskKind) -> bool {
        match self.active.as_mut() {
            Some(task) if task.kind.handoff() == Some(next) => {
                task.kind = next;
                true
            }
            _ => false,
        }
    }

    /// Resolve the active task successfully.
    ///
    /// Returns the task for the caller to build its result from, or `None`
    /// when no task of `kind` is active (a stray completion, ignored).
    pub fn complete_success(&mut self, kind: TaskKind) -> Option<ActiveTask> {
        if self.in_task(kind) {
            self.active.take()
        } else {
            None
        }
    }

    /// Resolve the active task as failed.
    ///
    /// Same matching rule as [`TaskCoordinator::complete_success`]: a kind
    /// mismatch is a stray event and changes nothing.
    pub fn complete_failure(&mut self, kind: TaskKind) -> Option<ActiveTask> {
        if self.in_task(kind) {
            self.active.take()
        } else {
            None
        }
    }

    /// Fail the active task because its link dropped.
    ///
    /// Applies to any task bound to `conn`; takes priority over whatever
    /// the task was waiting for.
    pub fn fail_on_disconnect(&mut self, conn: u16) -> Option<ActiveTask> {
        if self
            .active
            .as_ref()
            .is_some_and(|task| task.conn == Some(conn))
        {
            self.active.take()
        } else {
            None
        }
    }

    /// Take the active task unconditionally (timeout handling)
    pub fn take(&mut self) -> Option<ActiveTask> {
        self.active.take()
    }
}
