//! Completion tokens.
//!
//! An [`Event`] stands for one asynchronous operation. The executor drives its status from
//! [`EventStatus::Queued`] toward a terminal state (complete or a negative error code) and never
//! leaves a terminal state. User events are the exception to executor control: the application
//! (or the build bridge) sets their terminal state, exactly once.
//!
//! # Example
//!
//! ```ignore
//! let gate = context.create_user_event()?;
//! let submitted = queue.submit(Command::Marker, CallShape::Enqueued, &WaitList::from(&gate))?;
//!
//! gate.set_status(EventStatus::Complete)?;
//! submitted.event.unwrap().wait()?;
//! ```

use std::sync::Arc;

use ferrocl_abi::{CommandType, Driver, EventId, InfoParam, ProfilingParam, RawId, status};
use snafu::ensure;
use tracing::{debug, trace};

use crate::callback;
use crate::context::Context;
use crate::error::{ExecutorSnafu, InvalidTransitionSnafu, OperationFailedSnafu, ProfilingNotEnabledSnafu, Result};
use crate::handle::{Handle, InfoValueExt};
use crate::queue::CommandQueue;

/// Execution status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStatus {
    Queued,
    Submitted,
    Running,
    Complete,
    /// Terminated with a negative status code.
    Error(i32),
}

impl EventStatus {
    /// Decode an executor status. Unknown positive values read as queued.
    pub fn from_raw(code: i32) -> Self {
        match code {
            status::COMPLETE => Self::Complete,
            status::RUNNING => Self::Running,
            status::SUBMITTED => Self::Submitted,
            code if code < 0 => Self::Error(code),
            _ => Self::Queued,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Queued => status::QUEUED,
            Self::Submitted => status::SUBMITTED,
            Self::Running => status::RUNNING,
            Self::Complete => status::COMPLETE,
            Self::Error(code) => code,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error(_))
    }
}

/// Status an [`Event::on_status`] callback waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Submitted,
    Running,
    /// Also fires on error termination.
    Complete,
}

impl Trigger {
    fn as_raw(self) -> i32 {
        match self {
            Self::Submitted => status::SUBMITTED,
            Self::Running => status::RUNNING,
            Self::Complete => status::COMPLETE,
        }
    }
}

/// Profiling timestamps of a completed command, in nanoseconds of executor time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Profile {
    pub queued: u64,
    pub submit: u64,
    pub start: u64,
    pub end: u64,
}

impl Profile {
    /// Execution time of the command.
    pub fn duration_ns(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    User,
    /// Returned by a submission on a queue with the given profiling setting.
    Queue { profiling: bool },
    /// Command event adopted from a raw identifier.
    Foreign,
}

/// Reference-counted completion token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    handle: Handle<EventId>,
    origin: Origin,
}

impl Event {
    /// Wrap a raw event identifier. The command type is queried to tell user events apart.
    pub fn from_raw(driver: Arc<dyn Driver>, id: EventId, retain_on_construct: bool) -> Result<Self> {
        let handle = Handle::new(driver, id, retain_on_construct)?;
        let command = handle.info(InfoParam::EventCommandType)?.into_command_type("event_command_type")?;
        let origin = if command == CommandType::User { Origin::User } else { Origin::Foreign };
        Ok(Self { handle, origin })
    }

    pub(crate) fn user(driver: Arc<dyn Driver>, id: EventId) -> Result<Self> {
        Ok(Self { handle: Handle::new(driver, id, false)?, origin: Origin::User })
    }

    pub(crate) fn submitted(driver: Arc<dyn Driver>, id: EventId, profiling: bool) -> Result<Self> {
        Ok(Self { handle: Handle::new(driver, id, false)?, origin: Origin::Queue { profiling } })
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self { handle: self.handle.try_clone()?, origin: self.origin })
    }

    pub fn handle(&self) -> &Handle<EventId> {
        &self.handle
    }

    pub fn raw_id(&self) -> EventId {
        self.handle.raw_id()
    }

    pub fn is_user(&self) -> bool {
        self.origin == Origin::User
    }

    /// Current status. Never blocks.
    pub fn status(&self) -> Result<EventStatus> {
        let code = self.handle.info(InfoParam::EventStatus)?.into_int("event_status")?;
        Ok(EventStatus::from_raw(code))
    }

    /// Block until the event is terminal.
    ///
    /// Returns [`Error::OperationFailed`](crate::Error::OperationFailed) with the event's own
    /// error code when it failed.
    pub fn wait(&self) -> Result<()> {
        let id = self.raw_id();
        match self.handle.driver().wait_for_events(std::slice::from_ref(&id)) {
            status::SUCCESS => Ok(()),
            status::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST => {
                let code = match self.status()? {
                    EventStatus::Error(code) => code,
                    _ => status::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST,
                };
                OperationFailedSnafu { code }.fail()
            }
            code => ExecutorSnafu { call: "wait_for_events", code }.fail(),
        }
    }

    pub fn command_type(&self) -> Result<CommandType> {
        self.handle.info(InfoParam::EventCommandType)?.into_command_type("event_command_type")
    }

    pub fn context(&self) -> Result<Context> {
        let id = self.handle.info(InfoParam::Context)?.into_context("context")?;
        Context::from_raw(Arc::clone(self.handle.driver()), id, true)
    }

    /// Queue the command was submitted to; `None` for user events.
    pub fn queue(&self) -> Result<Option<CommandQueue>> {
        let id = self.handle.info(InfoParam::EventQueue)?.into_queue("event_queue")?;
        if id.is_null() {
            return Ok(None);
        }
        CommandQueue::from_raw(Arc::clone(self.handle.driver()), id, true).map(Some)
    }

    fn profiling_info(&self, param: ProfilingParam) -> Result<u64> {
        ensure!(!matches!(self.origin, Origin::User | Origin::Queue { profiling: false }), ProfilingNotEnabledSnafu);

        let mut value = 0;
        match self.handle.driver().get_profiling_info(self.raw_id(), param, &mut value) {
            status::SUCCESS => Ok(value),
            status::PROFILING_INFO_NOT_AVAILABLE if self.origin == Origin::Foreign => ProfilingNotEnabledSnafu.fail(),
            code => ExecutorSnafu { call: "get_profiling_info", code }.fail(),
        }
    }

    pub fn queued_time_ns(&self) -> Result<u64> {
        self.profiling_info(ProfilingParam::Queued)
    }

    pub fn submit_time_ns(&self) -> Result<u64> {
        self.profiling_info(ProfilingParam::Submit)
    }

    /// When the command started executing.
    ///
    /// [`Error::ProfilingNotEnabled`](crate::Error::ProfilingNotEnabled) unless the event came
    /// from a profiling queue. Before the command completes the executor reports
    /// `PROFILING_INFO_NOT_AVAILABLE`.
    pub fn start_time_ns(&self) -> Result<u64> {
        self.profiling_info(ProfilingParam::Start)
    }

    pub fn end_time_ns(&self) -> Result<u64> {
        self.profiling_info(ProfilingParam::End)
    }

    pub fn profile(&self) -> Result<Profile> {
        Ok(Profile {
            queued: self.queued_time_ns()?,
            submit: self.submit_time_ns()?,
            start: self.start_time_ns()?,
            end: self.end_time_ns()?,
        })
    }

    pub fn duration_ns(&self) -> Result<u64> {
        Ok(self.profile()?.duration_ns())
    }

    /// Set the terminal status of a user event.
    ///
    /// Only [`EventStatus::Complete`] and [`EventStatus::Error`] are accepted, once. Anything else,
    /// or any call on a command event, is
    /// [`Error::InvalidTransition`](crate::Error::InvalidTransition).
    pub fn set_status(&self, new_status: EventStatus) -> Result<()> {
        let code = new_status.as_raw();
        ensure!(self.is_user() && new_status.is_terminal(), InvalidTransitionSnafu { status: code });

        match self.handle.driver().set_user_event_status(self.raw_id(), code) {
            status::SUCCESS => {
                debug!(event = %self.raw_id(), status = code, "user event settled");
                Ok(())
            }
            status::INVALID_OPERATION => InvalidTransitionSnafu { status: code }.fail(),
            code => ExecutorSnafu { call: "set_user_event_status", code }.fail(),
        }
    }

    /// Run `callback` once, on an executor thread, when the event reaches `trigger`.
    ///
    /// The callback receives the status reached. It runs immediately (on the calling thread) if
    /// the executor sees the trigger as already reached.
    pub fn on_status<F>(&self, trigger: Trigger, callback: F) -> Result<()>
    where
        F: FnOnce(EventStatus) + Send + 'static,
    {
        trace!(event = %self.raw_id(), ?trigger, "registering status callback");
        callback::register_event(self.handle.driver().as_ref(), self.raw_id(), trigger.as_raw(), move |_, code| {
            callback(EventStatus::from_raw(code))
        })
    }
}
