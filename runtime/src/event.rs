//! Executor-side events.
//!
//! An event is a one-way status cell: it moves from `QUEUED` toward a terminal status (`COMPLETE`
//! or a negative code) and stays there. Waiters block on a parking_lot condvar; listeners
//! (application callbacks and the scheduler's continuations) fire once, after the state lock has
//! been released, from whichever thread performed the transition.

use std::ffi::c_void;
use std::fmt;
use std::time::Instant;

use ferrocl_abi::{CommandType, ContextId, EventCallback, EventId, ProfilingParam, QueueId, status};
use parking_lot::{Condvar, Mutex};
use tracing::trace;

/// Scheduler hook run with the terminal status.
pub(crate) type Continuation = Box<dyn FnOnce(i32) + Send>;

struct Listener {
    trigger: i32,
    callback: EventCallback,
    user_data: usize,
}

struct State {
    status: i32,
    /// Indexed by [`slot`].
    timestamps: [Option<u64>; 4],
    listeners: Vec<Listener>,
    continuations: Vec<Continuation>,
}

fn slot(param: ProfilingParam) -> usize {
    match param {
        ProfilingParam::Queued => 0,
        ProfilingParam::Submit => 1,
        ProfilingParam::Start => 2,
        ProfilingParam::End => 3,
    }
}

/// Whether a status at or past `trigger` has been reached. Errors count as complete.
fn reached(status: i32, trigger: i32) -> bool {
    status <= trigger
}

pub(crate) struct EventObj {
    pub id: EventId,
    pub context: ContextId,
    /// `None` for user events.
    pub queue: Option<QueueId>,
    pub command: CommandType,
    pub profiling: bool,
    epoch: Instant,
    state: Mutex<State>,
    changed: Condvar,
}

impl EventObj {
    fn new(
        id: EventId,
        context: ContextId,
        queue: Option<QueueId>,
        command: CommandType,
        profiling: bool,
        epoch: Instant,
    ) -> Self {
        let initial = if command == CommandType::User { status::SUBMITTED } else { status::QUEUED };
        let mut timestamps = [None; 4];
        timestamps[slot(ProfilingParam::Queued)] = Some(nanos_since(epoch));
        Self {
            id,
            context,
            queue,
            command,
            profiling,
            epoch,
            state: Mutex::new(State { status: initial, timestamps, listeners: Vec::new(), continuations: Vec::new() }),
            changed: Condvar::new(),
        }
    }

    /// Event of a queued command, starting at `QUEUED`.
    pub fn command(
        id: EventId,
        context: ContextId,
        queue: QueueId,
        command: CommandType,
        profiling: bool,
        epoch: Instant,
    ) -> Self {
        Self::new(id, context, Some(queue), command, profiling, epoch)
    }

    /// User event, starting at `SUBMITTED`.
    pub fn user(id: EventId, context: ContextId, epoch: Instant) -> Self {
        Self::new(id, context, None, CommandType::User, false, epoch)
    }

    pub fn status(&self) -> i32 {
        self.state.lock().status
    }

    pub fn timestamp(&self, param: ProfilingParam) -> Option<u64> {
        self.state.lock().timestamps[slot(param)]
    }

    /// Move to `next`. Returns `false` (and changes nothing) if the event is already terminal or
    /// `next` is not past the current status.
    pub fn transition(&self, next: i32) -> bool {
        let (listeners, continuations) = {
            let mut state = self.state.lock();
            if status::is_terminal(state.status) || (!status::is_terminal(next) && next >= state.status) {
                return false;
            }
            state.status = next;

            let now = nanos_since(self.epoch);
            let stamp = match next {
                status::SUBMITTED => Some(ProfilingParam::Submit),
                status::RUNNING => Some(ProfilingParam::Start),
                status::COMPLETE => Some(ProfilingParam::End),
                _ => None,
            };
            if let Some(param) = stamp {
                state.timestamps[slot(param)] = Some(now);
            }

            let (fired, pending): (Vec<_>, Vec<_>) =
                std::mem::take(&mut state.listeners).into_iter().partition(|listener| reached(next, listener.trigger));
            state.listeners = pending;
            let continuations =
                if status::is_terminal(next) { std::mem::take(&mut state.continuations) } else { Vec::new() };
            (fired, continuations)
        };
        self.changed.notify_all();
        trace!(event = %self.id, status = next, listeners = listeners.len(), "event transition");

        for listener in listeners {
            self.invoke(&listener, next);
        }
        for continuation in continuations {
            continuation(next);
        }
        true
    }

    /// Block until terminal and return the terminal status.
    pub fn wait(&self) -> i32 {
        let mut state = self.state.lock();
        while !status::is_terminal(state.status) {
            self.changed.wait(&mut state);
        }
        state.status
    }

    /// Register an application callback. Invoked right away if `trigger` is already reached.
    pub fn add_callback(&self, trigger: i32, callback: EventCallback, user_data: usize) {
        let listener = Listener { trigger, callback, user_data };
        let current = {
            let mut state = self.state.lock();
            if !reached(state.status, trigger) {
                state.listeners.push(listener);
                return;
            }
            state.status
        };
        self.invoke(&listener, current);
    }

    /// Register a scheduler continuation. Runs right away if the event is already terminal.
    pub fn on_terminal(&self, continuation: Continuation) {
        let current = {
            let mut state = self.state.lock();
            if !status::is_terminal(state.status) {
                state.continuations.push(continuation);
                return;
            }
            state.status
        };
        continuation(current);
    }

    fn invoke(&self, listener: &Listener, status: i32) {
        // SAFETY: the registrant handed over `user_data` for exactly this one invocation.
        unsafe { (listener.callback)(self.id, status, listener.user_data as *mut c_void) }
    }
}

impl fmt::Debug for EventObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventObj")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

pub(crate) fn nanos_since(epoch: Instant) -> u64 {
    u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
}
