//! Call log, dispatch log and fault injection.

use std::collections::{HashMap, VecDeque};

use ferrocl_abi::{CommandType, DeviceId, EventId, ProgramId, QueueId};
use parking_lot::Mutex;
use tracing::debug;

/// One recorded executor call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Call {
    /// `Driver` method name.
    pub name: &'static str,
    /// Raw identifier of the object the call targets, `0` if none.
    pub target: usize,
}

/// One command that started executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dispatch {
    pub queue: QueueId,
    pub command: CommandType,
    pub event: EventId,
}

#[derive(Debug, Default)]
pub(crate) struct Instruments {
    calls: Mutex<Vec<Call>>,
    faults: Mutex<HashMap<&'static str, VecDeque<i32>>>,
    build_queries: Mutex<HashMap<(ProgramId, DeviceId), usize>>,
    dispatches: Mutex<Vec<Dispatch>>,
}

impl Instruments {
    /// Record a call; returns an injected failure if one is pending for `name`.
    pub fn enter(&self, name: &'static str, target: usize) -> Option<i32> {
        self.calls.lock().push(Call { name, target });
        let code = self.faults.lock().get_mut(name).and_then(VecDeque::pop_front)?;
        debug!(call = name, target, code, "injecting failure");
        Some(code)
    }

    pub fn fail_next(&self, name: &'static str, code: i32) {
        self.faults.lock().entry(name).or_default().push_back(code);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn count_build_query(&self, program: ProgramId, device: DeviceId) {
        *self.build_queries.lock().entry((program, device)).or_default() += 1;
    }

    pub fn build_queries(&self, program: ProgramId, device: DeviceId) -> usize {
        self.build_queries.lock().get(&(program, device)).copied().unwrap_or(0)
    }

    pub fn record_dispatch(&self, dispatch: Dispatch) {
        self.dispatches.lock().push(dispatch);
    }

    pub fn dispatches(&self, queue: QueueId) -> Vec<Dispatch> {
        self.dispatches.lock().iter().filter(|dispatch| dispatch.queue == queue).copied().collect()
    }
}
