//! Queues and job scheduling.
//!
//! Every enqueued command becomes a [`Job`]: an event, the events it depends on and a closure
//! doing the work. Dependencies are the wait list plus, for in-order queues, the previous command;
//! out-of-order queues add the last barrier instead. A job is handed to the rayon pool once every
//! dependency is terminal. A failed dependency terminates the job's event with the same code
//! without running the work.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use ferrocl_abi::{CommandType, ContextId, DeviceId, QueueId, flags, status};
use parking_lot::Mutex;
use rayon::ThreadPool;
use smallvec::SmallVec;
use tracing::trace;

use crate::event::EventObj;
use crate::instrument::{Dispatch, Instruments};

/// Command body. Returns `COMPLETE` or a negative code.
pub(crate) type Work = Box<dyn FnOnce() -> i32 + Send>;

pub(crate) type Dependencies = SmallVec<[Arc<EventObj>; 4]>;

pub(crate) struct Job {
    pub event: Arc<EventObj>,
    pub dependencies: Dependencies,
    pub work: Work,
}

#[derive(Default)]
struct QueueState {
    /// Last command of an in-order queue.
    tail: Option<Arc<EventObj>>,
    /// Last barrier of an out-of-order queue.
    barrier: Option<Arc<EventObj>>,
    /// Commands not known to be terminal yet.
    outstanding: Vec<Arc<EventObj>>,
    /// Jobs waiting for a flush in deferred mode.
    held: Vec<Job>,
}

pub(crate) struct QueueObj {
    pub id: QueueId,
    pub context: ContextId,
    pub device: DeviceId,
    pub properties: u64,
    state: Mutex<QueueState>,
}

impl QueueObj {
    pub fn new(id: QueueId, context: ContextId, device: DeviceId, properties: u64) -> Self {
        Self { id, context, device, properties, state: Mutex::new(QueueState::default()) }
    }

    pub fn in_order(&self) -> bool {
        self.properties & flags::QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE == 0
    }

    pub fn profiling(&self) -> bool {
        self.properties & flags::QUEUE_PROFILING_ENABLE != 0
    }

    /// Add the queue's implicit dependencies to `job`, then dispatch it or hold it until the
    /// next flush.
    ///
    /// `joins_all` makes the job wait for every outstanding command (markers and barriers with an
    /// empty wait list).
    pub fn submit(&self, mut job: Job, joins_all: bool, scheduler: &Arc<Scheduler>, deferred: bool) {
        let ready = {
            let mut state = self.state.lock();
            state.outstanding.retain(|event| !status::is_terminal(event.status()));

            if self.in_order() {
                job.dependencies.extend(state.tail.replace(Arc::clone(&job.event)));
            } else {
                job.dependencies.extend(state.barrier.clone());
                if joins_all {
                    job.dependencies.extend(state.outstanding.iter().cloned());
                }
                if job.event.command == CommandType::Barrier {
                    state.barrier = Some(Arc::clone(&job.event));
                }
            }
            state.outstanding.push(Arc::clone(&job.event));

            if deferred {
                state.held.push(job);
                None
            } else {
                Some(job)
            }
        };

        if let Some(job) = ready {
            scheduler.dispatch(job);
        }
    }

    /// Dispatch every held job, in submission order.
    pub fn flush(&self, scheduler: &Arc<Scheduler>) {
        let held = std::mem::take(&mut self.state.lock().held);
        for job in held {
            scheduler.dispatch(job);
        }
    }

    pub fn outstanding(&self) -> Vec<Arc<EventObj>> {
        self.state.lock().outstanding.clone()
    }
}

impl fmt::Debug for QueueObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueObj")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("device", &self.device)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Runs jobs on the worker pool once their dependencies are terminal.
pub(crate) struct Scheduler {
    pool: ThreadPool,
    instruments: Arc<Instruments>,
}

impl Scheduler {
    pub fn new(pool: ThreadPool, instruments: Arc<Instruments>) -> Self {
        Self { pool, instruments }
    }

    pub fn dispatch(self: &Arc<Self>, job: Job) {
        let Job { event, dependencies, work } = job;
        event.transition(status::SUBMITTED);

        // One extra count keeps the job from launching while continuations are registered.
        let pending = Arc::new(Pending {
            remaining: AtomicUsize::new(dependencies.len() + 1),
            failure: AtomicI32::new(status::COMPLETE),
            job: Mutex::new(Some((event, work))),
            scheduler: Arc::clone(self),
        });
        for dependency in dependencies {
            let pending = Arc::clone(&pending);
            dependency.on_terminal(Box::new(move |code| pending.settle(code)));
        }
        pending.settle(status::COMPLETE);
    }

    /// Hand the job to the pool. Failed jobs settle on the pool too, never on the caller's stack.
    fn launch(&self, event: Arc<EventObj>, work: Work, failure: i32) {
        let instruments = Arc::clone(&self.instruments);
        self.pool.spawn(move || {
            if failure < 0 {
                trace!(event = %event.id, code = failure, "dependency failed, command not run");
                event.transition(failure);
                return;
            }

            event.transition(status::RUNNING);
            if let Some(queue) = event.queue {
                instruments.record_dispatch(Dispatch { queue, command: event.command, event: event.id });
            }
            let code = work();
            event.transition(if code < 0 { code } else { status::COMPLETE });
        });
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").field("threads", &self.pool.current_num_threads()).finish()
    }
}

struct Pending {
    remaining: AtomicUsize,
    /// First negative status among dependencies.
    failure: AtomicI32,
    job: Mutex<Option<(Arc<EventObj>, Work)>>,
    scheduler: Arc<Scheduler>,
}

impl Pending {
    fn settle(&self, code: i32) {
        if code < 0 {
            let _ = self.failure.compare_exchange(status::COMPLETE, code, Ordering::AcqRel, Ordering::Acquire);
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let job = self.job.lock().take();
        if let Some((event, work)) = job {
            self.scheduler.launch(event, work, self.failure.load(Ordering::Acquire));
        }
    }
}
