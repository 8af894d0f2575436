//! [`SoftDriver`]: the [`Driver`] implementation.

use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use ferrocl_abi::{
    BuildCallback, BuildInfoParam, CommandType, ContextId, DeviceId, Driver, EventCallback, EventId, InfoParam,
    InfoValue, KernelId, MemDestructorCallback, MemId, ObjectRef, ProfilingParam, ProgramId, QueueId, RawCommand,
    RawId, RawKernelArg, flags, status,
};
use snafu::{ResultExt, ensure};
use tracing::{debug, info, trace, warn};

use crate::commands::prepare;
use crate::config::SoftConfig;
use crate::error::{NoDevicesSnafu, Result, ThreadPoolSnafu};
use crate::event::EventObj;
use crate::instrument::{Call, Dispatch, Instruments};
use crate::objects::{ContextObj, MemObj, Object, ObjectTable, Released, invalid};
use crate::program::{
    ArgValue, Compiled, KernelFn, KernelInvocation, KernelObj, KernelRegistry, ProgramObj, SoftKernel, compile,
    valid_options,
};
use crate::queue::{Dependencies, Job, QueueObj, Scheduler};

const MEM_ACCESS: u64 = flags::MEM_READ_WRITE | flags::MEM_WRITE_ONLY | flags::MEM_READ_ONLY;
const QUEUE_PROPERTIES: u64 = flags::QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE | flags::QUEUE_PROFILING_ENABLE;

/// Record the call and return early with an injected failure, if any.
macro_rules! enter {
    ($self:ident, $name:literal, $target:expr) => {
        if let Some(code) = $self.shared.instruments.enter($name, $target) {
            return code;
        }
    };
}

/// Unwrap a `Result<T, i32>` or return the status code.
macro_rules! try_status {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(code) => return code,
        }
    };
}

struct Shared {
    config: SoftConfig,
    devices: Vec<DeviceId>,
    objects: ObjectTable,
    kernels: KernelRegistry,
    scheduler: Arc<Scheduler>,
    instruments: Arc<Instruments>,
    /// Origin of profiling timestamps.
    epoch: Instant,
}

/// In-process executor running commands on a rayon pool.
///
/// Buffers live in host memory and kernels are host closures registered with
/// [`register_kernel`](Self::register_kernel). Besides the [`Driver`] calls it records every call
/// and every dispatched command, and can be told to fail a call with a given code.
///
/// Clones share the same executor state.
///
/// # Examples
///
/// ```
/// use ferrocl_abi::{ContextId, Driver, status};
/// use ferrocl_runtime::{SoftConfig, SoftDriver};
///
/// let driver = SoftDriver::new(SoftConfig::builder().devices(2).build()).unwrap();
/// let mut context = ContextId::default();
/// assert_eq!(driver.create_context(driver.devices(), &mut context), status::SUCCESS);
/// ```
#[derive(Clone)]
pub struct SoftDriver {
    shared: Arc<Shared>,
}

impl SoftDriver {
    pub fn new(config: SoftConfig) -> Result<Self> {
        ensure!(config.devices > 0, NoDevicesSnafu);

        let mut pool = rayon::ThreadPoolBuilder::new().thread_name(|index| format!("ferrocl-soft-{index}"));
        if let Some(threads) = config.threads {
            pool = pool.num_threads(threads);
        }
        let pool = pool.build().context(ThreadPoolSnafu)?;

        info!(
            devices = config.devices,
            threads = pool.current_num_threads(),
            deferred = config.deferred,
            "software executor started"
        );

        let instruments = Arc::new(Instruments::default());
        let scheduler = Arc::new(Scheduler::new(pool, Arc::clone(&instruments)));
        let devices = (1..=config.devices).map(DeviceId).collect();
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                devices,
                objects: ObjectTable::default(),
                kernels: KernelRegistry::default(),
                scheduler,
                instruments,
                epoch: Instant::now(),
            }),
        })
    }

    /// Executor configured from `FERROCL_SOFT_*` variables, see [`SoftConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(SoftConfig::from_env())
    }

    pub fn config(&self) -> &SoftConfig {
        &self.shared.config
    }

    pub fn devices(&self) -> &[DeviceId] {
        &self.shared.devices
    }

    /// Make `name` available to `kernel name` directives of later builds.
    ///
    /// The kernel takes `arity` arguments, all of which must be set before it is enqueued.
    pub fn register_kernel<F>(&self, name: impl Into<String>, arity: u32, body: F)
    where
        F: Fn(&KernelInvocation<'_>) -> i32 + Send + Sync + 'static,
    {
        let body: Arc<KernelFn> = Arc::new(body);
        self.shared.kernels.register(name.into(), SoftKernel { arity, body });
    }

    /// Force the per-device outcome of the next build of `program`.
    ///
    /// Statuses apply to the build's target devices in order; targets past the end of `statuses`
    /// get the compiled outcome. Statuses other than `BUILD_SUCCESS` and `BUILD_ERROR` are
    /// reported as is. Returns `false` if `program` is not live.
    pub fn script_build(&self, program: ProgramId, statuses: Vec<i32>) -> bool {
        match self.shared.objects.program(program) {
            Ok(program) => {
                program.script(statuses);
                true
            }
            Err(_) => false,
        }
    }

    /// Make the next call to the `Driver` method `call` return `code` without doing anything.
    ///
    /// Failures queue up per method.
    pub fn fail_next(&self, call: &'static str, code: i32) {
        self.shared.instruments.fail_next(call, code);
    }

    /// Every `Driver` call so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.shared.instruments.calls()
    }

    pub fn clear_calls(&self) {
        self.shared.instruments.clear_calls();
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls().iter().filter(|call| call.name == name).count()
    }

    /// How many times the build status of `program` on `device` was queried.
    pub fn build_status_queries(&self, program: ProgramId, device: DeviceId) -> usize {
        self.shared.instruments.build_queries(program, device)
    }

    /// Commands of `queue` in the order they started running.
    pub fn dispatches(&self, queue: QueueId) -> Vec<Dispatch> {
        self.shared.instruments.dispatches(queue)
    }

    /// Executor-side reference count, `None` once the object is destroyed.
    pub fn reference_count(&self, object: ObjectRef) -> Option<u32> {
        self.shared.objects.refcount(object)
    }

    /// Number of objects not destroyed yet.
    pub fn live_objects(&self) -> usize {
        self.shared.objects.len()
    }

    /// Register `object` under `id`, taking a reference on its parent.
    fn insert(&self, id: usize, object: Object) {
        if let Some(parent) = object.parent() {
            self.shared.objects.retain(parent);
        }
        debug!(object = %ObjectRef { kind: object.kind(), raw: id }, "object created");
        self.shared.objects.insert(id, object);
    }

    /// Drop one reference without recording a call. Returns `false` if `object` is not live.
    fn unref(&self, object: ObjectRef) -> bool {
        match self.shared.objects.release(object) {
            None => false,
            Some(Released::Alive) => true,
            Some(Released::Destroyed(destroyed)) => {
                debug!(%object, "object destroyed");
                match &destroyed {
                    Object::Queue(queue) => queue.flush(&self.shared.scheduler),
                    Object::Mem(mem) => mem.run_destructors(MemId(object.raw)),
                    Object::Kernel(kernel) => {
                        if let Ok(program) = self.shared.objects.program(kernel.program) {
                            program.detach_kernel();
                        }
                    }
                    _ => {}
                }
                if let Some(parent) = destroyed.parent() {
                    self.unref(parent);
                }
                true
            }
        }
    }

    fn flush_all(&self) {
        for queue in self.shared.objects.queues() {
            queue.flush(&self.shared.scheduler);
        }
    }

    fn finish_build(
        &self,
        program: ProgramId,
        build: &ProgramObj,
        targets: &[DeviceId],
        compiled: &Compiled,
        scripted: Option<&[i32]>,
    ) -> bool {
        let succeeded = build.finish_build(targets, compiled, scripted);
        debug!(%program, succeeded, devices = targets.len(), "build finished");
        succeeded
    }
}

impl fmt::Debug for SoftDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftDriver")
            .field("config", &self.shared.config)
            .field("live_objects", &self.live_objects())
            .field("scheduler", &self.shared.scheduler)
            .finish()
    }
}

impl Driver for SoftDriver {
    fn device_ids(&self, out: &mut Vec<DeviceId>) -> i32 {
        enter!(self, "device_ids", 0);
        out.clear();
        out.extend_from_slice(&self.shared.devices);
        status::SUCCESS
    }

    fn create_context(&self, devices: &[DeviceId], out: &mut ContextId) -> i32 {
        enter!(self, "create_context", 0);
        if devices.is_empty() {
            return status::INVALID_VALUE;
        }
        if devices.iter().any(|device| !self.shared.devices.contains(device)) {
            return status::INVALID_DEVICE;
        }

        let id = self.shared.objects.allocate_id();
        self.insert(id, Object::Context(Arc::new(ContextObj { devices: devices.to_vec() })));
        *out = ContextId(id);
        status::SUCCESS
    }

    fn create_command_queue(&self, context: ContextId, device: DeviceId, properties: u64, out: &mut QueueId) -> i32 {
        enter!(self, "create_command_queue", context.0);
        let ctx = try_status!(self.shared.objects.context(context));
        if !ctx.devices.contains(&device) {
            return status::INVALID_DEVICE;
        }
        if properties & !QUEUE_PROPERTIES != 0 {
            return status::INVALID_VALUE;
        }

        let id = self.shared.objects.allocate_id();
        self.insert(id, Object::Queue(Arc::new(QueueObj::new(QueueId(id), context, device, properties))));
        *out = QueueId(id);
        status::SUCCESS
    }

    fn create_buffer(&self, context: ContextId, flags: u64, size: usize, host: Option<&[u8]>, out: &mut MemId) -> i32 {
        enter!(self, "create_buffer", context.0);
        try_status!(self.shared.objects.context(context));
        if size == 0 {
            return status::INVALID_BUFFER_SIZE;
        }
        if (flags & MEM_ACCESS).count_ones() > 1 {
            return status::INVALID_VALUE;
        }
        let copy = flags & flags::MEM_COPY_HOST_PTR != 0;
        let data: Box<[u8]> = match host {
            Some(host) if copy && host.len() >= size => host[..size].into(),
            None if !copy => vec![0; size].into_boxed_slice(),
            _ => return status::INVALID_VALUE,
        };
        let flags = if flags & MEM_ACCESS == 0 { flags | flags::MEM_READ_WRITE } else { flags };

        let id = self.shared.objects.allocate_id();
        self.insert(id, Object::Mem(Arc::new(MemObj::new(context, flags, data))));
        *out = MemId(id);
        status::SUCCESS
    }

    fn create_user_event(&self, context: ContextId, out: &mut EventId) -> i32 {
        enter!(self, "create_user_event", context.0);
        try_status!(self.shared.objects.context(context));

        let id = self.shared.objects.allocate_id();
        self.insert(id, Object::Event(Arc::new(EventObj::user(EventId(id), context, self.shared.epoch))));
        *out = EventId(id);
        status::SUCCESS
    }

    fn create_program_with_source(&self, context: ContextId, source: &str, out: &mut ProgramId) -> i32 {
        enter!(self, "create_program_with_source", context.0);
        let ctx = try_status!(self.shared.objects.context(context));

        let id = self.shared.objects.allocate_id();
        let program = ProgramObj::new(context, ctx.devices.clone(), source.to_string());
        self.insert(id, Object::Program(Arc::new(program)));
        *out = ProgramId(id);
        status::SUCCESS
    }

    fn create_kernel(&self, program: ProgramId, name: &str, out: &mut KernelId) -> i32 {
        enter!(self, "create_kernel", program.0);
        let built = try_status!(self.shared.objects.program(program));
        if !built.has_executable() {
            return status::INVALID_PROGRAM_EXECUTABLE;
        }
        let Some(kernel) = self.shared.kernels.get(name).filter(|_| built.has_entry_point(name)) else {
            return status::INVALID_KERNEL_NAME;
        };

        built.attach_kernel();
        let id = self.shared.objects.allocate_id();
        self.insert(id, Object::Kernel(Arc::new(KernelObj::new(program, built.context, name.to_string(), kernel))));
        *out = KernelId(id);
        status::SUCCESS
    }

    fn set_kernel_arg(&self, kernel: KernelId, index: u32, arg: RawKernelArg<'_>) -> i32 {
        enter!(self, "set_kernel_arg", kernel.0);
        let target = try_status!(self.shared.objects.kernel(kernel));
        let value = match arg {
            RawKernelArg::Mem(memory) => match self.shared.objects.mem(memory) {
                Ok(mem) if mem.context == target.context => ArgValue::Mem(mem),
                _ => return status::INVALID_ARG_VALUE,
            },
            RawKernelArg::Bytes([]) | RawKernelArg::Local(0) => return status::INVALID_ARG_SIZE,
            RawKernelArg::Bytes(bytes) => ArgValue::Bytes(bytes.to_vec()),
            RawKernelArg::Local(size) => ArgValue::Local(size),
        };
        try_status!(target.set_arg(index, value));
        status::SUCCESS
    }

    fn retain(&self, object: ObjectRef) -> i32 {
        enter!(self, "retain", object.raw);
        if self.shared.objects.retain(object) { status::SUCCESS } else { invalid(object.kind) }
    }

    fn release(&self, object: ObjectRef) -> i32 {
        enter!(self, "release", object.raw);
        if self.unref(object) { status::SUCCESS } else { invalid(object.kind) }
    }

    fn get_info(&self, object: ObjectRef, param: InfoParam, out: &mut InfoValue) -> i32 {
        enter!(self, "get_info", object.raw);
        let Some(target) = self.shared.objects.get(object) else {
            return invalid(object.kind);
        };

        *out = match (param, &target) {
            (InfoParam::ReferenceCount, _) => {
                InfoValue::Uint(try_status!(self.shared.objects.refcount(object).ok_or(invalid(object.kind))))
            }
            (InfoParam::Context, target) => match target.context() {
                Some(context) => InfoValue::Context(context),
                None => return status::INVALID_VALUE,
            },
            (InfoParam::ContextDevices, Object::Context(context)) => InfoValue::Devices(context.devices.clone()),
            (InfoParam::QueueDevice, Object::Queue(queue)) => InfoValue::Device(queue.device),
            (InfoParam::QueueProperties, Object::Queue(queue)) => InfoValue::Bitfield(queue.properties),
            (InfoParam::EventStatus, Object::Event(event)) => InfoValue::Int(event.status()),
            (InfoParam::EventCommandType, Object::Event(event)) => InfoValue::CommandType(event.command),
            (InfoParam::EventQueue, Object::Event(event)) => InfoValue::Queue(event.queue.unwrap_or_default()),
            (InfoParam::MemSize, Object::Mem(mem)) => InfoValue::Size(mem.size),
            (InfoParam::MemFlags, Object::Mem(mem)) => InfoValue::Bitfield(mem.flags),
            (InfoParam::MemMapCount, Object::Mem(mem)) => InfoValue::Uint(mem.map_count()),
            (InfoParam::ProgramDevices, Object::Program(program)) => InfoValue::Devices(program.devices.clone()),
            (InfoParam::ProgramSource, Object::Program(program)) => InfoValue::Text(program.source.clone()),
            (InfoParam::KernelFunctionName, Object::Kernel(kernel)) => InfoValue::Text(kernel.name.clone()),
            (InfoParam::KernelNumArgs, Object::Kernel(kernel)) => InfoValue::Uint(kernel.kernel.arity),
            (InfoParam::KernelProgram, Object::Kernel(kernel)) => InfoValue::Program(kernel.program),
            _ => return status::INVALID_VALUE,
        };
        status::SUCCESS
    }

    fn get_build_info(&self, program: ProgramId, device: DeviceId, param: BuildInfoParam, out: &mut InfoValue) -> i32 {
        enter!(self, "get_build_info", program.0);
        let built = try_status!(self.shared.objects.program(program));
        if !built.devices.contains(&device) {
            return status::INVALID_DEVICE;
        }

        *out = match param {
            BuildInfoParam::Status => {
                self.shared.instruments.count_build_query(program, device);
                InfoValue::Int(built.build_status(device))
            }
            BuildInfoParam::Log => InfoValue::Text(built.build_log(device)),
            BuildInfoParam::Options => InfoValue::Text(built.build_options(device)),
        };
        status::SUCCESS
    }

    fn get_profiling_info(&self, event: EventId, param: ProfilingParam, out: &mut u64) -> i32 {
        enter!(self, "get_profiling_info", event.0);
        let target = try_status!(self.shared.objects.event(event));
        if !target.profiling || target.status() != status::COMPLETE {
            return status::PROFILING_INFO_NOT_AVAILABLE;
        }
        *out = try_status!(target.timestamp(param).ok_or(status::PROFILING_INFO_NOT_AVAILABLE));
        status::SUCCESS
    }

    fn set_user_event_status(&self, event: EventId, execution_status: i32) -> i32 {
        enter!(self, "set_user_event_status", event.0);
        let target = try_status!(self.shared.objects.event(event));
        if target.command != CommandType::User {
            return status::INVALID_EVENT;
        }
        if execution_status > status::COMPLETE {
            return status::INVALID_VALUE;
        }
        if !target.transition(execution_status) {
            return status::INVALID_OPERATION;
        }
        status::SUCCESS
    }

    unsafe fn set_event_callback(
        &self,
        event: EventId,
        trigger: i32,
        callback: EventCallback,
        user_data: *mut c_void,
    ) -> i32 {
        enter!(self, "set_event_callback", event.0);
        let target = try_status!(self.shared.objects.event(event));
        if !matches!(trigger, status::SUBMITTED | status::RUNNING | status::COMPLETE) {
            return status::INVALID_VALUE;
        }
        target.add_callback(trigger, callback, user_data as usize);
        status::SUCCESS
    }

    unsafe fn set_mem_destructor_callback(
        &self,
        memory: MemId,
        callback: MemDestructorCallback,
        user_data: *mut c_void,
    ) -> i32 {
        enter!(self, "set_mem_destructor_callback", memory.0);
        let target = try_status!(self.shared.objects.mem(memory));
        target.add_destructor(callback, user_data as usize);
        status::SUCCESS
    }

    fn wait_for_events(&self, events: &[EventId]) -> i32 {
        enter!(self, "wait_for_events", events.first().map_or(0, |event| event.0));
        if events.is_empty() {
            return status::INVALID_VALUE;
        }
        let mut targets = Vec::with_capacity(events.len());
        for event in events {
            targets.push(try_status!(self.shared.objects.event(*event)));
        }
        if targets.iter().any(|target| target.context != targets[0].context) {
            return status::INVALID_CONTEXT;
        }

        self.flush_all();
        let failed = targets.iter().map(|target| target.wait()).filter(|code| *code < 0).count();
        if failed > 0 { status::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST } else { status::SUCCESS }
    }

    unsafe fn build_program(
        &self,
        program: ProgramId,
        devices: &[DeviceId],
        options: &str,
        notify: Option<BuildCallback>,
        user_data: *mut c_void,
    ) -> i32 {
        enter!(self, "build_program", program.0);
        let built = try_status!(self.shared.objects.program(program));
        if devices.iter().any(|device| !built.devices.contains(device)) {
            return status::INVALID_DEVICE;
        }
        if !valid_options(options) {
            return status::INVALID_BUILD_OPTIONS;
        }
        if notify.is_none() && !user_data.is_null() {
            return status::INVALID_VALUE;
        }
        let targets = if devices.is_empty() { built.devices.clone() } else { devices.to_vec() };

        let scripted = try_status!(built.begin_build(&targets, options));
        let compiled = compile(&built.source, &self.shared.kernels);
        debug!(%program, devices = targets.len(), options, asynchronous = notify.is_some(), "build started");

        let Some(notify) = notify else {
            let succeeded = self.finish_build(program, &built, &targets, &compiled, scripted.as_deref());
            return if succeeded { status::SUCCESS } else { status::BUILD_PROGRAM_FAILURE };
        };

        // The build thread keeps the program alive until `notify` has returned.
        self.shared.objects.retain(program.object());
        let driver = self.clone();
        let worker = Arc::clone(&built);
        let worker_targets = targets.clone();
        let user_data = user_data as usize;
        let spawned = thread::Builder::new().name(format!("ferrocl-build-{}", program.0)).spawn(move || {
            let latency = driver.shared.config.build_latency;
            if !latency.is_zero() {
                thread::sleep(latency);
            }
            driver.finish_build(program, &worker, &worker_targets, &compiled, scripted.as_deref());
            // SAFETY: the registrant handed over `user_data` for exactly this one invocation.
            unsafe { notify(program, user_data as *mut c_void) };
            driver.unref(program.object());
        });

        if let Err(error) = spawned {
            warn!(%program, %error, "cannot start build thread");
            let aborted = Compiled { status: status::BUILD_ERROR, log: error.to_string(), entry_points: Vec::new() };
            built.finish_build(&targets, &aborted, None);
            self.unref(program.object());
            return status::OUT_OF_HOST_MEMORY;
        }
        status::SUCCESS
    }

    unsafe fn enqueue(
        &self,
        queue: QueueId,
        command: &RawCommand<'_>,
        blocking: bool,
        wait_list: &[EventId],
        event: Option<&mut EventId>,
        mapped: Option<&mut *mut u8>,
    ) -> i32 {
        enter!(self, "enqueue", queue.0);
        let target = try_status!(self.shared.objects.queue(queue));

        let mut dependencies = Dependencies::new();
        for id in wait_list {
            let Ok(dependency) = self.shared.objects.event(*id) else {
                return status::INVALID_EVENT_WAIT_LIST;
            };
            if dependency.context != target.context {
                return status::INVALID_CONTEXT;
            }
            if dependency.status() < 0 {
                return status::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST;
            }
            dependencies.push(dependency);
        }
        if matches!(command, RawCommand::MapBuffer { .. }) && mapped.is_none() {
            return status::INVALID_VALUE;
        }

        let prepared = try_status!(prepare(&self.shared.objects, &target, command));
        let kind = command.command_type();
        let id = EventId(self.shared.objects.allocate_id());
        let completion =
            Arc::new(EventObj::command(id, target.context, queue, kind, target.profiling(), self.shared.epoch));
        if event.is_some() {
            self.insert(id.0, Object::Event(Arc::clone(&completion)));
        }

        let joins_all = matches!(command, RawCommand::Marker | RawCommand::Barrier) && wait_list.is_empty();
        let job = Job { event: Arc::clone(&completion), dependencies, work: prepared.work };
        trace!(%queue, command = %kind, event = %id, blocking, waits = wait_list.len(), "enqueue");
        target.submit(job, joins_all, &self.shared.scheduler, self.shared.config.deferred);

        if blocking {
            self.flush_all();
            let code = completion.wait();
            if code < 0 {
                if event.is_some() {
                    self.unref(id.object());
                }
                return code;
            }
        }

        if let Some(slot) = event {
            *slot = id;
        }
        if let (Some(slot), Some(pointer)) = (mapped, prepared.mapped) {
            *slot = pointer;
        }
        status::SUCCESS
    }

    fn flush(&self, queue: QueueId) -> i32 {
        enter!(self, "flush", queue.0);
        let target = try_status!(self.shared.objects.queue(queue));
        target.flush(&self.shared.scheduler);
        status::SUCCESS
    }

    fn finish(&self, queue: QueueId) -> i32 {
        enter!(self, "finish", queue.0);
        let target = try_status!(self.shared.objects.queue(queue));
        self.flush_all();
        for outstanding in target.outstanding() {
            outstanding.wait();
        }
        status::SUCCESS
    }
}
