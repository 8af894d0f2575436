//! Program builds and host kernels.
//!
//! A program's source is a list of directives, one per line:
//!
//! - `kernel <name>` declares an entry point. The name must have been registered with
//!   [`SoftDriver::register_kernel`](crate::SoftDriver::register_kernel), otherwise the build fails.
//! - `#error <message>` fails the build with `message` in the log.
//!
//! Anything else is ignored. Kernels are host closures that receive their bound arguments and the
//! launch geometry through a [`KernelInvocation`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ferrocl_abi::{ContextId, DeviceId, ProgramId, status};
use parking_lot::{Mutex, RwLock};

use crate::objects::MemObj;

/// Host kernel body. Returns `status::COMPLETE` or a negative code that fails the command.
pub type KernelFn = dyn Fn(&KernelInvocation<'_>) -> i32 + Send + Sync;

#[derive(Clone)]
pub(crate) struct SoftKernel {
    pub arity: u32,
    pub body: Arc<KernelFn>,
}

impl fmt::Debug for SoftKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftKernel").field("arity", &self.arity).finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub(crate) struct KernelRegistry {
    kernels: RwLock<HashMap<String, SoftKernel>>,
}

impl KernelRegistry {
    pub fn register(&self, name: String, kernel: SoftKernel) {
        self.kernels.write().insert(name, kernel);
    }

    pub fn get(&self, name: &str) -> Option<SoftKernel> {
        self.kernels.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kernels.read().contains_key(name)
    }
}

/// Result of compiling a source once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Compiled {
    /// `BUILD_SUCCESS` or `BUILD_ERROR`.
    pub status: i32,
    pub log: String,
    pub entry_points: Vec<String>,
}

pub(crate) fn compile(source: &str, registry: &KernelRegistry) -> Compiled {
    let mut log = String::new();
    let mut entry_points = Vec::new();
    let mut failed = false;

    for (index, line) in source.lines().enumerate() {
        let line = line.trim();
        if let Some(message) = line.strip_prefix("#error") {
            failed = true;
            log.push_str(&format!("line {}: error: {}\n", index + 1, message.trim()));
        } else if let Some(name) = line.strip_prefix("kernel ") {
            let name = name.trim();
            if registry.contains(name) {
                entry_points.push(name.to_string());
            } else {
                failed = true;
                log.push_str(&format!("line {}: error: unknown kernel '{name}'\n", index + 1));
            }
        }
    }

    let status = if failed { status::BUILD_ERROR } else { status::BUILD_SUCCESS };
    Compiled { status, log, entry_points }
}

/// Whether `options` is a whitespace separated list of `-flag` tokens.
pub(crate) fn valid_options(options: &str) -> bool {
    options.split_whitespace().all(|token| token.len() > 1 && token.starts_with('-'))
}

#[derive(Debug, Clone)]
struct DeviceBuild {
    status: i32,
    log: String,
    options: String,
}

#[derive(Debug, Default)]
struct ProgramState {
    builds: HashMap<DeviceId, DeviceBuild>,
    /// Per-target statuses overriding the next build's outcome.
    scripted: Option<Vec<i32>>,
    entry_points: Vec<String>,
    building: bool,
    kernels: usize,
}

#[derive(Debug)]
pub(crate) struct ProgramObj {
    pub context: ContextId,
    pub devices: Vec<DeviceId>,
    pub source: String,
    state: Mutex<ProgramState>,
}

impl ProgramObj {
    pub fn new(context: ContextId, devices: Vec<DeviceId>, source: String) -> Self {
        Self { context, devices, source, state: Mutex::new(ProgramState::default()) }
    }

    pub fn script(&self, statuses: Vec<i32>) {
        self.state.lock().scripted = Some(statuses);
    }

    /// Mark `targets` as in progress. Fails while another build runs or kernels exist.
    pub fn begin_build(&self, targets: &[DeviceId], options: &str) -> Result<Option<Vec<i32>>, i32> {
        let mut state = self.state.lock();
        if state.building || state.kernels > 0 {
            return Err(status::INVALID_OPERATION);
        }
        state.building = true;
        for device in targets {
            let build =
                DeviceBuild { status: status::BUILD_IN_PROGRESS, log: String::new(), options: options.to_string() };
            state.builds.insert(*device, build);
        }
        Ok(state.scripted.take())
    }

    /// Record the outcome for `targets`; returns whether every target succeeded.
    ///
    /// Scripted statuses apply positionally and fall back to the compiled status past their end.
    pub fn finish_build(&self, targets: &[DeviceId], compiled: &Compiled, scripted: Option<&[i32]>) -> bool {
        let mut state = self.state.lock();
        let mut succeeded = true;
        for (position, device) in targets.iter().enumerate() {
            let status = scripted.and_then(|statuses| statuses.get(position).copied()).unwrap_or(compiled.status);
            succeeded &= status == status::BUILD_SUCCESS;
            if let Some(build) = state.builds.get_mut(device) {
                build.status = status;
                build.log = compiled.log.clone();
            }
        }
        state.entry_points = compiled.entry_points.clone();
        state.building = false;
        succeeded
    }

    pub fn build_status(&self, device: DeviceId) -> i32 {
        self.state.lock().builds.get(&device).map_or(status::BUILD_NONE, |build| build.status)
    }

    pub fn build_log(&self, device: DeviceId) -> String {
        self.state.lock().builds.get(&device).map(|build| build.log.clone()).unwrap_or_default()
    }

    pub fn build_options(&self, device: DeviceId) -> String {
        self.state.lock().builds.get(&device).map(|build| build.options.clone()).unwrap_or_default()
    }

    /// Whether kernels can be created: no build running and one device built successfully.
    pub fn has_executable(&self) -> bool {
        let state = self.state.lock();
        !state.building && state.builds.values().any(|build| build.status == status::BUILD_SUCCESS)
    }

    pub fn has_entry_point(&self, name: &str) -> bool {
        self.state.lock().entry_points.iter().any(|entry| entry == name)
    }

    pub fn attach_kernel(&self) {
        self.state.lock().kernels += 1;
    }

    pub fn detach_kernel(&self) {
        let mut state = self.state.lock();
        state.kernels = state.kernels.saturating_sub(1);
    }
}

/// Bound kernel argument.
#[derive(Debug, Clone)]
pub(crate) enum ArgValue {
    Mem(Arc<MemObj>),
    Bytes(Vec<u8>),
    Local(usize),
}

#[derive(Debug)]
pub(crate) struct KernelObj {
    pub program: ProgramId,
    pub context: ContextId,
    pub name: String,
    pub kernel: SoftKernel,
    args: Mutex<Vec<Option<ArgValue>>>,
}

impl KernelObj {
    pub fn new(program: ProgramId, context: ContextId, name: String, kernel: SoftKernel) -> Self {
        let args = Mutex::new(vec![None; kernel.arity as usize]);
        Self { program, context, name, kernel, args }
    }

    pub fn set_arg(&self, index: u32, value: ArgValue) -> Result<(), i32> {
        let mut args = self.args.lock();
        let slot = args.get_mut(index as usize).ok_or(status::INVALID_ARG_INDEX)?;
        *slot = Some(value);
        Ok(())
    }

    /// Argument values at enqueue time; `INVALID_KERNEL_ARGS` if any is unset.
    pub fn snapshot_args(&self) -> Result<Vec<ArgValue>, i32> {
        self.args.lock().iter().map(|arg| arg.clone().ok_or(status::INVALID_KERNEL_ARGS)).collect()
    }
}

/// What a host kernel sees when it runs.
pub struct KernelInvocation<'a> {
    pub(crate) global_offset: &'a [usize],
    pub(crate) global_size: &'a [usize],
    pub(crate) local_size: Option<&'a [usize]>,
    pub(crate) args: &'a [ArgValue],
}

impl KernelInvocation<'_> {
    pub fn global_size(&self) -> &[usize] {
        self.global_size
    }

    /// Empty when no offset was given.
    pub fn global_offset(&self) -> &[usize] {
        self.global_offset
    }

    pub fn local_size(&self) -> Option<&[usize]> {
        self.local_size
    }

    /// Total number of work items.
    pub fn work_items(&self) -> usize {
        self.global_size.iter().product()
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Run `f` over the bytes of the buffer bound at `index`.
    ///
    /// Do not nest calls on the same buffer.
    pub fn with_buffer<R>(&self, index: usize, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        match self.args.get(index)? {
            ArgValue::Mem(mem) => Some(mem.with_bytes(f)),
            _ => None,
        }
    }

    /// Copy of the buffer bound at `index`.
    pub fn read_buffer(&self, index: usize) -> Option<Vec<u8>> {
        self.with_buffer(index, |bytes| bytes.to_vec())
    }

    /// Plain value bound at `index`.
    pub fn bytes(&self, index: usize) -> Option<&[u8]> {
        match self.args.get(index)? {
            ArgValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Size of the local memory argument at `index`.
    pub fn local_memory(&self, index: usize) -> Option<usize> {
        match self.args.get(index)? {
            ArgValue::Local(size) => Some(*size),
            _ => None,
        }
    }
}
