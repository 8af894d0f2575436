//! The executor call boundary.

use std::ffi::c_void;
use std::fmt;

use crate::command::{RawCommand, RawKernelArg};
use crate::id::{ContextId, DeviceId, EventId, KernelId, MemId, ObjectRef, ProgramId, QueueId};
use crate::info::{BuildInfoParam, InfoParam, InfoValue, ProfilingParam};

/// Invoked once when an asynchronous build finishes (`pfn_notify` of `clBuildProgram`).
pub type BuildCallback = unsafe extern "C" fn(program: ProgramId, user_data: *mut c_void);

/// Invoked once when an event reaches the registered execution status, with the status reached.
pub type EventCallback = unsafe extern "C" fn(event: EventId, status: i32, user_data: *mut c_void);

/// Invoked once when a memory object is destroyed.
pub type MemDestructorCallback = unsafe extern "C" fn(memory: MemId, user_data: *mut c_void);

/// External command executor.
///
/// Every method returns a status code from [`crate::status`]. Outputs are written to the
/// provided slots only on success.
///
/// # Thread Safety
///
/// Implementations must accept calls from any thread, including from inside their own callbacks.
/// Callbacks may run on any thread.
pub trait Driver: Send + Sync + fmt::Debug {
    /// Devices exposed by this executor.
    fn device_ids(&self, out: &mut Vec<DeviceId>) -> i32;

    fn create_context(&self, devices: &[DeviceId], out: &mut ContextId) -> i32;

    /// `properties` is a bitfield of `flags::QUEUE_*`.
    fn create_command_queue(&self, context: ContextId, device: DeviceId, properties: u64, out: &mut QueueId) -> i32;

    /// `flags` is a bitfield of `flags::MEM_*`; `host` is required with `MEM_COPY_HOST_PTR`.
    fn create_buffer(&self, context: ContextId, flags: u64, size: usize, host: Option<&[u8]>, out: &mut MemId) -> i32;

    fn create_user_event(&self, context: ContextId, out: &mut EventId) -> i32;

    fn create_program_with_source(&self, context: ContextId, source: &str, out: &mut ProgramId) -> i32;

    fn create_kernel(&self, program: ProgramId, name: &str, out: &mut KernelId) -> i32;

    fn set_kernel_arg(&self, kernel: KernelId, index: u32, arg: RawKernelArg<'_>) -> i32;

    /// Increment the reference count of any object.
    fn retain(&self, object: ObjectRef) -> i32;

    /// Decrement the reference count of any object, destroying it at zero.
    fn release(&self, object: ObjectRef) -> i32;

    fn get_info(&self, object: ObjectRef, param: InfoParam, out: &mut InfoValue) -> i32;

    fn get_build_info(&self, program: ProgramId, device: DeviceId, param: BuildInfoParam, out: &mut InfoValue)
    -> i32;

    /// Returns `PROFILING_INFO_NOT_AVAILABLE` unless the event came from a profiling queue and
    /// has completed.
    fn get_profiling_info(&self, event: EventId, param: ProfilingParam, out: &mut u64) -> i32;

    /// Set the terminal status of a user event: `COMPLETE` or a negative code.
    fn set_user_event_status(&self, event: EventId, status: i32) -> i32;

    /// Register `callback` for when the event reaches `trigger` (`SUBMITTED`, `RUNNING` or
    /// `COMPLETE`). An error status counts as `COMPLETE`.
    ///
    /// # Safety
    ///
    /// `user_data` is handed back to `callback` verbatim; the caller owns whatever it points to.
    unsafe fn set_event_callback(
        &self,
        event: EventId,
        trigger: i32,
        callback: EventCallback,
        user_data: *mut c_void,
    ) -> i32;

    /// Register `callback` for when the memory object is destroyed.
    ///
    /// # Safety
    ///
    /// Same contract as [`Driver::set_event_callback`].
    unsafe fn set_mem_destructor_callback(
        &self,
        memory: MemId,
        callback: MemDestructorCallback,
        user_data: *mut c_void,
    ) -> i32;

    /// Block until every event is terminal. Returns
    /// `EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST` if any of them terminated with an error.
    fn wait_for_events(&self, events: &[EventId]) -> i32;

    /// Build `program` for `devices` (all program devices when empty).
    ///
    /// Without `notify` the call blocks and reports `BUILD_PROGRAM_FAILURE` itself. With `notify`
    /// it returns immediately and invokes `notify(program, user_data)` exactly once when the build
    /// finishes, unless it returns an error, in which case `notify` is never invoked.
    ///
    /// # Safety
    ///
    /// Same contract as [`Driver::set_event_callback`].
    unsafe fn build_program(
        &self,
        program: ProgramId,
        devices: &[DeviceId],
        options: &str,
        notify: Option<BuildCallback>,
        user_data: *mut c_void,
    ) -> i32;

    /// Submit one command.
    ///
    /// `wait_list` may be empty. When `event` is provided, a new event with reference count one
    /// is written to it. `mapped` receives the host pointer of a `MapBuffer` command.
    ///
    /// # Safety
    ///
    /// Host pointers inside `command` must stay valid until the command completes (until this call
    /// returns when `blocking`).
    unsafe fn enqueue(
        &self,
        queue: QueueId,
        command: &RawCommand<'_>,
        blocking: bool,
        wait_list: &[EventId],
        event: Option<&mut EventId>,
        mapped: Option<&mut *mut u8>,
    ) -> i32;

    fn flush(&self, queue: QueueId) -> i32;

    fn finish(&self, queue: QueueId) -> i32;
}
