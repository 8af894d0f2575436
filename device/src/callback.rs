//! Durable closures handed to the executor by raw address.
//!
//! A closure is boxed and leaked into the `user_data` pointer of a registration call. The
//! monomorphized trampoline the executor invokes reclaims the box and consumes the closure in the
//! same invocation, so the closure is freed exactly once by the thread that ran it. If the
//! executor rejects the registration, it will never invoke the trampoline and the registering call
//! reclaims the box itself.
//!
//! Panics inside a closure cannot unwind through the `extern "C"` trampoline and abort the
//! process.

use std::ffi::c_void;

use ferrocl_abi::{DeviceId, Driver, EventId, MemId, ProgramId, status};

use crate::error::{ExecutorSnafu, Result};

fn into_user_data<F: Send + 'static>(callback: F) -> *mut c_void {
    Box::into_raw(Box::new(callback)).cast()
}

/// # Safety
///
/// `user_data` must come from [`into_user_data::<F>`] and not have been reclaimed yet.
unsafe fn reclaim<F>(user_data: *mut c_void) -> Box<F> {
    unsafe { Box::from_raw(user_data.cast::<F>()) }
}

/// Run `register` with a leaked `callback`, reclaiming it if the executor refuses it.
fn register<F>(call: &'static str, callback: F, register: impl FnOnce(*mut c_void) -> i32) -> Result<()>
where
    F: Send + 'static,
{
    let user_data = into_user_data(callback);
    let code = register(user_data);
    if code != status::SUCCESS {
        // SAFETY: the executor rejected the registration and never saw a valid trampoline call.
        drop(unsafe { reclaim::<F>(user_data) });
        return ExecutorSnafu { call, code }.fail();
    }
    Ok(())
}

unsafe extern "C" fn build_trampoline<F>(program: ProgramId, user_data: *mut c_void)
where
    F: FnOnce(ProgramId) + Send + 'static,
{
    // SAFETY: registered by `register_build` with this exact `F`; the executor calls it once.
    let callback = unsafe { reclaim::<F>(user_data) };
    callback(program);
}

unsafe extern "C" fn event_trampoline<F: FnOnce(EventId, i32) + Send + 'static>(
    event: EventId,
    status: i32,
    user_data: *mut c_void,
) {
    // SAFETY: registered by `register_event` with this exact `F`; the executor calls it once.
    let callback = unsafe { reclaim::<F>(user_data) };
    callback(event, status);
}

unsafe extern "C" fn mem_destructor_trampoline<F>(memory: MemId, user_data: *mut c_void)
where
    F: FnOnce(MemId) + Send + 'static,
{
    // SAFETY: registered by `register_mem_destructor` with this exact `F`; the executor calls it once.
    let callback = unsafe { reclaim::<F>(user_data) };
    callback(memory);
}

/// Start an asynchronous build that hands `callback` the program once it finishes.
pub(crate) fn register_build<F>(
    driver: &dyn Driver,
    program: ProgramId,
    devices: &[DeviceId],
    options: &str,
    callback: F,
) -> Result<()>
where
    F: FnOnce(ProgramId) + Send + 'static,
{
    register("build_program", callback, |user_data| {
        // SAFETY: `user_data` is a leaked `F` and `build_trampoline::<F>` consumes it exactly once.
        unsafe { driver.build_program(program, devices, options, Some(build_trampoline::<F>), user_data) }
    })
}

pub(crate) fn register_event<F>(driver: &dyn Driver, event: EventId, trigger: i32, callback: F) -> Result<()>
where
    F: FnOnce(EventId, i32) + Send + 'static,
{
    register("set_event_callback", callback, |user_data| {
        // SAFETY: as in `register_build`.
        unsafe { driver.set_event_callback(event, trigger, event_trampoline::<F>, user_data) }
    })
}

pub(crate) fn register_mem_destructor<F>(driver: &dyn Driver, memory: MemId, callback: F) -> Result<()>
where
    F: FnOnce(MemId) + Send + 'static,
{
    register("set_mem_destructor_callback", callback, |user_data| {
        // SAFETY: as in `register_build`.
        unsafe { driver.set_mem_destructor_callback(memory, mem_destructor_trampoline::<F>, user_data) }
    })
}
