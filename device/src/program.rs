//! Programs and the asynchronous build bridge.
//!
//! The executor reports the end of an asynchronous build through a one-shot callback.
//! [`Program::build_with_event`] turns that callback into an [`Event`] any submission can wait
//! on:
//!
//! ```text
//! NotStarted --build_with_event--> Submitted --callback--> Succeeded
//!                                                       -> Failed(BUILD_PROGRAM_FAILURE)
//!                                                       -> UnsupportedOutcome (abort)
//! ```
//!
//! The callback inspects the per-device build status of every targeted device in order and stops
//! at the first failure. A status that is neither success nor error means the executor and this
//! crate disagree about the build protocol; that is a defect, so it is logged and the process
//! aborts instead of guessing an outcome.

use std::sync::Arc;

use ferrocl_abi::{BuildInfoParam, DeviceId, Driver, InfoParam, InfoValue, ProgramId, status};
use tracing::{debug, error, warn};

use crate::callback;
use crate::context::Context;
use crate::error::{Error, Result, UnsupportedOutcomeSnafu, check};
use crate::handle::{Handle, InfoValueExt};
use crate::kernel::Kernel;
use crate::sync::{Event, EventStatus};

/// Per-device build status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    Success,
    /// No build was attempted for the device.
    None,
    Error,
    InProgress,
    /// Anything the executor reports outside the known values.
    Unknown(i32),
}

impl BuildStatus {
    pub fn from_raw(code: i32) -> Self {
        match code {
            status::BUILD_SUCCESS => Self::Success,
            status::BUILD_NONE => Self::None,
            status::BUILD_ERROR => Self::Error,
            status::BUILD_IN_PROGRESS => Self::InProgress,
            code => Self::Unknown(code),
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            Self::Success => status::BUILD_SUCCESS,
            Self::None => status::BUILD_NONE,
            Self::Error => status::BUILD_ERROR,
            Self::InProgress => status::BUILD_IN_PROGRESS,
            Self::Unknown(code) => code,
        }
    }
}

/// Result of inspecting a finished build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildOutcome {
    Succeeded,
    /// `device` is the first device that reported an error.
    Failed { device: DeviceId, code: i32 },
}

impl BuildOutcome {
    /// Terminal status of the build event.
    pub fn event_status(self) -> EventStatus {
        match self {
            Self::Succeeded => EventStatus::Complete,
            Self::Failed { code, .. } => EventStatus::Error(code),
        }
    }
}

/// Decide a build's outcome from the per-device statuses, querying devices lazily in order.
///
/// The first [`BuildStatus::Error`] yields [`BuildOutcome::Failed`] without querying the remaining
/// devices. Any status other than success or error is [`Error::UnsupportedOutcome`].
pub fn resolve_build_outcome<I, F>(devices: I, mut build_status: F) -> Result<BuildOutcome>
where
    I: IntoIterator<Item = DeviceId>,
    F: FnMut(DeviceId) -> Result<BuildStatus>,
{
    for device in devices {
        match build_status(device)? {
            BuildStatus::Success => continue,
            BuildStatus::Error => {
                return Ok(BuildOutcome::Failed { device, code: status::BUILD_PROGRAM_FAILURE });
            }
            other => return UnsupportedOutcomeSnafu { device, status: other.as_raw() }.fail(),
        }
    }
    Ok(BuildOutcome::Succeeded)
}

/// Reference-counted program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    handle: Handle<ProgramId>,
}

impl Program {
    pub fn from_raw(driver: Arc<dyn Driver>, id: ProgramId, retain_on_construct: bool) -> Result<Self> {
        Ok(Self { handle: Handle::new(driver, id, retain_on_construct)? })
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self { handle: self.handle.try_clone()? })
    }

    pub fn handle(&self) -> &Handle<ProgramId> {
        &self.handle
    }

    pub fn raw_id(&self) -> ProgramId {
        self.handle.raw_id()
    }

    pub fn context(&self) -> Result<Context> {
        let id = self.handle.info(InfoParam::Context)?.into_context("context")?;
        Context::from_raw(Arc::clone(self.handle.driver()), id, true)
    }

    /// Devices the program is associated with.
    pub fn devices(&self) -> Result<Vec<DeviceId>> {
        self.handle.info(InfoParam::ProgramDevices)?.into_devices("program_devices")
    }

    pub fn source(&self) -> Result<String> {
        self.handle.info(InfoParam::ProgramSource)?.into_text("program_source")
    }

    pub fn build_status(&self, device: DeviceId) -> Result<BuildStatus> {
        let code = self.build_info(device, BuildInfoParam::Status)?.into_int("build_status")?;
        Ok(BuildStatus::from_raw(code))
    }

    pub fn build_log(&self, device: DeviceId) -> Result<String> {
        self.build_info(device, BuildInfoParam::Log)?.into_text("build_log")
    }

    pub fn build_options(&self, device: DeviceId) -> Result<String> {
        self.build_info(device, BuildInfoParam::Options)?.into_text("build_options")
    }

    fn build_info(&self, device: DeviceId, param: BuildInfoParam) -> Result<InfoValue> {
        let mut value = InfoValue::Empty;
        check("get_build_info", self.handle.driver().get_build_info(self.raw_id(), device, param, &mut value))?;
        Ok(value)
    }

    /// Build for `devices` (every program device when empty), blocking until done.
    pub fn build(&self, devices: &[DeviceId], options: &str) -> Result<()> {
        debug!(program = %self.raw_id(), devices = devices.len(), options, "building program");
        // SAFETY: no callback, so no user data to keep alive.
        let code =
            unsafe { self.handle.driver().build_program(self.raw_id(), devices, options, None, std::ptr::null_mut()) };
        check("build_program", code)
    }

    /// Start a build and run `callback` once, on an executor thread, when it finishes.
    ///
    /// The callback holds its own reference to the program, so every handle the caller owns may be
    /// dropped before the build finishes. If the executor rejects the build, the callback is
    /// dropped without running and the error is returned.
    pub fn build_with_callback<F>(&self, devices: &[DeviceId], options: &str, callback: F) -> Result<()>
    where
        F: FnOnce(&Program) + Send + 'static,
    {
        let program = self.try_clone()?;
        debug!(program = %self.raw_id(), devices = devices.len(), options, "starting asynchronous build");
        callback::register_build(self.handle.driver().as_ref(), self.raw_id(), devices, options, move |_| {
            callback(&program)
        })
    }

    /// Start a build and return a user event that completes when every targeted device built
    /// successfully, or fails with `BUILD_PROGRAM_FAILURE` when one did not.
    ///
    /// The devices inspected are `devices`, or every program device when `devices` is empty.
    pub fn build_with_event(&self, devices: &[DeviceId], options: &str) -> Result<Event> {
        let event = self.context()?.create_user_event()?;
        let token = event.try_clone()?;
        let targets = if devices.is_empty() { self.devices()? } else { devices.to_vec() };

        self.build_with_callback(devices, options, move |program| settle(program, &targets, &token))?;
        Ok(event)
    }

    pub fn create_kernel(&self, name: &str) -> Result<Kernel> {
        Kernel::create(self, name)
    }

    /// Wait for `build` (typically from [`Program::build_with_event`]), then create the kernel.
    pub fn create_kernel_after(&self, name: &str, build: &Event) -> Result<Kernel> {
        build.wait()?;
        self.create_kernel(name)
    }
}

/// Body of the build callback: resolve the outcome and settle the event once.
fn settle(program: &Program, devices: &[DeviceId], token: &Event) {
    let outcome = resolve_build_outcome(devices.iter().copied(), |device| program.build_status(device));
    let status = match outcome {
        Ok(outcome) => {
            debug!(program = %program.raw_id(), ?outcome, "build finished");
            outcome.event_status()
        }
        Err(error @ Error::UnsupportedOutcome { .. }) => {
            error!(program = %program.raw_id(), %error, "build reported an outcome outside the build protocol");
            std::process::abort();
        }
        Err(error) => {
            warn!(program = %program.raw_id(), %error, "cannot inspect build status");
            EventStatus::Error(error.status_code().filter(|code| *code < 0).unwrap_or(status::BUILD_PROGRAM_FAILURE))
        }
    };

    if let Err(error) = token.set_status(status) {
        error!(program = %program.raw_id(), event = %token.raw_id(), %error, "cannot settle build event");
    }
}
