use ferrocl_abi::{CommandType, DeviceId, ObjectKind, status};
use snafu::{Snafu, ensure};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A null identifier was handed to a wrapper or placed in a wait list.
    #[snafu(display("invalid argument: null {kind} identifier"))]
    InvalidArgument { kind: ObjectKind },

    /// The executor rejected a call.
    #[snafu(display("executor call {call} failed: {} ({code})", status::name(*code)))]
    Executor { call: &'static str, code: i32 },

    /// An awaited event terminated with an error status.
    #[snafu(display("operation failed: {} ({code})", status::name(*code)))]
    OperationFailed { code: i32 },

    #[snafu(display("profiling is not enabled for this event"))]
    ProfilingNotEnabled,

    /// User status set twice, set on a command event, or set to a non-terminal value.
    #[snafu(display("invalid event status transition to {status}"))]
    InvalidTransition { status: i32 },

    /// A build reported a per-device status that is neither success nor error.
    #[snafu(display("unsupported build outcome {status} on {device}"))]
    UnsupportedOutcome { device: DeviceId, status: i32 },

    /// A non-blocking submission would outlive the host memory it borrows.
    #[snafu(display("{command} borrows host memory and must be submitted blocking"))]
    HostMemoryBorrowed { command: CommandType },

    #[snafu(display("executor returned an unexpected value for {param}"))]
    UnexpectedInfo { param: &'static str },
}

impl Error {
    /// Raw status code carried by this error, if it came from the executor.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::Executor { code, .. } | Self::OperationFailed { code } => Some(*code),
            _ => None,
        }
    }
}

/// Map an executor status code to `Ok(())` or [`Error::Executor`].
pub(crate) fn check(call: &'static str, code: i32) -> Result<()> {
    ensure!(code == status::SUCCESS, ExecutorSnafu { call, code });
    Ok(())
}
