//! Executor ABI for ferrocl.
//!
//! This crate describes the boundary between the ferrocl core and an external command executor
//! (a compute device driver). The shape follows the OpenCL C API: opaque identifiers, integer
//! status codes, output slots and `extern "C"` callbacks carrying an opaque user pointer.
//!
//! # Design
//!
//! - Identifiers are `#[repr(transparent)]` newtypes over `usize`, `0` being the null identifier.
//! - Every [`Driver`] call returns an `i32` status; [`status::SUCCESS`] is zero and failures are
//!   negative. Outputs are written through `&mut` slots, never returned.
//! - The many `clEnqueue*` entry points collapse into one [`Driver::enqueue`] call taking a
//!   tagged [`RawCommand`].
//!
//! Nothing here manages lifetimes; reference counting is the core's job.

pub mod command;
pub mod driver;
pub mod flags;
pub mod id;
pub mod info;
pub mod status;

pub use command::{CommandType, RawCommand, RawKernelArg};
pub use driver::{BuildCallback, Driver, EventCallback, MemDestructorCallback};
pub use id::{ContextId, DeviceId, EventId, KernelId, MemId, ObjectKind, ObjectRef, ProgramId, QueueId, RawId};
pub use info::{BuildInfoParam, InfoParam, InfoValue, ProfilingParam};
