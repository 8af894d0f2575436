//! Lifecycle and dependency coordination over an external command executor.
//!
//! The executor (a compute device driver behind [`ferrocl_abi::Driver`]) owns every object and
//! every scheduling decision. This crate makes its objects safe to hold and its asynchronous
//! completions easy to compose:
//!
//! - [`Handle`] owns one executor-side reference; cloning retains and dropping releases.
//! - [`Event`] is the completion token of one operation, including user events the application
//!   settles itself.
//! - [`WaitList`] borrows the events a submission depends on.
//! - [`CommandQueue::submit`] forwards any [`Command`] in any [`CallShape`].
//! - [`Program::build_with_event`] turns the executor's build callback into an [`Event`].
//!
//! # Example
//!
//! ```ignore
//! let context = Context::with_all_devices(driver)?;
//! let device = context.devices()?[0];
//! let queue = context.create_command_queue(device, EnumSet::empty())?;
//!
//! let program = context.create_program_with_source("kernel scale")?;
//! let built = program.build_with_event(&[], "")?;
//! let kernel = program.create_kernel_after("scale", &built)?;
//!
//! let launch = Command::NdRange { kernel: &kernel, range: NdRange::new_1d(64, None) };
//! let launch = queue.submit(launch, CallShape::Enqueued, &WaitList::new())?;
//! launch.event.unwrap().wait()?;
//! ```

pub mod buffer;
mod callback;
pub mod context;
pub mod error;
pub mod handle;
pub mod kernel;
pub mod program;
pub mod queue;
pub mod sync;
pub mod wait_list;

#[cfg(test)]
pub mod test;

pub use buffer::{Buffer, MapFlag, MemFlag, MigrationFlag};
pub use context::Context;
pub use error::{Error, Result};
pub use handle::Handle;
pub use kernel::Kernel;
pub use program::{BuildOutcome, BuildStatus, Program, resolve_build_outcome};
pub use queue::{CallShape, Command, CommandQueue, ExecutionOrder, MappedRegion, NdRange, QueueProperty, Submitted};
pub use sync::{Event, EventStatus, Profile, Trigger};
pub use wait_list::WaitList;
