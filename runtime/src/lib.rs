//! Software executor for ferrocl.
//!
//! [`SoftDriver`] implements the [`ferrocl_abi::Driver`] boundary entirely in process: buffers
//! are host memory, kernels are host closures and commands run on a rayon pool. It is the
//! executor the ferrocl core is tested against, and it can stand in for a device driver wherever
//! a real one is not available.
//!
//! # Execution model
//!
//! - Every enqueued command gets an event that moves from queued to submitted once its
//!   dependencies are tracked, to running on a worker, then to complete or a negative error code.
//! - In-order queues chain each command after the previous one. Out-of-order queues only honor
//!   wait lists and barriers.
//! - A command whose dependency failed terminates with the same code without running.
//! - With [`SoftConfig::deferred`] submissions are held until `flush`, `finish`, a blocking call
//!   or a wait, which exercises the "flush before waiting" obligations of callers.
//! - Asynchronous builds complete on a dedicated thread after [`SoftConfig::build_latency`].
//!
//! # Instrumentation
//!
//! Tests can inspect the call log ([`SoftDriver::calls`]), the dispatch order per queue
//! ([`SoftDriver::dispatches`]), build status queries and reference counts, and inject failures
//! with [`SoftDriver::fail_next`].

pub mod config;
pub mod error;

mod commands;
mod driver;
mod event;
mod instrument;
mod objects;
mod program;
mod queue;


pub use config::SoftConfig;
pub use driver::SoftDriver;
pub use error::*;
pub use instrument::{Call, Dispatch};
pub use program::{KernelFn, KernelInvocation};
