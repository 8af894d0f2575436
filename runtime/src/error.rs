//! Errors raised while setting up the software executor.
//!
//! Once running, the executor reports failures through ABI status codes like any driver.

use snafu::Snafu;

/// Result type for executor setup.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The rayon worker pool could not be started.
    #[snafu(display("cannot start the worker pool: {source}"))]
    ThreadPool { source: rayon::ThreadPoolBuildError },

    /// The configuration asks for zero devices.
    #[snafu(display("the software executor needs at least one device"))]
    NoDevices,
}
