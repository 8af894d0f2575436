//! Raw command descriptors accepted by [`Driver::enqueue`](crate::Driver::enqueue).

use strum::{Display, IntoStaticStr};

use crate::id::{KernelId, MemId};

/// Command type reported by event queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CommandType {
    ReadBuffer,
    WriteBuffer,
    CopyBuffer,
    FillBuffer,
    MapBuffer,
    UnmapMemObject,
    MigrateMemObjects,
    NdRangeKernel,
    Marker,
    Barrier,
    /// Event created by `create_user_event`.
    User,
}

/// One command, as the executor sees it.
///
/// Host pointers are raw: the executor may dereference them after `enqueue` has returned when
/// the call is non-blocking.
#[derive(Debug, Clone, Copy)]
pub enum RawCommand<'a> {
    ReadBuffer { buffer: MemId, offset: usize, size: usize, destination: *mut u8 },
    WriteBuffer { buffer: MemId, offset: usize, size: usize, source: *const u8 },
    CopyBuffer { source: MemId, destination: MemId, source_offset: usize, destination_offset: usize, size: usize },
    /// The pattern is copied by the executor before `enqueue` returns.
    FillBuffer { buffer: MemId, pattern: &'a [u8], offset: usize, size: usize },
    /// The mapped pointer is written to the `mapped` slot of `enqueue`.
    MapBuffer { buffer: MemId, flags: u64, offset: usize, size: usize },
    UnmapMemObject { memory: MemId, mapped: *mut u8 },
    MigrateMemObjects { objects: &'a [MemId], flags: u64 },
    /// `global_offset` is empty or has the same length as `global_size`.
    NdRangeKernel {
        kernel: KernelId,
        global_offset: &'a [usize],
        global_size: &'a [usize],
        local_size: Option<&'a [usize]>,
    },
    /// Completes once its wait list (or, when empty, every earlier command) has completed.
    Marker,
    /// Like `Marker`, and later commands do not start before it completes.
    Barrier,
}

impl RawCommand<'_> {
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::ReadBuffer { .. } => CommandType::ReadBuffer,
            Self::WriteBuffer { .. } => CommandType::WriteBuffer,
            Self::CopyBuffer { .. } => CommandType::CopyBuffer,
            Self::FillBuffer { .. } => CommandType::FillBuffer,
            Self::MapBuffer { .. } => CommandType::MapBuffer,
            Self::UnmapMemObject { .. } => CommandType::UnmapMemObject,
            Self::MigrateMemObjects { .. } => CommandType::MigrateMemObjects,
            Self::NdRangeKernel { .. } => CommandType::NdRangeKernel,
            Self::Marker => CommandType::Marker,
            Self::Barrier => CommandType::Barrier,
        }
    }
}

/// Kernel argument value (`clSetKernelArg`).
#[derive(Debug, Clone, Copy)]
pub enum RawKernelArg<'a> {
    Mem(MemId),
    /// Plain value, copied by the executor.
    Bytes(&'a [u8]),
    /// Local memory of the given size in bytes.
    Local(usize),
}
