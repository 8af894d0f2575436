//! Object property queries.
//!
//! The `clGet*Info` family takes a parameter name and an untyped output buffer. Here the output is
//! a typed [`InfoValue`] slot; the executor writes the variant documented on each parameter.

use strum::{Display, IntoStaticStr};

use crate::command::CommandType;
use crate::id::{ContextId, DeviceId, ProgramId, QueueId};

/// Property of a reference-counted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum InfoParam {
    /// Any object; `Uint`.
    ReferenceCount,
    /// Queue, mem, program, event or kernel; `Context`.
    Context,
    /// Context; `Devices`.
    ContextDevices,
    /// Queue; `Device`.
    QueueDevice,
    /// Queue; `Bitfield` of `flags::QUEUE_*`.
    QueueProperties,
    /// Event; `Int` execution status.
    EventStatus,
    /// Event; `CommandType`.
    EventCommandType,
    /// Event; `Queue` (null for user events).
    EventQueue,
    /// Mem; `Size`.
    MemSize,
    /// Mem; `Bitfield` of `flags::MEM_*`.
    MemFlags,
    /// Mem; `Uint`.
    MemMapCount,
    /// Program; `Devices`.
    ProgramDevices,
    /// Program; `Text`.
    ProgramSource,
    /// Kernel; `Text`.
    KernelFunctionName,
    /// Kernel; `Uint`.
    KernelNumArgs,
    /// Kernel; `Program`.
    KernelProgram,
}

/// Per-device build property of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BuildInfoParam {
    /// `Int`, one of `status::BUILD_*`.
    Status,
    /// `Text`.
    Log,
    /// `Text`.
    Options,
}

/// Profiling timestamp of a command event, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ProfilingParam {
    Queued,
    Submit,
    Start,
    End,
}

/// Output slot of an info query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InfoValue {
    #[default]
    Empty,
    Int(i32),
    Uint(u32),
    Size(usize),
    Bitfield(u64),
    Context(ContextId),
    Device(DeviceId),
    Devices(Vec<DeviceId>),
    Queue(QueueId),
    Program(ProgramId),
    CommandType(CommandType),
    Text(String),
}
