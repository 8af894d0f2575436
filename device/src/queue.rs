//! Command submission.
//!
//! Every operation a queue accepts is one variant of [`Command`], submitted in one of three
//! [`CallShape`]s through a single implementation. The executor owns scheduling: a command never
//! starts before every event of its wait list has completed, and in-order queues run commands in
//! submission order.
//!
//! # Host memory
//!
//! Reads and writes borrow host memory that the executor touches at execution time. A blocking
//! submission returns only after that, so the borrow suffices; a non-blocking one would let the
//! borrow end early. [`CommandQueue::submit`] therefore refuses non-blocking reads and writes with
//! [`Error::HostMemoryBorrowed`](crate::Error::HostMemoryBorrowed), and
//! [`CommandQueue::submit_unchecked`] accepts them under an explicit safety contract.

use std::ptr::NonNull;
use std::sync::Arc;

use enumset::{EnumSet, EnumSetType};
use ferrocl_abi::{CommandType, DeviceId, Driver, EventId, InfoParam, MemId, QueueId, RawCommand, RawId, status};
use smallvec::SmallVec;
use snafu::ensure;
use tracing::{debug, warn};

use crate::buffer::{Buffer, MapFlag, MigrationFlag};
use crate::context::Context;
use crate::error::{ExecutorSnafu, HostMemoryBorrowedSnafu, Result, check};
use crate::handle::{Handle, InfoValueExt};
use crate::kernel::Kernel;
use crate::sync::Event;
use crate::wait_list::WaitList;

/// Command queue properties. Discriminants are bit positions of `flags::QUEUE_*`.
#[derive(Debug, EnumSetType)]
#[enumset(repr = "u64")]
pub enum QueueProperty {
    OutOfOrderExecMode = 0,
    Profiling = 1,
}

/// Execution ordering of a queue, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionOrder {
    /// Commands run in submission order.
    InOrder,
    /// Unrelated commands may run in any order.
    OutOfOrder,
}

/// How a submission behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    /// Returns once the command has completed. No event.
    Blocking,
    /// Returns after enqueueing. No event.
    Enqueue,
    /// Returns after enqueueing, with an event tracking the command.
    Enqueued,
}

/// N-dimensional index space of a kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NdRange {
    dimensions: usize,
    offset: [usize; 3],
    global: [usize; 3],
    local: Option<[usize; 3]>,
}

impl NdRange {
    pub fn new_1d(global: usize, local: Option<usize>) -> Self {
        Self { dimensions: 1, offset: [0; 3], global: [global, 1, 1], local: local.map(|local| [local, 1, 1]) }
    }

    pub fn new_2d(global: [usize; 2], local: Option<[usize; 2]>) -> Self {
        Self {
            dimensions: 2,
            offset: [0; 3],
            global: [global[0], global[1], 1],
            local: local.map(|local| [local[0], local[1], 1]),
        }
    }

    pub fn new_3d(global: [usize; 3], local: Option<[usize; 3]>) -> Self {
        Self { dimensions: 3, offset: [0; 3], global, local }
    }

    /// Shift global ids by `offset` (only the first `dimensions` entries are used).
    pub fn with_offset(mut self, offset: [usize; 3]) -> Self {
        self.offset = offset;
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn global_size(&self) -> &[usize] {
        &self.global[..self.dimensions]
    }

    pub fn global_offset(&self) -> &[usize] {
        &self.offset[..self.dimensions]
    }

    pub fn local_size(&self) -> Option<&[usize]> {
        self.local.as_ref().map(|local| &local[..self.dimensions])
    }
}

/// Host view of a mapped buffer region, valid until it is unmapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedRegion {
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Safety
    ///
    /// The map command must have completed, the region must still be mapped, and nothing may
    /// write to it for `'a`.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// # Safety
    ///
    /// As [`MappedRegion::as_slice`], and no other access to the region may happen for `'a`.
    pub unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

/// One queue operation.
#[derive(Debug)]
pub enum Command<'a> {
    /// Copy `destination.len()` bytes starting at `offset` out of `buffer`.
    Read { buffer: &'a Buffer, offset: usize, destination: &'a mut [u8] },
    /// Copy `source` into `buffer` starting at `offset`.
    Write { buffer: &'a Buffer, offset: usize, source: &'a [u8] },
    Copy { source: &'a Buffer, source_offset: usize, destination: &'a Buffer, destination_offset: usize, size: usize },
    /// Repeat `pattern` over `size` bytes starting at `offset`.
    Fill { buffer: &'a Buffer, pattern: &'a [u8], offset: usize, size: usize },
    /// Map a region into host memory. The region is returned in [`Submitted::mapped`].
    Map { buffer: &'a Buffer, flags: EnumSet<MapFlag>, offset: usize, size: usize },
    Unmap { buffer: &'a Buffer, region: MappedRegion },
    Migrate { buffers: &'a [&'a Buffer], flags: EnumSet<MigrationFlag> },
    NdRange { kernel: &'a Kernel, range: NdRange },
    /// Completes after its wait list, or after every earlier command when the list is empty.
    Marker,
    /// Like [`Command::Marker`], and later commands wait for it.
    Barrier,
}

impl Command<'_> {
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::Read { .. } => CommandType::ReadBuffer,
            Self::Write { .. } => CommandType::WriteBuffer,
            Self::Copy { .. } => CommandType::CopyBuffer,
            Self::Fill { .. } => CommandType::FillBuffer,
            Self::Map { .. } => CommandType::MapBuffer,
            Self::Unmap { .. } => CommandType::UnmapMemObject,
            Self::Migrate { .. } => CommandType::MigrateMemObjects,
            Self::NdRange { .. } => CommandType::NdRangeKernel,
            Self::Marker => CommandType::Marker,
            Self::Barrier => CommandType::Barrier,
        }
    }

    /// Whether the executor dereferences caller memory after enqueueing.
    pub fn borrows_host_memory(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Write { .. })
    }
}

/// Outcome of a submission.
#[derive(Debug, Default)]
pub struct Submitted {
    /// Present exactly for [`CallShape::Enqueued`].
    pub event: Option<Event>,
    /// Present for [`Command::Map`].
    pub mapped: Option<MappedRegion>,
}

/// Reference-counted command queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandQueue {
    handle: Handle<QueueId>,
    properties: EnumSet<QueueProperty>,
}

impl CommandQueue {
    pub(crate) fn create(context: &Context, device: DeviceId, properties: EnumSet<QueueProperty>) -> Result<Self> {
        let driver = Arc::clone(context.handle().driver());
        let mut id = QueueId::NULL;
        let code = driver.create_command_queue(context.raw_id(), device, properties.as_repr(), &mut id);
        check("create_command_queue", code)?;
        debug!(queue = %id, context = %context.raw_id(), %device, ?properties, "command queue created");
        Ok(Self { handle: Handle::new(driver, id, false)?, properties })
    }

    /// Wrap a raw queue identifier; its properties are queried once.
    pub fn from_raw(driver: Arc<dyn Driver>, id: QueueId, retain_on_construct: bool) -> Result<Self> {
        let handle = Handle::new(driver, id, retain_on_construct)?;
        let bits = handle.info(InfoParam::QueueProperties)?.into_bitfield("queue_properties")?;
        Ok(Self { handle, properties: EnumSet::from_repr_truncated(bits) })
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self { handle: self.handle.try_clone()?, properties: self.properties })
    }

    pub fn handle(&self) -> &Handle<QueueId> {
        &self.handle
    }

    pub fn raw_id(&self) -> QueueId {
        self.handle.raw_id()
    }

    pub fn properties(&self) -> EnumSet<QueueProperty> {
        self.properties
    }

    pub fn ordering(&self) -> ExecutionOrder {
        if self.properties.contains(QueueProperty::OutOfOrderExecMode) {
            ExecutionOrder::OutOfOrder
        } else {
            ExecutionOrder::InOrder
        }
    }

    pub fn profiling_enabled(&self) -> bool {
        self.properties.contains(QueueProperty::Profiling)
    }

    pub fn context(&self) -> Result<Context> {
        let id = self.handle.info(InfoParam::Context)?.into_context("context")?;
        Context::from_raw(Arc::clone(self.handle.driver()), id, true)
    }

    pub fn device(&self) -> Result<DeviceId> {
        self.handle.info(InfoParam::QueueDevice)?.into_device("queue_device")
    }

    /// Submit `command` after every event of `wait_list`.
    ///
    /// Reads and writes must use [`CallShape::Blocking`]; see the module documentation.
    pub fn submit(&self, command: Command<'_>, shape: CallShape, wait_list: &WaitList<'_>) -> Result<Submitted> {
        ensure!(
            shape == CallShape::Blocking || !command.borrows_host_memory(),
            HostMemoryBorrowedSnafu { command: command.command_type() }
        );
        // SAFETY: blocking submissions outlive every host access; other shapes carry no host borrow.
        unsafe { self.submit_unchecked(command, shape, wait_list) }
    }

    /// Submit `command` in any shape.
    ///
    /// # Safety
    ///
    /// For a non-blocking read or write, the host memory it borrows must stay valid, and must not
    /// be accessed in a conflicting way, until the command completes (its event or a later
    /// [`CommandQueue::finish`] says so), even though the Rust borrow ends when this call returns.
    pub unsafe fn submit_unchecked(
        &self,
        command: Command<'_>,
        shape: CallShape,
        wait_list: &WaitList<'_>,
    ) -> Result<Submitted> {
        let dependencies = wait_list.marshal()?;
        let command_type = command.command_type();

        let migrated: SmallVec<[MemId; 4]>;
        let launch: NdRange;
        let mut map_size = None;
        let raw = match command {
            Command::Read { buffer, offset, destination } => RawCommand::ReadBuffer {
                buffer: buffer.raw_id(),
                offset,
                size: destination.len(),
                destination: destination.as_mut_ptr(),
            },
            Command::Write { buffer, offset, source } => {
                RawCommand::WriteBuffer { buffer: buffer.raw_id(), offset, size: source.len(), source: source.as_ptr() }
            }
            Command::Copy { source, source_offset, destination, destination_offset, size } => RawCommand::CopyBuffer {
                source: source.raw_id(),
                destination: destination.raw_id(),
                source_offset,
                destination_offset,
                size,
            },
            Command::Fill { buffer, pattern, offset, size } => {
                RawCommand::FillBuffer { buffer: buffer.raw_id(), pattern, offset, size }
            }
            Command::Map { buffer, flags, offset, size } => {
                map_size = Some(size);
                RawCommand::MapBuffer { buffer: buffer.raw_id(), flags: flags.as_repr(), offset, size }
            }
            Command::Unmap { buffer, region } => {
                RawCommand::UnmapMemObject { memory: buffer.raw_id(), mapped: region.as_ptr() }
            }
            Command::Migrate { buffers, flags } => {
                migrated = buffers.iter().map(|buffer| buffer.raw_id()).collect();
                RawCommand::MigrateMemObjects { objects: &migrated, flags: flags.as_repr() }
            }
            Command::NdRange { kernel, range } => {
                launch = range;
                RawCommand::NdRangeKernel {
                    kernel: kernel.raw_id(),
                    global_offset: launch.global_offset(),
                    global_size: launch.global_size(),
                    local_size: launch.local_size(),
                }
            }
            Command::Marker => RawCommand::Marker,
            Command::Barrier => RawCommand::Barrier,
        };

        let mut event = EventId::NULL;
        let mut mapped: *mut u8 = std::ptr::null_mut();
        debug!(
            queue = %self.raw_id(),
            command = %command_type,
            ?shape,
            dependencies = dependencies.len(),
            "submitting command"
        );

        // SAFETY: pointers in `raw` come from live borrows; their lifetime past this call is the
        // caller's obligation.
        let code = unsafe {
            self.handle.driver().enqueue(
                self.raw_id(),
                &raw,
                shape == CallShape::Blocking,
                &dependencies,
                (shape == CallShape::Enqueued).then_some(&mut event),
                map_size.is_some().then_some(&mut mapped),
            )
        };
        if code != status::SUCCESS {
            let name = status::name(code);
            warn!(queue = %self.raw_id(), command = %command_type, code, status = name, "submission rejected");
            return ExecutorSnafu { call: "enqueue", code }.fail();
        }

        let event = match shape {
            CallShape::Enqueued => {
                Some(Event::submitted(Arc::clone(self.handle.driver()), event, self.profiling_enabled())?)
            }
            CallShape::Blocking | CallShape::Enqueue => None,
        };
        let mapped = match map_size {
            Some(len) => match NonNull::new(mapped) {
                Some(ptr) => Some(MappedRegion { ptr, len }),
                None => return ExecutorSnafu { call: "enqueue", code: status::MAP_FAILURE }.fail(),
            },
            None => None,
        };
        Ok(Submitted { event, mapped })
    }

    /// Ask the executor to start everything enqueued so far.
    pub fn flush(&self) -> Result<()> {
        check("flush", self.handle.driver().flush(self.raw_id()))
    }

    /// Block until every command enqueued so far has finished.
    pub fn finish(&self) -> Result<()> {
        debug!(queue = %self.raw_id(), "finishing queue");
        check("finish", self.handle.driver().finish(self.raw_id()))
    }
}
