//! Validation and execution of raw commands.
//!
//! [`prepare`] checks a command against the object table when it is enqueued and turns it into a
//! [`Work`] closure. Errors found here are returned by `enqueue` itself; errors found while the
//! work runs terminate the command's event instead.

use std::sync::Arc;

use ferrocl_abi::{MemId, RawCommand, status};

use crate::objects::{MemObj, ObjectTable};
use crate::program::KernelInvocation;
use crate::queue::{QueueObj, Work};

pub(crate) struct Prepared {
    pub work: Work,
    /// Host pointer handed out by a map command.
    pub mapped: Option<*mut u8>,
}

impl Prepared {
    fn run(work: impl FnOnce() -> i32 + Send + 'static) -> Self {
        Self { work: Box::new(work), mapped: None }
    }
}

/// Host address captured by a command. The caller keeps the memory alive until completion.
#[derive(Clone, Copy)]
struct HostPtr(usize);

/// Look up a buffer in the queue's context and check `offset..offset + size` against it.
fn buffer(objects: &ObjectTable, queue: &QueueObj, id: MemId, offset: usize, size: usize) -> Result<Arc<MemObj>, i32> {
    let mem = objects.mem(id)?;
    if mem.context != queue.context {
        return Err(status::INVALID_CONTEXT);
    }
    if !mem.contains_range(offset, size) {
        return Err(status::INVALID_VALUE);
    }
    Ok(mem)
}

fn overlaps(a: usize, b: usize, size: usize) -> bool {
    a < b + size && b < a + size
}

pub(crate) fn prepare(objects: &ObjectTable, queue: &QueueObj, command: &RawCommand<'_>) -> Result<Prepared, i32> {
    match *command {
        RawCommand::ReadBuffer { buffer: id, offset, size, destination } => {
            if destination.is_null() {
                return Err(status::INVALID_VALUE);
            }
            let mem = buffer(objects, queue, id, offset, size)?;
            let destination = HostPtr(destination as usize);
            Ok(Prepared::run(move || {
                // SAFETY: `enqueue` requires the destination to stay valid until completion.
                let destination = unsafe { std::slice::from_raw_parts_mut(destination.0 as *mut u8, size) };
                mem.read(offset, destination);
                status::COMPLETE
            }))
        }
        RawCommand::WriteBuffer { buffer: id, offset, size, source } => {
            if source.is_null() {
                return Err(status::INVALID_VALUE);
            }
            let mem = buffer(objects, queue, id, offset, size)?;
            let source = HostPtr(source as usize);
            Ok(Prepared::run(move || {
                // SAFETY: `enqueue` requires the source to stay valid until completion.
                let source = unsafe { std::slice::from_raw_parts(source.0 as *const u8, size) };
                mem.write(offset, source);
                status::COMPLETE
            }))
        }
        RawCommand::CopyBuffer { source, destination, source_offset, destination_offset, size } => {
            let from = buffer(objects, queue, source, source_offset, size)?;
            let to = buffer(objects, queue, destination, destination_offset, size)?;
            if source == destination && overlaps(source_offset, destination_offset, size) {
                return Err(status::MEM_COPY_OVERLAP);
            }
            Ok(Prepared::run(move || {
                let bytes = from.to_vec(source_offset, size);
                to.write(destination_offset, &bytes);
                status::COMPLETE
            }))
        }
        RawCommand::FillBuffer { buffer: id, pattern, offset, size } => {
            if pattern.is_empty() || offset % pattern.len() != 0 || size % pattern.len() != 0 {
                return Err(status::INVALID_VALUE);
            }
            let mem = buffer(objects, queue, id, offset, size)?;
            let pattern = pattern.to_vec();
            Ok(Prepared::run(move || {
                mem.with_bytes(|bytes| {
                    for chunk in bytes[offset..offset + size].chunks_exact_mut(pattern.len()) {
                        chunk.copy_from_slice(&pattern);
                    }
                });
                status::COMPLETE
            }))
        }
        RawCommand::MapBuffer { buffer: id, offset, size, .. } => {
            let mem = buffer(objects, queue, id, offset, size)?;
            // SAFETY: `offset` is within the allocation, checked above.
            let mapped = unsafe { mem.base_ptr().add(offset) };
            let work = Box::new(move || {
                mem.mapped();
                status::COMPLETE
            });
            Ok(Prepared { work, mapped: Some(mapped) })
        }
        RawCommand::UnmapMemObject { memory, mapped } => {
            let mem = buffer(objects, queue, memory, 0, 0)?;
            let base = mem.base_ptr() as usize;
            let address = mapped as usize;
            if address < base || address > base + mem.size {
                return Err(status::INVALID_VALUE);
            }
            Ok(Prepared::run(move || if mem.unmapped() { status::COMPLETE } else { status::INVALID_VALUE }))
        }
        RawCommand::MigrateMemObjects { objects: ids, .. } => {
            if ids.is_empty() {
                return Err(status::INVALID_VALUE);
            }
            for id in ids {
                buffer(objects, queue, *id, 0, 0)?;
            }
            Ok(Prepared::run(|| status::COMPLETE))
        }
        RawCommand::NdRangeKernel { kernel, global_offset, global_size, local_size } => {
            let kernel = objects.kernel(kernel)?;
            if kernel.context != queue.context {
                return Err(status::INVALID_CONTEXT);
            }
            let dimensions = global_size.len();
            if !(1..=3).contains(&dimensions) {
                return Err(status::INVALID_WORK_DIMENSION);
            }
            if !global_offset.is_empty() && global_offset.len() != dimensions {
                return Err(status::INVALID_VALUE);
            }
            if global_size.contains(&0) {
                return Err(status::INVALID_GLOBAL_WORK_SIZE);
            }
            if let Some(local) = local_size {
                let divides = local.len() == dimensions
                    && local.iter().zip(global_size).all(|(local, global)| *local > 0 && global % local == 0);
                if !divides {
                    return Err(status::INVALID_WORK_GROUP_SIZE);
                }
            }
            let args = kernel.snapshot_args()?;

            let global_offset = global_offset.to_vec();
            let global_size = global_size.to_vec();
            let local_size = local_size.map(<[usize]>::to_vec);
            Ok(Prepared::run(move || {
                let invocation = KernelInvocation {
                    global_offset: &global_offset,
                    global_size: &global_size,
                    local_size: local_size.as_deref(),
                    args: &args,
                };
                (kernel.kernel.body)(&invocation)
            }))
        }
        RawCommand::Marker | RawCommand::Barrier => Ok(Prepared::run(|| status::COMPLETE)),
    }
}
