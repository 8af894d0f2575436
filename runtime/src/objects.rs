//! Object table with executor-side reference counts.
//!
//! Identifiers come from one counter starting at 1, so `0` is never a live object and identifiers
//! are never reused. Every object except contexts holds one reference to its parent (see
//! [`Object::parent`]), taken when it is registered and dropped when it is destroyed. Command
//! events keep their queue alive, user events their context.

use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use ferrocl_abi::{
    ContextId, DeviceId, EventId, KernelId, MemDestructorCallback, MemId, ObjectKind, ObjectRef, ProgramId, QueueId,
    RawId, status,
};
use parking_lot::Mutex;

use crate::event::EventObj;
use crate::program::{KernelObj, ProgramObj};
use crate::queue::QueueObj;

/// Status reported for an identifier that names no live object of `kind`.
pub(crate) fn invalid(kind: ObjectKind) -> i32 {
    match kind {
        ObjectKind::Context => status::INVALID_CONTEXT,
        ObjectKind::CommandQueue => status::INVALID_COMMAND_QUEUE,
        ObjectKind::Program => status::INVALID_PROGRAM,
        ObjectKind::Kernel => status::INVALID_KERNEL,
        ObjectKind::Mem => status::INVALID_MEM_OBJECT,
        ObjectKind::Event => status::INVALID_EVENT,
    }
}

#[derive(Debug)]
pub(crate) struct ContextObj {
    pub devices: Vec<DeviceId>,
}

/// Buffer storage. Host memory stands in for device memory.
pub(crate) struct MemObj {
    pub context: ContextId,
    pub flags: u64,
    pub size: usize,
    data: Mutex<Box<[u8]>>,
    map_count: AtomicU32,
    destructors: Mutex<Vec<(MemDestructorCallback, usize)>>,
}

impl MemObj {
    pub fn new(context: ContextId, flags: u64, data: Box<[u8]>) -> Self {
        Self {
            context,
            flags,
            size: data.len(),
            data: Mutex::new(data),
            map_count: AtomicU32::new(0),
            destructors: Mutex::new(Vec::new()),
        }
    }

    /// Whether `offset..offset + size` lies inside the buffer.
    pub fn contains_range(&self, offset: usize, size: usize) -> bool {
        offset.checked_add(size).is_some_and(|end| end <= self.size)
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.data.lock())
    }

    pub fn read(&self, offset: usize, destination: &mut [u8]) {
        self.with_bytes(|bytes| destination.copy_from_slice(&bytes[offset..offset + destination.len()]));
    }

    pub fn write(&self, offset: usize, source: &[u8]) {
        self.with_bytes(|bytes| bytes[offset..offset + source.len()].copy_from_slice(source));
    }

    pub fn to_vec(&self, offset: usize, size: usize) -> Vec<u8> {
        self.with_bytes(|bytes| bytes[offset..offset + size].to_vec())
    }

    /// Address of the first byte of storage. Stable for the object's lifetime.
    pub fn base_ptr(&self) -> *mut u8 {
        self.data.lock().as_mut_ptr()
    }

    pub fn map_count(&self) -> u32 {
        self.map_count.load(Ordering::Acquire)
    }

    pub fn mapped(&self) {
        self.map_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns `false` if nothing was mapped.
    pub fn unmapped(&self) -> bool {
        self.map_count.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1)).is_ok()
    }

    pub fn add_destructor(&self, callback: MemDestructorCallback, user_data: usize) {
        self.destructors.lock().push((callback, user_data));
    }

    /// Run destructor callbacks, most recently registered first.
    pub fn run_destructors(&self, id: MemId) {
        let destructors = std::mem::take(&mut *self.destructors.lock());
        for (callback, user_data) in destructors.into_iter().rev() {
            // SAFETY: the registrant handed over `user_data` for exactly this one invocation.
            unsafe { callback(id, user_data as *mut c_void) };
        }
    }
}

impl fmt::Debug for MemObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemObj").field("context", &self.context).field("size", &self.size).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Object {
    Context(Arc<ContextObj>),
    Queue(Arc<QueueObj>),
    Mem(Arc<MemObj>),
    Program(Arc<ProgramObj>),
    Kernel(Arc<KernelObj>),
    Event(Arc<EventObj>),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Context(_) => ObjectKind::Context,
            Self::Queue(_) => ObjectKind::CommandQueue,
            Self::Mem(_) => ObjectKind::Mem,
            Self::Program(_) => ObjectKind::Program,
            Self::Kernel(_) => ObjectKind::Kernel,
            Self::Event(_) => ObjectKind::Event,
        }
    }

    /// Object this one keeps alive.
    pub fn parent(&self) -> Option<ObjectRef> {
        match self {
            Self::Context(_) => None,
            Self::Queue(queue) => Some(queue.context.object()),
            Self::Mem(mem) => Some(mem.context.object()),
            Self::Program(program) => Some(program.context.object()),
            Self::Kernel(kernel) => Some(kernel.program.object()),
            Self::Event(event) => Some(event.queue.map_or(event.context.object(), RawId::object)),
        }
    }

    /// Context the object belongs to.
    pub fn context(&self) -> Option<ContextId> {
        match self {
            Self::Context(_) => None,
            Self::Queue(queue) => Some(queue.context),
            Self::Mem(mem) => Some(mem.context),
            Self::Program(program) => Some(program.context),
            Self::Kernel(kernel) => Some(kernel.context),
            Self::Event(event) => Some(event.context),
        }
    }
}

#[derive(Debug)]
struct Entry {
    refcount: u32,
    object: Object,
}

/// Outcome of a release.
#[derive(Debug)]
pub(crate) enum Released {
    Alive,
    Destroyed(Object),
}

#[derive(Debug)]
pub(crate) struct ObjectTable {
    next: AtomicUsize,
    entries: Mutex<HashMap<usize, Entry>>,
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self { next: AtomicUsize::new(1), entries: Mutex::new(HashMap::new()) }
    }
}

macro_rules! lookup {
    ($name:ident, $id:ty, $variant:ident, $object:ty) => {
        pub fn $name(&self, id: $id) -> Result<Arc<$object>, i32> {
            match self.get(id.object()) {
                Some(Object::$variant(object)) => Ok(object),
                _ => Err(invalid(<$id as RawId>::KIND)),
            }
        }
    };
}

impl ObjectTable {
    pub fn allocate_id(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Store `object` under `id` with a reference count of one.
    pub fn insert(&self, id: usize, object: Object) {
        self.entries.lock().insert(id, Entry { refcount: 1, object });
    }

    pub fn get(&self, object: ObjectRef) -> Option<Object> {
        let entries = self.entries.lock();
        let entry = entries.get(&object.raw)?;
        (entry.object.kind() == object.kind).then(|| entry.object.clone())
    }

    lookup!(context, ContextId, Context, ContextObj);
    lookup!(queue, QueueId, Queue, QueueObj);
    lookup!(mem, MemId, Mem, MemObj);
    lookup!(program, ProgramId, Program, ProgramObj);
    lookup!(kernel, KernelId, Kernel, KernelObj);
    lookup!(event, EventId, Event, EventObj);

    pub fn retain(&self, object: ObjectRef) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(&object.raw) {
            Some(entry) if entry.object.kind() == object.kind => {
                entry.refcount += 1;
                true
            }
            _ => false,
        }
    }

    /// Drop one reference; `None` if `object` is not live.
    pub fn release(&self, object: ObjectRef) -> Option<Released> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&object.raw).filter(|entry| entry.object.kind() == object.kind)?;
        entry.refcount -= 1;
        if entry.refcount > 0 {
            return Some(Released::Alive);
        }
        entries.remove(&object.raw).map(|entry| Released::Destroyed(entry.object))
    }

    pub fn refcount(&self, object: ObjectRef) -> Option<u32> {
        let entries = self.entries.lock();
        entries.get(&object.raw).filter(|entry| entry.object.kind() == object.kind).map(|entry| entry.refcount)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn queues(&self) -> Vec<Arc<QueueObj>> {
        let entries = self.entries.lock();
        entries
            .values()
            .filter_map(|entry| match &entry.object {
                Object::Queue(queue) => Some(Arc::clone(queue)),
                _ => None,
            })
            .collect()
    }
}
