//! Memory objects.

use std::sync::Arc;

use enumset::{EnumSet, EnumSetType};
use ferrocl_abi::{Driver, InfoParam, MemId, RawId};
use tracing::{debug, trace};

use crate::callback;
use crate::context::Context;
use crate::error::{Result, check};
use crate::handle::{Handle, InfoValueExt};

/// Memory object flags. Discriminants are bit positions of `flags::MEM_*`.
#[derive(Debug, EnumSetType)]
#[enumset(repr = "u64")]
pub enum MemFlag {
    ReadWrite = 0,
    WriteOnly = 1,
    ReadOnly = 2,
    AllocHostPtr = 4,
    /// Set by [`Context::create_buffer_with_data`].
    CopyHostPtr = 5,
    HostWriteOnly = 7,
    HostReadOnly = 8,
    HostNoAccess = 9,
}

/// Map flags. Discriminants are bit positions of `flags::MAP_*`.
#[derive(Debug, EnumSetType)]
#[enumset(repr = "u64")]
pub enum MapFlag {
    Read = 0,
    Write = 1,
    WriteInvalidateRegion = 2,
}

/// Migration flags. Discriminants are bit positions of `flags::MIGRATE_MEM_OBJECT_*`.
#[derive(Debug, EnumSetType)]
#[enumset(repr = "u64")]
pub enum MigrationFlag {
    Host = 0,
    ContentUndefined = 1,
}

/// Reference-counted device buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    handle: Handle<MemId>,
}

impl Buffer {
    pub(crate) fn create(context: &Context, flags: EnumSet<MemFlag>, size: usize, host: Option<&[u8]>) -> Result<Self> {
        let driver = Arc::clone(context.handle().driver());
        let mut id = MemId::NULL;
        check("create_buffer", driver.create_buffer(context.raw_id(), flags.as_repr(), size, host, &mut id))?;
        debug!(buffer = %id, context = %context.raw_id(), size, ?flags, "buffer created");
        Ok(Self { handle: Handle::new(driver, id, false)? })
    }

    pub fn from_raw(driver: Arc<dyn Driver>, id: MemId, retain_on_construct: bool) -> Result<Self> {
        Ok(Self { handle: Handle::new(driver, id, retain_on_construct)? })
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self { handle: self.handle.try_clone()? })
    }

    pub fn handle(&self) -> &Handle<MemId> {
        &self.handle
    }

    pub fn raw_id(&self) -> MemId {
        self.handle.raw_id()
    }

    /// Size in bytes.
    pub fn size(&self) -> Result<usize> {
        self.handle.info(InfoParam::MemSize)?.into_size("mem_size")
    }

    pub fn flags(&self) -> Result<EnumSet<MemFlag>> {
        let bits = self.handle.info(InfoParam::MemFlags)?.into_bitfield("mem_flags")?;
        Ok(EnumSet::from_repr_truncated(bits))
    }

    /// Number of outstanding mappings.
    pub fn map_count(&self) -> Result<u32> {
        self.handle.info(InfoParam::MemMapCount)?.into_uint("mem_map_count")
    }

    pub fn context(&self) -> Result<Context> {
        let id = self.handle.info(InfoParam::Context)?.into_context("context")?;
        Context::from_raw(Arc::clone(self.handle.driver()), id, true)
    }

    /// Run `callback` once the executor destroys the memory object, on whichever thread releases
    /// the last reference.
    pub fn on_destroy<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(MemId) + Send + 'static,
    {
        trace!(buffer = %self.raw_id(), "registering destructor callback");
        callback::register_mem_destructor(self.handle.driver().as_ref(), self.raw_id(), callback)
    }
}
