//! Reference-counted ownership of executor objects.
//!
//! The executor keeps the authoritative reference count of every object. A [`Handle`] owns
//! exactly one of those references: constructing it either adopts a reference the caller already
//! holds (identifiers fresh from a create call) or takes a new one, cloning retains and dropping
//! releases. Nothing is cached locally, so any number of handles may name the same object from
//! any thread.

use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use ferrocl_abi::{
    CommandType, ContextId, DeviceId, Driver, InfoParam, InfoValue, ProgramId, QueueId, RawId, status,
};
use snafu::ensure;
use tracing::{error, trace};

use crate::error::{InvalidArgumentSnafu, Result, UnexpectedInfoSnafu, check};

/// Owner of one executor-side reference to the object `I` names.
pub struct Handle<I: RawId> {
    id: I,
    driver: Arc<dyn Driver>,
}

impl<I: RawId> Handle<I> {
    /// Wrap `id`.
    ///
    /// With `retain_on_construct == false` the handle adopts a reference the caller already owns
    /// (the usual case right after a create call). Otherwise a new reference is taken.
    pub fn new(driver: Arc<dyn Driver>, id: I, retain_on_construct: bool) -> Result<Self> {
        ensure!(!id.is_null(), InvalidArgumentSnafu { kind: I::KIND });
        if retain_on_construct {
            check("retain", driver.retain(id.object()))?;
        }
        trace!(object = %id.object(), retained = retain_on_construct, "handle acquired");
        Ok(Self { id, driver })
    }

    /// Take another reference to the same object.
    pub fn try_clone(&self) -> Result<Self> {
        check("retain", self.driver.retain(self.id.object()))?;
        trace!(object = %self.id.object(), "handle cloned");
        Ok(Self { id: self.id, driver: Arc::clone(&self.driver) })
    }

    /// Raw identifier. Using it does not keep the object alive.
    pub fn raw_id(&self) -> I {
        self.id
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Executor-side reference count. Racy by nature; meant for diagnostics and tests.
    pub fn reference_count(&self) -> Result<u32> {
        self.info(InfoParam::ReferenceCount)?.into_uint("reference_count")
    }

    /// Query a property of the object.
    pub fn info(&self, param: InfoParam) -> Result<InfoValue> {
        let mut value = InfoValue::Empty;
        check("get_info", self.driver.get_info(self.id.object(), param, &mut value))?;
        Ok(value)
    }

    /// Release the reference now, reporting a failure instead of logging it.
    pub fn close(self) -> Result<()> {
        let (id, driver) = self.into_parts();
        trace!(object = %id.object(), "handle closed");
        check("release", driver.release(id.object()))
    }

    /// Give up ownership of the reference without releasing it.
    pub fn into_raw(self) -> I {
        self.into_parts().0
    }

    fn into_parts(self) -> (I, Arc<dyn Driver>) {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the driver is moved out exactly once.
        let driver = unsafe { std::ptr::read(&this.driver) };
        (this.id, driver)
    }
}

impl<I: RawId> Clone for Handle<I> {
    /// # Panics
    ///
    /// Panics if the executor refuses the retain. Use [`Handle::try_clone`] to handle it.
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(handle) => handle,
            Err(error) => panic!("cannot clone handle to {}: {error}", self.id.object()),
        }
    }
}

impl<I: RawId> Drop for Handle<I> {
    fn drop(&mut self) {
        let code = self.driver.release(self.id.object());
        if code == status::SUCCESS {
            trace!(object = %self.id.object(), "handle released");
        } else {
            let name = status::name(code);
            error!(object = %self.id.object(), code, status = name, "release failed while dropping handle");
        }
    }
}

impl<I: RawId> PartialEq for Handle<I> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<I: RawId> Eq for Handle<I> {}

impl<I: RawId> fmt::Debug for Handle<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.id).finish()
    }
}

/// Typed extraction of [`InfoValue`] variants.
pub(crate) trait InfoValueExt: Sized {
    fn into_int(self, param: &'static str) -> Result<i32>;
    fn into_uint(self, param: &'static str) -> Result<u32>;
    fn into_size(self, param: &'static str) -> Result<usize>;
    fn into_bitfield(self, param: &'static str) -> Result<u64>;
    fn into_context(self, param: &'static str) -> Result<ContextId>;
    fn into_device(self, param: &'static str) -> Result<DeviceId>;
    fn into_devices(self, param: &'static str) -> Result<Vec<DeviceId>>;
    fn into_queue(self, param: &'static str) -> Result<QueueId>;
    fn into_program(self, param: &'static str) -> Result<ProgramId>;
    fn into_command_type(self, param: &'static str) -> Result<CommandType>;
    fn into_text(self, param: &'static str) -> Result<String>;
}

macro_rules! extract {
    ($method:ident, $variant:ident, $ty:ty) => {
        fn $method(self, param: &'static str) -> Result<$ty> {
            match self {
                InfoValue::$variant(value) => Ok(value),
                _ => UnexpectedInfoSnafu { param }.fail(),
            }
        }
    };
}

impl InfoValueExt for InfoValue {
    extract!(into_int, Int, i32);
    extract!(into_uint, Uint, u32);
    extract!(into_size, Size, usize);
    extract!(into_bitfield, Bitfield, u64);
    extract!(into_context, Context, ContextId);
    extract!(into_device, Device, DeviceId);
    extract!(into_devices, Devices, Vec<DeviceId>);
    extract!(into_queue, Queue, QueueId);
    extract!(into_program, Program, ProgramId);
    extract!(into_command_type, CommandType, CommandType);
    extract!(into_text, Text, String);
}
