//! Contexts: the scope every other object is created in.

use std::sync::Arc;

use enumset::EnumSet;
use ferrocl_abi::{ContextId, DeviceId, Driver, EventId, InfoParam, ProgramId, RawId, status};
use snafu::ensure;
use tracing::debug;

use crate::buffer::{Buffer, MemFlag};
use crate::error::{ExecutorSnafu, Result, check};
use crate::handle::{Handle, InfoValueExt};
use crate::program::Program;
use crate::queue::{CommandQueue, QueueProperty};
use crate::sync::Event;

/// Reference-counted context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    handle: Handle<ContextId>,
}

impl Context {
    /// Create a context spanning `devices`.
    pub fn new(driver: Arc<dyn Driver>, devices: &[DeviceId]) -> Result<Self> {
        let mut id = ContextId::NULL;
        check("create_context", driver.create_context(devices, &mut id))?;
        debug!(context = %id, devices = devices.len(), "context created");
        Ok(Self { handle: Handle::new(driver, id, false)? })
    }

    /// Create a context spanning every device the executor exposes.
    pub fn with_all_devices(driver: Arc<dyn Driver>) -> Result<Self> {
        let mut devices = Vec::new();
        check("device_ids", driver.device_ids(&mut devices))?;
        ensure!(!devices.is_empty(), ExecutorSnafu { call: "device_ids", code: status::DEVICE_NOT_FOUND });
        Self::new(driver, &devices)
    }

    pub fn from_raw(driver: Arc<dyn Driver>, id: ContextId, retain_on_construct: bool) -> Result<Self> {
        Ok(Self { handle: Handle::new(driver, id, retain_on_construct)? })
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self { handle: self.handle.try_clone()? })
    }

    pub fn handle(&self) -> &Handle<ContextId> {
        &self.handle
    }

    pub fn raw_id(&self) -> ContextId {
        self.handle.raw_id()
    }

    pub fn devices(&self) -> Result<Vec<DeviceId>> {
        self.handle.info(InfoParam::ContextDevices)?.into_devices("context_devices")
    }

    pub fn create_command_queue(&self, device: DeviceId, properties: EnumSet<QueueProperty>) -> Result<CommandQueue> {
        CommandQueue::create(self, device, properties)
    }

    /// Uninitialized buffer of `size` bytes.
    pub fn create_buffer(&self, flags: EnumSet<MemFlag>, size: usize) -> Result<Buffer> {
        Buffer::create(self, flags, size, None)
    }

    /// Buffer initialized with a copy of `data`. Adds [`MemFlag::CopyHostPtr`] to `flags`.
    pub fn create_buffer_with_data(&self, flags: EnumSet<MemFlag>, data: &[u8]) -> Result<Buffer> {
        Buffer::create(self, flags | MemFlag::CopyHostPtr, data.len(), Some(data))
    }

    /// Event whose terminal status the application sets with
    /// [`Event::set_status`](crate::Event::set_status).
    pub fn create_user_event(&self) -> Result<Event> {
        let driver = Arc::clone(self.handle.driver());
        let mut id = EventId::NULL;
        check("create_user_event", driver.create_user_event(self.raw_id(), &mut id))?;
        debug!(event = %id, context = %self.raw_id(), "user event created");
        Event::user(driver, id)
    }

    pub fn create_program_with_source(&self, source: &str) -> Result<Program> {
        let driver = Arc::clone(self.handle.driver());
        let mut id = ProgramId::NULL;
        check("create_program_with_source", driver.create_program_with_source(self.raw_id(), source, &mut id))?;
        debug!(program = %id, context = %self.raw_id(), source.len = source.len(), "program created");
        Program::from_raw(driver, id, false)
    }
}
