//! Kernel objects. Argument binding is forwarded to the executor as-is.

use std::sync::Arc;

use ferrocl_abi::{Driver, InfoParam, KernelId, RawId, RawKernelArg};
use tracing::{debug, trace};

use crate::buffer::Buffer;
use crate::error::{Result, check};
use crate::handle::{Handle, InfoValueExt};
use crate::program::Program;

/// Reference-counted kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    handle: Handle<KernelId>,
}

impl Kernel {
    pub(crate) fn create(program: &Program, name: &str) -> Result<Self> {
        let driver = Arc::clone(program.handle().driver());
        let mut id = KernelId::NULL;
        check("create_kernel", driver.create_kernel(program.raw_id(), name, &mut id))?;
        debug!(kernel = %id, kernel.name = name, program = %program.raw_id(), "kernel created");
        Ok(Self { handle: Handle::new(driver, id, false)? })
    }

    pub fn from_raw(driver: Arc<dyn Driver>, id: KernelId, retain_on_construct: bool) -> Result<Self> {
        Ok(Self { handle: Handle::new(driver, id, retain_on_construct)? })
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self { handle: self.handle.try_clone()? })
    }

    pub fn handle(&self) -> &Handle<KernelId> {
        &self.handle
    }

    pub fn raw_id(&self) -> KernelId {
        self.handle.raw_id()
    }

    pub fn name(&self) -> Result<String> {
        self.handle.info(InfoParam::KernelFunctionName)?.into_text("kernel_function_name")
    }

    pub fn num_args(&self) -> Result<u32> {
        self.handle.info(InfoParam::KernelNumArgs)?.into_uint("kernel_num_args")
    }

    pub fn program(&self) -> Result<Program> {
        let id = self.handle.info(InfoParam::KernelProgram)?.into_program("kernel_program")?;
        Program::from_raw(Arc::clone(self.handle.driver()), id, true)
    }

    pub fn set_arg_buffer(&self, index: u32, buffer: &Buffer) -> Result<()> {
        self.set_arg(index, RawKernelArg::Mem(buffer.raw_id()))
    }

    /// Plain value argument; the executor copies the bytes.
    pub fn set_arg_bytes(&self, index: u32, bytes: &[u8]) -> Result<()> {
        self.set_arg(index, RawKernelArg::Bytes(bytes))
    }

    /// Local memory argument of `size` bytes.
    pub fn set_arg_local(&self, index: u32, size: usize) -> Result<()> {
        self.set_arg(index, RawKernelArg::Local(size))
    }

    fn set_arg(&self, index: u32, arg: RawKernelArg<'_>) -> Result<()> {
        trace!(kernel = %self.raw_id(), index, ?arg, "setting kernel argument");
        check("set_kernel_arg", self.handle.driver().set_kernel_arg(self.raw_id(), index, arg))
    }
}
