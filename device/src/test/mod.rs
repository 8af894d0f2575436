//! Shared fixtures. Every test runs against an in-process software executor.


use std::sync::Arc;

use enumset::EnumSet;
use ferrocl_abi::{Driver, status};
use ferrocl_runtime::{KernelInvocation, SoftConfig, SoftDriver};

use crate::{CommandQueue, Context, QueueProperty};

pub(crate) struct Rig {
    pub soft: SoftDriver,
    pub context: Context,
    pub queue: CommandQueue,
}

/// Software executor with the test kernels registered, and the same executor as a trait object.
pub(crate) fn executor(config: SoftConfig) -> (SoftDriver, Arc<dyn Driver>) {
    let soft = SoftDriver::new(config).unwrap();

    // Writes each work item's global id into the byte buffer at argument 0.
    soft.register_kernel("iota", 1, |invocation: &KernelInvocation<'_>| {
        let items = invocation.work_items();
        let offset = invocation.global_offset().first().copied().unwrap_or(0);
        invocation
            .with_buffer(0, |bytes| {
                for (id, byte) in bytes.iter_mut().take(items).enumerate() {
                    *byte = (offset + id) as u8;
                }
                status::COMPLETE
            })
            .unwrap_or(status::INVALID_KERNEL_ARGS)
    });
    soft.register_kernel("fail", 0, |_: &KernelInvocation<'_>| status::OUT_OF_RESOURCES);

    let driver: Arc<dyn Driver> = Arc::new(soft.clone());
    (soft, driver)
}

pub(crate) fn rig_with(config: SoftConfig, properties: EnumSet<QueueProperty>) -> Rig {
    let (soft, driver) = executor(config);
    let context = Context::with_all_devices(driver).unwrap();
    let device = context.devices().unwrap()[0];
    let queue = context.create_command_queue(device, properties).unwrap();
    Rig { soft, context, queue }
}

pub(crate) fn rig() -> Rig {
    rig_with(SoftConfig::default(), EnumSet::empty())
}
