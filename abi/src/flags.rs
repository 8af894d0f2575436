//! Bitfield values passed through the ABI.

// Command queue properties.
pub const QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE: u64 = 1 << 0;
pub const QUEUE_PROFILING_ENABLE: u64 = 1 << 1;

// Memory object flags.
pub const MEM_READ_WRITE: u64 = 1 << 0;
pub const MEM_WRITE_ONLY: u64 = 1 << 1;
pub const MEM_READ_ONLY: u64 = 1 << 2;
pub const MEM_ALLOC_HOST_PTR: u64 = 1 << 4;
pub const MEM_COPY_HOST_PTR: u64 = 1 << 5;
pub const MEM_HOST_WRITE_ONLY: u64 = 1 << 7;
pub const MEM_HOST_READ_ONLY: u64 = 1 << 8;
pub const MEM_HOST_NO_ACCESS: u64 = 1 << 9;

// Map flags.
pub const MAP_READ: u64 = 1 << 0;
pub const MAP_WRITE: u64 = 1 << 1;
pub const MAP_WRITE_INVALIDATE_REGION: u64 = 1 << 2;

// Memory migration flags.
pub const MIGRATE_MEM_OBJECT_HOST: u64 = 1 << 0;
pub const MIGRATE_MEM_OBJECT_CONTENT_UNDEFINED: u64 = 1 << 1;
