//! Integer status codes returned by every executor call.
//!
//! Values match the OpenCL 1.2 headers so that codes seen in logs can be looked up directly.

pub const SUCCESS: i32 = 0;
pub const DEVICE_NOT_FOUND: i32 = -1;
pub const MEM_OBJECT_ALLOCATION_FAILURE: i32 = -4;
pub const OUT_OF_RESOURCES: i32 = -5;
pub const OUT_OF_HOST_MEMORY: i32 = -6;
pub const PROFILING_INFO_NOT_AVAILABLE: i32 = -7;
pub const MEM_COPY_OVERLAP: i32 = -8;
pub const BUILD_PROGRAM_FAILURE: i32 = -11;
pub const MAP_FAILURE: i32 = -12;
pub const EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST: i32 = -14;
pub const INVALID_VALUE: i32 = -30;
pub const INVALID_DEVICE: i32 = -33;
pub const INVALID_CONTEXT: i32 = -34;
pub const INVALID_QUEUE_PROPERTIES: i32 = -35;
pub const INVALID_COMMAND_QUEUE: i32 = -36;
pub const INVALID_MEM_OBJECT: i32 = -38;
pub const INVALID_BUILD_OPTIONS: i32 = -43;
pub const INVALID_PROGRAM: i32 = -44;
pub const INVALID_PROGRAM_EXECUTABLE: i32 = -45;
pub const INVALID_KERNEL_NAME: i32 = -46;
pub const INVALID_KERNEL: i32 = -48;
pub const INVALID_ARG_INDEX: i32 = -49;
pub const INVALID_ARG_VALUE: i32 = -50;
pub const INVALID_ARG_SIZE: i32 = -51;
pub const INVALID_KERNEL_ARGS: i32 = -52;
pub const INVALID_WORK_DIMENSION: i32 = -53;
pub const INVALID_WORK_GROUP_SIZE: i32 = -54;
pub const INVALID_EVENT_WAIT_LIST: i32 = -57;
pub const INVALID_EVENT: i32 = -58;
pub const INVALID_OPERATION: i32 = -59;
pub const INVALID_BUFFER_SIZE: i32 = -61;
pub const INVALID_GLOBAL_WORK_SIZE: i32 = -63;

// Command execution status. Errors are any negative code.
pub const COMPLETE: i32 = 0;
pub const RUNNING: i32 = 1;
pub const SUBMITTED: i32 = 2;
pub const QUEUED: i32 = 3;

// Per-device program build status.
pub const BUILD_SUCCESS: i32 = 0;
pub const BUILD_NONE: i32 = -1;
pub const BUILD_ERROR: i32 = -2;
pub const BUILD_IN_PROGRESS: i32 = -3;

/// Symbolic name of an error or success code, for diagnostics.
pub fn name(code: i32) -> &'static str {
    match code {
        SUCCESS => "SUCCESS",
        DEVICE_NOT_FOUND => "DEVICE_NOT_FOUND",
        MEM_OBJECT_ALLOCATION_FAILURE => "MEM_OBJECT_ALLOCATION_FAILURE",
        OUT_OF_RESOURCES => "OUT_OF_RESOURCES",
        OUT_OF_HOST_MEMORY => "OUT_OF_HOST_MEMORY",
        PROFILING_INFO_NOT_AVAILABLE => "PROFILING_INFO_NOT_AVAILABLE",
        MEM_COPY_OVERLAP => "MEM_COPY_OVERLAP",
        BUILD_PROGRAM_FAILURE => "BUILD_PROGRAM_FAILURE",
        MAP_FAILURE => "MAP_FAILURE",
        EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST => "EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST",
        INVALID_VALUE => "INVALID_VALUE",
        INVALID_DEVICE => "INVALID_DEVICE",
        INVALID_CONTEXT => "INVALID_CONTEXT",
        INVALID_QUEUE_PROPERTIES => "INVALID_QUEUE_PROPERTIES",
        INVALID_COMMAND_QUEUE => "INVALID_COMMAND_QUEUE",
        INVALID_MEM_OBJECT => "INVALID_MEM_OBJECT",
        INVALID_BUILD_OPTIONS => "INVALID_BUILD_OPTIONS",
        INVALID_PROGRAM => "INVALID_PROGRAM",
        INVALID_PROGRAM_EXECUTABLE => "INVALID_PROGRAM_EXECUTABLE",
        INVALID_KERNEL_NAME => "INVALID_KERNEL_NAME",
        INVALID_KERNEL => "INVALID_KERNEL",
        INVALID_ARG_INDEX => "INVALID_ARG_INDEX",
        INVALID_ARG_VALUE => "INVALID_ARG_VALUE",
        INVALID_ARG_SIZE => "INVALID_ARG_SIZE",
        INVALID_KERNEL_ARGS => "INVALID_KERNEL_ARGS",
        INVALID_WORK_DIMENSION => "INVALID_WORK_DIMENSION",
        INVALID_WORK_GROUP_SIZE => "INVALID_WORK_GROUP_SIZE",
        INVALID_EVENT_WAIT_LIST => "INVALID_EVENT_WAIT_LIST",
        INVALID_EVENT => "INVALID_EVENT",
        INVALID_OPERATION => "INVALID_OPERATION",
        INVALID_BUFFER_SIZE => "INVALID_BUFFER_SIZE",
        INVALID_GLOBAL_WORK_SIZE => "INVALID_GLOBAL_WORK_SIZE",
        _ => "UNKNOWN",
    }
}

/// Whether an execution status is terminal (complete or an error).
pub fn is_terminal(execution_status: i32) -> bool {
    execution_status <= COMPLETE
}
