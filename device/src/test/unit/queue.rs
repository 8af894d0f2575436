use std::thread;
use std::time::Duration;

use enumset::EnumSet;
use ferrocl_abi::{CommandType, status};
use ferrocl_runtime::SoftConfig;
use test_case::test_case;

use crate::test::{Rig, rig, rig_with};
use crate::{
    Buffer, CallShape, Command, CommandQueue, Error, EventStatus, ExecutionOrder, Kernel, MapFlag, MigrationFlag,
    NdRange, QueueProperty, WaitList,
};

fn read_back(queue: &CommandQueue, buffer: &Buffer, len: usize) -> Vec<u8> {
    let mut host = vec![0u8; len];
    let read = Command::Read { buffer, offset: 0, destination: &mut host };
    queue.submit(read, CallShape::Blocking, &WaitList::new()).unwrap();
    host
}

fn kernel(rig: &Rig, name: &str) -> Kernel {
    let program = rig.context.create_program_with_source(&format!("kernel {name}\n")).unwrap();
    program.build(&[], "").unwrap();
    program.create_kernel(name).unwrap()
}

#[test]
fn test_queue_properties() {
    let tuned = rig_with(SoftConfig::default(), QueueProperty::OutOfOrderExecMode | QueueProperty::Profiling);
    assert_eq!(tuned.queue.ordering(), ExecutionOrder::OutOfOrder);
    assert!(tuned.queue.profiling_enabled());
    assert_eq!(tuned.queue.device().unwrap(), tuned.context.devices().unwrap()[0]);
    assert_eq!(tuned.queue.context().unwrap(), tuned.context);

    let adopted = CommandQueue::from_raw(tuned.queue.handle().driver().clone(), tuned.queue.raw_id(), true).unwrap();
    assert_eq!(adopted.properties(), tuned.queue.properties());
    assert_eq!(rig().queue.ordering(), ExecutionOrder::InOrder);
}

#[test_case(CallShape::Blocking, false; "blocking")]
#[test_case(CallShape::Enqueue, false; "enqueue")]
#[test_case(CallShape::Enqueued, true; "enqueued")]
fn test_call_shapes(shape: CallShape, has_event: bool) {
    let rig = rig();
    let buffer = rig.context.create_buffer(EnumSet::empty(), 8).unwrap();
    let fill = Command::Fill { buffer: &buffer, pattern: &[5], offset: 0, size: 8 };

    let submitted = rig.queue.submit(fill, shape, &WaitList::new()).unwrap();
    assert_eq!(submitted.event.is_some(), has_event);
    assert!(submitted.mapped.is_none());
    if let Some(event) = submitted.event {
        assert_eq!(event.command_type().unwrap(), CommandType::FillBuffer);
        event.wait().unwrap();
    }
    rig.queue.finish().unwrap();
    assert_eq!(read_back(&rig.queue, &buffer, 8), vec![5; 8]);
}

#[test]
fn test_write_then_read() {
    let rig = rig();
    let buffer = rig.context.create_buffer(EnumSet::empty(), 6).unwrap();
    let write = Command::Write { buffer: &buffer, offset: 2, source: &[1, 2, 3, 4] };
    rig.queue.submit(write, CallShape::Blocking, &WaitList::new()).unwrap();
    assert_eq!(read_back(&rig.queue, &buffer, 6)[2..], [1, 2, 3, 4]);
}

#[test_case(CallShape::Enqueue; "enqueue")]
#[test_case(CallShape::Enqueued; "enqueued")]
fn test_non_blocking_read_is_refused(shape: CallShape) {
    let rig = rig();
    let buffer = rig.context.create_buffer(EnumSet::empty(), 4).unwrap();
    let mut host = [0u8; 4];
    let read = Command::Read { buffer: &buffer, offset: 0, destination: &mut host };

    let error = rig.queue.submit(read, shape, &WaitList::new()).unwrap_err();
    assert_eq!(error, Error::HostMemoryBorrowed { command: CommandType::ReadBuffer });
    assert_eq!(rig.soft.call_count("enqueue"), 0);
}

#[test]
fn test_submit_unchecked_non_blocking_read() {
    let rig = rig();
    let buffer = rig.context.create_buffer_with_data(EnumSet::empty(), &[9, 8, 7]).unwrap();
    let mut host = [0u8; 3];
    let read = Command::Read { buffer: &buffer, offset: 0, destination: &mut host };

    // SAFETY: `host` is not touched until the event completes.
    let submitted = unsafe { rig.queue.submit_unchecked(read, CallShape::Enqueued, &WaitList::new()) }.unwrap();
    submitted.event.unwrap().wait().unwrap();
    assert_eq!(host, [9, 8, 7]);
}

#[test]
fn test_in_order_queue_runs_in_submission_order() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    let buffer = rig.context.create_buffer(EnumSet::empty(), 4).unwrap();

    let gated = rig.queue.submit(Command::Marker, CallShape::Enqueued, &WaitList::from(&gate)).unwrap();
    let fill = Command::Fill { buffer: &buffer, pattern: &[1], offset: 0, size: 4 };
    let later = rig.queue.submit(fill, CallShape::Enqueued, &WaitList::new()).unwrap().event.unwrap();

    thread::sleep(Duration::from_millis(20));
    assert!(!later.status().unwrap().is_terminal());

    gate.set_status(EventStatus::Complete).unwrap();
    rig.queue.finish().unwrap();
    let order: Vec<_> = rig.soft.dispatches(rig.queue.raw_id()).iter().map(|dispatch| dispatch.command).collect();
    assert_eq!(order, vec![CommandType::Marker, CommandType::FillBuffer]);
    assert_eq!(gated.event.unwrap().status().unwrap(), EventStatus::Complete);
}

#[test]
fn test_out_of_order_queue_and_barrier() {
    let rig = rig_with(SoftConfig::default(), EnumSet::only(QueueProperty::OutOfOrderExecMode));
    let gate = rig.context.create_user_event().unwrap();
    let buffer = rig.context.create_buffer(EnumSet::empty(), 4).unwrap();

    let gated = rig.queue.submit(Command::Marker, CallShape::Enqueued, &WaitList::from(&gate)).unwrap();
    let gated = gated.event.unwrap();
    let fill = Command::Fill { buffer: &buffer, pattern: &[1], offset: 0, size: 4 };
    let independent = rig.queue.submit(fill, CallShape::Enqueued, &WaitList::new()).unwrap().event.unwrap();

    // Unrelated work overtakes the gated marker.
    independent.wait().unwrap();
    assert!(!gated.status().unwrap().is_terminal());

    let barrier = rig.queue.submit(Command::Barrier, CallShape::Enqueued, &WaitList::new()).unwrap().event.unwrap();
    thread::sleep(Duration::from_millis(20));
    assert!(!barrier.status().unwrap().is_terminal());

    gate.set_status(EventStatus::Complete).unwrap();
    barrier.wait().unwrap();
    assert_eq!(gated.status().unwrap(), EventStatus::Complete);
}

#[test]
fn test_map_and_unmap() {
    let rig = rig();
    let buffer = rig.context.create_buffer_with_data(EnumSet::empty(), &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    let map = Command::Map { buffer: &buffer, flags: MapFlag::Read | MapFlag::Write, offset: 2, size: 4 };

    let region = rig.queue.submit(map, CallShape::Blocking, &WaitList::new()).unwrap().mapped.unwrap();
    assert_eq!(region.len(), 4);
    assert_eq!(buffer.map_count().unwrap(), 1);
    // SAFETY: the blocking map has completed and nothing else touches the buffer.
    unsafe {
        assert_eq!(region.as_slice(), &[3, 4, 5, 6]);
        region.as_mut_slice()[0] = 30;
    }

    let unmap = Command::Unmap { buffer: &buffer, region };
    rig.queue.submit(unmap, CallShape::Blocking, &WaitList::new()).unwrap();
    assert_eq!(buffer.map_count().unwrap(), 0);
    assert_eq!(read_back(&rig.queue, &buffer, 8), vec![1, 2, 30, 4, 5, 6, 7, 8]);
}

#[test]
fn test_fill_then_copy() {
    let rig = rig();
    let source = rig.context.create_buffer(EnumSet::empty(), 8).unwrap();
    let destination = rig.context.create_buffer_with_data(EnumSet::empty(), &[0; 8]).unwrap();

    let fill = Command::Fill { buffer: &source, pattern: &[0xab, 0xcd], offset: 0, size: 8 };
    let filled = rig.queue.submit(fill, CallShape::Enqueued, &WaitList::new()).unwrap().event.unwrap();
    let copy =
        Command::Copy { source: &source, source_offset: 2, destination: &destination, destination_offset: 4, size: 4 };
    rig.queue.submit(copy, CallShape::Enqueue, &WaitList::from(&filled)).unwrap();
    rig.queue.finish().unwrap();

    assert_eq!(read_back(&rig.queue, &destination, 8), vec![0, 0, 0, 0, 0xab, 0xcd, 0xab, 0xcd]);
}

#[test]
fn test_fill_with_misaligned_pattern_is_rejected() {
    let rig = rig();
    let buffer = rig.context.create_buffer(EnumSet::empty(), 8).unwrap();
    let fill = Command::Fill { buffer: &buffer, pattern: &[1, 2, 3], offset: 0, size: 8 };
    let error = rig.queue.submit(fill, CallShape::Enqueue, &WaitList::new()).unwrap_err();
    assert_eq!(error, Error::Executor { call: "enqueue", code: status::INVALID_VALUE });
}

#[test]
fn test_nd_range_launch() {
    let rig = rig();
    let kernel = kernel(&rig, "iota");
    assert_eq!(kernel.name().unwrap(), "iota");
    assert_eq!(kernel.num_args().unwrap(), 1);

    let buffer = rig.context.create_buffer_with_data(EnumSet::empty(), &[0; 10]).unwrap();
    kernel.set_arg_buffer(0, &buffer).unwrap();
    let range = NdRange::new_1d(8, Some(4)).with_offset([2, 0, 0]);
    let launch = Command::NdRange { kernel: &kernel, range };
    rig.queue.submit(launch, CallShape::Blocking, &WaitList::new()).unwrap();

    assert_eq!(read_back(&rig.queue, &buffer, 10), vec![2, 3, 4, 5, 6, 7, 8, 9, 0, 0]);
}

#[test]
fn test_failing_kernel() {
    let rig = rig();
    let kernel = kernel(&rig, "fail");
    let range = NdRange::new_2d([2, 2], None);

    let launch = Command::NdRange { kernel: &kernel, range };
    let event = rig.queue.submit(launch, CallShape::Enqueued, &WaitList::new()).unwrap().event.unwrap();
    assert_eq!(event.wait().unwrap_err(), Error::OperationFailed { code: status::OUT_OF_RESOURCES });

    let launch = Command::NdRange { kernel: &kernel, range };
    let error = rig.queue.submit(launch, CallShape::Blocking, &WaitList::new()).unwrap_err();
    assert_eq!(error, Error::Executor { call: "enqueue", code: status::OUT_OF_RESOURCES });
}

#[test]
fn test_nd_range_accessors() {
    let range = NdRange::new_3d([4, 2, 2], Some([2, 1, 1])).with_offset([1, 0, 0]);
    assert_eq!(range.dimensions(), 3);
    assert_eq!(range.global_size(), &[4, 2, 2]);
    assert_eq!(range.global_offset(), &[1, 0, 0]);
    assert_eq!(range.local_size(), Some(&[2, 1, 1][..]));

    let range = NdRange::new_2d([8, 8], None);
    assert_eq!(range.global_size(), &[8, 8]);
    assert_eq!(range.local_size(), None);
}

#[test]
fn test_migrate() {
    let rig = rig();
    let first = rig.context.create_buffer(EnumSet::empty(), 4).unwrap();
    let second = rig.context.create_buffer(EnumSet::empty(), 4).unwrap();

    let migrate = Command::Migrate { buffers: &[&first, &second], flags: EnumSet::only(MigrationFlag::Host) };
    rig.queue.submit(migrate, CallShape::Blocking, &WaitList::new()).unwrap();

    let empty = Command::Migrate { buffers: &[], flags: EnumSet::empty() };
    let error = rig.queue.submit(empty, CallShape::Blocking, &WaitList::new()).unwrap_err();
    assert_eq!(error.status_code(), Some(status::INVALID_VALUE));
}

#[test]
fn test_deferred_queue_starts_on_flush() {
    let rig = rig_with(SoftConfig::builder().deferred(true).build(), EnumSet::empty());
    let marker = rig.queue.submit(Command::Marker, CallShape::Enqueued, &WaitList::new()).unwrap().event.unwrap();

    thread::sleep(Duration::from_millis(20));
    assert!(!marker.status().unwrap().is_terminal());
    assert!(rig.soft.dispatches(rig.queue.raw_id()).is_empty());

    rig.queue.flush().unwrap();
    while !marker.status().unwrap().is_terminal() {
        thread::yield_now();
    }
    assert_eq!(marker.status().unwrap(), EventStatus::Complete);
}

#[test]
fn test_finish_waits_for_everything() {
    let rig = rig();
    let buffer = rig.context.create_buffer(EnumSet::empty(), 4).unwrap();
    for value in 0..8u8 {
        let fill = Command::Fill { buffer: &buffer, pattern: &[value], offset: 0, size: 4 };
        rig.queue.submit(fill, CallShape::Enqueue, &WaitList::new()).unwrap();
    }
    rig.queue.finish().unwrap();

    assert_eq!(rig.soft.dispatches(rig.queue.raw_id()).len(), 8);
    assert_eq!(read_back(&rig.queue, &buffer, 4), vec![7; 4]);
}

#[test]
fn test_failed_dependency_refuses_submission() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    gate.set_status(EventStatus::Error(status::OUT_OF_RESOURCES)).unwrap();

    let error = rig.queue.submit(Command::Marker, CallShape::Enqueued, &WaitList::from(&gate)).unwrap_err();
    let code = status::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST;
    assert_eq!(error, Error::Executor { call: "enqueue", code });
    assert!(rig.soft.dispatches(rig.queue.raw_id()).is_empty());
}

#[test]
fn test_dependency_failing_after_submission() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    let buffer = rig.context.create_buffer_with_data(EnumSet::empty(), &[0; 4]).unwrap();

    let fill = Command::Fill { buffer: &buffer, pattern: &[1], offset: 0, size: 4 };
    let submitted = rig.queue.submit(fill, CallShape::Enqueued, &WaitList::from(&gate)).unwrap();
    gate.set_status(EventStatus::Error(status::MAP_FAILURE)).unwrap();

    let event = submitted.event.unwrap();
    assert_eq!(event.wait().unwrap_err(), Error::OperationFailed { code: status::MAP_FAILURE });
    assert_eq!(read_back(&rig.queue, &buffer, 4), vec![0; 4]);
}

#[test]
fn test_failed_gate_fails_long_chain() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    rig.queue.submit(Command::Marker, CallShape::Enqueue, &WaitList::from(&gate)).unwrap();
    for _ in 0..5_000 {
        rig.queue.submit(Command::Marker, CallShape::Enqueue, &WaitList::new()).unwrap();
    }
    let last = rig.queue.submit(Command::Marker, CallShape::Enqueued, &WaitList::new()).unwrap().event.unwrap();

    gate.set_status(EventStatus::Error(status::OUT_OF_RESOURCES)).unwrap();
    assert_eq!(last.wait().unwrap_err(), Error::OperationFailed { code: status::OUT_OF_RESOURCES });
    rig.queue.finish().unwrap();
    assert!(rig.soft.dispatches(rig.queue.raw_id()).is_empty());
}

#[test]
fn test_rejected_submission_reports_executor_code() {
    let rig = rig();
    rig.soft.fail_next("enqueue", status::OUT_OF_HOST_MEMORY);
    let error = rig.queue.submit(Command::Marker, CallShape::Enqueued, &WaitList::new()).unwrap_err();
    assert_eq!(error, Error::Executor { call: "enqueue", code: status::OUT_OF_HOST_MEMORY });
}
