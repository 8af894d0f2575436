use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use enumset::EnumSet;
use ferrocl_abi::{CommandType, RawId, status};
use ferrocl_runtime::SoftConfig;
use test_case::test_case;

use crate::test::{rig, rig_with};
use crate::{CallShape, Command, Error, Event, EventStatus, QueueProperty, Trigger, WaitList};

fn marker(queue: &crate::CommandQueue, wait_list: &WaitList<'_>) -> Event {
    queue.submit(Command::Marker, CallShape::Enqueued, wait_list).unwrap().event.unwrap()
}

#[test]
fn test_user_event_lifecycle() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    assert!(gate.is_user());
    assert_eq!(gate.status().unwrap(), EventStatus::Submitted);
    assert_eq!(gate.command_type().unwrap(), CommandType::User);
    assert!(gate.queue().unwrap().is_none());
    assert_eq!(gate.context().unwrap(), rig.context);

    gate.set_status(EventStatus::Complete).unwrap();
    assert_eq!(gate.status().unwrap(), EventStatus::Complete);
    gate.wait().unwrap();

    let error = gate.set_status(EventStatus::Error(status::OUT_OF_RESOURCES)).unwrap_err();
    assert_eq!(error, Error::InvalidTransition { status: status::OUT_OF_RESOURCES });
}

#[test_case(EventStatus::Queued; "queued")]
#[test_case(EventStatus::Submitted; "submitted")]
#[test_case(EventStatus::Running; "running")]
fn test_non_terminal_status_is_rejected(target: EventStatus) {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    let error = gate.set_status(target).unwrap_err();
    assert_eq!(error, Error::InvalidTransition { status: target.as_raw() });
    assert_eq!(gate.status().unwrap(), EventStatus::Submitted);
}

#[test]
fn test_command_event_cannot_be_set() {
    let rig = rig();
    let event = marker(&rig.queue, &WaitList::new());
    assert!(!event.is_user());
    assert!(matches!(event.set_status(EventStatus::Complete), Err(Error::InvalidTransition { .. })));
    assert_eq!(event.queue().unwrap().unwrap(), rig.queue);
}

#[test]
fn test_wait_reports_own_error_code() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    let dependent = marker(&rig.queue, &WaitList::from(&gate));

    gate.set_status(EventStatus::Error(status::MAP_FAILURE)).unwrap();
    assert_eq!(gate.wait().unwrap_err(), Error::OperationFailed { code: status::MAP_FAILURE });
    assert_eq!(dependent.wait().unwrap_err(), Error::OperationFailed { code: status::MAP_FAILURE });
    assert_eq!(dependent.status().unwrap(), EventStatus::Error(status::MAP_FAILURE));
}

#[test]
fn test_status_callbacks_fire_once() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    let event = marker(&rig.queue, &WaitList::from(&gate));

    let (sender, receiver) = mpsc::channel();
    for trigger in [Trigger::Complete, Trigger::Running] {
        let sender = sender.clone();
        event.on_status(trigger, move |status| sender.send((trigger, status)).unwrap()).unwrap();
    }
    drop(sender);
    assert!(receiver.try_recv().is_err());

    gate.set_status(EventStatus::Complete).unwrap();
    let mut seen: Vec<_> = receiver.iter().collect();
    seen.sort_by_key(|(_, status)| status.as_raw());
    assert_eq!(seen, vec![(Trigger::Complete, EventStatus::Complete), (Trigger::Running, EventStatus::Running)]);
}

#[test]
fn test_callback_on_reached_trigger_runs_immediately() {
    let rig = rig();
    let event = marker(&rig.queue, &WaitList::new());
    event.wait().unwrap();

    let (sender, receiver) = mpsc::channel();
    event.on_status(Trigger::Submitted, move |status| sender.send(status).unwrap()).unwrap();
    assert_eq!(receiver.try_recv().unwrap(), EventStatus::Complete);
}

#[test]
fn test_error_counts_as_complete_for_callbacks() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    let (sender, receiver) = mpsc::channel();
    gate.on_status(Trigger::Complete, move |status| sender.send(status).unwrap()).unwrap();

    gate.set_status(EventStatus::Error(status::OUT_OF_RESOURCES)).unwrap();
    let status = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(status, EventStatus::Error(status::OUT_OF_RESOURCES));
}

#[test]
fn test_rejected_callback_is_dropped() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    let token = Arc::new(());
    let held = Arc::clone(&token);

    rig.soft.fail_next("set_event_callback", status::INVALID_EVENT);
    let error = gate.on_status(Trigger::Complete, move |_| drop(held)).unwrap_err();
    assert_eq!(error.status_code(), Some(status::INVALID_EVENT));
    assert_eq!(Arc::strong_count(&token), 1);
}

#[test]
fn test_profiling_on_profiling_queue() {
    let rig = rig_with(SoftConfig::default(), EnumSet::only(QueueProperty::Profiling));
    let event = marker(&rig.queue, &WaitList::new());
    event.wait().unwrap();

    let profile = event.profile().unwrap();
    assert!(profile.queued <= profile.submit);
    assert!(profile.submit <= profile.start);
    assert!(profile.start <= profile.end);
    assert_eq!(event.duration_ns().unwrap(), profile.end - profile.start);
}

#[test]
fn test_profiling_not_enabled() {
    let rig = rig();
    let event = marker(&rig.queue, &WaitList::new());
    event.wait().unwrap();
    assert_eq!(event.start_time_ns().unwrap_err(), Error::ProfilingNotEnabled);

    let gate = rig.context.create_user_event().unwrap();
    assert_eq!(gate.end_time_ns().unwrap_err(), Error::ProfilingNotEnabled);

    let calls = rig.soft.call_count("get_profiling_info");
    assert_eq!(calls, 0);

    // Adopted command events ask the executor.
    let foreign = Event::from_raw(Arc::clone(event.handle().driver()), event.raw_id(), true).unwrap();
    assert_eq!(foreign.end_time_ns().unwrap_err(), Error::ProfilingNotEnabled);
    assert_eq!(rig.soft.call_count("get_profiling_info"), 1);
}

#[test]
fn test_profiling_before_completion_is_an_executor_error() {
    let rig = rig_with(SoftConfig::default(), EnumSet::only(QueueProperty::Profiling));
    let gate = rig.context.create_user_event().unwrap();
    let event = marker(&rig.queue, &WaitList::from(&gate));

    let error = event.end_time_ns().unwrap_err();
    assert_eq!(error, Error::Executor { call: "get_profiling_info", code: status::PROFILING_INFO_NOT_AVAILABLE });
    gate.set_status(EventStatus::Complete).unwrap();
    event.wait().unwrap();
    assert!(event.end_time_ns().is_ok());
}

#[test]
fn test_from_raw_detects_user_events() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    let adopted = Event::from_raw(Arc::clone(gate.handle().driver()), gate.raw_id(), true).unwrap();
    assert!(adopted.is_user());
    adopted.set_status(EventStatus::Complete).unwrap();
    assert_eq!(gate.status().unwrap(), EventStatus::Complete);
    assert_eq!(rig.soft.reference_count(gate.raw_id().object()), Some(2));
}

#[test]
fn test_command_event_outlives_its_queue() {
    let rig = rig();
    let event = marker(&rig.queue, &WaitList::new());
    let id = rig.queue.raw_id();
    drop(rig.queue);

    event.wait().unwrap();
    let queue = event.queue().unwrap().unwrap();
    assert_eq!(queue.raw_id(), id);
    drop(queue);
    assert_eq!(rig.soft.reference_count(id.object()), Some(1));

    drop(event);
    assert_eq!(rig.soft.reference_count(id.object()), None);
}
