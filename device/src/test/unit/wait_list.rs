use ferrocl_abi::status;

use crate::test::rig;
use crate::{CallShape, Command, Error, Event, EventStatus, WaitList};

#[test]
fn test_empty_wait_list_returns_immediately() {
    let rig = rig();
    let empty = WaitList::new();
    assert!(empty.is_empty());
    empty.wait().unwrap();
    assert_eq!(rig.soft.call_count("wait_for_events"), 0);
}

#[test]
fn test_conversions_keep_order() {
    let rig = rig();
    let events: Vec<Event> = (0..3).map(|_| rig.context.create_user_event().unwrap()).collect();
    let ids: Vec<_> = events.iter().map(Event::raw_id).collect();

    let from_slice = WaitList::from(events.as_slice());
    assert_eq!(from_slice.iter().map(Event::raw_id).collect::<Vec<_>>(), ids);

    let from_array = WaitList::from([&events[2], &events[0]]);
    assert_eq!(from_array.len(), 2);
    assert_eq!(from_array.iter().next().unwrap().raw_id(), ids[2]);

    let mut built = WaitList::from(&events[0]);
    built.push(&events[1]);
    built.extend([&events[2]]);
    assert_eq!((&built).into_iter().map(Event::raw_id).collect::<Vec<_>>(), ids);
    assert_eq!(built.marshal().unwrap().as_slice(), ids.as_slice());
}

#[test]
fn test_wait_all_complete() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    let marker = rig.queue.submit(Command::Marker, CallShape::Enqueued, &WaitList::from(&gate)).unwrap();
    let marker = marker.event.unwrap();

    gate.set_status(EventStatus::Complete).unwrap();
    WaitList::from([&gate, &marker]).wait().unwrap();
    assert_eq!(marker.status().unwrap(), EventStatus::Complete);
}

#[test]
fn test_wait_reports_first_failure_in_list_order() {
    let rig = rig();
    let events: Vec<Event> = (0..3).map(|_| rig.context.create_user_event().unwrap()).collect();
    events[0].set_status(EventStatus::Complete).unwrap();
    events[1].set_status(EventStatus::Error(status::OUT_OF_RESOURCES)).unwrap();
    events[2].set_status(EventStatus::Error(status::MAP_FAILURE)).unwrap();

    let error = WaitList::from(events.as_slice()).wait().unwrap_err();
    assert_eq!(error, Error::OperationFailed { code: status::OUT_OF_RESOURCES });

    let reversed: WaitList<'_> = events.iter().rev().collect();
    assert_eq!(reversed.wait().unwrap_err(), Error::OperationFailed { code: status::MAP_FAILURE });
}

#[test]
fn test_wait_surfaces_executor_rejection() {
    let rig = rig();
    let gate = rig.context.create_user_event().unwrap();
    rig.soft.fail_next("wait_for_events", status::INVALID_CONTEXT);
    let error = WaitList::from(&gate).wait().unwrap_err();
    assert_eq!(error, Error::Executor { call: "wait_for_events", code: status::INVALID_CONTEXT });
}
