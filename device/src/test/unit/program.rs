use std::cell::RefCell;
use std::sync::{Arc, mpsc};
use std::thread;

use ferrocl_abi::{DeviceId, RawId, status};
use ferrocl_runtime::SoftConfig;
use test_case::test_case;

use crate::test::{Rig, rig, rig_with};
use crate::{BuildOutcome, BuildStatus, Error, EventStatus, resolve_build_outcome};

fn devices(count: usize) -> Vec<DeviceId> {
    (1..=count).map(DeviceId).collect()
}

fn three_devices() -> Rig {
    rig_with(SoftConfig::builder().devices(3).build(), Default::default())
}

#[test]
fn test_resolve_all_succeeded() {
    let outcome = resolve_build_outcome(devices(3), |_| Ok(BuildStatus::Success)).unwrap();
    assert_eq!(outcome, BuildOutcome::Succeeded);
    assert_eq!(outcome.event_status(), EventStatus::Complete);
}

#[test]
fn test_resolve_stops_at_first_error() {
    let queried = RefCell::new(Vec::new());
    let outcome = resolve_build_outcome(devices(3), |device| {
        queried.borrow_mut().push(device);
        Ok(if device == DeviceId(2) { BuildStatus::Error } else { BuildStatus::Success })
    })
    .unwrap();

    assert_eq!(outcome, BuildOutcome::Failed { device: DeviceId(2), code: status::BUILD_PROGRAM_FAILURE });
    assert_eq!(outcome.event_status(), EventStatus::Error(status::BUILD_PROGRAM_FAILURE));
    assert_eq!(queried.into_inner(), devices(2));
}

#[test_case(BuildStatus::None; "none")]
#[test_case(BuildStatus::InProgress; "in progress")]
#[test_case(BuildStatus::Unknown(42); "unknown")]
fn test_resolve_rejects_unsupported_outcome(reported: BuildStatus) {
    let error = resolve_build_outcome(devices(2), |_| Ok(reported)).unwrap_err();
    assert_eq!(error, Error::UnsupportedOutcome { device: DeviceId(1), status: reported.as_raw() });
}

#[test]
fn test_resolve_propagates_query_failure() {
    let failure = Error::Executor { call: "get_build_info", code: status::INVALID_PROGRAM };
    let error = resolve_build_outcome(devices(1), |_| Err(failure.clone())).unwrap_err();
    assert_eq!(error, failure);
}

#[test]
fn test_resolve_no_devices_succeeds() {
    assert_eq!(resolve_build_outcome(Vec::new(), |_| Ok(BuildStatus::Error)).unwrap(), BuildOutcome::Succeeded);
}

#[test]
fn test_build_status_round_trips_known_codes() {
    for known in [BuildStatus::Success, BuildStatus::None, BuildStatus::Error, BuildStatus::InProgress] {
        assert_eq!(BuildStatus::from_raw(known.as_raw()), known);
    }
    assert_eq!(BuildStatus::from_raw(-100), BuildStatus::Unknown(-100));
}

#[test]
fn test_program_info() {
    let rig = three_devices();
    let program = rig.context.create_program_with_source("kernel iota\n").unwrap();
    assert_eq!(program.source().unwrap(), "kernel iota\n");
    assert_eq!(program.devices().unwrap(), devices(3));
    assert_eq!(program.context().unwrap(), rig.context);
    assert_eq!(program.build_status(DeviceId(1)).unwrap(), BuildStatus::None);
}

#[test]
fn test_build_with_event_then_create_kernel() {
    let rig = rig();
    let program = rig.context.create_program_with_source("kernel iota\n").unwrap();
    let built = program.build_with_event(&[], "-O2").unwrap();
    assert!(built.is_user());

    let kernel = program.create_kernel_after("iota", &built).unwrap();
    assert_eq!(built.status().unwrap(), EventStatus::Complete);
    assert_eq!(kernel.program().unwrap(), program);
    assert_eq!(program.build_status(DeviceId(1)).unwrap(), BuildStatus::Success);
    assert_eq!(program.build_options(DeviceId(1)).unwrap(), "-O2");
}

#[test]
fn test_build_with_event_stops_at_first_failed_device() {
    let rig = three_devices();
    let program = rig.context.create_program_with_source("kernel iota\n").unwrap();
    let scripted = vec![status::BUILD_SUCCESS, status::BUILD_ERROR, status::BUILD_SUCCESS];
    assert!(rig.soft.script_build(program.raw_id(), scripted));

    let built = program.build_with_event(&[], "").unwrap();
    assert_eq!(built.wait().unwrap_err(), Error::OperationFailed { code: status::BUILD_PROGRAM_FAILURE });
    assert_eq!(built.status().unwrap(), EventStatus::Error(status::BUILD_PROGRAM_FAILURE));

    let queries: Vec<_> =
        devices(3).into_iter().map(|device| rig.soft.build_status_queries(program.raw_id(), device)).collect();
    assert_eq!(queries, vec![1, 1, 0]);
    assert!(program.create_kernel_after("iota", &built).is_err());
}

#[test]
fn test_build_with_event_inspects_only_requested_devices() {
    let rig = three_devices();
    let program = rig.context.create_program_with_source("kernel iota\n").unwrap();
    let built = program.build_with_event(&[DeviceId(3)], "").unwrap();
    built.wait().unwrap();

    assert_eq!(rig.soft.build_status_queries(program.raw_id(), DeviceId(1)), 0);
    assert_eq!(rig.soft.build_status_queries(program.raw_id(), DeviceId(3)), 1);
}

#[test]
fn test_program_dropped_before_build_finishes() {
    let rig = rig_with(SoftConfig::builder().build_latency_ms(20).build(), Default::default());
    let program = rig.context.create_program_with_source("kernel iota\n").unwrap();
    let id = program.raw_id();
    let built = program.build_with_event(&[], "").unwrap();
    drop(program);

    built.wait().unwrap();
    while rig.soft.reference_count(id.object()).is_some() {
        thread::yield_now();
    }
}

#[test]
fn test_build_with_callback_runs_once() {
    let rig = rig();
    let program = rig.context.create_program_with_source("").unwrap();
    let (sender, receiver) = mpsc::channel();
    program.build_with_callback(&[], "", move |built| sender.send(built.raw_id()).unwrap()).unwrap();

    assert_eq!(receiver.recv().unwrap(), program.raw_id());
    assert!(receiver.recv().is_err());
}

#[test]
fn test_blocking_build_failure() {
    let rig = rig();
    let program = rig.context.create_program_with_source("#error boom\n").unwrap();
    let error = program.build(&[], "").unwrap_err();
    assert_eq!(error, Error::Executor { call: "build_program", code: status::BUILD_PROGRAM_FAILURE });
    assert_eq!(program.build_status(DeviceId(1)).unwrap(), BuildStatus::Error);
    assert!(program.build_log(DeviceId(1)).unwrap().contains("boom"));
}

#[test]
fn test_rejected_build_drops_callback() {
    let rig = rig();
    let program = rig.context.create_program_with_source("").unwrap();
    let token = Arc::new(());
    let held = Arc::clone(&token);

    rig.soft.fail_next("build_program", status::INVALID_OPERATION);
    let error = program.build_with_callback(&[], "", move |_| drop(held)).unwrap_err();
    assert_eq!(error, Error::Executor { call: "build_program", code: status::INVALID_OPERATION });
    assert_eq!(Arc::strong_count(&token), 1);
    assert_eq!(rig.soft.reference_count(program.raw_id().object()), Some(1));
}
