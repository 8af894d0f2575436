use std::sync::mpsc;

use enumset::{EnumSet, enum_set};
use ferrocl_abi::{RawId, status};

use crate::test::rig;
use crate::{Error, MemFlag};

#[test]
fn test_create_defaults_to_read_write() {
    let rig = rig();
    let buffer = rig.context.create_buffer(EnumSet::empty(), 64).unwrap();
    assert_eq!(buffer.size().unwrap(), 64);
    assert_eq!(buffer.flags().unwrap(), EnumSet::only(MemFlag::ReadWrite));
    assert_eq!(buffer.map_count().unwrap(), 0);
    assert_eq!(buffer.context().unwrap(), rig.context);
}

#[test]
fn test_create_with_data_adds_copy_flag() {
    let rig = rig();
    let buffer = rig.context.create_buffer_with_data(EnumSet::only(MemFlag::ReadOnly), &[7; 16]).unwrap();
    assert_eq!(buffer.size().unwrap(), 16);
    assert_eq!(buffer.flags().unwrap(), enum_set!(MemFlag::ReadOnly | MemFlag::CopyHostPtr));
}

#[test]
fn test_zero_size_is_rejected() {
    let rig = rig();
    let error = rig.context.create_buffer(EnumSet::empty(), 0).unwrap_err();
    assert_eq!(error, Error::Executor { call: "create_buffer", code: status::INVALID_BUFFER_SIZE });
}

#[test]
fn test_on_destroy_fires_once_on_last_drop() {
    let rig = rig();
    let buffer = rig.context.create_buffer(EnumSet::empty(), 8).unwrap();
    let id = buffer.raw_id();
    let (sender, receiver) = mpsc::channel();
    buffer.on_destroy(move |memory| sender.send(memory).unwrap()).unwrap();

    let copy = buffer.clone();
    drop(buffer);
    assert!(receiver.try_recv().is_err());

    drop(copy);
    assert_eq!(receiver.try_recv().unwrap(), id);
    assert!(receiver.try_recv().is_err());
    assert_eq!(rig.soft.reference_count(id.object()), None);
}
