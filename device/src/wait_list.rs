//! Dependency lists.
//!
//! A [`WaitList`] borrows the events a submission depends on. The borrow keeps every event alive
//! for as long as the list exists, which covers the submitting call; the executor takes its own
//! references past that point.

use std::slice;

use ferrocl_abi::{EventId, ObjectKind, RawId, status};
use smallvec::SmallVec;
use snafu::ensure;

use crate::error::{ExecutorSnafu, InvalidArgumentSnafu, OperationFailedSnafu, Result};
use crate::sync::{Event, EventStatus};

/// Raw identifiers handed to the executor.
pub(crate) type RawWaitList = SmallVec<[EventId; 8]>;

/// Ordered, non-owning collection of events. Empty means "no dependencies".
#[derive(Debug, Clone, Default)]
pub struct WaitList<'a> {
    events: SmallVec<[&'a Event; 8]>,
}

impl<'a> WaitList<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: &'a Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Event> + '_ {
        self.events.iter().copied()
    }

    /// Flat array of raw identifiers, failing fast on a null one.
    pub(crate) fn marshal(&self) -> Result<RawWaitList> {
        self.events
            .iter()
            .map(|event| {
                let id = event.raw_id();
                ensure!(!id.is_null(), InvalidArgumentSnafu { kind: ObjectKind::Event });
                Ok(id)
            })
            .collect()
    }

    /// Block until every event is terminal.
    ///
    /// On failure the error carries the code of the first failed event in list order.
    pub fn wait(&self) -> Result<()> {
        let Some(first) = self.events.first() else {
            return Ok(());
        };
        let ids = self.marshal()?;
        match first.handle().driver().wait_for_events(&ids) {
            status::SUCCESS => Ok(()),
            status::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST => {
                for event in &self.events {
                    if let EventStatus::Error(code) = event.status()? {
                        return OperationFailedSnafu { code }.fail();
                    }
                }
                OperationFailedSnafu { code: status::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST }.fail()
            }
            code => ExecutorSnafu { call: "wait_for_events", code }.fail(),
        }
    }
}

impl<'a> From<&'a Event> for WaitList<'a> {
    fn from(event: &'a Event) -> Self {
        Self { events: smallvec::smallvec![event] }
    }
}

impl<'a> From<&'a [Event]> for WaitList<'a> {
    fn from(events: &'a [Event]) -> Self {
        events.iter().collect()
    }
}

impl<'a, const N: usize> From<[&'a Event; N]> for WaitList<'a> {
    fn from(events: [&'a Event; N]) -> Self {
        events.into_iter().collect()
    }
}

impl<'a> FromIterator<&'a Event> for WaitList<'a> {
    fn from_iter<T: IntoIterator<Item = &'a Event>>(iter: T) -> Self {
        Self { events: iter.into_iter().collect() }
    }
}

impl<'a> Extend<&'a Event> for WaitList<'a> {
    fn extend<T: IntoIterator<Item = &'a Event>>(&mut self, iter: T) {
        self.events.extend(iter);
    }
}

impl<'a, 'b> IntoIterator for &'b WaitList<'a> {
    type Item = &'a Event;
    type IntoIter = std::iter::Copied<slice::Iter<'b, &'a Event>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter().copied()
    }
}
