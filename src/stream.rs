//! Replays the body of a [`Document`] as value changes interleaved with
//! fixed-size simulation steps.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::slice;

use crate::error::{Result, VcdError};
use crate::hierarchy::{Hierarchy, SignalId};
use crate::types::Value;
use crate::vcd::{parse_record, Document, Event};

/// Parsed body records, in file order.
///
/// Records that are neither a value change nor a time marker are skipped
/// when `ignore_invalid` is set and reported as
/// [`VcdError::UnsupportedValue`] otherwise.
pub struct Events<'a> {
    records: slice::Iter<'a, String>,
    ignore_invalid: bool,
}

impl<'a> Events<'a> {
    pub(crate) fn new(records: &'a [String], ignore_invalid: bool) -> Self {
        Events {
            records: records.iter(),
            ignore_invalid,
        }
    }
}

impl<'a> Iterator for Events<'a> {
    type Item = Result<Event<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = self.records.next()?;
            match parse_record(record) {
                Some(event) => return Some(Ok(event)),
                None if self.ignore_invalid => {
                    log::trace!("ignoring record `{}`", record);
                }
                None => return Some(Err(VcdError::UnsupportedValue(record.clone()))),
            }
        }
    }
}

/// Resolves VCD symbols to whatever the consumer drives.
pub trait SignalLookup {
    type Target;

    fn lookup_symbol(&self, symbol: &str) -> Option<Self::Target>;
}

impl SignalLookup for Hierarchy {
    type Target = SignalId;

    fn lookup_symbol(&self, symbol: &str) -> Option<SignalId> {
        self.lookup(symbol)
    }
}

impl<T: Clone> SignalLookup for HashMap<String, T> {
    type Target = T;

    fn lookup_symbol(&self, symbol: &str) -> Option<T> {
        self.get(symbol).cloned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    Assign { target: T, value: Value },
    /// One simulation step, starting at simulated time `time`.
    Step { time: u64 },
}

/// Single pass over a document, translating time markers into steps of a
/// fixed size.
///
/// A marker `#t` produces steps while the simulated time is still `<= t`,
/// each advancing it by `step` ticks. Simulated time starts at 0 and never
/// goes backwards.
pub struct ChangeStream<'a, L: SignalLookup> {
    events: Events<'a>,
    lookup: &'a L,
    step: u64,
    ignore_invalid: bool,
    sim_time: u64,
    target_time: Option<u64>,
}

impl<'a, L: SignalLookup> ChangeStream<'a, L> {
    pub fn new(
        document: &'a Document,
        lookup: &'a L,
        step: NonZeroU64,
        ignore_invalid: bool,
    ) -> Self {
        ChangeStream {
            events: document.events(ignore_invalid),
            lookup,
            step: step.get(),
            ignore_invalid,
            sim_time: 0,
            target_time: None,
        }
    }

    /// Simulated time reached so far, in ticks.
    pub fn sim_time(&self) -> u64 {
        self.sim_time
    }
}

impl<'a, L: SignalLookup> Iterator for ChangeStream<'a, L> {
    type Item = Result<Change<L::Target>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(target) = self.target_time {
                if self.sim_time <= target {
                    let time = self.sim_time;
                    match self.sim_time.checked_add(self.step) {
                        Some(t) => self.sim_time = t,
                        None => {
                            self.sim_time = u64::MAX;
                            self.target_time = None;
                        }
                    }
                    return Some(Ok(Change::Step { time }));
                }
                self.target_time = None;
            }
            match self.events.next()? {
                Err(e) => return Some(Err(e)),
                Ok(Event::Time(t)) => self.target_time = Some(t),
                Ok(Event::Change { symbol, value }) => match self.lookup.lookup_symbol(symbol) {
                    Some(target) => return Some(Ok(Change::Assign { target, value })),
                    None if self.ignore_invalid => {
                        log::trace!("no target for `{}`, ignoring", symbol);
                    }
                    None => return Some(Err(VcdError::UnresolvedSymbol(symbol.to_string()))),
                },
            }
        }
    }
}

/// Consumer of a replay, e.g. a simulator binding or a code generator.
pub trait StimulusDriver {
    type Target;

    fn drive(&mut self, target: &Self::Target, value: &Value) -> Result<()>;

    fn step(&mut self, time: u64) -> Result<()>;
}

/// Pumps `stream` into `driver`, returning the number of steps taken.
pub fn replay<L, D>(stream: ChangeStream<'_, L>, driver: &mut D) -> Result<u64>
where
    L: SignalLookup,
    D: StimulusDriver<Target = L::Target>,
{
    let mut steps = 0;
    for change in stream {
        match change? {
            Change::Assign { target, value } => driver.drive(&target, &value)?,
            Change::Step { time } => {
                driver.step(time)?;
                steps += 1;
            }
        }
    }
    Ok(steps)
}
