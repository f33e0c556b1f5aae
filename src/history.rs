/*
 *  Copyright (c) 2024 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use std::collections::VecDeque;

use crate::api::{
    transport::LossCounts,
    units::{DataRate, TimeDelta, Timestamp},
};

/// How much of a history log is kept. Sessions may run for hours, so both logs
/// are bounded by entry count and by age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRetention {
    pub max_entries: usize,
    pub max_age: TimeDelta,
}

impl HistoryRetention {
    // The recovery gate compares the last two bitrate entries.
    pub const MIN_ENTRIES: usize = 2;

    pub const fn new(max_entries: usize, max_age: TimeDelta) -> Self {
        Self {
            max_entries,
            max_age,
        }
    }

    pub fn validate(&mut self, default: HistoryRetention) {
        if self.max_entries < Self::MIN_ENTRIES {
            tracing::warn!(
                "History must keep at least {} entries, using {}",
                Self::MIN_ENTRIES,
                default.max_entries
            );
            self.max_entries = default.max_entries;
        }
        if self.max_age <= TimeDelta::zero() || self.max_age.is_infinite() {
            tracing::warn!(
                "History max age must be positive and finite, using {:?}",
                default.max_age
            );
            self.max_age = default.max_age;
        }
    }
}

pub trait HistoryEntry: Copy {
    fn at_time(&self) -> Timestamp;
    fn set_at_time(&mut self, at_time: Timestamp);
}

/// One committed bitrate change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitrateEntry {
    pub at_time: Timestamp,
    pub bitrate: DataRate,
}

/// Cumulative session loss counters at the time they last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossEntry {
    pub at_time: Timestamp,
    pub lost: LossCounts,
}

impl HistoryEntry for BitrateEntry {
    fn at_time(&self) -> Timestamp {
        self.at_time
    }

    fn set_at_time(&mut self, at_time: Timestamp) {
        self.at_time = at_time;
    }
}

impl HistoryEntry for LossEntry {
    fn at_time(&self) -> Timestamp {
        self.at_time
    }

    fn set_at_time(&mut self, at_time: Timestamp) {
        self.at_time = at_time;
    }
}

/// Append-only time series with non-decreasing timestamps.
#[derive(Debug, Clone)]
pub struct History<E> {
    entries: VecDeque<E>,
    retention: HistoryRetention,
}

pub type BitrateHistory = History<BitrateEntry>;
pub type LossHistory = History<LossEntry>;

impl<E: HistoryEntry> History<E> {
    pub fn new(retention: HistoryRetention) -> Self {
        Self {
            entries: VecDeque::new(),
            retention,
        }
    }

    pub fn push(&mut self, mut entry: E) {
        if let Some(last) = self.entries.back() {
            if entry.at_time() < last.at_time() {
                tracing::warn!(
                    "History entry at {:?} is older than the last one at {:?}, clamping",
                    entry.at_time(),
                    last.at_time()
                );
                entry.set_at_time(last.at_time());
            }
        }
        let now = entry.at_time();
        self.entries.push_back(entry);
        self.prune(now);
    }

    pub fn last(&self) -> Option<&E> {
        self.entries.back()
    }

    pub fn first(&self) -> Option<&E> {
        self.entries.front()
    }

    // The entry before the last one.
    pub fn previous(&self) -> Option<&E> {
        self.entries.len().checked_sub(2).and_then(|i| self.entries.get(i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &E> + '_ {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    // Drops entries beyond the count limit, then entries that are too old. The
    // newest entry older than the age limit stays as a baseline so windowed
    // queries reaching back to the limit still have a reference point.
    fn prune(&mut self, now: Timestamp) {
        let max_entries = self.retention.max_entries.max(HistoryRetention::MIN_ENTRIES);
        while self.entries.len() > max_entries {
            self.entries.pop_front();
        }
        let cutoff = now - self.retention.max_age;
        while self.entries.len() > HistoryRetention::MIN_ENTRIES
            && self.entries[1].at_time() <= cutoff
        {
            self.entries.pop_front();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitrateDirection {
    Decrease,
    Increase,
}

/// The most recent committed change, relative to the entry before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitrateTransition {
    pub direction: BitrateDirection,
    pub at_time: Timestamp,
}

impl History<BitrateEntry> {
    /// The authoritative current bitrate.
    pub fn current(&self) -> Option<DataRate> {
        self.last().map(|entry| entry.bitrate)
    }

    pub fn last_change(&self) -> Option<Timestamp> {
        self.last().map(|entry| entry.at_time)
    }

    pub fn last_transition(&self) -> Option<BitrateTransition> {
        let last = self.last()?;
        let prev = self.previous()?;
        let direction = if last.bitrate < prev.bitrate {
            BitrateDirection::Decrease
        } else if last.bitrate > prev.bitrate {
            BitrateDirection::Increase
        } else {
            return None;
        };
        Some(BitrateTransition {
            direction,
            at_time: last.at_time,
        })
    }
}

impl History<LossEntry> {
    pub fn last_change(&self) -> Option<Timestamp> {
        self.last().map(|entry| entry.at_time)
    }

    pub fn total(&self) -> LossCounts {
        self.last().map(|entry| entry.lost).unwrap_or_default()
    }

    /// Frames lost at or after `since`: the last cumulative total minus the
    /// total of the newest entry recorded before `since`. Falls back to the
    /// oldest entry when nothing precedes `since`.
    pub fn lost_since(&self, since: Timestamp) -> u64 {
        let Some(last) = self.last() else {
            return 0;
        };
        let baseline = self
            .iter()
            .rev()
            .find(|entry| entry.at_time < since)
            .or_else(|| self.first())
            .map(|entry| entry.lost)
            .unwrap_or_default();
        last.lost.saturating_since(baseline).total()
    }
}
