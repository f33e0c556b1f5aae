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

use crate::{
    api::{
        conditioner_control::ThroughputEstimate,
        transport::{ConnectionId, LossCounts, TransportStats},
        units::{DataRate, DataSize, TimeDelta, Timestamp},
    },
    ConditionerError,
};

// Fixed-capacity ring of per-tick byte counts with a running sum.
#[derive(Debug, Clone)]
pub struct TrafficHistory {
    samples: VecDeque<i64>,
    capacity: usize,
    sum: i64,
}

impl TrafficHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0,
        }
    }

    pub fn put(&mut self, value: i64) {
        if self.samples.len() == self.capacity {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }
        self.samples.push_back(value);
        self.sum += value;
    }

    // Averages over the samples actually present, so a half-filled ring at
    // session start isn't diluted by empty slots.
    pub fn avg(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.sum as f64 / self.samples.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = 0;
    }
}

// Turns the cumulative counters of one connection into smoothed required and
// real throughput.
#[derive(Debug, Clone)]
pub struct StreamStats {
    avg_to_send: TrafficHistory,
    last_sample: Option<(Timestamp, TransportStats)>,
    required: Option<DataRate>,
    real: Option<DataRate>,
    reported: bool,
}

impl StreamStats {
    pub fn new(capacity: usize) -> Self {
        Self {
            avg_to_send: TrafficHistory::new(capacity),
            last_sample: None,
            required: None,
            real: None,
            reported: false,
        }
    }

    /// Feeds the sample taken at `at_time`. Returns the frames lost since the
    /// previous sample.
    pub fn update(
        &mut self,
        stats: TransportStats,
        at_time: Timestamp,
        check_interval: TimeDelta,
        packet_overhead: DataSize,
    ) -> LossCounts {
        self.reported = true;
        self.real = stats.bandwidth();

        let Some((prev_at, prev)) = self.last_sample else {
            // First sample only sets the baseline.
            self.last_sample = Some((at_time, stats));
            return LossCounts::default();
        };
        let elapsed = at_time - prev_at;
        if elapsed <= TimeDelta::zero() {
            tracing::debug!("Sample at {:?} doesn't advance past {:?}, ignoring", at_time, prev_at);
            return LossCounts::default();
        }
        self.last_sample = Some((at_time, stats));
        let lost = stats.lost_frames().saturating_since(prev.lost_frames());

        if stats.bytes_sent_unique < prev.bytes_sent_unique
            || stats.packets_sent_unique < prev.packets_sent_unique
        {
            tracing::debug!("Transport counters went backwards, resetting throughput window");
            self.avg_to_send.clear();
            self.required = None;
            return lost;
        }

        let bytes = (stats.bytes_sent_unique - prev.bytes_sent_unique) as i64;
        let packets = (stats.packets_sent_unique - prev.packets_sent_unique) as i64;
        // Only payload counts towards what the encoder is producing.
        let payload = (bytes - packets * packet_overhead.bytes()).max(0);
        // A skipped or late check makes the delta span more than one interval.
        let per_interval = (payload as f64 * (check_interval / elapsed)).round() as i64;
        self.avg_to_send.put(per_interval);

        self.required = self.avg_to_send.avg().map(|avg_bytes| {
            DataRate::from_bytes_per_sec_float(avg_bytes / check_interval.seconds_float())
        });
        lost
    }

    /// The connection had nothing to report this tick.
    pub fn mark_missing(&mut self) {
        self.reported = false;
    }

    /// Makes the next sample a baseline again. The throughput window is kept.
    pub fn rebaseline(&mut self) {
        self.last_sample = None;
        self.reported = false;
    }

    pub fn required(&self) -> Option<DataRate> {
        self.required
    }

    pub fn real(&self) -> Option<DataRate> {
        self.real
    }

    pub fn reported(&self) -> bool {
        self.reported
    }

    pub fn estimate(&self, connection: ConnectionId) -> Option<ThroughputEstimate> {
        if !self.reported {
            return None;
        }
        Some(ThroughputEstimate {
            connection,
            required: self.required?,
            real: self.real?,
        })
    }
}

// Dense table of StreamStats indexed directly by connection id. Ids are small
// integers handed out by the streaming engine, so a Vec of slots gives stable
// keys without hashing.
#[derive(Debug, Clone)]
pub struct ConnectionTable {
    slots: Vec<Option<StreamStats>>,
    max_connections: usize,
    len: usize,
}

impl ConnectionTable {
    pub fn new(max_connections: usize) -> Self {
        Self {
            slots: Vec::new(),
            max_connections,
            len: 0,
        }
    }

    /// Registers a connection. Re-adding a known id starts its stats over.
    /// Returns true when the id wasn't monitored before.
    pub fn insert(&mut self, id: ConnectionId, stats: StreamStats) -> Result<bool, ConditionerError> {
        let index = id.index();
        if index >= self.max_connections {
            return Err(ConditionerError::ConnectionIdOutOfRange {
                id,
                max: self.max_connections,
            });
        }
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        let is_new = self.slots[index].replace(stats).is_none();
        if is_new {
            self.len += 1;
        }
        Ok(is_new)
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<StreamStats> {
        let removed = self.slots.get_mut(id.index()).and_then(Option::take);
        if removed.is_some() {
            self.len -= 1;
            while matches!(self.slots.last(), Some(None)) {
                self.slots.pop();
            }
        }
        removed
    }

    pub fn get(&self, id: ConnectionId) -> Option<&StreamStats> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &StreamStats)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|stats| (ConnectionId(index as u32), stats)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ConnectionId, &mut StreamStats)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|stats| (ConnectionId(index as u32), stats)))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.len = 0;
    }
}
