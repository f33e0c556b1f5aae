/*
 *  Copyright (c) 2024 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use super::{
    transport::{ConnectionId, TransportStats},
    units::{DataRate, TimeDelta, Timestamp},
};
use crate::{BitrateHistory, EncoderError, LossHistory};

// The encoder whose target bitrate the conditioner drives. Commands are fire
// and forget: nothing waits for the new bitrate to take effect.
pub trait EncoderControl {
    // Start precondition: the encoder has to be capturing.
    fn is_capturing(&self) -> bool;
    // Called only for committed (clamped and debounced) changes. An error means
    // the encoder is gone and ends the session.
    fn set_bitrate(&mut self, bitrate: DataRate) -> Result<(), EncoderError>;
}

// Source of the per-connection transport counters, read once per tick. The
// counters are already buffered by the transport so this never blocks.
pub trait TransportStatsProvider {
    // Returns None when the connection has nothing to report yet. The
    // connection is then skipped for the tick rather than treated as idle.
    fn connection_stats(&self, id: ConnectionId) -> Option<TransportStats>;
}

impl<F> TransportStatsProvider for F
where
    F: Fn(ConnectionId) -> Option<TransportStats>,
{
    fn connection_stats(&self, id: ConnectionId) -> Option<TransportStats> {
        self(id)
    }
}

/// Smoothed throughput of one connection for the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputEstimate {
    pub connection: ConnectionId,
    /// What the application is trying to push into the transport.
    pub required: DataRate,
    /// What the transport reports it actually achieves.
    pub real: DataRate,
}

/// Everything a strategy may look at when deciding on a new bitrate.
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub at_time: Timestamp,
    pub current_bitrate: DataRate,
    pub full_bitrate: DataRate,
    pub min_bitrate: DataRate,
    /// Estimates of the connections that reported this tick, in id order.
    pub estimates: &'a [ThroughputEstimate],
    /// True when the session's lost frame counters went up this tick. The new
    /// loss entry is already in `loss_history`.
    pub loss_increased: bool,
    pub bitrate_history: &'a BitrateHistory,
    pub loss_history: &'a LossHistory,
}

// ConditionerStrategy is implemented by the bitrate decision algorithms. The
// controller owns all state and histories; a strategy only maps a TickInput to
// an optional proposal, which the controller then clamps and debounces.
pub trait ConditionerStrategy {
    // Period of the controller's check timer.
    fn check_interval(&self) -> TimeDelta;
    // Called when a session starts with the nominal (full) bitrate.
    fn start(&mut self, full_bitrate: DataRate);
    // Returns the proposed bitrate for this tick, if any.
    fn check(&mut self, input: &TickInput<'_>) -> Option<DataRate>;
    // Lowest bitrate the strategy will ever ask for.
    fn min_bitrate(&self, full_bitrate: DataRate) -> DataRate;
    // Proposals closer than this to the current bitrate are dropped.
    fn debounce_threshold(&self) -> DataRate {
        DataRate::zero()
    }
    // How far back `check` looks into the loss history.
    fn loss_window(&self) -> TimeDelta {
        TimeDelta::zero()
    }
}

impl<S: ConditionerStrategy + ?Sized> ConditionerStrategy for Box<S> {
    fn check_interval(&self) -> TimeDelta {
        (**self).check_interval()
    }

    fn start(&mut self, full_bitrate: DataRate) {
        (**self).start(full_bitrate)
    }

    fn check(&mut self, input: &TickInput<'_>) -> Option<DataRate> {
        (**self).check(input)
    }

    fn min_bitrate(&self, full_bitrate: DataRate) -> DataRate {
        (**self).min_bitrate(full_bitrate)
    }

    fn debounce_threshold(&self) -> DataRate {
        (**self).debounce_threshold()
    }

    fn loss_window(&self) -> TimeDelta {
        (**self).loss_window()
    }
}
