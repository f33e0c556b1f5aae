/*
 *  Copyright (c) 2024 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use std::{fmt, str::FromStr};

use crate::{
    api::units::{DataSize, TimeDelta},
    strategy::{HybridConfig, LogarithmicDescendConfig},
    HistoryRetention,
};

/// Which bitrate algorithm runs the session. The integer codes match the
/// values stored in the application's settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AdaptiveMode {
    Off = 0,
    LogarithmicDescend = 1,
    LadderAscend = 2,
    #[default]
    Hybrid = 3,
}

impl AdaptiveMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AdaptiveMode::Off => "off",
            AdaptiveMode::LogarithmicDescend => "logarithmic-descend",
            AdaptiveMode::LadderAscend => "ladder-ascend",
            AdaptiveMode::Hybrid => "hybrid",
        }
    }
}

impl TryFrom<i32> for AdaptiveMode {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AdaptiveMode::Off),
            1 => Ok(AdaptiveMode::LogarithmicDescend),
            2 => Ok(AdaptiveMode::LadderAscend),
            3 => Ok(AdaptiveMode::Hybrid),
            _ => Err(value),
        }
    }
}

impl FromStr for AdaptiveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(AdaptiveMode::Off),
            "logarithmic-descend" => Ok(AdaptiveMode::LogarithmicDescend),
            "ladder-ascend" => Ok(AdaptiveMode::LadderAscend),
            "hybrid" => Ok(AdaptiveMode::Hybrid),
            _ => Err(format!("unknown adaptive mode: {s}")),
        }
    }
}

impl fmt::Display for AdaptiveMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionerSettings {
    pub mode: AdaptiveMode,
    pub hybrid: HybridConfig,
    pub logarithmic_descend: LogarithmicDescendConfig,

    pub bitrate_history: HistoryRetention,
    pub loss_history: HistoryRetention,

    // Framing header added to every packet by the transport. It's subtracted
    // from the sent bytes so the required rate reflects encoder output.
    pub packet_overhead: DataSize,
    // Span of throughput samples averaged per connection.
    pub stats_window: TimeDelta,
    // Connection ids must stay below this.
    pub max_connections: usize,
}

impl ConditionerSettings {
    pub const DEFAULT_BITRATE_HISTORY: HistoryRetention =
        HistoryRetention::new(256, TimeDelta::from_minutes(60));
    pub const DEFAULT_LOSS_HISTORY: HistoryRetention =
        HistoryRetention::new(1024, TimeDelta::from_seconds(60));
    pub const DEFAULT_PACKET_OVERHEAD: DataSize = DataSize::from_bytes(44);
    pub const DEFAULT_STATS_WINDOW: TimeDelta = TimeDelta::from_seconds(5);
    pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

    pub fn with_mode(mode: AdaptiveMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn validate(&mut self) {
        self.hybrid.validate();
        self.logarithmic_descend.validate();
        self.bitrate_history.validate(Self::DEFAULT_BITRATE_HISTORY);
        self.loss_history.validate(Self::DEFAULT_LOSS_HISTORY);

        let loss_window = self.logarithmic_descend.loss_window;
        if self.loss_history.max_age < loss_window {
            tracing::warn!(
                "Loss history must cover the loss window of {:?}, extending it",
                loss_window
            );
            self.loss_history.max_age = loss_window.max(Self::DEFAULT_LOSS_HISTORY.max_age);
        }
        if self.packet_overhead.is_infinite() {
            tracing::warn!("Packet overhead must be finite");
            self.packet_overhead = Self::DEFAULT_PACKET_OVERHEAD;
        }
        if self.stats_window <= TimeDelta::zero() || self.stats_window.is_infinite() {
            tracing::warn!("Stats window must be positive and finite");
            self.stats_window = Self::DEFAULT_STATS_WINDOW;
        }
        if self.max_connections == 0 || self.max_connections > u32::MAX as usize {
            tracing::warn!("Max connections must be between 1 and {}", u32::MAX);
            self.max_connections = Self::DEFAULT_MAX_CONNECTIONS;
        }
    }

    /// Number of per-tick samples kept for a connection checked every
    /// `check_interval`.
    pub fn stats_capacity(&self, check_interval: TimeDelta) -> usize {
        if check_interval <= TimeDelta::zero() {
            return 1;
        }
        (self.stats_window.us() / check_interval.us()).max(1) as usize
    }
}

impl Default for ConditionerSettings {
    fn default() -> Self {
        Self {
            mode: AdaptiveMode::default(),
            hybrid: HybridConfig::default(),
            logarithmic_descend: LogarithmicDescendConfig::default(),
            bitrate_history: Self::DEFAULT_BITRATE_HISTORY,
            loss_history: Self::DEFAULT_LOSS_HISTORY,
            packet_overhead: Self::DEFAULT_PACKET_OVERHEAD,
            stats_window: Self::DEFAULT_STATS_WINDOW,
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
        }
    }
}
