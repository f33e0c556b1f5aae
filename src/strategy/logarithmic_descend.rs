/*
 *  Copyright (c) 2024 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use crate::api::{
    conditioner_control::{ConditionerStrategy, TickInput},
    units::{DataRate, TimeDelta},
};

#[derive(Debug, Clone, PartialEq)]
pub struct LogarithmicDescendConfig {
    pub check_interval: TimeDelta,
    // Lost frames are ignored for this long after a bitrate change.
    pub normalization_delay: TimeDelta,
    // Trailing window lost frames are counted over.
    pub loss_window: TimeDelta,
    // More lost frames than this within the window trigger a decrease.
    pub loss_tolerance: u64,
    // Quiet time, with neither losses nor changes, before stepping up.
    pub recovery_attempt_interval: TimeDelta,

    // Decrease multiplies by decrease_numerator / decrease_denominator,
    // roughly 1/sqrt(2). Increase is the inverse step.
    pub decrease_numerator: i64,
    pub decrease_denominator: i64,
    pub increase_numerator: i64,
    pub increase_denominator: i64,

    pub floor_divisor: i64,
    pub debounce_threshold: DataRate,
}

impl Default for LogarithmicDescendConfig {
    fn default() -> Self {
        Self {
            check_interval: TimeDelta::from_seconds(1),
            normalization_delay: TimeDelta::from_millis(1_500),
            loss_window: TimeDelta::from_seconds(10),
            loss_tolerance: 4,
            recovery_attempt_interval: TimeDelta::from_seconds(60),
            decrease_numerator: 1_000,
            decrease_denominator: 1_414,
            increase_numerator: 1_415,
            increase_denominator: 1_000,
            floor_divisor: 4,
            debounce_threshold: DataRate::zero(),
        }
    }
}

impl LogarithmicDescendConfig {
    pub fn validate(&mut self) {
        let default = Self::default();

        if self.check_interval <= TimeDelta::zero() || self.check_interval.is_infinite() {
            tracing::warn!("Check interval must be positive and finite");
            self.check_interval = default.check_interval;
        }
        if self.normalization_delay < TimeDelta::zero() || self.normalization_delay.is_infinite() {
            tracing::warn!("Normalization delay must be finite and non-negative");
            self.normalization_delay = default.normalization_delay;
        }
        if self.loss_window <= TimeDelta::zero() || self.loss_window.is_infinite() {
            tracing::warn!("Loss window must be positive and finite");
            self.loss_window = default.loss_window;
        }
        if self.loss_tolerance == 0 {
            tracing::warn!("Loss tolerance must be at least one frame");
            self.loss_tolerance = default.loss_tolerance;
        }
        if self.recovery_attempt_interval < TimeDelta::zero()
            || self.recovery_attempt_interval.is_infinite()
        {
            tracing::warn!("Recovery attempt interval must be finite and non-negative");
            self.recovery_attempt_interval = default.recovery_attempt_interval;
        }
        if self.decrease_numerator <= 0
            || self.decrease_denominator <= 0
            || self.decrease_numerator >= self.decrease_denominator
        {
            tracing::warn!("Decrease factor must be in (0, 1)");
            self.decrease_numerator = default.decrease_numerator;
            self.decrease_denominator = default.decrease_denominator;
        }
        if self.increase_numerator <= 0
            || self.increase_denominator <= 0
            || self.increase_numerator <= self.increase_denominator
        {
            tracing::warn!("Increase factor must be greater than 1");
            self.increase_numerator = default.increase_numerator;
            self.increase_denominator = default.increase_denominator;
        }
        if self.floor_divisor < 1 {
            tracing::warn!("Floor divisor must be at least 1");
            self.floor_divisor = default.floor_divisor;
        }
        if self.debounce_threshold.is_infinite() {
            tracing::warn!("Debounce threshold must be finite");
            self.debounce_threshold = default.debounce_threshold;
        }
    }
}

// Reacts to lost frame counters only: divides the bitrate by about sqrt(2)
// when too many frames are lost in a short window and multiplies it back after
// a long quiet period.
#[derive(Debug, Clone)]
pub struct LogarithmicDescendStrategy {
    config: LogarithmicDescendConfig,
}

impl LogarithmicDescendStrategy {
    pub fn new(mut config: LogarithmicDescendConfig) -> Self {
        config.validate();
        Self { config }
    }

    pub fn config(&self) -> &LogarithmicDescendConfig {
        &self.config
    }

    fn decreased(&self, bitrate: DataRate) -> DataRate {
        bitrate * self.config.decrease_numerator / self.config.decrease_denominator
    }

    fn increased(&self, bitrate: DataRate) -> DataRate {
        bitrate * self.config.increase_numerator / self.config.increase_denominator
    }
}

impl ConditionerStrategy for LogarithmicDescendStrategy {
    fn check_interval(&self) -> TimeDelta {
        self.config.check_interval
    }

    fn start(&mut self, full_bitrate: DataRate) {
        tracing::debug!(
            "Logarithmic descend conditioner starting at {:?}, floor {:?}",
            full_bitrate,
            self.min_bitrate(full_bitrate)
        );
    }

    fn check(&mut self, input: &TickInput<'_>) -> Option<DataRate> {
        let current = input.current_bitrate;
        let last_bitrate_change = input.bitrate_history.last_change()?;

        if input.loss_increased {
            if current <= input.min_bitrate
                || input.at_time - last_bitrate_change < self.config.normalization_delay
            {
                return None;
            }
            // Losses right after the last change belong to the old bitrate.
            let since = (last_bitrate_change + self.config.normalization_delay)
                .max(input.at_time - self.config.loss_window);
            let lost = input.loss_history.lost_since(since);
            if lost < self.config.loss_tolerance {
                tracing::debug!("{} frames lost since {:?}, tolerating", lost, since);
                return None;
            }
            tracing::debug!("{} frames lost since {:?}, descending", lost, since);
            return Some(self.decreased(current).max(input.min_bitrate));
        }

        if current >= input.full_bitrate {
            return None;
        }
        let last_change = input
            .loss_history
            .last_change()
            .map_or(last_bitrate_change, |loss| loss.max(last_bitrate_change));
        if input.at_time - last_change < self.config.recovery_attempt_interval {
            return None;
        }
        Some(self.increased(current).min(input.full_bitrate))
    }

    fn min_bitrate(&self, full_bitrate: DataRate) -> DataRate {
        full_bitrate / self.config.floor_divisor
    }

    fn debounce_threshold(&self) -> DataRate {
        self.config.debounce_threshold
    }

    fn loss_window(&self) -> TimeDelta {
        self.config.loss_window
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        api::{transport::LossCounts, units::Timestamp},
        BitrateEntry, BitrateHistory, ConditionerSettings, LossEntry, LossHistory,
    };

    const FULL: DataRate = DataRate::from_bits_per_sec(4_000_000);
    const START: Timestamp = Timestamp::from_seconds(1_000);

    fn bps(value: i64) -> DataRate {
        DataRate::from_bits_per_sec(value)
    }

    struct Fixture {
        strategy: LogarithmicDescendStrategy,
        bitrates: BitrateHistory,
        losses: LossHistory,
    }

    impl Fixture {
        fn new() -> Self {
            let settings = ConditionerSettings::default();
            let mut bitrates = BitrateHistory::new(settings.bitrate_history);
            bitrates.push(BitrateEntry {
                at_time: START,
                bitrate: FULL,
            });
            let mut losses = LossHistory::new(settings.loss_history);
            losses.push(LossEntry {
                at_time: START,
                lost: LossCounts::default(),
            });
            Self {
                strategy: LogarithmicDescendStrategy::new(LogarithmicDescendConfig::default()),
                bitrates,
                losses,
            }
        }

        fn commit(&mut self, at_time: Timestamp, bitrate: DataRate) {
            self.bitrates.push(BitrateEntry { at_time, bitrate });
        }

        // Records `video` more lost frames and runs the check.
        fn lose(&mut self, at_time: Timestamp, video: u64) -> Option<DataRate> {
            let mut lost = self.losses.total();
            lost.video += video;
            self.losses.push(LossEntry { at_time, lost });
            self.check(at_time, true)
        }

        fn check(&mut self, at_time: Timestamp, loss_increased: bool) -> Option<DataRate> {
            let input = TickInput {
                at_time,
                current_bitrate: self.bitrates.current().unwrap(),
                full_bitrate: FULL,
                min_bitrate: self.strategy.min_bitrate(FULL),
                estimates: &[],
                loss_increased,
                bitrate_history: &self.bitrates,
                loss_history: &self.losses,
            };
            self.strategy.check(&input)
        }
    }

    #[test]
    fn defaults() {
        let strategy = LogarithmicDescendStrategy::new(LogarithmicDescendConfig::default());
        assert_eq!(strategy.check_interval(), TimeDelta::from_seconds(1));
        assert_eq!(strategy.min_bitrate(FULL), bps(1_000_000));
        assert_eq!(strategy.debounce_threshold(), DataRate::zero());
        assert_eq!(strategy.loss_window(), TimeDelta::from_seconds(10));
    }

    #[test]
    fn descends_after_tolerated_losses() {
        let mut f = Fixture::new();
        let at = START + TimeDelta::from_seconds(2);
        // 4,000,000 * 1000 / 1414 in integer arithmetic.
        assert_eq!(f.lose(at, 5), Some(bps(2_828_854)));
    }

    #[test]
    fn tolerates_few_losses() {
        let mut f = Fixture::new();
        assert_eq!(f.lose(START + TimeDelta::from_seconds(2), 2), None);
        assert_eq!(f.lose(START + TimeDelta::from_seconds(3), 1), None);
        // Fourth frame in the window crosses the tolerance.
        assert_eq!(f.lose(START + TimeDelta::from_seconds(4), 1), Some(bps(2_828_854)));
    }

    #[test]
    fn losses_outside_window_are_forgotten() {
        let mut f = Fixture::new();
        assert_eq!(f.lose(START + TimeDelta::from_seconds(2), 3), None);
        assert_eq!(f.lose(START + TimeDelta::from_seconds(13), 1), None);
    }

    #[test]
    fn ignores_losses_during_normalization() {
        let mut f = Fixture::new();
        assert_eq!(f.lose(START + TimeDelta::from_millis(1_499), 10), None);
    }

    #[test]
    fn window_starts_after_normalization() {
        let mut f = Fixture::new();
        let changed = START + TimeDelta::from_seconds(5);
        f.commit(changed, bps(2_828_854));
        // These belong to the previous bitrate.
        assert_eq!(f.lose(changed + TimeDelta::from_millis(1_000), 10), None);
        assert_eq!(f.lose(changed + TimeDelta::from_millis(2_000), 3), None);
        assert_eq!(
            f.lose(changed + TimeDelta::from_millis(3_000), 1),
            Some(bps(2_828_854 * 1_000 / 1_414))
        );
    }

    #[test]
    fn never_descends_below_floor() {
        let mut f = Fixture::new();
        f.commit(START + TimeDelta::from_seconds(5), bps(1_200_000));
        assert_eq!(f.lose(START + TimeDelta::from_seconds(8), 5), Some(bps(1_000_000)));

        f.commit(START + TimeDelta::from_seconds(8), bps(1_000_000));
        assert_eq!(f.lose(START + TimeDelta::from_seconds(12), 50), None);
    }

    #[test]
    fn recovers_after_quiet_period() {
        let mut f = Fixture::new();
        let changed = START + TimeDelta::from_seconds(5);
        f.commit(changed, bps(2_000_000));
        assert_eq!(f.check(changed + TimeDelta::from_seconds(59), false), None);
        assert_eq!(
            f.check(changed + TimeDelta::from_seconds(60), false),
            Some(bps(2_830_000))
        );
    }

    #[test]
    fn recent_loss_delays_recovery() {
        let mut f = Fixture::new();
        let changed = START + TimeDelta::from_seconds(5);
        f.commit(changed, bps(2_000_000));
        let lost = changed + TimeDelta::from_seconds(30);
        assert_eq!(f.lose(lost, 1), None);
        assert_eq!(f.check(changed + TimeDelta::from_seconds(60), false), None);
        assert_eq!(f.check(lost + TimeDelta::from_seconds(60), false), Some(bps(2_830_000)));
    }

    #[test]
    fn recovery_is_capped_at_full() {
        let mut f = Fixture::new();
        let changed = START + TimeDelta::from_seconds(5);
        f.commit(changed, bps(3_500_000));
        assert_eq!(f.check(changed + TimeDelta::from_seconds(60), false), Some(FULL));
    }

    #[test]
    fn no_recovery_at_full() {
        let mut f = Fixture::new();
        assert_eq!(f.check(START + TimeDelta::from_seconds(600), false), None);
    }

    #[test]
    fn validate_restores_defaults() {
        let mut config = LogarithmicDescendConfig {
            loss_window: TimeDelta::zero(),
            loss_tolerance: 0,
            decrease_numerator: 2_000,
            increase_numerator: 500,
            floor_divisor: 0,
            ..Default::default()
        };
        config.validate();
        assert_eq!(config, LogarithmicDescendConfig::default());
    }
}
