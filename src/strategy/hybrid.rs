/*
 *  Copyright (c) 2024 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use crate::{
    api::{
        conditioner_control::{ConditionerStrategy, ThroughputEstimate, TickInput},
        units::{DataRate, TimeDelta, Timestamp},
    },
    BitrateDirection, BitrateHistory,
};

#[derive(Debug, Clone, PartialEq)]
pub struct HybridConfig {
    pub check_interval: TimeDelta,
    // Proposals are ignored for this long after a committed change.
    pub normalization_delay: TimeDelta,
    // First upward step after a decrease.
    pub recovery_attempt_interval: TimeDelta,
    // Each following upward step.
    pub recovery_step_interval: TimeDelta,

    // A connection is degraded when its real rate is below this fraction of
    // both the current bitrate and the required rate.
    pub degradation_threshold: f64,
    pub reduction_margin: DataRate,
    pub rounding_step: DataRate,
    // Required rates at or below this mean nothing was sent yet.
    pub min_required_rate: DataRate,

    pub floor_fraction: f64,

    // Recovery step is recovery_step_fraction of the full bitrate, bounded to
    // [min_recovery_step, max_recovery_step].
    pub recovery_step_fraction: f64,
    pub min_recovery_step: DataRate,
    pub max_recovery_step: DataRate,

    pub debounce_threshold: DataRate,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            check_interval: TimeDelta::from_seconds(1),
            normalization_delay: TimeDelta::from_seconds(5),
            recovery_attempt_interval: TimeDelta::from_seconds(30),
            recovery_step_interval: TimeDelta::from_seconds(10),
            degradation_threshold: 0.95,
            reduction_margin: DataRate::from_bits_per_sec(30_000),
            rounding_step: DataRate::from_bits_per_sec(100_000),
            min_required_rate: DataRate::from_bits_per_sec(1_000),
            floor_fraction: 0.25,
            recovery_step_fraction: 0.1,
            min_recovery_step: DataRate::from_bits_per_sec(100_000),
            max_recovery_step: DataRate::from_bits_per_sec(500_000),
            debounce_threshold: DataRate::from_bits_per_sec(99_000),
        }
    }
}

impl HybridConfig {
    pub fn validate(&mut self) {
        let default = Self::default();

        if self.check_interval <= TimeDelta::zero() || self.check_interval.is_infinite() {
            tracing::warn!("Check interval must be positive and finite");
            self.check_interval = default.check_interval;
        }
        for (name, value, fallback) in [
            (
                "Normalization delay",
                &mut self.normalization_delay,
                default.normalization_delay,
            ),
            (
                "Recovery attempt interval",
                &mut self.recovery_attempt_interval,
                default.recovery_attempt_interval,
            ),
            (
                "Recovery step interval",
                &mut self.recovery_step_interval,
                default.recovery_step_interval,
            ),
        ] {
            if *value < TimeDelta::zero() || value.is_infinite() {
                tracing::warn!("{} must be finite and non-negative", name);
                *value = fallback;
            }
        }
        if !(self.degradation_threshold > 0.0 && self.degradation_threshold <= 1.0) {
            tracing::warn!("Degradation threshold must be in (0, 1]");
            self.degradation_threshold = default.degradation_threshold;
        }
        if !(self.floor_fraction > 0.0 && self.floor_fraction <= 1.0) {
            tracing::warn!("Floor fraction must be in (0, 1]");
            self.floor_fraction = default.floor_fraction;
        }
        if !(self.recovery_step_fraction > 0.0 && self.recovery_step_fraction <= 1.0) {
            tracing::warn!("Recovery step fraction must be in (0, 1]");
            self.recovery_step_fraction = default.recovery_step_fraction;
        }
        if self.rounding_step.is_zero() || self.rounding_step.is_infinite() {
            tracing::warn!("Rounding step must be positive and finite");
            self.rounding_step = default.rounding_step;
        }
        if self.reduction_margin.is_infinite() || self.min_required_rate.is_infinite() {
            tracing::warn!("Reduction margin and minimum required rate must be finite");
            self.reduction_margin = default.reduction_margin;
            self.min_required_rate = default.min_required_rate;
        }
        if self.min_recovery_step.is_zero()
            || self.max_recovery_step.is_infinite()
            || self.min_recovery_step > self.max_recovery_step
        {
            tracing::warn!("Recovery step bounds must be positive, finite and ordered");
            self.min_recovery_step = default.min_recovery_step;
            self.max_recovery_step = default.max_recovery_step;
        }
        if self.debounce_threshold.is_infinite() {
            tracing::warn!("Debounce threshold must be finite");
            self.debounce_threshold = default.debounce_threshold;
        }
    }
}

// Compares what each connection achieves against what the encoder produces and
// scales the bitrate down by the worst ratio. Climbs back towards the full
// bitrate in fixed steps once the cool-downs allow it.
#[derive(Debug, Clone)]
pub struct HybridStrategy {
    config: HybridConfig,
}

impl HybridStrategy {
    pub fn new(mut config: HybridConfig) -> Self {
        config.validate();
        Self { config }
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    // Bitrate this connection can sustain, or None when it keeps up.
    fn reduced_bitrate(&self, current: DataRate, estimate: &ThroughputEstimate) -> Option<DataRate> {
        if estimate.required <= self.config.min_required_rate {
            return None;
        }
        let threshold = self.config.degradation_threshold;
        if estimate.real >= current * threshold || estimate.real >= estimate.required * threshold {
            return None;
        }
        let ratio = estimate.real / estimate.required;
        let scaled = current * ratio + self.config.reduction_margin;
        Some(scaled.round_to(self.config.rounding_step))
    }

    fn can_recover(&self, history: &BitrateHistory, at_time: Timestamp) -> bool {
        let Some(transition) = history.last_transition() else {
            return false;
        };
        let elapsed = at_time - transition.at_time;
        match transition.direction {
            BitrateDirection::Decrease => elapsed >= self.config.recovery_attempt_interval,
            BitrateDirection::Increase => elapsed >= self.config.recovery_step_interval,
        }
    }

    fn recovery_step(&self, full_bitrate: DataRate) -> DataRate {
        (full_bitrate * self.config.recovery_step_fraction)
            .min(self.config.max_recovery_step)
            .max(self.config.min_recovery_step)
    }
}

impl ConditionerStrategy for HybridStrategy {
    fn check_interval(&self) -> TimeDelta {
        self.config.check_interval
    }

    fn start(&mut self, full_bitrate: DataRate) {
        tracing::debug!(
            "Hybrid conditioner starting at {:?}, floor {:?}",
            full_bitrate,
            self.min_bitrate(full_bitrate)
        );
    }

    fn check(&mut self, input: &TickInput<'_>) -> Option<DataRate> {
        let current = input.current_bitrate;

        // The most constrained connection wins.
        let mut target: Option<DataRate> = None;
        for estimate in input.estimates {
            let Some(reduced) = self.reduced_bitrate(current, estimate) else {
                continue;
            };
            let reduced = reduced.max(input.min_bitrate);
            if reduced >= current {
                // Rounding or the floor landed at or above current.
                tracing::debug!(
                    "{} degraded but {:?} is no reduction from {:?}",
                    estimate.connection,
                    reduced,
                    current
                );
                continue;
            }
            tracing::debug!(
                "{} degraded: real {:?} required {:?}, proposing {:?}",
                estimate.connection,
                estimate.real,
                estimate.required,
                reduced
            );
            target = Some(target.map_or(reduced, |t| t.min(reduced)));
        }

        let last_change = input.bitrate_history.last_change()?;
        if input.at_time - last_change < self.config.normalization_delay {
            return None;
        }

        if target.is_some() {
            return target;
        }

        if current >= input.full_bitrate || !self.can_recover(input.bitrate_history, input.at_time) {
            return None;
        }
        let recovered = (current + self.recovery_step(input.full_bitrate)).min(input.full_bitrate);
        tracing::debug!("Recovering {:?} -> {:?}", current, recovered);
        Some(recovered)
    }

    fn min_bitrate(&self, full_bitrate: DataRate) -> DataRate {
        full_bitrate * self.config.floor_fraction
    }

    fn debounce_threshold(&self) -> DataRate {
        self.config.debounce_threshold
    }
}
