/*
 *  Copyright (c) 2024 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

//! Bitrate decision algorithms.

mod hybrid;
mod logarithmic_descend;

pub use hybrid::*;
pub use logarithmic_descend::*;

use crate::{
    api::{
        conditioner_control::{ConditionerStrategy, TickInput},
        units::{DataRate, TimeDelta},
    },
    AdaptiveMode, ConditionerError, ConditionerSettings,
};

/// The built-in strategies.
#[derive(Debug, Clone)]
pub enum Strategy {
    Hybrid(HybridStrategy),
    LogarithmicDescend(LogarithmicDescendStrategy),
}

impl Strategy {
    /// Builds the strategy selected by `settings.mode`. Returns `None` when
    /// adaptive bitrate is off.
    pub fn from_settings(settings: &ConditionerSettings) -> Result<Option<Self>, ConditionerError> {
        match settings.mode {
            AdaptiveMode::Off => Ok(None),
            AdaptiveMode::Hybrid => Ok(Some(Strategy::Hybrid(HybridStrategy::new(
                settings.hybrid.clone(),
            )))),
            AdaptiveMode::LogarithmicDescend => Ok(Some(Strategy::LogarithmicDescend(
                LogarithmicDescendStrategy::new(settings.logarithmic_descend.clone()),
            ))),
            AdaptiveMode::LadderAscend => Err(ConditionerError::UnsupportedMode(settings.mode)),
        }
    }

    pub fn mode(&self) -> AdaptiveMode {
        match self {
            Strategy::Hybrid(_) => AdaptiveMode::Hybrid,
            Strategy::LogarithmicDescend(_) => AdaptiveMode::LogarithmicDescend,
        }
    }
}

impl ConditionerStrategy for Strategy {
    fn check_interval(&self) -> TimeDelta {
        match self {
            Strategy::Hybrid(s) => s.check_interval(),
            Strategy::LogarithmicDescend(s) => s.check_interval(),
        }
    }

    fn start(&mut self, full_bitrate: DataRate) {
        match self {
            Strategy::Hybrid(s) => s.start(full_bitrate),
            Strategy::LogarithmicDescend(s) => s.start(full_bitrate),
        }
    }

    fn check(&mut self, input: &TickInput<'_>) -> Option<DataRate> {
        match self {
            Strategy::Hybrid(s) => s.check(input),
            Strategy::LogarithmicDescend(s) => s.check(input),
        }
    }

    fn min_bitrate(&self, full_bitrate: DataRate) -> DataRate {
        match self {
            Strategy::Hybrid(s) => s.min_bitrate(full_bitrate),
            Strategy::LogarithmicDescend(s) => s.min_bitrate(full_bitrate),
        }
    }

    fn debounce_threshold(&self) -> DataRate {
        match self {
            Strategy::Hybrid(s) => s.debounce_threshold(),
            Strategy::LogarithmicDescend(s) => s.debounce_threshold(),
        }
    }

    fn loss_window(&self) -> TimeDelta {
        match self {
            Strategy::Hybrid(s) => s.loss_window(),
            Strategy::LogarithmicDescend(s) => s.loss_window(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn selects_by_mode() {
        let strategy = Strategy::from_settings(&ConditionerSettings::with_mode(AdaptiveMode::Hybrid))
            .unwrap()
            .unwrap();
        assert_eq!(strategy.mode(), AdaptiveMode::Hybrid);
        assert_eq!(strategy.debounce_threshold(), DataRate::from_bits_per_sec(99_000));

        let strategy = Strategy::from_settings(&ConditionerSettings::with_mode(
            AdaptiveMode::LogarithmicDescend,
        ))
        .unwrap()
        .unwrap();
        assert_eq!(strategy.mode(), AdaptiveMode::LogarithmicDescend);
        assert_eq!(
            strategy.min_bitrate(DataRate::from_bits_per_sec(4_000_000)),
            DataRate::from_bits_per_sec(1_000_000)
        );
    }

    #[test]
    fn off_builds_nothing() {
        let settings = ConditionerSettings::with_mode(AdaptiveMode::Off);
        assert!(Strategy::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn ladder_ascend_is_unsupported() {
        let settings = ConditionerSettings::with_mode(AdaptiveMode::LadderAscend);
        assert_eq!(
            Strategy::from_settings(&settings).unwrap_err(),
            ConditionerError::UnsupportedMode(AdaptiveMode::LadderAscend)
        );
    }
}
