/*
 *  Copyright (c) 2024 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

//! DataRate represents an encoder bitrate or a measured throughput. The
//! internal storage is bits per second (bps), never negative.

use std::fmt;
use std::ops::*;

use super::{DataSize, TimeDelta};

super::relative_unit!(DataRate);

impl DataRate {
    const ONE_SIDED: bool = true;

    pub const fn from_bits_per_sec(value: i64) -> Self {
        Self::from_value(value)
    }

    pub fn from_bits_per_sec_float(value: f64) -> Self {
        Self::from_value_float(value)
    }

    pub const fn from_bytes_per_sec(value: i64) -> Self {
        Self::from_fraction(8, value)
    }

    pub fn from_bytes_per_sec_float(value: f64) -> Self {
        Self::from_fraction_float(8.0, value)
    }

    pub const fn from_kilobits_per_sec(value: i64) -> Self {
        Self::from_fraction(1000, value)
    }

    pub fn from_kilobits_per_sec_float(value: f64) -> Self {
        Self::from_fraction_float(1000.0, value)
    }

    pub const fn infinity() -> Self {
        Self::plus_infinity()
    }

    pub const fn bps(&self) -> i64 {
        self.to_value()
    }

    pub fn bps_float(&self) -> f64 {
        self.to_value_float()
    }

    pub fn bytes_per_sec_float(&self) -> f64 {
        self.to_fraction_float(8.0)
    }

    pub const fn kbps(&self) -> i64 {
        self.to_fraction(1000)
    }

    pub fn kbps_float(&self) -> f64 {
        self.to_fraction_float(1000.0)
    }

    pub const fn bps_or(&self, fallback_value: i64) -> i64 {
        self.to_value_or(fallback_value)
    }

    /// Absolute difference between two finite rates.
    pub const fn abs_diff(&self, other: Self) -> Self {
        Self::from_value((self.to_value() - other.to_value()).abs())
    }
}

impl Div<TimeDelta> for DataSize {
    type Output = DataRate;

    fn div(self, duration: TimeDelta) -> Self::Output {
        DataRate::from_bits_per_sec(self.microbits() / duration.us())
    }
}

impl Mul<TimeDelta> for DataRate {
    type Output = DataSize;

    fn mul(self, duration: TimeDelta) -> Self::Output {
        let microbits: i64 = self.bps() * duration.us();
        DataSize::from_bytes((microbits + 4_000_000) / 8_000_000)
    }
}

impl Mul<DataRate> for TimeDelta {
    type Output = DataSize;

    fn mul(self, rate: DataRate) -> Self::Output {
        rate * self
    }
}

impl fmt::Debug for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_plus_infinity() {
            write!(f, "+inf bps")
        } else if self.is_minus_infinity() {
            write!(f, "-inf bps")
        } else if self.bps() == 0 || self.bps() % 1000 != 0 {
            write!(f, "{} bps", self.bps())
        } else {
            write!(f, "{} kbps", self.kbps())
        }
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn unit_conversions() {
        assert_eq!(DataRate::from_kilobits_per_sec(2_000).bps(), 2_000_000);
        assert_eq!(DataRate::from_bytes_per_sec(125_000).bps(), 1_000_000);
        assert_eq!(DataRate::from_bytes_per_sec_float(62_500.0).kbps(), 500);
        assert_relative_eq!(DataRate::from_bits_per_sec(1_000_000).bytes_per_sec_float(), 125_000.0);
        assert_relative_eq!(DataRate::from_bits_per_sec(1_500).kbps_float(), 1.5);
        assert_eq!(DataRate::infinity().bps_or(-1), -1);
    }

    #[test]
    fn abs_diff_is_symmetric() {
        let a = DataRate::from_kilobits_per_sec(1_000);
        let b = DataRate::from_kilobits_per_sec(901);
        assert_eq!(a.abs_diff(b), DataRate::from_kilobits_per_sec(99));
        assert_eq!(b.abs_diff(a), DataRate::from_kilobits_per_sec(99));
        assert!(a.abs_diff(a).is_zero());
    }

    #[test]
    fn rate_size_and_duration() {
        let one_second = TimeDelta::from_seconds(1);
        let rate = DataRate::from_kilobits_per_sec(800);
        assert_eq!((rate * one_second).bytes(), 100_000);
        assert_eq!((one_second * rate).bytes(), 100_000);
        assert_eq!(DataSize::from_bytes(100_000) / one_second, rate);
        assert_eq!(
            DataSize::from_bytes(50_000) / TimeDelta::from_millis(500),
            rate
        );
    }

    #[test]
    fn formatting() {
        assert_eq!(format!("{:?}", DataRate::from_kilobits_per_sec(300)), "300 kbps");
        assert_eq!(format!("{:?}", DataRate::from_bits_per_sec(2_828_854)), "2828854 bps");
        assert_eq!(format!("{}", DataRate::infinity()), "+inf bps");
    }

    #[test]
    #[should_panic]
    fn negative_rate_is_rejected() {
        let _ = DataRate::from_kilobits_per_sec(100) - DataRate::from_kilobits_per_sec(200);
    }
}
