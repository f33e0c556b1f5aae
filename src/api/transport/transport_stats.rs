/*
 *  Copyright (c) 2024 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use std::fmt;
use std::ops::{Add, AddAssign};

use crate::api::units::DataRate;

/// Handle of one outbound transport connection, assigned by the streaming
/// engine when the connection is created. The conditioner only uses it as a
/// table key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Raw counters reported by the transport for one connection, sampled once per
/// tick. All counters are cumulative since the connection was created.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransportStats {
    // Unique (non-retransmitted) payload bytes handed to the socket, including
    // the per-packet framing header.
    pub bytes_sent_unique: u64,
    // Unique packets sent, used to subtract the framing overhead.
    pub packets_sent_unique: u64,
    // Instantaneous bandwidth estimate of the transport in Mbit/s.
    pub bandwidth_mbps: f64,
    pub audio_frames_lost: u64,
    pub video_frames_lost: u64,
}

impl TransportStats {
    // 1 Mbit/s expressed in bytes per second.
    pub const MBPS_TO_BYTES_PER_SEC: f64 = 125_000.0;
    // 1 Tbit/s. Anything above is a bogus figure rather than a fast link.
    pub const MAX_BANDWIDTH_MBPS: f64 = 1_000_000.0;

    /// The transport's bandwidth figure, or `None` when it isn't a usable
    /// number yet.
    pub fn bandwidth(&self) -> Option<DataRate> {
        if !(0.0..=Self::MAX_BANDWIDTH_MBPS).contains(&self.bandwidth_mbps) {
            return None;
        }
        Some(DataRate::from_bytes_per_sec_float(
            self.bandwidth_mbps * Self::MBPS_TO_BYTES_PER_SEC,
        ))
    }

    pub fn lost_frames(&self) -> LossCounts {
        LossCounts {
            audio: self.audio_frames_lost,
            video: self.video_frames_lost,
        }
    }
}

/// Lost audio and video frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LossCounts {
    pub audio: u64,
    pub video: u64,
}

impl LossCounts {
    pub const fn total(&self) -> u64 {
        self.audio + self.video
    }

    /// Frames lost since `earlier`. A counter that went backwards contributes
    /// nothing.
    pub const fn saturating_since(&self, earlier: LossCounts) -> LossCounts {
        LossCounts {
            audio: self.audio.saturating_sub(earlier.audio),
            video: self.video.saturating_sub(earlier.video),
        }
    }
}

impl Add for LossCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        LossCounts {
            audio: self.audio + rhs.audio,
            video: self.video + rhs.video,
        }
    }
}

impl AddAssign for LossCounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bandwidth_converts_mbps() {
        let stats = TransportStats {
            bandwidth_mbps: 4.0,
            ..Default::default()
        };
        assert_eq!(stats.bandwidth(), Some(DataRate::from_bytes_per_sec(500_000)));
        assert_eq!(stats.bandwidth(), Some(DataRate::from_kilobits_per_sec(4_000)));
    }

    #[test]
    fn unusable_bandwidth_is_unavailable() {
        for bandwidth_mbps in [f64::NAN, f64::INFINITY, -1.0, 1e300] {
            let stats = TransportStats {
                bandwidth_mbps,
                ..Default::default()
            };
            assert_eq!(stats.bandwidth(), None);
        }
    }

    #[test]
    fn bandwidth_bound_is_inclusive() {
        let stats = TransportStats {
            bandwidth_mbps: TransportStats::MAX_BANDWIDTH_MBPS,
            ..Default::default()
        };
        assert_eq!(stats.bandwidth(), Some(DataRate::from_bits_per_sec(1_000_000_000_000)));
    }

    #[test]
    fn loss_delta_saturates() {
        let earlier = LossCounts { audio: 3, video: 10 };
        let later = LossCounts { audio: 5, video: 4 };
        assert_eq!(later.saturating_since(earlier), LossCounts { audio: 2, video: 0 });
        assert_eq!((earlier + later).total(), 22);
    }
}
