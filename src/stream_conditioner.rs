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
        conditioner_control::{
            ConditionerStrategy, EncoderControl, ThroughputEstimate, TickInput,
            TransportStatsProvider,
        },
        transport::{ConnectionId, LossCounts},
        units::{DataRate, TimeDelta, Timestamp},
    },
    BitrateEntry, BitrateHistory, ConditionerError, ConditionerSettings, ConnectionTable,
    LossEntry, LossHistory, Strategy, StreamStats,
};

/// Lifecycle of a conditioner session. `Stopped` is terminal: a new session
/// needs a new conditioner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Adaptive bitrate control loop for one broadcast session.
///
/// The conditioner does no I/O and owns no timer. The host calls
/// [`Conditioner::poll_timeout`] to learn when the next check is due and
/// [`Conditioner::handle_timeout`] once it is, passing the transport counters
/// in. All entry points take the current time explicitly and must be called
/// from one execution context.
pub struct Conditioner<E, S = Strategy> {
    settings: ConditionerSettings,
    strategy: S,
    state: SessionState,
    encoder: Option<E>,

    full_bitrate: DataRate,
    min_bitrate: DataRate,

    connections: ConnectionTable,
    bitrate_history: BitrateHistory,
    loss_history: LossHistory,
    // Session wide lost frames, summed from per-connection deltas so the totals
    // survive connections going away.
    lost_frames: LossCounts,

    next_check: Option<Timestamp>,
    estimates: Vec<ThroughputEstimate>,
}

impl<E: EncoderControl> Conditioner<E, Strategy> {
    /// Creates a conditioner running the algorithm selected in `settings`.
    /// Returns `None` when adaptive bitrate is turned off.
    pub fn from_settings(mut settings: ConditionerSettings) -> Result<Option<Self>, ConditionerError> {
        settings.validate();
        let strategy = Strategy::from_settings(&settings)?;
        Ok(strategy.map(|strategy| Self::new(strategy, settings)))
    }
}

impl<E: EncoderControl, S: ConditionerStrategy> Conditioner<E, S> {
    pub fn new(strategy: S, mut settings: ConditionerSettings) -> Self {
        settings.validate();
        let loss_window = strategy.loss_window();
        if settings.loss_history.max_age < loss_window {
            tracing::warn!(
                "Loss history of {:?} is shorter than the strategy's loss window, extending to {:?}",
                settings.loss_history.max_age,
                loss_window
            );
            settings.loss_history.max_age = loss_window;
        }
        Self {
            connections: ConnectionTable::new(settings.max_connections),
            bitrate_history: BitrateHistory::new(settings.bitrate_history),
            loss_history: LossHistory::new(settings.loss_history),
            settings,
            strategy,
            state: SessionState::Idle,
            encoder: None,
            full_bitrate: DataRate::zero(),
            min_bitrate: DataRate::zero(),
            lost_frames: LossCounts::default(),
            next_check: None,
            estimates: Vec::new(),
        }
    }

    /// Starts the session at `nominal_bitrate`, which becomes the ceiling.
    pub fn start(
        &mut self,
        encoder: E,
        nominal_bitrate: DataRate,
        now: Timestamp,
    ) -> Result<(), ConditionerError> {
        if self.state != SessionState::Idle {
            return Err(ConditionerError::InvalidState {
                state: self.state,
                operation: "start",
            });
        }
        if nominal_bitrate.is_zero() || nominal_bitrate.is_infinite() {
            return Err(ConditionerError::InvalidBitrate(nominal_bitrate));
        }
        let min_bitrate = self.strategy.min_bitrate(nominal_bitrate);
        if min_bitrate.is_zero() || min_bitrate > nominal_bitrate {
            return Err(ConditionerError::InvalidBitrate(nominal_bitrate));
        }
        if !encoder.is_capturing() {
            return Err(ConditionerError::NotCapturing);
        }

        self.strategy.start(nominal_bitrate);
        self.full_bitrate = nominal_bitrate;
        self.min_bitrate = min_bitrate;
        self.encoder = Some(encoder);

        self.bitrate_history.push(BitrateEntry {
            at_time: now,
            bitrate: nominal_bitrate,
        });
        self.loss_history.push(LossEntry {
            at_time: now,
            lost: self.lost_frames,
        });

        let check_interval = self.strategy.check_interval();
        self.next_check = Some(now + check_interval);
        self.state = SessionState::Running;
        tracing::info!(
            "Conditioner started at {:?} (floor {:?}), checking every {:?}",
            nominal_bitrate,
            min_bitrate,
            check_interval
        );
        Ok(())
    }

    /// Ends the session and hands the encoder back. Calling it again does
    /// nothing.
    pub fn stop(&mut self) -> Option<E> {
        if self.state == SessionState::Stopped {
            return None;
        }
        if self.state != SessionState::Idle {
            tracing::info!("Conditioner stopped at {:?}", self.bitrate_history.current());
        }
        self.state = SessionState::Stopped;
        self.next_check = None;
        self.connections.clear();
        self.bitrate_history.clear();
        self.loss_history.clear();
        self.estimates.clear();
        self.lost_frames = LossCounts::default();
        self.encoder.take()
    }

    /// Suspends checks. History and the current bitrate are kept.
    pub fn pause(&mut self) {
        if self.state != SessionState::Running {
            tracing::debug!("Ignoring pause while {:?}", self.state);
            return;
        }
        self.state = SessionState::Paused;
        self.next_check = None;
        tracing::info!("Conditioner paused");
    }

    /// Resumes checks; the first one is due one interval after `now`.
    /// Counters accumulated while paused only serve as the new baseline.
    pub fn resume(&mut self, now: Timestamp) {
        if self.state != SessionState::Paused {
            tracing::debug!("Ignoring resume while {:?}", self.state);
            return;
        }
        for (_, stats) in self.connections.iter_mut() {
            stats.rebaseline();
        }
        self.state = SessionState::Running;
        self.next_check = Some(now + self.strategy.check_interval());
        tracing::info!("Conditioner resumed");
    }

    /// Starts monitoring a connection. Re-adding a monitored id restarts its
    /// throughput window.
    pub fn add_connection(&mut self, id: ConnectionId) -> Result<(), ConditionerError> {
        if self.state == SessionState::Stopped {
            tracing::debug!("Ignoring {} added after stop", id);
            return Ok(());
        }
        let capacity = self.settings.stats_capacity(self.strategy.check_interval());
        if !self.connections.insert(id, StreamStats::new(capacity))? {
            tracing::debug!("{} re-added, throughput window reset", id);
        }
        tracing::debug!("Monitoring {}", id);
        Ok(())
    }

    /// Stops monitoring a connection from the next check on. Returns false if
    /// the id wasn't monitored.
    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            tracing::debug!("No longer monitoring {}", id);
        }
        removed
    }

    /// When the next check is due, if one is scheduled.
    pub fn poll_timeout(&self) -> Option<Timestamp> {
        self.next_check
    }

    /// Runs the check if it is due. Outside of a running session this does
    /// nothing, so a timer firing after stop is harmless.
    ///
    /// An encoder failure stops the session and is returned.
    pub fn handle_timeout<P: TransportStatsProvider + ?Sized>(
        &mut self,
        now: Timestamp,
        provider: &P,
    ) -> Result<(), ConditionerError> {
        if self.state != SessionState::Running {
            return Ok(());
        }
        match self.next_check {
            Some(next_check) if now >= next_check => {}
            _ => return Ok(()),
        }
        self.next_check = Some(now + self.strategy.check_interval());
        self.on_tick(now, provider)
    }

    fn on_tick<P: TransportStatsProvider + ?Sized>(
        &mut self,
        now: Timestamp,
        provider: &P,
    ) -> Result<(), ConditionerError> {
        let check_interval = self.strategy.check_interval();
        let packet_overhead = self.settings.packet_overhead;

        self.estimates.clear();
        let mut lost = LossCounts::default();
        for (id, stats) in self.connections.iter_mut() {
            let Some(sample) = provider.connection_stats(id) else {
                tracing::debug!("{} has no stats yet, skipping", id);
                stats.mark_missing();
                continue;
            };
            lost += stats.update(sample, now, check_interval, packet_overhead);
            match stats.estimate(id) {
                Some(estimate) => self.estimates.push(estimate),
                None => tracing::debug!("{} has no throughput estimate yet", id),
            }
        }

        let loss_increased = lost.total() > 0;
        if loss_increased {
            self.lost_frames += lost;
            tracing::debug!(
                "Lost {} audio and {} video frames, {:?} total",
                lost.audio,
                lost.video,
                self.lost_frames
            );
            self.loss_history.push(LossEntry {
                at_time: now,
                lost: self.lost_frames,
            });
        }

        let current_bitrate = self.bitrate_history.current().unwrap_or(self.full_bitrate);
        let input = TickInput {
            at_time: now,
            current_bitrate,
            full_bitrate: self.full_bitrate,
            min_bitrate: self.min_bitrate,
            estimates: &self.estimates,
            loss_increased,
            bitrate_history: &self.bitrate_history,
            loss_history: &self.loss_history,
        };
        let Some(proposed) = self.strategy.check(&input) else {
            return Ok(());
        };
        tracing::debug!("Proposed {:?} at {:?}", proposed, current_bitrate);
        self.change_bitrate(proposed, now).map(|_| ())
    }

    /// Clamps `bitrate` to the session's bounds and applies it when it differs
    /// from the current bitrate by more than the strategy's debounce threshold.
    /// Returns whether a command was issued.
    ///
    /// Nothing is applied while paused. If the encoder rejects the command the
    /// session is stopped and the error returned.
    pub fn change_bitrate(
        &mut self,
        bitrate: DataRate,
        at_time: Timestamp,
    ) -> Result<bool, ConditionerError> {
        match self.state {
            SessionState::Running => {}
            SessionState::Paused => {
                tracing::debug!("Not applying {:?} while paused", bitrate);
                return Ok(false);
            }
            state => {
                return Err(ConditionerError::InvalidState {
                    state,
                    operation: "change_bitrate",
                })
            }
        }

        let bitrate = bitrate.clamp(self.min_bitrate, self.full_bitrate);
        let current_bitrate = self.bitrate_history.current().unwrap_or(self.full_bitrate);
        if bitrate.abs_diff(current_bitrate) <= self.strategy.debounce_threshold() {
            return Ok(false);
        }
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(false);
        };

        self.bitrate_history.push(BitrateEntry { at_time, bitrate });
        if let Err(err) = encoder.set_bitrate(bitrate) {
            tracing::warn!("Encoder rejected {:?}, stopping: {}", bitrate, err);
            self.stop();
            return Err(err.into());
        }
        tracing::info!("Bitrate changed {:?} -> {:?}", current_bitrate, bitrate);
        Ok(true)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The bitrate last applied, `None` outside of a session.
    pub fn current_bitrate(&self) -> Option<DataRate> {
        self.bitrate_history.current()
    }

    pub fn full_bitrate(&self) -> DataRate {
        self.full_bitrate
    }

    pub fn min_bitrate(&self) -> DataRate {
        self.min_bitrate
    }

    pub fn check_interval(&self) -> TimeDelta {
        self.strategy.check_interval()
    }

    pub fn lost_frames(&self) -> LossCounts {
        self.lost_frames
    }

    pub fn bitrate_history(&self) -> &BitrateHistory {
        &self.bitrate_history
    }

    pub fn loss_history(&self) -> &LossHistory {
        &self.loss_history
    }

    pub fn is_monitoring(&self, id: ConnectionId) -> bool {
        self.connections.contains(id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Estimates the last check worked with.
    pub fn estimates(&self) -> &[ThroughputEstimate] {
        &self.estimates
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn settings(&self) -> &ConditionerSettings {
        &self.settings
    }

    pub fn encoder(&self) -> Option<&E> {
        self.encoder.as_ref()
    }
}
