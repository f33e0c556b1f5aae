/*
 *  Copyright (c) 2024 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use thiserror::Error;

use crate::{
    api::{transport::ConnectionId, units::DataRate},
    AdaptiveMode, SessionState,
};

/// Errors reported by the encoder when a bitrate command can't be applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncoderError {
    /// The encoder was released; no further commands can be delivered.
    #[error("encoder released")]
    Released,

    /// The encoder refused the command.
    #[error("encoder rejected bitrate: {0}")]
    Rejected(String),
}

/// Errors returned by the conditioner.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConditionerError {
    /// The nominal bitrate passed to start is not a positive, finite rate.
    #[error("nominal bitrate must be positive and finite, got {0:?}")]
    InvalidBitrate(DataRate),

    /// start was called while the encoder isn't capturing.
    #[error("encoder is not capturing")]
    NotCapturing,

    /// The operation isn't allowed in the current session state.
    #[error("{operation} is not allowed while {state:?}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },

    /// The configured adaptive mode has no algorithm.
    #[error("adaptive mode {0} is not supported")]
    UnsupportedMode(AdaptiveMode),

    /// The id doesn't fit the connection table.
    #[error("connection id {id} exceeds the table size {max}")]
    ConnectionIdOutOfRange { id: ConnectionId, max: usize },

    /// The bitrate command failed; the session has been stopped.
    #[error("{0}")]
    Encoder(#[from] EncoderError),
}
