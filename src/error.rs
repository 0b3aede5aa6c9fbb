/*
 * This file is part of Panelio.
 *
 * Copyright (C) 2025 Panelio contributors
 *
 * Panelio is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Panelio is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Panelio. If not, see <https://www.gnu.org/licenses/>.
 */

//! Unified error handling for Panelio
//!
//! Every fallible operation in the crate returns [`PanelError`]. Hardware
//! variants carry the device path / line offset or channel name they refer to,
//! and [`PanelError::kind`] folds them into the coarse [`ErrorKind`] taxonomy
//! used for per-line claim status and for callers that only care about the
//! failure class.

use std::io;

use serde::Serialize;

use crate::gpio::Direction;

/// Result type alias using PanelError
pub type Result<T> = std::result::Result<T, PanelError>;

/// Coarse failure class of a [`PanelError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DeviceOpenFailure,
    LineBusyOrRequestFailure,
    DirectionMismatch,
    ReadFailure,
    WriteFailure,
    ChannelNotFound,
    Config,
    Io,
}

#[derive(thiserror::Error, Debug)]
pub enum PanelError {
    // ============================================================================
    // GPIO Errors
    // ============================================================================
    #[error("Failed to open GPIO chip {path}: {reason}")]
    DeviceOpen {
        path: String,
        reason: String,
    },

    #[error("Failed to request line {offset} on {path}: {reason}")]
    LineRequest {
        path: String,
        offset: u32,
        reason: String,
    },

    #[error("Line {offset} on {path} is already owned by another descriptor")]
    LineBusy {
        path: String,
        offset: u32,
    },

    #[error("Line {offset} on {path} is claimed as {direction}")]
    DirectionMismatch {
        path: String,
        offset: u32,
        direction: Direction,
    },

    #[error("Failed to read line {offset} on {path}: {reason}")]
    LineRead {
        path: String,
        offset: u32,
        reason: String,
    },

    #[error("Failed to write line {offset} on {path}: {reason}")]
    LineWrite {
        path: String,
        offset: u32,
        reason: String,
    },

    // ============================================================================
    // Analog Input Errors
    // ============================================================================
    #[error("Failed to open analog input context at {path}: {reason}")]
    AdcContext {
        path: String,
        reason: String,
    },

    #[error("Analog device not found: {0}")]
    AdcDeviceNotFound(String),

    #[error("Channel {channel} not found on analog device {device}")]
    ChannelNotFound {
        device: String,
        channel: String,
    },

    #[error("Failed to read analog channel {channel}: {reason}")]
    AdcRead {
        channel: String,
        reason: String,
    },

    // ============================================================================
    // Registration and Configuration Errors
    // ============================================================================
    #[error("Unknown line descriptor: {0}")]
    UnknownDescriptor(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PanelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PanelError::DeviceOpen { .. } | PanelError::AdcContext { .. } => {
                ErrorKind::DeviceOpenFailure
            }
            PanelError::LineRequest { .. } | PanelError::LineBusy { .. } => {
                ErrorKind::LineBusyOrRequestFailure
            }
            PanelError::DirectionMismatch { .. } => ErrorKind::DirectionMismatch,
            PanelError::LineRead { .. } | PanelError::AdcRead { .. } => ErrorKind::ReadFailure,
            PanelError::LineWrite { .. } => ErrorKind::WriteFailure,
            PanelError::AdcDeviceNotFound(_) | PanelError::ChannelNotFound { .. } => {
                ErrorKind::ChannelNotFound
            }
            PanelError::UnknownDescriptor(_)
            | PanelError::Config(_)
            | PanelError::InvalidConfig { .. }
            | PanelError::JsonParse(_) => ErrorKind::Config,
            PanelError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PanelError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
