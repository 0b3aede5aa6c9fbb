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

//! Claimed GPIO lines
//!
//! A [`LineHandle`] owns one requested line together with a reference to the
//! chip it came from, so the chip stays open for as long as any of its lines
//! is held. It caches the claimed direction and the last known value.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{PanelError, Result};
use crate::gpio::{ChipDevice, Direction, LineDevice, LineKey};

/// Line handle shared between the claim table and the subsystem driving it
pub type SharedLine = Arc<Mutex<LineHandle>>;

pub struct LineHandle {
    key: LineKey,
    label: String,
    direction: Direction,
    value: bool,
    line: Box<dyn LineDevice>,
    chip: Arc<dyn ChipDevice>,
}

impl LineHandle {
    pub fn new(
        key: LineKey,
        label: impl Into<String>,
        direction: Direction,
        default: bool,
        line: Box<dyn LineDevice>,
        chip: Arc<dyn ChipDevice>,
    ) -> Self {
        // Inputs start low until the first read
        let value = match direction {
            Direction::Output => default,
            Direction::Input => false,
        };
        Self { key, label: label.into(), direction, value, line, chip }
    }

    pub fn key(&self) -> &LineKey {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn chip_path(&self) -> &str {
        self.chip.path()
    }

    /// Last value written (outputs) or read (inputs), without touching hardware
    pub fn cached_value(&self) -> bool {
        self.value
    }

    /// Drive an output line. Input lines are never switched to output here.
    pub fn set_value(&mut self, value: bool) -> Result<()> {
        if self.direction != Direction::Output {
            return Err(PanelError::DirectionMismatch {
                path: self.key.chip.clone(),
                offset: self.key.offset,
                direction: self.direction,
            });
        }
        self.line.set_value(value)?;
        self.value = value;
        trace!(line = %self.key, value, "line written");
        Ok(())
    }

    /// Read the line from hardware and refresh the cache
    pub fn get_value(&mut self) -> Result<bool> {
        let value = self.line.get_value()?;
        self.value = value;
        Ok(value)
    }

    /// Invert the cached output value and write it; returns the new value
    pub fn toggle(&mut self) -> Result<bool> {
        let next = !self.value;
        self.set_value(next)?;
        Ok(next)
    }

    pub fn into_shared(self) -> SharedLine {
        Arc::new(Mutex::new(self))
    }
}

impl fmt::Debug for LineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineHandle")
            .field("key", &self.key)
            .field("label", &self.label)
            .field("direction", &self.direction)
            .field("value", &self.value)
            .finish()
    }
}
