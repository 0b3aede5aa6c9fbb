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

//! GPIO hardware abstraction
//!
//! The engine only talks to GPIO through these traits so the Linux character
//! device backend ([`cdev`]) and the simulator ([`sim`]) are interchangeable.
//!
//! Resource lifetime follows ownership: dropping a [`LineDevice`] releases the
//! line, dropping the last `Arc` to a [`ChipDevice`] closes the chip.

pub mod cdev;
pub mod sim;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Whether a line is driven (output) or sensed (input)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Identity of a physical line: (device path, offset within the device)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineKey {
    pub chip: String,
    pub offset: u32,
}

impl LineKey {
    pub fn new(chip: impl Into<String>, offset: u32) -> Self {
        Self { chip: chip.into(), offset }
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chip, self.offset)
    }
}

/// Opens GPIO chips by device path
pub trait GpioBackend: Send + Sync {
    fn open_chip(&self, path: &str) -> Result<Arc<dyn ChipDevice>>;
}

/// An open GPIO chip
pub trait ChipDevice: Send + Sync {
    fn path(&self) -> &str;

    /// Request exclusive use of `offset` in the given direction. For outputs
    /// `default` is driven immediately; it is ignored for inputs.
    fn request_line(
        &self,
        offset: u32,
        direction: Direction,
        default: bool,
        consumer: &str,
    ) -> Result<Box<dyn LineDevice>>;
}

/// A requested line. Values are logical: `true` is active.
#[cfg_attr(test, mockall::automock)]
pub trait LineDevice: Send {
    fn get_value(&self) -> Result<bool>;
    fn set_value(&self, value: bool) -> Result<()>;
}
