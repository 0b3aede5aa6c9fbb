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


//! Panelio - GPIO and ADC synchronization engine for embedded touch panels
//!
//! This library claims GPIO lines and analog channels on behalf of a UI,
//! drives outputs from UI toggles, polls inputs into display state and
//! smooths analog readings for display.

pub mod analog;
pub mod claim;
pub mod config;
pub mod display;
pub mod error;
pub mod gpio;
pub mod input;
pub mod line;
pub mod logger;
pub mod output;
pub mod panel;
pub mod registry;
pub mod scheduler;
pub mod smoothing;

pub use display::{DisplaySink, ElementId};
pub use error::{ErrorKind, PanelError, Result};
pub use panel::Panel;

#[cfg(test)]
pub mod test_utils;
