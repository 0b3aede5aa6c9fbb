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

//! In-memory GPIO simulator
//!
//! Behaves like the kernel character device where it matters to the engine:
//! a line can only be requested once until it is released, requesting an
//! output drives its default level, and writing a line requested as input is
//! rejected. Failures can be injected per chip or per line, and the simulator
//! counts opens and requests so tests can assert on hardware traffic.
//!
//! Handles are cheap clones sharing one state, so a test keeps a `SimGpio`
//! to poke levels while the engine owns another.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ChipDevice, Direction, GpioBackend, LineDevice, LineKey};
use crate::error::{PanelError, Result};

#[derive(Clone, Default)]
pub struct SimGpio {
    state: Arc<Mutex<SimState>>,
}

#[derive(Default)]
struct SimState {
    chips: HashMap<String, SimChip>,
    fail_open: HashSet<String>,
    opens: HashMap<String, usize>,
    live_chips: usize,
    requests: HashMap<LineKey, usize>,
}

struct SimChip {
    num_lines: u32,
    lines: HashMap<u32, SimLine>,
}

#[derive(Default)]
struct SimLine {
    level: bool,
    requested: Option<Direction>,
    fail_request: bool,
    fail_read: bool,
    fail_write: bool,
}

impl SimState {
    fn line_mut(&mut self, path: &str, offset: u32) -> Option<&mut SimLine> {
        let chip = self.chips.get_mut(path)?;
        if offset >= chip.num_lines {
            return None;
        }
        Some(chip.lines.entry(offset).or_default())
    }
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`SimGpio::add_chip`]
    pub fn with_chip(self, path: &str, num_lines: u32) -> Self {
        self.add_chip(path, num_lines);
        self
    }

    pub fn add_chip(&self, path: &str, num_lines: u32) {
        self.state.lock().chips.insert(
            path.to_string(),
            SimChip { num_lines, lines: HashMap::new() },
        );
    }

    pub fn fail_open(&self, path: &str) {
        self.state.lock().fail_open.insert(path.to_string());
    }

    pub fn fail_request(&self, path: &str, offset: u32) {
        if let Some(line) = self.state.lock().line_mut(path, offset) {
            line.fail_request = true;
        }
    }

    pub fn set_read_failure(&self, path: &str, offset: u32, fail: bool) {
        if let Some(line) = self.state.lock().line_mut(path, offset) {
            line.fail_read = fail;
        }
    }

    pub fn set_write_failure(&self, path: &str, offset: u32, fail: bool) {
        if let Some(line) = self.state.lock().line_mut(path, offset) {
            line.fail_write = fail;
        }
    }

    /// Drive the electrical level seen by an input line
    pub fn set_level(&self, path: &str, offset: u32, level: bool) {
        if let Some(line) = self.state.lock().line_mut(path, offset) {
            line.level = level;
        }
    }

    pub fn level(&self, path: &str, offset: u32) -> Option<bool> {
        self.state.lock().line_mut(path, offset).map(|l| l.level)
    }

    pub fn is_requested(&self, path: &str, offset: u32) -> bool {
        self.state
            .lock()
            .line_mut(path, offset)
            .map(|l| l.requested.is_some())
            .unwrap_or(false)
    }

    pub fn open_count(&self, path: &str) -> usize {
        self.state.lock().opens.get(path).copied().unwrap_or(0)
    }

    pub fn total_opens(&self) -> usize {
        self.state.lock().opens.values().sum()
    }

    pub fn request_count(&self, path: &str, offset: u32) -> usize {
        self.state
            .lock()
            .requests
            .get(&LineKey::new(path, offset))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.state.lock().requests.values().sum()
    }

    /// Chips currently open (opened and not yet dropped)
    pub fn live_chips(&self) -> usize {
        self.state.lock().live_chips
    }

    /// Lines currently requested across all chips
    pub fn live_lines(&self) -> usize {
        self.state
            .lock()
            .chips
            .values()
            .flat_map(|c| c.lines.values())
            .filter(|l| l.requested.is_some())
            .count()
    }
}

impl GpioBackend for SimGpio {
    fn open_chip(&self, path: &str) -> Result<Arc<dyn ChipDevice>> {
        let mut state = self.state.lock();
        if state.fail_open.contains(path) || !state.chips.contains_key(path) {
            return Err(PanelError::DeviceOpen {
                path: path.to_string(),
                reason: "No such file or directory".to_string(),
            });
        }
        *state.opens.entry(path.to_string()).or_insert(0) += 1;
        state.live_chips += 1;
        Ok(Arc::new(SimChipHandle {
            path: path.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimChipHandle {
    path: String,
    state: Arc<Mutex<SimState>>,
}

impl Drop for SimChipHandle {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.live_chips = state.live_chips.saturating_sub(1);
    }
}

impl ChipDevice for SimChipHandle {
    fn path(&self) -> &str {
        &self.path
    }

    fn request_line(
        &self,
        offset: u32,
        direction: Direction,
        default: bool,
        _consumer: &str,
    ) -> Result<Box<dyn LineDevice>> {
        let request_err = |reason: &str| PanelError::LineRequest {
            path: self.path.clone(),
            offset,
            reason: reason.to_string(),
        };

        let mut state = self.state.lock();
        let line = state
            .line_mut(&self.path, offset)
            .ok_or_else(|| request_err("Invalid argument"))?;
        if line.fail_request {
            return Err(request_err("Input/output error"));
        }
        if line.requested.is_some() {
            return Err(request_err("Device or resource busy"));
        }
        line.requested = Some(direction);
        if direction == Direction::Output {
            line.level = default;
        }
        *state.requests.entry(LineKey::new(self.path.clone(), offset)).or_insert(0) += 1;

        Ok(Box::new(SimLineHandle {
            key: LineKey::new(self.path.clone(), offset),
            direction,
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimLineHandle {
    key: LineKey,
    direction: Direction,
    state: Arc<Mutex<SimState>>,
}

impl Drop for SimLineHandle {
    fn drop(&mut self) {
        if let Some(line) = self.state.lock().line_mut(&self.key.chip, self.key.offset) {
            line.requested = None;
        }
    }
}

impl LineDevice for SimLineHandle {
    fn get_value(&self) -> Result<bool> {
        let mut state = self.state.lock();
        let line = state
            .line_mut(&self.key.chip, self.key.offset)
            .ok_or_else(|| PanelError::LineRead {
                path: self.key.chip.clone(),
                offset: self.key.offset,
                reason: "line vanished".to_string(),
            })?;
        if line.fail_read {
            return Err(PanelError::LineRead {
                path: self.key.chip.clone(),
                offset: self.key.offset,
                reason: "Input/output error".to_string(),
            });
        }
        Ok(line.level)
    }

    fn set_value(&self, value: bool) -> Result<()> {
        let write_err = |reason: &str| PanelError::LineWrite {
            path: self.key.chip.clone(),
            offset: self.key.offset,
            reason: reason.to_string(),
        };

        let mut state = self.state.lock();
        let line = state
            .line_mut(&self.key.chip, self.key.offset)
            .ok_or_else(|| write_err("line vanished"))?;
        if self.direction == Direction::Input {
            return Err(write_err("Operation not permitted"));
        }
        if line.fail_write {
            return Err(write_err("Input/output error"));
        }
        line.level = value;
        Ok(())
    }
}
