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

//! Linux GPIO character device backend (`/dev/gpiochipN`)

use std::sync::Arc;

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use parking_lot::Mutex;
use tracing::debug;

use super::{ChipDevice, Direction, GpioBackend, LineDevice};
use crate::error::{PanelError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct CdevBackend;

impl CdevBackend {
    pub fn new() -> Self {
        Self
    }
}

impl GpioBackend for CdevBackend {
    fn open_chip(&self, path: &str) -> Result<Arc<dyn ChipDevice>> {
        let chip = Chip::new(path).map_err(|e| PanelError::DeviceOpen {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        debug!(chip = path, name = chip.name(), lines = chip.num_lines(), "opened GPIO chip");
        Ok(Arc::new(CdevChip {
            path: path.to_string(),
            chip: Mutex::new(chip),
        }))
    }
}

struct CdevChip {
    path: String,
    chip: Mutex<Chip>,
}

impl ChipDevice for CdevChip {
    fn path(&self) -> &str {
        &self.path
    }

    fn request_line(
        &self,
        offset: u32,
        direction: Direction,
        default: bool,
        consumer: &str,
    ) -> Result<Box<dyn LineDevice>> {
        let request_err = |reason: String| PanelError::LineRequest {
            path: self.path.clone(),
            offset,
            reason,
        };

        let line = self
            .chip
            .lock()
            .get_line(offset)
            .map_err(|e| request_err(e.to_string()))?;

        let (flags, default) = match direction {
            Direction::Output => (LineRequestFlags::OUTPUT, u8::from(default)),
            Direction::Input => (LineRequestFlags::INPUT, 0),
        };
        let handle = line
            .request(flags, default, consumer)
            .map_err(|e| request_err(e.to_string()))?;

        Ok(Box::new(CdevLine {
            path: self.path.clone(),
            offset,
            handle,
        }))
    }
}

struct CdevLine {
    path: String,
    offset: u32,
    handle: LineHandle,
}

impl LineDevice for CdevLine {
    fn get_value(&self) -> Result<bool> {
        self.handle
            .get_value()
            .map(|v| v != 0)
            .map_err(|e| PanelError::LineRead {
                path: self.path.clone(),
                offset: self.offset,
                reason: e.to_string(),
            })
    }

    fn set_value(&self, value: bool) -> Result<()> {
        self.handle
            .set_value(u8::from(value))
            .map_err(|e| PanelError::LineWrite {
                path: self.path.clone(),
                offset: self.offset,
                reason: e.to_string(),
            })
    }
}
