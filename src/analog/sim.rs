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


//! In-memory ADC simulator

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{AdcChannel, AdcContext, AdcDevice};
use crate::error::{PanelError, Result};

#[derive(Clone, Default)]
pub struct SimAdc {
    state: Arc<Mutex<BTreeMap<String, BTreeMap<String, SimChannel>>>>,
}

#[derive(Default)]
struct SimChannel {
    raw: i64,
    fail_read: bool,
    reads: usize,
}

impl SimAdc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, name: &str, channels: &[&str]) -> Self {
        {
            let mut state = self.state.lock();
            let dev = state.entry(name.to_string()).or_default();
            for ch in channels {
                dev.entry(ch.to_string()).or_default();
            }
        }
        self
    }

    pub fn set_raw(&self, device: &str, channel: &str, raw: i64) {
        if let Some(ch) = self.state.lock().get_mut(device).and_then(|d| d.get_mut(channel)) {
            ch.raw = raw;
        }
    }

    pub fn set_read_failure(&self, device: &str, channel: &str, fail: bool) {
        if let Some(ch) = self.state.lock().get_mut(device).and_then(|d| d.get_mut(channel)) {
            ch.fail_read = fail;
        }
    }

    pub fn read_count(&self, device: &str, channel: &str) -> usize {
        self.state
            .lock()
            .get(device)
            .and_then(|d| d.get(channel))
            .map(|c| c.reads)
            .unwrap_or(0)
    }
}

impl AdcContext for SimAdc {
    fn find_device(&self, name: &str) -> Result<Box<dyn AdcDevice>> {
        if !self.state.lock().contains_key(name) {
            return Err(PanelError::AdcDeviceNotFound(name.to_string()));
        }
        Ok(Box::new(SimAdcDevice { name: name.to_string(), adc: self.clone() }))
    }
}

struct SimAdcDevice {
    name: String,
    adc: SimAdc,
}

impl AdcDevice for SimAdcDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_channel(&self, id: &str) -> Result<Box<dyn AdcChannel>> {
        let known = self
            .adc
            .state
            .lock()
            .get(&self.name)
            .map(|d| d.contains_key(id))
            .unwrap_or(false);
        if !known {
            return Err(PanelError::ChannelNotFound {
                device: self.name.clone(),
                channel: id.to_string(),
            });
        }
        Ok(Box::new(SimAdcChannel {
            device: self.name.clone(),
            id: id.to_string(),
            adc: self.adc.clone(),
        }))
    }
}

struct SimAdcChannel {
    device: String,
    id: String,
    adc: SimAdc,
}

impl AdcChannel for SimAdcChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_raw(&self) -> Result<i64> {
        let mut state = self.adc.state.lock();
        let ch = state
            .get_mut(&self.device)
            .and_then(|d| d.get_mut(&self.id))
            .ok_or_else(|| PanelError::AdcRead {
                channel: self.id.clone(),
                reason: "channel vanished".to_string(),
            })?;
        ch.reads += 1;
        if ch.fail_read {
            return Err(PanelError::AdcRead {
                channel: self.id.clone(),
                reason: "Input/output error".to_string(),
            });
        }
        Ok(ch.raw)
    }
}
