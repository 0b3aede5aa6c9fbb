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


//! Shared fixtures for unit tests

use crate::analog::sim::SimAdc;
use crate::display::{DisplaySink, ElementId};
use crate::error::{ErrorKind, PanelError};
use crate::gpio::sim::SimGpio;
use crate::gpio::{Direction, GpioBackend, LineKey};
use crate::line::{LineHandle, SharedLine};

pub const ADC_DEVICE: &str = "2198000.adc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Input(ElementId, bool),
    Sample(ElementId, i64),
    OutputError(ElementId, ErrorKind),
}

/// Display sink that records every notification in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<Notification>,
}

impl RecordingSink {
    pub fn inputs(&self, element: ElementId) -> Vec<bool> {
        self.events
            .iter()
            .filter_map(|n| match n {
                Notification::Input(e, on) if *e == element => Some(*on),
                _ => None,
            })
            .collect()
    }

    pub fn samples(&self, element: ElementId) -> Vec<i64> {
        self.events
            .iter()
            .filter_map(|n| match n {
                Notification::Sample(e, v) if *e == element => Some(*v),
                _ => None,
            })
            .collect()
    }
}

impl DisplaySink for RecordingSink {
    fn on_input_changed(&mut self, element: ElementId, on: bool) {
        self.events.push(Notification::Input(element, on));
    }

    fn on_sample_updated(&mut self, element: ElementId, value: i64) {
        self.events.push(Notification::Sample(element, value));
    }

    fn on_output_error(&mut self, element: ElementId, error: &PanelError) {
        self.events.push(Notification::OutputError(element, error.kind()));
    }
}

/// Simulated board carrying every chip of the stock catalog
pub fn sim_board() -> SimGpio {
    SimGpio::new()
        .with_chip("/dev/gpiochip4", 32)
        .with_chip("/dev/gpiochip5", 32)
        .with_chip("/dev/gpiochip6", 32)
}

/// Simulated ADC with the stock analog channels
pub fn sim_adc() -> SimAdc {
    SimAdc::new().with_device(ADC_DEVICE, &["voltage0", "voltage5", "voltage8", "voltage9"])
}

/// Request a line straight from the simulator, bypassing the coordinator
pub fn claimed_line(sim: &SimGpio, chip: &str, offset: u32, direction: Direction) -> SharedLine {
    let chip_dev = sim.open_chip(chip).expect("sim chip");
    let line = chip_dev
        .request_line(offset, direction, false, "test")
        .expect("sim line");
    LineHandle::new(LineKey::new(chip, offset), format!("{}:{}", chip, offset), direction, false, line, chip_dev)
        .into_shared()
}
