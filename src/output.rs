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


//! Output Sync
//!
//! Routes UI toggle events to the output line bound to the toggled element.
//! Each binding is a [`ToggleHandler`] that captures the claimed line itself,
//! so dispatch needs no lookup through the claim table.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::display::ElementId;
use crate::error::Result;
use crate::gpio::LineKey;
use crate::line::SharedLine;

/// Write `state` to a claimed output line. Failures are logged and returned.
pub fn on_toggle(handle: &SharedLine, state: bool) -> Result<()> {
    let mut line = handle.lock();
    match line.set_value(state) {
        Ok(()) => {
            debug!(line = %line.key(), label = %line.label(), state, "output written");
            Ok(())
        }
        Err(e) => {
            warn!(line = %line.key(), label = %line.label(), state, error = %e, "output write failed");
            Err(e)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToggleHandler {
    key: LineKey,
    handle: SharedLine,
}

impl ToggleHandler {
    pub fn new(handle: SharedLine) -> Self {
        let key = handle.lock().key().clone();
        Self { key, handle }
    }

    pub fn key(&self) -> &LineKey {
        &self.key
    }

    pub fn call(&self, state: bool) -> Result<()> {
        on_toggle(&self.handle, state)
    }
}

#[derive(Debug, Default)]
pub struct OutputSync {
    handlers: HashMap<ElementId, ToggleHandler>,
}

impl OutputSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handler for `element`, replacing any previous one
    pub fn bind(&mut self, element: ElementId, handle: SharedLine) {
        let handler = ToggleHandler::new(handle);
        debug!(element = %element, line = %handler.key(), "output bound");
        self.handlers.insert(element, handler);
    }

    pub fn handler(&self, element: ElementId) -> Option<&ToggleHandler> {
        self.handlers.get(&element)
    }

    /// Dispatch a toggle. `None` means nothing is bound to `element`.
    pub fn toggle(&self, element: ElementId, state: bool) -> Option<Result<()>> {
        self.handlers.get(&element).map(|h| h.call(state))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::{ErrorKind, PanelError};
    use crate::gpio::sim::SimGpio;
    use crate::gpio::{ChipDevice, Direction, GpioBackend, MockLineDevice};
    use crate::line::LineHandle;

    const CHIP: &str = "/dev/gpiochip4";

    fn claimed(sim: &SimGpio, offset: u32, direction: Direction) -> SharedLine {
        let chip = sim.open_chip(CHIP).unwrap();
        let line = chip.request_line(offset, direction, false, "test").unwrap();
        LineHandle::new(LineKey::new(CHIP, offset), "Relay", direction, false, line, chip).into_shared()
    }

    #[test]
    fn test_toggle_round_trip() {
        let sim = SimGpio::new().with_chip(CHIP, 8);
        let handle = claimed(&sim, 4, Direction::Output);

        on_toggle(&handle, true).unwrap();
        assert_eq!(sim.level(CHIP, 4), Some(true));
        assert!(handle.lock().get_value().unwrap());

        on_toggle(&handle, false).unwrap();
        assert_eq!(sim.level(CHIP, 4), Some(false));
    }

    #[test]
    fn test_toggle_input_reports_direction_mismatch() {
        let sim = SimGpio::new().with_chip(CHIP, 8);
        sim.set_level(CHIP, 2, true);
        let handle = claimed(&sim, 2, Direction::Input);
        let err = on_toggle(&handle, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectionMismatch);
        assert_eq!(sim.level(CHIP, 2), Some(true));
    }

    #[test]
    fn test_write_failure_is_returned() {
        let sim = SimGpio::new().with_chip(CHIP, 8);
        let chip: Arc<dyn ChipDevice> = sim.open_chip(CHIP).unwrap();
        let mut line = MockLineDevice::new();
        line.expect_set_value().times(1).returning(|_| {
            Err(PanelError::LineWrite {
                path: CHIP.to_string(),
                offset: 5,
                reason: "Input/output error".to_string(),
            })
        });
        let handle = LineHandle::new(LineKey::new(CHIP, 5), "Relay 2", Direction::Output, false, Box::new(line), chip)
            .into_shared();

        let mut sync = OutputSync::new();
        sync.bind(ElementId(3), handle);
        let result = sync.toggle(ElementId(3), true).unwrap();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::WriteFailure);
    }

    #[test]
    fn test_unbound_element_is_inert() {
        let sync = OutputSync::new();
        assert!(sync.toggle(ElementId(1), true).is_none());
    }

    #[test]
    fn test_bind_replaces_and_clear_drops_handlers() {
        let sim = SimGpio::new().with_chip(CHIP, 8);
        let mut sync = OutputSync::new();
        sync.bind(ElementId(1), claimed(&sim, 4, Direction::Output));
        sync.bind(ElementId(1), claimed(&sim, 5, Direction::Output));
        assert_eq!(sync.len(), 1);
        assert_eq!(sync.handler(ElementId(1)).unwrap().key(), &LineKey::new(CHIP, 5));

        sync.toggle(ElementId(1), true).unwrap().unwrap();
        assert_eq!(sim.level(CHIP, 5), Some(true));
        assert_eq!(sim.level(CHIP, 4), Some(false));

        sync.clear();
        assert!(sync.is_empty());
        assert_eq!(sim.live_lines(), 0);
    }
}
