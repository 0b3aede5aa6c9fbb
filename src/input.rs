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


//! Input Poller
//!
//! Reads polled input lines and reflects them on their display elements.
//! Polling is level-based: every successful read is delivered to the sink,
//! whether or not the value changed since the previous tick. A failed read
//! skips the line for that tick and leaves the display as it was.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::display::{DisplaySink, ElementId};
use crate::gpio::LineKey;
use crate::line::SharedLine;

/// Consecutive read failures between repeated warnings
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

struct PolledInput {
    element: ElementId,
    handle: SharedLine,
    failures: u32,
}

#[derive(Default)]
pub struct InputPoller {
    inputs: BTreeMap<LineKey, PolledInput>,
}

impl InputPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start reflecting `handle` on `element`; returns the line it polls
    pub fn add(&mut self, element: ElementId, handle: SharedLine) -> LineKey {
        let key = handle.lock().key().clone();
        debug!(line = %key, element = %element, "input registered for polling");
        self.inputs.insert(key.clone(), PolledInput { element, handle, failures: 0 });
        key
    }

    /// Read one input and notify its element. Returns the value read, or
    /// `None` if the line is unknown or the read failed.
    pub fn poll<S: DisplaySink + ?Sized>(&mut self, key: &LineKey, sink: &mut S) -> Option<bool> {
        let input = self.inputs.get_mut(key)?;
        let result = input.handle.lock().get_value();
        match result {
            Ok(on) => {
                if input.failures > 0 {
                    info!(line = %key, failures = input.failures, "input read recovered");
                    input.failures = 0;
                }
                sink.on_input_changed(input.element, on);
                Some(on)
            }
            Err(e) => {
                input.failures += 1;
                if input.failures == 1 {
                    debug!(line = %key, error = %e, "input read failed, skipping this tick");
                }
                if input.failures % MAX_CONSECUTIVE_ERRORS == 0 {
                    warn!(line = %key, failures = input.failures, error = %e, "input keeps failing to read");
                }
                None
            }
        }
    }

    pub fn poll_all<S: DisplaySink + ?Sized>(&mut self, sink: &mut S) {
        let keys: Vec<LineKey> = self.inputs.keys().cloned().collect();
        for key in &keys {
            self.poll(key, sink);
        }
    }

    /// Current run of failed reads for `key`
    pub fn failures(&self, key: &LineKey) -> u32 {
        self.inputs.get(key).map(|i| i.failures).unwrap_or(0)
    }

    pub fn element_for(&self, key: &LineKey) -> Option<ElementId> {
        self.inputs.get(key).map(|i| i.element)
    }

    pub fn keys(&self) -> impl Iterator<Item = &LineKey> {
        self.inputs.keys()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
    }
}
