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

//! Boundary to the UI layer
//!
//! The engine never touches widgets. The UI hands it opaque [`ElementId`]s
//! when it registers bindings and receives notifications through a
//! [`DisplaySink`]. All notifications are delivered from the thread that
//! calls [`crate::panel::Panel::tick`] / `toggle`.

use std::fmt;

use serde::Serialize;

use crate::error::PanelError;

/// Opaque reference to a display element owned by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementId(pub u32);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub trait DisplaySink {
    /// A polled input was read. Delivered on every poll, not only on change;
    /// the element shows strictly on or off.
    fn on_input_changed(&mut self, element: ElementId, on: bool);

    /// The smoothed value shown for an analog channel moved
    fn on_sample_updated(&mut self, element: ElementId, value: i64);

    /// Writing the output bound to `element` failed
    fn on_output_error(&mut self, element: ElementId, error: &PanelError) {
        let _ = (element, error);
    }
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn on_input_changed(&mut self, element: ElementId, on: bool) {
        (**self).on_input_changed(element, on)
    }

    fn on_sample_updated(&mut self, element: ElementId, value: i64) {
        (**self).on_sample_updated(element, value)
    }

    fn on_output_error(&mut self, element: ElementId, error: &PanelError) {
        (**self).on_output_error(element, error)
    }
}
