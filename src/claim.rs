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

//! Claim coordination
//!
//! The coordinator turns bound descriptors into [`LineHandle`]s. Claiming is
//! lazy (the UI calls [`ClaimCoordinator::claim_all`] once a screen that needs
//! hardware is shown, so untouched lines stay available to the rest of the
//! system) and happens at most once per group: a group moves
//! `Unclaimed -> Claiming -> Claimed` and repeated calls are no-ops.
//!
//! # Invariants
//! - At most one handle per (chip path, line offset). A second descriptor for
//!   a line that is already held fails with [`PanelError::LineBusy`].
//! - Each chip is opened once and shared by all of its lines.
//! - A failing line never aborts the group; it is recorded as
//!   [`LineStatus::Failed`] and stays inert. There is no automatic retry.
//! - A group with nothing to claim stays `Unclaimed`, and a pass that unwinds
//!   mid-way is rolled back to `Unclaimed`, so `Claimed` is never reported for
//!   work that did not happen.
//!
//! All state sits behind one mutex held for the whole pass, which makes the
//! state transition single-writer even if claims are triggered from several
//! contexts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::display::ElementId;
use crate::error::{ErrorKind, PanelError, Result};
use crate::gpio::{ChipDevice, GpioBackend, LineKey};
use crate::line::{LineHandle, SharedLine};
use crate::logger;
use crate::registry::{ClaimCandidate, DescriptorId, GroupRole, LineRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    Unclaimed,
    Claiming,
    Claimed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineStatus {
    NotAttempted,
    Failed { kind: ErrorKind, reason: String },
    Claimed,
}

pub struct ClaimedLine {
    pub id: DescriptorId,
    pub role: GroupRole,
    pub element: Option<ElementId>,
    pub handle: SharedLine,
}

/// What a claim pass did. Empty when every group was already claimed.
#[derive(Default)]
pub struct ClaimReport {
    pub claimed: Vec<ClaimedLine>,
    pub failed: Vec<(DescriptorId, PanelError)>,
    /// Groups that reached `Claimed` during this pass
    pub groups: Vec<usize>,
}

impl ClaimReport {
    pub fn is_noop(&self) -> bool {
        self.groups.is_empty()
    }
}

// Field order matters: line handles drop before the chips they came from
#[derive(Default)]
struct Inner {
    handles: BTreeMap<LineKey, SharedLine>,
    chips: HashMap<String, Arc<dyn ChipDevice>>,
    states: HashMap<usize, ClaimState>,
    statuses: HashMap<DescriptorId, LineStatus>,
}

impl Inner {
    fn state(&self, group: usize) -> ClaimState {
        self.states.get(&group).copied().unwrap_or(ClaimState::Unclaimed)
    }
}

/// Resets a group to `Unclaimed` and releases what it grabbed unless the
/// pass completes
struct Rollback<'a> {
    inner: &'a mut Inner,
    group: usize,
    taken: Vec<(DescriptorId, LineKey)>,
    committed: bool,
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for (id, key) in self.taken.drain(..) {
            self.inner.handles.remove(&key);
            self.inner.statuses.remove(&id);
        }
        self.inner.states.insert(self.group, ClaimState::Unclaimed);
        warn!(group = self.group, "claim pass aborted, group rolled back to unclaimed");
    }
}

pub struct ClaimCoordinator {
    consumer: String,
    inner: Mutex<Inner>,
}

impl ClaimCoordinator {
    pub fn new(consumer: impl Into<String>) -> Self {
        Self { consumer: consumer.into(), inner: Mutex::new(Inner::default()) }
    }

    /// Claim every group that is still unclaimed
    pub fn claim_all(&self, registry: &LineRegistry, backend: &dyn GpioBackend) -> ClaimReport {
        let mut inner = self.inner.lock();
        let mut report = ClaimReport::default();
        for group in 0..registry.groups().len() {
            self.claim_group_locked(&mut inner, registry, backend, group, &mut report);
        }
        report
    }

    pub fn claim_group(
        &self,
        registry: &LineRegistry,
        backend: &dyn GpioBackend,
        group: usize,
    ) -> ClaimReport {
        let mut inner = self.inner.lock();
        let mut report = ClaimReport::default();
        self.claim_group_locked(&mut inner, registry, backend, group, &mut report);
        report
    }

    fn claim_group_locked(
        &self,
        inner: &mut Inner,
        registry: &LineRegistry,
        backend: &dyn GpioBackend,
        group: usize,
        report: &mut ClaimReport,
    ) {
        let Some(g) = registry.groups().get(group) else { return };
        match inner.state(group) {
            ClaimState::Claimed => return,
            ClaimState::Claiming => {
                warn!(group = %g.name, "claim already in progress");
                return;
            }
            ClaimState::Unclaimed => {}
        }

        let candidates = registry.claimable(group);
        if candidates.is_empty() {
            debug!(group = %g.name, "no bound lines, leaving group unclaimed");
            return;
        }

        inner.states.insert(group, ClaimState::Claiming);
        let mut pass = Rollback { inner, group, taken: Vec::new(), committed: false };
        let mut failed_opens: HashMap<String, String> = HashMap::new();
        let mut claimed = 0usize;
        let mut failed = 0usize;

        for candidate in candidates {
            let id = candidate.id;
            let key = candidate.descriptor.key();
            match self.claim_line(pass.inner, backend, &candidate, &mut failed_opens) {
                Ok(handle) => {
                    info!(line = %key, label = %candidate.descriptor.label, direction = %candidate.descriptor.direction, "line claimed");
                    logger::log_event("line_claimed", json!({
                        "consumer": self.consumer,
                        "group": g.name,
                        "line": key.to_string(),
                        "label": candidate.descriptor.label,
                        "direction": candidate.descriptor.direction,
                    }));
                    pass.inner.handles.insert(key.clone(), Arc::clone(&handle));
                    pass.inner.statuses.insert(id, LineStatus::Claimed);
                    pass.taken.push((id, key));
                    report.claimed.push(ClaimedLine {
                        id,
                        role: g.role,
                        element: candidate.element,
                        handle,
                    });
                    claimed += 1;
                }
                Err(e) => {
                    warn!(line = %key, label = %candidate.descriptor.label, error = %e, "line left unclaimed");
                    logger::log_event("line_claim_failed", json!({
                        "consumer": self.consumer,
                        "group": g.name,
                        "line": key.to_string(),
                        "kind": e.kind(),
                        "error": e.to_string(),
                    }));
                    pass.inner.statuses.insert(
                        id,
                        LineStatus::Failed { kind: e.kind(), reason: e.to_string() },
                    );
                    report.failed.push((id, e));
                    failed += 1;
                }
            }
        }

        pass.inner.states.insert(group, ClaimState::Claimed);
        pass.committed = true;
        report.groups.push(group);
        info!(group = %g.name, claimed, failed, "group claimed");
    }

    fn claim_line(
        &self,
        inner: &mut Inner,
        backend: &dyn GpioBackend,
        candidate: &ClaimCandidate<'_>,
        failed_opens: &mut HashMap<String, String>,
    ) -> Result<SharedLine> {
        let d = candidate.descriptor;
        let key = d.key();
        if inner.handles.contains_key(&key) {
            return Err(PanelError::LineBusy { path: key.chip, offset: key.offset });
        }

        let chip = match inner.chips.get(&d.chip_path) {
            Some(chip) => Arc::clone(chip),
            None => {
                if let Some(reason) = failed_opens.get(&d.chip_path) {
                    return Err(PanelError::DeviceOpen { path: d.chip_path.clone(), reason: reason.clone() });
                }
                match backend.open_chip(&d.chip_path) {
                    Ok(chip) => {
                        inner.chips.insert(d.chip_path.clone(), Arc::clone(&chip));
                        chip
                    }
                    Err(e) => {
                        let reason = match &e {
                            PanelError::DeviceOpen { reason, .. } => reason.clone(),
                            other => other.to_string(),
                        };
                        failed_opens.insert(d.chip_path.clone(), reason);
                        return Err(e);
                    }
                }
            }
        };

        let line = chip.request_line(d.line, d.direction, d.default_value, &self.consumer)?;
        Ok(LineHandle::new(key, d.label.clone(), d.direction, d.default_value, line, chip).into_shared())
    }

    pub fn state(&self, group: usize) -> ClaimState {
        self.inner.lock().state(group)
    }

    pub fn status(&self, id: DescriptorId) -> LineStatus {
        self.inner
            .lock()
            .statuses
            .get(&id)
            .cloned()
            .unwrap_or(LineStatus::NotAttempted)
    }

    pub fn handle(&self, key: &LineKey) -> Option<SharedLine> {
        self.inner.lock().handles.get(key).cloned()
    }

    pub fn claimed_lines(&self) -> Vec<LineKey> {
        self.inner.lock().handles.keys().cloned().collect()
    }

    pub fn open_chips(&self) -> usize {
        self.inner.lock().chips.len()
    }

    /// Release every line, then close every chip, and forget all claim
    /// state. Callers must stop anything still using the handles first.
    pub fn release_all(&self) {
        let mut inner = self.inner.lock();
        let lines = inner.handles.len();
        inner.handles.clear();
        let chips = inner.chips.len();
        inner.chips.clear();
        inner.states.clear();
        inner.statuses.clear();
        if lines > 0 || chips > 0 {
            info!(lines, chips, "released GPIO lines");
            logger::log_event("lines_released", json!({ "lines": lines, "chips": chips }));
        }
    }
}
