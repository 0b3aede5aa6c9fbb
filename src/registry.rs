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

//! Catalog of line descriptors
//!
//! Descriptors are static: they are built once (usually from [`PanelConfig`])
//! and never change. The only mutable part of the registry is the table of
//! display bindings the UI records before claiming. Nothing here touches
//! hardware.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::PanelConfig;
use crate::display::ElementId;
use crate::error::{PanelError, Result};
use crate::gpio::{Direction, LineKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    /// UI-driven outputs (relays, switches)
    Output,
    /// Polled inputs reflected on status indicators
    Input,
    /// Hardware configuration outputs held at their default value
    ModeSelect,
}

impl GroupRole {
    pub fn direction(self) -> Direction {
        match self {
            GroupRole::Input => Direction::Input,
            GroupRole::Output | GroupRole::ModeSelect => Direction::Output,
        }
    }

    /// Mode-select lines are claimed whether or not anything displays them
    pub fn requires_display(self) -> bool {
        !matches!(self, GroupRole::ModeSelect)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDescriptor {
    pub chip_path: String,
    pub line: u32,
    pub label: String,
    pub direction: Direction,
    pub default_value: bool,
}

impl LineDescriptor {
    pub fn output(chip_path: &str, line: u32, label: &str, default_value: bool) -> Self {
        Self {
            chip_path: chip_path.to_string(),
            line,
            label: label.to_string(),
            direction: Direction::Output,
            default_value,
        }
    }

    pub fn input(chip_path: &str, line: u32, label: &str) -> Self {
        Self {
            chip_path: chip_path.to_string(),
            line,
            label: label.to_string(),
            direction: Direction::Input,
            default_value: false,
        }
    }

    pub fn key(&self) -> LineKey {
        LineKey::new(self.chip_path.clone(), self.line)
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub role: GroupRole,
    pub descriptors: Vec<LineDescriptor>,
}

/// Position of a descriptor in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DescriptorId {
    pub group: usize,
    pub index: usize,
}

/// A descriptor the coordinator should claim, with its display binding
#[derive(Debug, Clone, Copy)]
pub struct ClaimCandidate<'a> {
    pub id: DescriptorId,
    pub descriptor: &'a LineDescriptor,
    pub element: Option<ElementId>,
}

#[derive(Debug, Default)]
pub struct LineRegistry {
    groups: Vec<Group>,
    bindings: HashMap<DescriptorId, ElementId>,
}

impl LineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &PanelConfig) -> Self {
        let mut registry = Self::new();
        for group in &cfg.groups {
            let direction = group.role.direction();
            let descriptors = group
                .lines
                .iter()
                .map(|l| LineDescriptor {
                    chip_path: l.chip.clone(),
                    line: l.line,
                    label: l.label.clone(),
                    direction,
                    default_value: l.default_value,
                })
                .collect();
            registry.add_group(&group.name, group.role, descriptors);
        }
        registry
    }

    /// Append a group; returns its index
    pub fn add_group(&mut self, name: &str, role: GroupRole, descriptors: Vec<LineDescriptor>) -> usize {
        self.groups.push(Group { name: name.to_string(), role, descriptors });
        self.groups.len() - 1
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.name == name)
    }

    /// Descriptors of a group in claim order
    pub fn resolve(&self, name: &str) -> Option<&[LineDescriptor]> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.descriptors.as_slice())
    }

    pub fn descriptor(&self, id: DescriptorId) -> Option<&LineDescriptor> {
        self.groups.get(id.group)?.descriptors.get(id.index)
    }

    pub fn role_of(&self, id: DescriptorId) -> Option<GroupRole> {
        self.descriptor(id)?;
        self.groups.get(id.group).map(|g| g.role)
    }

    /// First descriptor carrying `label`
    pub fn find(&self, label: &str) -> Option<DescriptorId> {
        self.ids().find(|&id| self.descriptor(id).map(|d| d.label == label).unwrap_or(false))
    }

    pub fn ids(&self) -> impl Iterator<Item = DescriptorId> + '_ {
        self.groups.iter().enumerate().flat_map(|(group, g)| {
            (0..g.descriptors.len()).map(move |index| DescriptorId { group, index })
        })
    }

    /// Record the UI element paired with a descriptor. Rebinding replaces.
    pub fn bind_display(&mut self, id: DescriptorId, element: ElementId) -> Result<()> {
        if self.descriptor(id).is_none() {
            return Err(PanelError::UnknownDescriptor(format!(
                "group {} index {}",
                id.group, id.index
            )));
        }
        self.bindings.insert(id, element);
        Ok(())
    }

    pub fn display_for(&self, id: DescriptorId) -> Option<ElementId> {
        self.bindings.get(&id).copied()
    }

    /// Descriptors of `group` eligible for claiming: bound ones, or all of
    /// them for roles that need no display
    pub fn claimable(&self, group: usize) -> Vec<ClaimCandidate<'_>> {
        let Some(g) = self.groups.get(group) else { return Vec::new() };
        g.descriptors
            .iter()
            .enumerate()
            .filter_map(|(index, descriptor)| {
                let id = DescriptorId { group, index };
                let element = self.display_for(id);
                if element.is_none() && g.role.requires_display() {
                    return None;
                }
                Some(ClaimCandidate { id, descriptor, element })
            })
            .collect()
    }
}
