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


//! Linux IIO analog inputs through sysfs
//!
//! Devices live under `/sys/bus/iio/devices/iio:deviceN` and are matched by
//! their `name` attribute (or the directory name). A channel `voltageN`
//! exposes its `raw` attribute as `in_voltageN_raw`.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{AdcChannel, AdcContext, AdcDevice};
use crate::error::{PanelError, Result};

const IIO_ROOT: &str = "/sys/bus/iio/devices";

fn read_trimmed<P: AsRef<Path>>(p: P) -> io::Result<String> {
    let mut s = String::new();
    fs::File::open(p)?.read_to_string(&mut s)?;
    Ok(s.trim().to_string())
}

#[derive(Debug, Clone)]
pub struct IioContext {
    root: PathBuf,
}

impl IioContext {
    pub fn open_default() -> Result<Self> {
        Self::with_root(IIO_ROOT)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(PanelError::AdcContext {
                path: root.display().to_string(),
                reason: "No such file or directory".to_string(),
            });
        }
        Ok(Self { root })
    }

    /// `(name, directory)` of every IIO device, sorted by directory
    pub fn devices(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut out = Vec::new();
        for ent in fs::read_dir(&self.root)?.flatten() {
            let dir = ent.path();
            let Some(tag) = dir.file_name().and_then(|s| s.to_str()).map(str::to_string) else { continue };
            if !tag.starts_with("iio:device") {
                continue;
            }
            let name = read_trimmed(dir.join("name")).unwrap_or(tag);
            out.push((name, dir));
        }
        out.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(out)
    }
}

impl AdcContext for IioContext {
    fn find_device(&self, name: &str) -> Result<Box<dyn AdcDevice>> {
        for (dev_name, dir) in self.devices()? {
            let tag = dir.file_name().and_then(|s| s.to_str()).unwrap_or_default();
            if dev_name == name || tag == name {
                debug!(device = name, dir = %dir.display(), "IIO device found");
                return Ok(Box::new(IioDevice { name: dev_name, dir }));
            }
        }
        Err(PanelError::AdcDeviceNotFound(name.to_string()))
    }
}

#[derive(Debug)]
pub struct IioDevice {
    name: String,
    dir: PathBuf,
}

impl AdcDevice for IioDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_channel(&self, id: &str) -> Result<Box<dyn AdcChannel>> {
        let path = self.dir.join(format!("in_{}_raw", id));
        if !path.is_file() {
            return Err(PanelError::ChannelNotFound {
                device: self.name.clone(),
                channel: id.to_string(),
            });
        }
        Ok(Box::new(IioChannel { id: id.to_string(), path }))
    }
}

#[derive(Debug)]
pub struct IioChannel {
    id: String,
    path: PathBuf,
}

impl AdcChannel for IioChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_raw(&self) -> Result<i64> {
        let raw = read_trimmed(&self.path).map_err(|e| PanelError::AdcRead {
            channel: self.id.clone(),
            reason: e.to_string(),
        })?;
        raw.parse::<i64>().map_err(|e| PanelError::AdcRead {
            channel: self.id.clone(),
            reason: format!("invalid raw value {:?}: {}", raw, e),
        })
    }
}
