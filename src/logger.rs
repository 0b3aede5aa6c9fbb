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

//! Optional JSON-lines event journal
//!
//! Diagnostics go through `tracing`; this journal only records discrete
//! operational events (claims, failures, service lifecycle) for later
//! inspection on the device. Until [`init_logging`] runs, [`log_event`]
//! does nothing.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use serde_json::{json, Value};

const DEFAULT_LOG_PATH: &str = "/var/log/panelio/events.json";
const FALLBACK_LOG_PATH: &str = "/tmp/panelio_events.json";

lazy_static! {
    static ref LOG_FILE: Mutex<Option<File>> = Mutex::new(None);
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Open the journal at its default location, falling back to /tmp.
/// Returns the path in use, if any.
pub fn init_logging() -> Option<PathBuf> {
    for candidate in [DEFAULT_LOG_PATH, FALLBACK_LOG_PATH] {
        let path = Path::new(candidate);
        if init_logging_at(path).is_ok() {
            return Some(path.to_path_buf());
        }
    }
    None
}

pub fn init_logging_at(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let f = OpenOptions::new().create(true).append(true).open(path)?;
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(f);
    }
    Ok(())
}

/// Close the journal; later events are dropped
pub fn shutdown_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = None;
    }
}

pub fn is_enabled() -> bool {
    LOG_FILE.lock().map(|g| g.is_some()).unwrap_or(false)
}

pub fn log_event(event: &str, data: Value) {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(f) = guard.as_mut() {
            let line = json!({
                "ts_ms": now_millis(),
                "event": event,
                "data": data,
            });
            let _ = writeln!(f, "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_events_are_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("events.json");
        init_logging_at(&path).unwrap();
        assert!(is_enabled());

        log_event("journal_test_claim", json!({ "line": "/dev/gpiochip4:4" }));
        log_event("journal_test_stop", json!({}));
        shutdown_logging();

        // Other tests may log concurrently; only look at our own events
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap())
            .filter(|v| v["event"].as_str().map(|e| e.starts_with("journal_test_")).unwrap_or(false))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "journal_test_claim");
        assert_eq!(lines[0]["data"]["line"], "/dev/gpiochip4:4");
        assert!(lines[1]["ts_ms"].as_u64().is_some());
    }

    #[test]
    #[serial]
    fn test_disabled_journal_drops_events() {
        shutdown_logging();
        assert!(!is_enabled());
        log_event("ignored", json!({}));
    }
}
