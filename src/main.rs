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


//! Headless panel service
//!
//! Binds every configured line and analog channel to a synthetic display
//! element, claims the hardware and runs the dispatcher until SIGINT or
//! SIGTERM. Display updates are written to the log.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use panelio::analog::iio::IioContext;
use panelio::analog::sim::SimAdc;
use panelio::analog::AdcContext;
use panelio::config::{config_path, load_or_default, validate_config, PanelConfig};
use panelio::gpio::cdev::CdevBackend;
use panelio::gpio::sim::SimGpio;
use panelio::gpio::GpioBackend;
use panelio::registry::GroupRole;
use panelio::{logger, DisplaySink, ElementId, Panel, PanelError};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lines per simulated chip
const SIM_CHIP_LINES: u32 = 64;

struct Options {
    config: Option<PathBuf>,
    simulate: bool,
    logging: bool,
    check: bool,
}

fn print_usage() {
    println!("panelio {}", VERSION);
    println!("Usage: panelio [--config PATH] [--simulate] [--logging] [check]");
    println!();
    println!("  --config PATH  Panel description (default: $PANELIO_CONFIG, then");
    println!("                 $XDG_CONFIG_HOME/panelio/panel.json, then /etc/panelio/panel.json)");
    println!("  --simulate     Use in-memory GPIO and ADC instead of hardware");
    println!("  --logging      Append JSON events to /var/log/panelio/events.json");
    println!("  check          Validate and print the effective configuration");
    println!();
    println!("Runs until SIGINT or SIGTERM, then releases every line before exiting.");
}

fn parse_args() -> Result<Option<Options>> {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = Options { config: None, simulate: false, logging: false, check: false };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let Some(path) = args.get(i) else { bail!("--config needs a path") };
                opts.config = Some(PathBuf::from(path));
            }
            "--simulate" => opts.simulate = true,
            "--logging" => opts.logging = true,
            "check" => opts.check = true,
            "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            "--version" | "-V" => {
                println!("panelio {}", VERSION);
                return Ok(None);
            }
            other => bail!("unknown argument: {}", other),
        }
        i += 1;
    }
    Ok(Some(opts))
}

/// Display sink for the headless service: logs what a screen would show
struct LogSink {
    names: HashMap<ElementId, String>,
    inputs: HashMap<ElementId, bool>,
}

impl LogSink {
    fn name(&self, element: ElementId) -> &str {
        self.names.get(&element).map(String::as_str).unwrap_or("?")
    }
}

impl DisplaySink for LogSink {
    fn on_input_changed(&mut self, element: ElementId, on: bool) {
        // Polls repeat the level every tick; only report edges
        if self.inputs.insert(element, on) != Some(on) {
            info!(element = %element, name = self.name(element), on, "input");
        }
    }

    fn on_sample_updated(&mut self, element: ElementId, value: i64) {
        debug!(element = %element, name = self.name(element), value, "analog");
    }

    fn on_output_error(&mut self, element: ElementId, error: &PanelError) {
        warn!(element = %element, name = self.name(element), error = %error, "output write failed");
    }
}

fn simulated_backends(cfg: &PanelConfig) -> (Arc<dyn GpioBackend>, Box<dyn AdcContext>) {
    let chips: BTreeSet<&str> = cfg
        .groups
        .iter()
        .flat_map(|g| g.lines.iter().map(|l| l.chip.as_str()))
        .collect();
    let gpio = SimGpio::new();
    for chip in chips {
        gpio.add_chip(chip, SIM_CHIP_LINES);
    }
    let mut adc = SimAdc::new();
    if let Some(analog) = &cfg.analog {
        let names: Vec<&str> = analog.channels.iter().map(|c| c.name.as_str()).collect();
        adc = adc.with_device(&analog.device, &names);
    }
    (Arc::new(gpio), Box::new(adc))
}

fn hardware_backends(cfg: &PanelConfig) -> Result<(Arc<dyn GpioBackend>, Box<dyn AdcContext>)> {
    let adc: Box<dyn AdcContext> = if cfg.analog.is_some() {
        Box::new(IioContext::open_default().context("Failed to open the IIO context")?)
    } else {
        // Never queried without an analog section
        Box::new(SimAdc::new())
    };
    Ok((Arc::new(CdevBackend::new()), adc))
}

/// Register every configured line and channel against its own element
fn register_all(panel: &mut Panel<LogSink>) -> HashMap<ElementId, String> {
    let mut names = HashMap::new();
    let mut next = 0u32;
    let ids: Vec<_> = panel.registry().ids().collect();
    for id in ids {
        let (Some(role), Some(d)) = (panel.registry().role_of(id), panel.registry().descriptor(id)) else { continue };
        let label = d.label.clone();
        let element = ElementId(next);
        let result = match role {
            GroupRole::Output => panel.register_output(id, element),
            GroupRole::Input => panel.register_input(id, element),
            GroupRole::ModeSelect => continue,
        };
        match result {
            Ok(()) => {
                names.insert(element, label);
                next += 1;
            }
            Err(e) => warn!(label = %label, error = %e, "line not registered"),
        }
    }

    let channels: Vec<(String, String)> = panel
        .config()
        .analog
        .iter()
        .flat_map(|a| a.channels.iter().map(|c| (c.name.clone(), c.legend.clone())))
        .collect();
    for (channel, legend) in channels {
        let element = ElementId(next);
        match panel.register_analog(&channel, element) {
            Ok(_) => {
                let name = if legend.is_empty() { channel } else { legend };
                names.insert(element, name);
                next += 1;
            }
            Err(e) => warn!(channel = %channel, error = %e, "analog channel not registered"),
        }
    }
    names
}

fn run(opts: Options) -> Result<()> {
    let path = opts.config.clone().unwrap_or_else(config_path);
    let cfg = load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if opts.check {
        validate_config(&cfg)?;
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    if !opts.simulate && unsafe { libc::geteuid() } != 0 {
        warn!("not running as root, GPIO chips may not be accessible");
    }

    if opts.logging {
        match logger::init_logging() {
            Some(p) => info!(path = %p.display(), "event journal enabled"),
            None => warn!("could not open an event journal"),
        }
        logger::log_event("service_start", json!({
            "version": VERSION,
            "config": path.display().to_string(),
            "simulate": opts.simulate,
        }));
    }

    let (gpio, adc) = if opts.simulate {
        info!("using simulated GPIO and ADC");
        simulated_backends(&cfg)
    } else {
        hardware_backends(&cfg)?
    };

    let sink = LogSink { names: HashMap::new(), inputs: HashMap::new() };
    let mut panel = Panel::new(cfg, gpio, adc, sink).context("Invalid panel configuration")?;
    let names = register_all(&mut panel);
    panel.sink_mut().names = names;

    let report = panel.claim_all();
    for (id, e) in &report.failed {
        let label = panel.registry().descriptor(*id).map(|d| d.label.clone()).unwrap_or_default();
        error!(label = %label, kind = ?e.kind(), error = %e, "line unavailable");
    }
    info!(
        claimed = report.claimed.len(),
        failed = report.failed.len(),
        timers = panel.timers(),
        "panel running"
    );
    drop(report);

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    while running.load(Ordering::SeqCst) {
        panel.tick(Instant::now());
        thread::sleep(panel.idle_for(Instant::now()));
    }

    info!("shutdown requested");
    panel.shutdown();
    logger::log_event("service_stop", json!({}));
    logger::shutdown_logging();
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(opts) = parse_args()? else { return Ok(()) };
    run(opts)
}
