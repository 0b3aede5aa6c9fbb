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


//! Hardware-state synchronization engine
//!
//! [`Panel`] is what the UI layer talks to. During screen construction it
//! registers bindings between display elements and line descriptors or
//! analog channels; [`Panel::claim_all`] then acquires the bound hardware,
//! wires outputs to the Output Sync and schedules input polling and analog
//! sampling. A single dispatcher calls [`Panel::tick`] to run due timers and
//! advance smoothing, and forwards UI toggles through [`Panel::toggle`].
//!
//! Teardown runs in a fixed order: timers stop, bindings are dropped, lines
//! are released, chips are closed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, warn};

use crate::analog::{AdcContext, AnalogSampler};
use crate::claim::{ClaimCoordinator, ClaimReport, ClaimState, LineStatus};
use crate::config::{validate_config, PanelConfig};
use crate::display::{DisplaySink, ElementId};
use crate::error::{PanelError, Result};
use crate::gpio::{Direction, GpioBackend, LineKey};
use crate::input::InputPoller;
use crate::logger;
use crate::output::OutputSync;
use crate::registry::{DescriptorId, GroupRole, LineRegistry};
use crate::scheduler::Scheduler;

/// Dispatcher step while a smoothing transition is in flight
const ANIMATION_STEP: Duration = Duration::from_millis(5);

/// Longest idle sleep, so shutdown requests are noticed promptly
const MAX_IDLE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Task {
    PollInput(LineKey),
    SampleAnalog(usize),
}

pub struct Panel<S: DisplaySink> {
    config: PanelConfig,
    registry: LineRegistry,
    backend: Arc<dyn GpioBackend>,
    adc: Box<dyn AdcContext>,
    scheduler: Scheduler<Task>,
    outputs: OutputSync,
    inputs: InputPoller,
    sampler: Option<AnalogSampler>,
    sampled: HashSet<usize>,
    coordinator: ClaimCoordinator,
    sink: S,
}

impl<S: DisplaySink> Panel<S> {
    pub fn new(
        config: PanelConfig,
        backend: Arc<dyn GpioBackend>,
        adc: Box<dyn AdcContext>,
        sink: S,
    ) -> Result<Self> {
        validate_config(&config)?;
        let registry = LineRegistry::from_config(&config);
        let coordinator = ClaimCoordinator::new(config.consumer.clone());
        Ok(Self {
            config,
            registry,
            backend,
            adc,
            scheduler: Scheduler::new(),
            outputs: OutputSync::new(),
            inputs: InputPoller::new(),
            sampler: None,
            sampled: HashSet::new(),
            coordinator,
            sink,
        })
    }

    /// Descriptor carrying `label`
    pub fn descriptor_id(&self, label: &str) -> Result<DescriptorId> {
        self.registry
            .find(label)
            .ok_or_else(|| PanelError::UnknownDescriptor(label.to_string()))
    }

    fn check_registration(&self, id: DescriptorId, wanted: Direction) -> Result<()> {
        let d = self
            .registry
            .descriptor(id)
            .ok_or_else(|| PanelError::UnknownDescriptor(format!("group {} index {}", id.group, id.index)))?;
        if d.direction != wanted {
            return Err(PanelError::DirectionMismatch {
                path: d.chip_path.clone(),
                offset: d.line,
                direction: d.direction,
            });
        }
        // A claimed group is never claimed again, so a late binding would stay inert
        if self.coordinator.state(id.group) == ClaimState::Claimed {
            let group = self.registry.groups().get(id.group).map(|g| g.name.as_str()).unwrap_or("?");
            warn!(group, label = %d.label, "registration after the group was claimed");
            return Err(PanelError::Config(format!(
                "group '{}' is already claimed, cannot bind '{}'",
                group, d.label
            )));
        }
        Ok(())
    }

    /// Pair an output descriptor with the element whose toggles drive it
    pub fn register_output(&mut self, id: DescriptorId, element: ElementId) -> Result<()> {
        self.check_registration(id, Direction::Output)?;
        self.registry.bind_display(id, element)
    }

    /// Pair an input descriptor with the element that reflects it
    pub fn register_input(&mut self, id: DescriptorId, element: ElementId) -> Result<()> {
        self.check_registration(id, Direction::Input)?;
        self.registry.bind_display(id, element)
    }

    /// Bind an analog channel to `element`. The device and channel are
    /// looked up now so a bad name fails here. Returns the binding index.
    pub fn register_analog(&mut self, channel: &str, element: ElementId) -> Result<usize> {
        if self.sampler.is_none() {
            let cfg = self
                .config
                .analog
                .as_ref()
                .ok_or_else(|| PanelError::Config("no analog device configured".to_string()))?;
            self.sampler = Some(AnalogSampler::open(self.adc.as_ref(), cfg)?);
        }
        match self.sampler.as_mut() {
            Some(sampler) => sampler.bind(channel, element),
            None => Err(PanelError::Config("no analog device configured".to_string())),
        }
    }

    pub fn claim_all(&mut self) -> ClaimReport {
        self.claim_all_at(Instant::now())
    }

    /// Claim every bound line that is not claimed yet and start the timers
    /// of what was acquired. Timers first fire one period after `now`.
    pub fn claim_all_at(&mut self, now: Instant) -> ClaimReport {
        let report = self.coordinator.claim_all(&self.registry, self.backend.as_ref());

        for claimed in &report.claimed {
            let Some(element) = claimed.element else { continue };
            match claimed.role {
                GroupRole::Output | GroupRole::ModeSelect => {
                    self.outputs.bind(element, Arc::clone(&claimed.handle));
                }
                GroupRole::Input => {
                    let key = self.inputs.add(element, Arc::clone(&claimed.handle));
                    self.scheduler.add(self.config.poll_interval(), Task::PollInput(key), now);
                }
            }
        }

        if let (Some(sampler), Some(cfg)) = (self.sampler.as_ref(), self.config.analog.as_ref()) {
            for idx in 0..sampler.len() {
                if self.sampled.insert(idx) {
                    self.scheduler.add(cfg.sample_interval(), Task::SampleAnalog(idx), now);
                }
            }
        }

        if !report.is_noop() {
            info!(
                claimed = report.claimed.len(),
                failed = report.failed.len(),
                timers = self.scheduler.len(),
                "hardware claimed"
            );
        }
        report
    }

    /// Forward a UI toggle. Elements without a claimed output are inert.
    pub fn toggle(&mut self, element: ElementId, on: bool) -> Result<()> {
        match self.outputs.toggle(element, on) {
            None => {
                debug!(element = %element, "toggle on element without a claimed output ignored");
                Ok(())
            }
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => {
                self.sink.on_output_error(element, &e);
                Err(e)
            }
        }
    }

    /// Run the timers due at `now`, then advance smoothing
    pub fn tick(&mut self, now: Instant) {
        for task in self.scheduler.due(now) {
            match task {
                Task::PollInput(key) => {
                    self.inputs.poll(&key, &mut self.sink);
                }
                Task::SampleAnalog(idx) => {
                    if let Some(sampler) = self.sampler.as_mut() {
                        sampler.sample(idx, now);
                    }
                }
            }
        }
        if let Some(sampler) = self.sampler.as_mut() {
            sampler.step_all(now, &mut self.sink);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    pub fn is_animating(&self) -> bool {
        self.sampler.as_ref().map(|s| s.is_animating()).unwrap_or(false)
    }

    /// How long the dispatcher may sleep after a tick at `now`
    pub fn idle_for(&self, now: Instant) -> Duration {
        if self.is_animating() {
            return ANIMATION_STEP;
        }
        self.next_deadline()
            .map(|due| due.saturating_duration_since(now))
            .unwrap_or(MAX_IDLE)
            .min(MAX_IDLE)
    }

    /// Stop timers, drop bindings, release lines, close chips. The panel can
    /// be claimed again afterwards; analog channels must be registered anew.
    pub fn shutdown(&mut self) {
        let timers = self.scheduler.len();
        self.scheduler.clear();
        self.sampled.clear();

        self.outputs.clear();
        self.inputs.clear();
        self.sampler = None;

        let lines = self.coordinator.claimed_lines().len();
        self.coordinator.release_all();
        if timers > 0 || lines > 0 {
            info!(timers, lines, "panel shut down");
            logger::log_event("panel_shutdown", json!({ "timers": timers, "lines": lines }));
        }
    }

    pub fn status(&self, id: DescriptorId) -> LineStatus {
        self.coordinator.status(id)
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn registry(&self) -> &LineRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &ClaimCoordinator {
        &self.coordinator
    }

    pub fn sampler(&self) -> Option<&AnalogSampler> {
        self.sampler.as_ref()
    }

    pub fn timers(&self) -> usize {
        self.scheduler.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

impl<S: DisplaySink> Drop for Panel<S> {
    fn drop(&mut self) {
        if !self.scheduler.is_empty() || !self.coordinator.claimed_lines().is_empty() {
            warn!("panel dropped while live, tearing down");
        }
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::ErrorKind;
    use crate::gpio::sim::SimGpio;
    use crate::test_utils::{sim_adc, sim_board, Notification, RecordingSink, ADC_DEVICE};

    const CHIP4: &str = "/dev/gpiochip4";
    const CHIP5: &str = "/dev/gpiochip5";

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn panel(sim: &SimGpio) -> Panel<RecordingSink> {
        Panel::new(
            PanelConfig::default(),
            Arc::new(sim.clone()),
            Box::new(sim_adc()),
            RecordingSink::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_register_checks_direction() {
        let sim = sim_board();
        let mut p = panel(&sim);
        let relay = p.descriptor_id("Relay 1").unwrap();
        let status = p.descriptor_id("GPIO 5 2").unwrap();

        let err = p.register_input(relay, ElementId(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectionMismatch);
        let err = p.register_output(status, ElementId(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectionMismatch);

        p.register_output(relay, ElementId(1)).unwrap();
        p.register_input(status, ElementId(2)).unwrap();
        assert!(p.descriptor_id("Relay 9").is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut cfg = PanelConfig::default();
        cfg.poll_interval_ms = 0;
        let result = Panel::new(cfg, Arc::new(sim_board()), Box::new(sim_adc()), RecordingSink::default());
        assert_eq!(result.err().unwrap().kind(), ErrorKind::Config);
    }

    #[test]
    fn test_register_analog_unknown_channel() {
        let sim = sim_board();
        let mut p = panel(&sim);
        let err = p.register_analog("voltage3", ElementId(9)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelNotFound);
        assert_eq!(p.register_analog("voltage5", ElementId(9)).unwrap(), 0);
    }

    #[test]
    fn test_register_analog_without_device() {
        let sim = sim_board();
        let mut cfg = PanelConfig::default();
        cfg.analog = None;
        let mut p = Panel::new(cfg, Arc::new(sim), Box::new(sim_adc()), RecordingSink::default()).unwrap();
        assert_eq!(p.register_analog("voltage5", ElementId(9)).unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn test_mode_select_lines_claimed_at_default() {
        let sim = sim_board();
        sim.set_level(CHIP5, 9, true);
        let mut p = panel(&sim);
        let report = p.claim_all();
        // Nothing registered: only the mode-select group is acquired
        assert_eq!(report.claimed.len(), 4);
        assert_eq!(sim.level(CHIP5, 9), Some(false));
        assert!(!sim.is_requested(CHIP4, 4));
        assert_eq!(p.timers(), 0);
    }

    #[test]
    fn test_toggle_failure_reaches_sink() {
        let sim = sim_board();
        sim.set_write_failure(CHIP4, 5, true);
        let mut p = panel(&sim);
        let relay = p.descriptor_id("Relay 2").unwrap();
        p.register_output(relay, ElementId(5)).unwrap();
        p.claim_all();

        let err = p.toggle(ElementId(5), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailure);
        assert_eq!(p.sink().events, vec![Notification::OutputError(ElementId(5), ErrorKind::WriteFailure)]);
    }

    #[test]
    fn test_toggle_on_failed_claim_is_inert() {
        let sim = sim_board();
        sim.fail_request(CHIP4, 4);
        let mut p = panel(&sim);
        let relay = p.descriptor_id("Relay 1").unwrap();
        p.register_output(relay, ElementId(1)).unwrap();
        p.claim_all();

        assert!(matches!(p.status(relay), LineStatus::Failed { .. }));
        p.toggle(ElementId(1), true).unwrap();
        assert!(p.sink().events.is_empty());
    }

    #[test]
    fn test_tick_polls_inputs_on_period() {
        let sim = sim_board();
        sim.set_level(CHIP5, 3, true);
        let mut p = panel(&sim);
        let id = p.descriptor_id("GPIO 5 3").unwrap();
        p.register_input(id, ElementId(11)).unwrap();

        let t0 = Instant::now();
        p.claim_all_at(t0);
        assert_eq!(p.timers(), 1);
        p.tick(t0 + ms(50));
        assert!(p.sink().events.is_empty());
        p.tick(t0 + ms(100));
        p.tick(t0 + ms(200));
        assert_eq!(p.sink().inputs(ElementId(11)), vec![true, true]);
    }

    #[test]
    fn test_analog_timer_scheduled_once() {
        let sim = sim_board();
        let adc = sim_adc();
        let mut p = Panel::new(
            PanelConfig::default(),
            Arc::new(sim.clone()),
            Box::new(adc.clone()),
            RecordingSink::default(),
        )
        .unwrap();
        p.register_analog("voltage8", ElementId(40)).unwrap();
        let t0 = Instant::now();
        p.claim_all_at(t0);
        p.claim_all_at(t0);
        assert_eq!(p.timers(), 1);

        adc.set_raw(ADC_DEVICE, "voltage8", 4095);
        p.tick(t0 + ms(100));
        p.tick(t0 + ms(150));
        assert_eq!(p.sink().samples(ElementId(40)), vec![2220]);
        assert_eq!(adc.read_count(ADC_DEVICE, "voltage8"), 1);
    }

    #[test]
    fn test_shutdown_then_reclaim() {
        let sim = sim_board();
        let mut p = panel(&sim);
        let relay = p.descriptor_id("Relay 1").unwrap();
        let status = p.descriptor_id("GPIO 5 4").unwrap();
        p.register_output(relay, ElementId(1)).unwrap();
        p.register_input(status, ElementId(2)).unwrap();
        let t0 = Instant::now();
        p.claim_all_at(t0);
        assert_eq!(sim.live_lines(), 6);

        p.shutdown();
        assert_eq!(p.timers(), 0);
        assert_eq!(sim.live_lines(), 0);
        assert_eq!(sim.live_chips(), 0);
        assert_eq!(p.status(relay), LineStatus::NotAttempted);
        p.tick(t0 + ms(500));
        assert!(p.sink().events.is_empty());
        p.toggle(ElementId(1), true).unwrap();
        assert_eq!(sim.level(CHIP4, 4), Some(false));

        let report = p.claim_all_at(t0 + ms(600));
        assert_eq!(report.claimed.len(), 6);
        p.toggle(ElementId(1), true).unwrap();
        assert_eq!(sim.level(CHIP4, 4), Some(true));
    }

    #[test]
    fn test_register_into_claimed_group_is_rejected() {
        let sim = sim_board();
        let mut p = panel(&sim);
        let relay1 = p.descriptor_id("Relay 1").unwrap();
        let relay2 = p.descriptor_id("Relay 2").unwrap();
        p.register_output(relay1, ElementId(1)).unwrap();
        p.claim_all();

        let err = p.register_output(relay2, ElementId(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(p.claim_all().is_noop());
        assert!(!sim.is_requested(CHIP4, 5));
        assert_eq!(p.status(relay2), LineStatus::NotAttempted);

        // Allowed again once the hardware is released
        p.shutdown();
        p.register_output(relay2, ElementId(2)).unwrap();
        p.claim_all();
        assert!(sim.is_requested(CHIP4, 5));
    }

    #[test]
    fn test_idle_for_follows_timers_and_animation() {
        let sim = sim_board();
        let adc = sim_adc();
        let mut cfg = PanelConfig::default();
        if let Some(analog) = cfg.analog.as_mut() {
            analog.transition_ms = 50;
        }
        let mut p = Panel::new(cfg, Arc::new(sim.clone()), Box::new(adc.clone()), RecordingSink::default()).unwrap();
        let t0 = Instant::now();
        assert_eq!(p.idle_for(t0), MAX_IDLE);

        let status = p.descriptor_id("GPIO 5 2").unwrap();
        p.register_input(status, ElementId(3)).unwrap();
        p.register_analog("voltage5", ElementId(4)).unwrap();
        p.claim_all_at(t0);
        assert_eq!(p.idle_for(t0 + ms(70)), ms(30));
        assert_eq!(p.idle_for(t0 + ms(120)), Duration::ZERO);

        adc.set_raw(ADC_DEVICE, "voltage5", 4095);
        p.tick(t0 + ms(100));
        assert!(p.is_animating());
        assert_eq!(p.idle_for(t0 + ms(100)), ANIMATION_STEP);
        p.tick(t0 + ms(160));
        assert!(!p.is_animating());
        assert_eq!(p.idle_for(t0 + ms(160)), ms(40));
    }

    #[test]
    fn test_drop_releases_hardware() {
        let sim = sim_board();
        {
            let mut p = panel(&sim);
            let relay = p.descriptor_id("Relay 2").unwrap();
            p.register_output(relay, ElementId(1)).unwrap();
            p.claim_all();
            assert_eq!(sim.live_lines(), 5);
        }
        assert_eq!(sim.live_lines(), 0);
        assert_eq!(sim.live_chips(), 0);
    }
}
