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


//! Analog sampling and display smoothing
//!
//! An [`AnalogSampler`] owns the channels of one ADC device. Each sample is
//! read raw, converted with a fixed linear [`Scale`] and handed to the
//! channel's [`Smoother`] as its new target; [`AnalogSampler::step_all`]
//! then advances the transitions and reports displayed values that moved.
//!
//! Device and channel lookups happen when a channel is bound, so a wrong
//! name fails registration instead of the first read.

pub mod iio;
pub mod sim;

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::AnalogConfig;
use crate::display::{DisplaySink, ElementId};
use crate::error::{PanelError, Result};
use crate::smoothing::{Easing, Smoother};

const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Entry point to the analog input subsystem
pub trait AdcContext: Send {
    fn find_device(&self, name: &str) -> Result<Box<dyn AdcDevice>>;
}

pub trait AdcDevice: Send {
    fn name(&self) -> &str;
    fn find_channel(&self, id: &str) -> Result<Box<dyn AdcChannel>>;
}

pub trait AdcChannel: Send {
    fn id(&self) -> &str;

    /// The channel's `raw` attribute
    fn read_raw(&self) -> Result<i64>;
}

/// `display = raw * num / den`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    num: i64,
    den: i64,
}

impl Scale {
    pub fn new(num: i64, den: i64) -> Result<Self> {
        if den == 0 {
            return Err(PanelError::invalid_config("analog.scale_den", "must not be zero"));
        }
        Ok(Self { num, den })
    }

    /// Saturates at the i64 bounds instead of wrapping
    pub fn apply(self, raw: i64) -> i64 {
        let scaled = raw as i128 * self.num as i128 / self.den as i128;
        scaled.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

pub struct AnalogChannelBinding {
    pub name: String,
    pub element: ElementId,
    channel: Box<dyn AdcChannel>,
    smoother: Smoother,
    failures: u32,
}

impl AnalogChannelBinding {
    pub fn displayed(&self) -> i64 {
        self.smoother.displayed()
    }

    pub fn target(&self) -> i64 {
        self.smoother.target()
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

pub struct AnalogSampler {
    device: Box<dyn AdcDevice>,
    scale: Scale,
    transition: Duration,
    easing: Easing,
    bindings: Vec<AnalogChannelBinding>,
}

impl AnalogSampler {
    pub fn new(device: Box<dyn AdcDevice>, scale: Scale, transition: Duration, easing: Easing) -> Self {
        Self { device, scale, transition, easing, bindings: Vec::new() }
    }

    /// Resolve the configured device through `ctx`
    pub fn open(ctx: &dyn AdcContext, cfg: &AnalogConfig) -> Result<Self> {
        let device = ctx.find_device(&cfg.device)?;
        info!(device = %device.name(), "analog device opened");
        let scale = Scale::new(cfg.scale_num, cfg.scale_den)?;
        Ok(Self::new(device, scale, cfg.transition(), cfg.easing))
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Bind channel `name` to `element`; rebinding a channel moves it to the
    /// new element. Returns the binding index.
    pub fn bind(&mut self, name: &str, element: ElementId) -> Result<usize> {
        if let Some(idx) = self.bindings.iter().position(|b| b.name == name) {
            self.bindings[idx].element = element;
            return Ok(idx);
        }
        let channel = self.device.find_channel(name)?;
        debug!(device = %self.device.name(), channel = name, element = %element, "analog channel bound");
        self.bindings.push(AnalogChannelBinding {
            name: name.to_string(),
            element,
            channel,
            smoother: Smoother::new(0, self.transition, self.easing),
            failures: 0,
        });
        Ok(self.bindings.len() - 1)
    }

    /// Read one channel and retarget its smoother. Returns the new target,
    /// or `None` when the read failed and the display keeps its value.
    pub fn sample(&mut self, idx: usize, now: Instant) -> Option<i64> {
        let scale = self.scale;
        let binding = self.bindings.get_mut(idx)?;
        match binding.channel.read_raw() {
            Ok(raw) => {
                if binding.failures > 0 {
                    info!(channel = %binding.name, failures = binding.failures, "analog read recovered");
                    binding.failures = 0;
                }
                let target = scale.apply(raw);
                binding.smoother.retarget(target, now);
                Some(target)
            }
            Err(e) => {
                binding.failures += 1;
                if binding.failures == 1 {
                    debug!(channel = %binding.name, error = %e, "analog read failed, skipping this tick");
                }
                if binding.failures % MAX_CONSECUTIVE_ERRORS == 0 {
                    warn!(channel = %binding.name, failures = binding.failures, error = %e, "analog channel keeps failing to read");
                }
                None
            }
        }
    }

    /// Advance every transition to `now`, reporting values that moved
    pub fn step_all<S: DisplaySink + ?Sized>(&mut self, now: Instant, sink: &mut S) {
        for binding in &mut self.bindings {
            if let Some(value) = binding.smoother.step(now) {
                sink.on_sample_updated(binding.element, value);
            }
        }
    }

    pub fn is_animating(&self) -> bool {
        self.bindings.iter().any(|b| b.smoother.is_animating())
    }

    pub fn binding(&self, idx: usize) -> Option<&AnalogChannelBinding> {
        self.bindings.get(idx)
    }

    pub fn bindings(&self) -> &[AnalogChannelBinding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::sim::SimAdc;
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::RecordingSink;

    const DEV: &str = "2198000.adc";

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn sampler(adc: &SimAdc) -> AnalogSampler {
        let cfg = AnalogConfig::default();
        AnalogSampler::open(adc, &cfg).unwrap()
    }

    #[test]
    fn test_scale_full_range() {
        let scale = Scale::new(13325, 4095).unwrap();
        assert_eq!(scale.apply(0), 0);
        assert_eq!(scale.apply(4095), 13325);
        assert_eq!(scale.apply(2048), 6664);
        assert!(Scale::new(1, 0).is_err());
    }

    #[test]
    fn test_scale_saturates() {
        let scale = Scale::new(13325, 4095).unwrap();
        assert_eq!(scale.apply(i64::MAX), i64::MAX);
        assert_eq!(scale.apply(i64::MIN), i64::MIN);
        assert_eq!(Scale::new(-2, 1).unwrap().apply(i64::MAX), i64::MIN);
        assert_eq!(Scale::new(1, -1).unwrap().apply(i64::MIN), i64::MAX);
    }

    #[test]
    fn test_bind_unknown_channel_fails_immediately() {
        let adc = SimAdc::new().with_device(DEV, &["voltage0"]);
        let mut s = sampler(&adc);
        let err = s.bind("voltage7", ElementId(1)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ChannelNotFound);
        assert!(s.is_empty());
    }

    #[test]
    fn test_open_unknown_device_fails() {
        let adc = SimAdc::new().with_device("other.adc", &["voltage0"]);
        let err = AnalogSampler::open(&adc, &AnalogConfig::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ChannelNotFound);
    }

    #[test]
    fn test_sample_drives_transition_toward_scaled_value() {
        let adc = SimAdc::new().with_device(DEV, &["voltage5"]);
        let mut s = sampler(&adc);
        let idx = s.bind("voltage5", ElementId(30)).unwrap();
        adc.set_raw(DEV, "voltage5", 4095);

        let t0 = Instant::now();
        assert_eq!(s.sample(idx, t0), Some(13325));
        let mut sink = RecordingSink::default();
        s.step_all(t0 + ms(150), &mut sink);
        s.step_all(t0 + ms(300), &mut sink);
        assert_eq!(sink.samples(ElementId(30)), vec![6662, 13325]);
        assert!(!s.is_animating());
    }

    #[test]
    fn test_read_failure_keeps_displayed_value() {
        let adc = SimAdc::new().with_device(DEV, &["voltage8"]);
        let mut s = sampler(&adc);
        let idx = s.bind("voltage8", ElementId(31)).unwrap();
        adc.set_raw(DEV, "voltage8", 4095);
        let t0 = Instant::now();
        s.sample(idx, t0);
        s.step_all(t0 + ms(300), &mut RecordingSink::default());

        adc.set_read_failure(DEV, "voltage8", true);
        assert_eq!(s.sample(idx, t0 + ms(400)), None);
        let mut sink = RecordingSink::default();
        s.step_all(t0 + ms(500), &mut sink);
        assert!(sink.events.is_empty());
        assert_eq!(s.binding(idx).unwrap().displayed(), 13325);
        assert_eq!(s.binding(idx).unwrap().failures(), 1);

        adc.set_read_failure(DEV, "voltage8", false);
        adc.set_raw(DEV, "voltage8", 0);
        assert_eq!(s.sample(idx, t0 + ms(600)), Some(0));
        assert_eq!(s.binding(idx).unwrap().failures(), 0);
    }

    #[test]
    fn test_rebinding_moves_element() {
        let adc = SimAdc::new().with_device(DEV, &["voltage9"]);
        let mut s = sampler(&adc);
        assert_eq!(s.bind("voltage9", ElementId(1)).unwrap(), 0);
        assert_eq!(s.bind("voltage9", ElementId(2)).unwrap(), 0);
        assert_eq!(s.len(), 1);
        assert_eq!(s.binding(0).unwrap().element, ElementId(2));
    }
}
