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

//! Display smoothing for analog readings
//!
//! Each new sample starts a bounded-duration transition from the value
//! currently on screen to the new target. With samples arriving faster than
//! the transition length, every restart covers only part of the remaining
//! distance, so large jumps are crossed quickly and small residuals settle
//! slowly, much like a moving-coil meter needle.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    EaseOut,
}

impl Easing {
    fn interpolate(self, from: i64, to: i64, elapsed: Duration, duration: Duration) -> i64 {
        let total = duration.as_millis().max(1);
        let act = elapsed.as_millis().min(total);
        match self {
            Easing::Linear => {
                let delta = (to as i128 - from as i128) * act as i128 / total as i128;
                (from as i128 + delta) as i64
            }
            Easing::EaseOut => {
                let t = act as f64 / total as f64;
                let eased = 1.0 - (1.0 - t).powi(3);
                let delta = ((to as i128 - from as i128) as f64 * eased).round() as i128;
                (from as i128 + delta).clamp(i64::MIN as i128, i64::MAX as i128) as i64
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub from: i64,
    pub to: i64,
    pub started: Instant,
    pub duration: Duration,
    pub easing: Easing,
}

impl Transition {
    pub fn value_at(&self, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= self.duration {
            return self.to;
        }
        self.easing.interpolate(self.from, self.to, elapsed, self.duration)
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.duration
    }
}

#[derive(Debug, Clone)]
pub struct Smoother {
    displayed: i64,
    transition: Option<Transition>,
    duration: Duration,
    easing: Easing,
}

impl Smoother {
    pub fn new(initial: i64, duration: Duration, easing: Easing) -> Self {
        Self { displayed: initial, transition: None, duration, easing }
    }

    pub fn displayed(&self) -> i64 {
        self.displayed
    }

    /// Where the display is heading; the displayed value when settled
    pub fn target(&self) -> i64 {
        self.transition.map(|t| t.to).unwrap_or(self.displayed)
    }

    pub fn is_animating(&self) -> bool {
        self.transition.is_some()
    }

    /// Replace any in-flight transition with one from the displayed value to
    /// `target`
    pub fn retarget(&mut self, target: i64, now: Instant) {
        if self.transition.is_none() && target == self.displayed {
            return;
        }
        self.transition = Some(Transition {
            from: self.displayed,
            to: target,
            started: now,
            duration: self.duration,
            easing: self.easing,
        });
    }

    /// Advance to `now`; returns the new displayed value when it moved
    pub fn step(&mut self, now: Instant) -> Option<i64> {
        let transition = self.transition?;
        let value = transition.value_at(now);
        if transition.is_finished(now) {
            self.transition = None;
        }
        if value != self.displayed {
            self.displayed = value;
            Some(value)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_SCALE: i64 = 13325;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_linear_interpolation_midpoint_and_end() {
        let t0 = Instant::now();
        let tr = Transition { from: 0, to: 1000, started: t0, duration: ms(300), easing: Easing::Linear };
        assert_eq!(tr.value_at(t0), 0);
        assert_eq!(tr.value_at(t0 + ms(150)), 500);
        assert_eq!(tr.value_at(t0 + ms(300)), 1000);
        assert_eq!(tr.value_at(t0 + ms(900)), 1000);
        assert!(tr.is_finished(t0 + ms(300)));
    }

    #[test]
    fn test_ease_out_front_loads_motion() {
        let t0 = Instant::now();
        let tr = Transition { from: 0, to: 1000, started: t0, duration: ms(300), easing: Easing::EaseOut };
        let mid = tr.value_at(t0 + ms(150));
        assert!(mid > 500 && mid < 1000, "ease-out midpoint was {}", mid);
        assert_eq!(tr.value_at(t0 + ms(300)), 1000);
    }

    #[test]
    fn test_ease_out_spans_full_i64_range() {
        let t0 = Instant::now();
        let up = Transition { from: i64::MIN, to: i64::MAX, started: t0, duration: ms(300), easing: Easing::EaseOut };
        let mid = up.value_at(t0 + ms(150));
        assert!(mid > 0, "ease-out midpoint was {}", mid);
        assert!(up.value_at(t0 + ms(299)) > mid);
        assert_eq!(up.value_at(t0 + ms(300)), i64::MAX);

        let down = Transition { from: i64::MAX, to: i64::MIN, ..up };
        assert!(down.value_at(t0 + ms(150)) < 0);
        assert_eq!(down.value_at(t0 + ms(300)), i64::MIN);
    }

    #[test]
    fn test_retarget_to_same_value_is_noop() {
        let mut s = Smoother::new(0, ms(300), Easing::Linear);
        s.retarget(0, Instant::now());
        assert!(!s.is_animating());
    }

    #[test]
    fn test_smoothing_full_scale_up_and_back_down() {
        let t0 = Instant::now();
        let mut s = Smoother::new(0, ms(300), Easing::Linear);
        let mut trajectory = vec![s.displayed()];

        // raw 0, then 4095 (full scale), then 0 again
        s.retarget(0, t0);
        s.retarget(FULL_SCALE, t0);
        for t in (10..=300).step_by(10) {
            s.step(t0 + ms(t));
            trajectory.push(s.displayed());
        }
        assert_eq!(s.displayed(), FULL_SCALE);
        assert!(!s.is_animating());

        s.retarget(0, t0 + ms(300));
        for t in (310..=600).step_by(10) {
            s.step(t0 + ms(t));
            trajectory.push(s.displayed());
        }
        assert_eq!(s.displayed(), 0);

        assert_eq!(trajectory[0], 0);
        let halfway_up = trajectory[15];
        assert!((halfway_up - FULL_SCALE / 2).abs() <= 1, "halfway up was {}", halfway_up);
        let max_step = FULL_SCALE * 10 / 300 + 1;
        for w in trajectory.windows(2) {
            assert!((w[1] - w[0]).abs() <= max_step, "jump from {} to {}", w[0], w[1]);
        }
    }

    #[test]
    fn test_retarget_mid_flight_starts_from_displayed() {
        let t0 = Instant::now();
        let mut s = Smoother::new(0, ms(300), Easing::Linear);
        s.retarget(3000, t0);
        assert_eq!(s.step(t0 + ms(100)), Some(1000));

        s.retarget(0, t0 + ms(100));
        assert_eq!(s.target(), 0);
        // Starts from 1000, not from the abandoned 3000 target
        assert_eq!(s.step(t0 + ms(100)), None);
        assert_eq!(s.step(t0 + ms(250)), Some(500));
        assert_eq!(s.step(t0 + ms(400)), Some(0));
        assert_eq!(s.step(t0 + ms(500)), None);
    }

    #[test]
    fn test_periodic_restarts_converge() {
        let t0 = Instant::now();
        let mut s = Smoother::new(0, ms(300), Easing::Linear);
        // Samples every 100 ms toward a constant target cover a third of the
        // remaining distance each time
        for i in 0..20u64 {
            s.retarget(FULL_SCALE, t0 + ms(i * 100));
            s.step(t0 + ms(i * 100 + 100));
        }
        assert!((FULL_SCALE - s.displayed()).abs() < 10);
    }
}
