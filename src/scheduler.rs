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

//! Cooperative periodic timers
//!
//! One dispatcher thread asks [`Scheduler::due`] which timers expired and runs
//! them in creation order. A timer first fires one period after it was added
//! and is then rearmed one period after each run, so a slow iteration delays
//! the next run instead of producing a burst of catch-up runs.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Timer<T> {
    id: TimerId,
    period: Duration,
    next_due: Instant,
    task: T,
}

#[derive(Debug)]
pub struct Scheduler<T> {
    timers: Vec<Timer<T>>,
    next_id: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self { timers: Vec::new(), next_id: 0 }
    }

    pub fn add(&mut self, period: Duration, task: T, now: Instant) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer { id, period, next_due: now + period, task });
        id
    }

    /// Remove a timer; returns false if it was already gone
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.next_due).min()
    }
}

impl<T: Clone> Scheduler<T> {
    /// Tasks of every timer expired at `now`, rearming each of them
    pub fn due(&mut self, now: Instant) -> Vec<T> {
        let mut ready = Vec::new();
        for timer in self.timers.iter_mut() {
            if now >= timer.next_due {
                timer.next_due = now + timer.period;
                ready.push(timer.task.clone());
            }
        }
        ready
    }
}
