//! Rolling sample store turning instantaneous hashrate samples into
//! 1-minute and 1-hour means.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

pub const MINUTE_MS: u64 = 60_000;
pub const HOUR_MS: u64 = 3_600_000;
/// One sample per second for an hour.
pub const DEFAULT_CAPACITY: usize = 3_600;


#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: u64,
    pub rate: f64,
}


#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
    /// Time of the first sample since the last reset. Means are reported
    /// only once the window has been open long enough to cover them.
    opened_ms: Option<u64>,
}

impl Default for TelemetryWindow {
    fn default() -> Self {
        TelemetryWindow::new(DEFAULT_CAPACITY)
    }
}

impl TelemetryWindow {
    pub fn new(capacity: usize) -> Self {
        TelemetryWindow {
            samples: VecDeque::new(),
            capacity: capacity.max(1),
            opened_ms: None,
        }
    }

    /// Insert a sample, first pruning everything older than one hour
    /// relative to `now_ms`, then evicting the oldest beyond capacity.
    pub fn record(&mut self, rate: f64, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(HOUR_MS);
        while self.samples.front().map_or(false, |s| s.timestamp_ms < cutoff) {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample {
            timestamp_ms: now_ms,
            rate,
        });
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.opened_ms.get_or_insert(now_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    /// Most recent sample's rate.
    pub fn current(&self) -> Option<f64> {
        self.samples.back().map(|s| s.rate)
    }

    /// Mean over the last minute; `None` until the window is a minute old.
    pub fn minute_speed(&self, now_ms: u64) -> Option<f64> {
        self.mean_over(MINUTE_MS, now_ms)
    }

    /// Mean over the last hour; `None` until the window is an hour old.
    pub fn hour_speed(&self, now_ms: u64) -> Option<f64> {
        self.mean_over(HOUR_MS, now_ms)
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.opened_ms = None;
    }

    fn mean_over(&self, span_ms: u64, now_ms: u64) -> Option<f64> {
        let opened = self.opened_ms?;
        if now_ms.saturating_sub(opened) < span_ms {
            return None;
        }
        let cutoff = now_ms.saturating_sub(span_ms);
        let (sum, n) = self
            .samples
            .iter()
            .filter(|s| s.timestamp_ms >= cutoff)
            .fold((0.0, 0usize), |(sum, n), s| (sum + s.rate, n + 1));
        if n == 0 {
            None
        } else {
            Some(sum / n as f64)
        }
    }
}
