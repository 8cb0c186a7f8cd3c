//! Real-time activity monitor.
//!
//! Keeps a bounded ring of the most recent events, fans them out to
//! subscribers, and watches for abuse patterns (bursts, repeated failures)
//! without ever touching the store. Everything here is synchronous and
//! in-memory so recording never adds latency to a producer's write path.
//! This state is process-local: multiple instances run independent buffers
//! and make independent alert decisions.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::models::{ActivityEvent, SecurityAlert};

pub type SubscriberId = u64;

type EventHandler = Box<dyn Fn(&ActivityEvent) + Send + Sync>;
type AlertHandler = Box<dyn Fn(&SecurityAlert) + Send + Sync>;

/// Per-action failure window. A decaying counter, not a strict sliding
/// window: a burst straddling the reset boundary can be under- or
/// over-counted. Documented approximation, kept as-is.
struct FailureWindow {
    count: u32,
    started_at: DateTime<Utc>,
}

pub struct ActivityMonitor {
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    buffer: RwLock<VecDeque<ActivityEvent>>,
    failures: DashMap<String, FailureWindow>,
    event_subs: RwLock<Vec<(SubscriberId, EventHandler)>>,
    alert_subs: RwLock<Vec<(SubscriberId, AlertHandler)>>,
    next_sub: AtomicU64,
}

impl ActivityMonitor {
    pub fn new(config: MonitorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            buffer: RwLock::new(VecDeque::new()),
            failures: DashMap::new(),
            event_subs: RwLock::new(Vec::new()),
            alert_subs: RwLock::new(Vec::new()),
            next_sub: AtomicU64::new(1),
        }
    }

    /// Record one event: stamp it if needed, append to the ring (evicting the
    /// oldest entry at capacity), notify subscribers, and feed the failure
    /// counters. Never fails or blocks the caller — internal problems are
    /// logged and swallowed.
    pub fn record(&self, mut event: ActivityEvent) {
        if event.created_at.is_none() {
            event.created_at = Some(self.clock.now());
        }

        {
            let Ok(mut buffer) = self.buffer.write() else {
                tracing::error!("monitor buffer lock poisoned, dropping event");
                return;
            };
            while buffer.len() >= self.config.buffer_capacity {
                buffer.pop_front();
            }
            if self.config.buffer_capacity > 0 {
                buffer.push_back(event.clone());
            }
        }

        self.publish_event(&event);

        if event.status.is_failure() {
            self.track_failure(&event);
        }
    }

    /// Scan the buffer for events within the trailing window; at or above
    /// `threshold` (inclusive) an alert fires and this returns true.
    pub fn detect_suspicious_activity(&self, window_secs: i64, threshold: usize) -> bool {
        let cutoff = self.clock.now() - chrono::Duration::seconds(window_secs);
        let recent: Vec<ActivityEvent> = match self.buffer.read() {
            Ok(buffer) => buffer
                .iter()
                .filter(|e| e.created_at.is_some_and(|t| t >= cutoff))
                .cloned()
                .collect(),
            Err(_) => {
                tracing::error!("monitor buffer lock poisoned during scan");
                return false;
            }
        };

        if recent.len() >= threshold {
            self.trigger_alert(
                format!(
                    "High activity volume: {} events within {}s",
                    recent.len(),
                    window_secs
                ),
                recent,
            );
            true
        } else {
            false
        }
    }

    /// Publish a `SecurityAlert` on the alert channel and log it.
    pub fn trigger_alert(&self, reason: String, events: Vec<ActivityEvent>) {
        let count = events.len();
        let alert = SecurityAlert {
            reason,
            events,
            triggered_at: self.clock.now(),
        };
        tracing::warn!(reason = %alert.reason, count, "security alert triggered");

        let Ok(subs) = self.alert_subs.read() else {
            tracing::error!("alert subscriber lock poisoned");
            return;
        };
        for (id, handler) in subs.iter() {
            if std::panic::catch_unwind(AssertUnwindSafe(|| handler(&alert))).is_err() {
                tracing::error!(subscriber = id, "alert subscriber panicked");
            }
        }
    }

    /// Clear failure windows that have aged out. Called periodically by the
    /// scheduler; the windows also self-reset lazily on the next failure.
    pub fn sweep_counters(&self) {
        let now = self.clock.now();
        let window = chrono::Duration::seconds(self.config.failure_window_secs);
        self.failures
            .retain(|_, entry| now - entry.started_at <= window);
    }

    pub fn on_event<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&ActivityEvent) + Send + Sync + 'static,
    {
        let id = self.next_sub.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut subs) = self.event_subs.write() {
            subs.push((id, Box::new(handler)));
        }
        id
    }

    pub fn off_event(&self, id: SubscriberId) {
        if let Ok(mut subs) = self.event_subs.write() {
            subs.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    pub fn on_alert<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&SecurityAlert) + Send + Sync + 'static,
    {
        let id = self.next_sub.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut subs) = self.alert_subs.write() {
            subs.push((id, Box::new(handler)));
        }
        id
    }

    pub fn off_alert(&self, id: SubscriberId) {
        if let Ok(mut subs) = self.alert_subs.write() {
            subs.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    /// Most recent `limit` buffered events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityEvent> {
        match self.buffer.read() {
            Ok(buffer) => {
                let skip = buffer.len().saturating_sub(limit);
                buffer.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.read().map(|b| b.len()).unwrap_or(0)
    }

    fn publish_event(&self, event: &ActivityEvent) {
        let Ok(subs) = self.event_subs.read() else {
            tracing::error!("event subscriber lock poisoned");
            return;
        };
        // Registration order, best-effort: a panicking subscriber never
        // reaches the caller or the remaining subscribers.
        for (id, handler) in subs.iter() {
            if std::panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(subscriber = id, "event subscriber panicked");
            }
        }
    }

    fn track_failure(&self, event: &ActivityEvent) {
        let now = self.clock.now();
        let window = chrono::Duration::seconds(self.config.failure_window_secs);

        let fire = {
            let mut entry = self
                .failures
                .entry(event.action.clone())
                .or_insert_with(|| FailureWindow {
                    count: 0,
                    started_at: now,
                });
            if now - entry.started_at > window {
                entry.count = 0;
                entry.started_at = now;
            }
            entry.count += 1;
            entry.count >= self.config.failure_threshold
        };

        if fire {
            // Reset so one window produces exactly one alert.
            self.failures.remove(&event.action);
            let events: Vec<ActivityEvent> = match self.buffer.read() {
                Ok(buffer) => buffer
                    .iter()
                    .filter(|e| e.action == event.action)
                    .cloned()
                    .collect(),
                Err(_) => Vec::new(),
            };
            self.trigger_alert(
                format!("Repeated failures detected for action '{}'", event.action),
                events,
            );
        }
    }
}
