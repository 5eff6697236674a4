// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cooperative cancellation and per-tile statistics.
//!
//! A [`Progress`] is shared by everything working on a tile. Long-running
//! stages poll [`Progress::is_canceled`] between features and buildings;
//! nothing is interrupted mid-step.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Progress {
    canceled: Arc<AtomicBool>,
    collect_stats: bool,
    stats: Mutex<BTreeMap<String, f64>>,
    message: Mutex<String>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats() -> Self {
        Self {
            collect_stats: true,
            ..Self::default()
        }
    }

    /// New token sharing this one's cancellation flag, with its own
    /// statistics and message
    pub fn child(&self) -> Self {
        Self {
            canceled: self.canceled.clone(),
            collect_stats: self.collect_stats,
            ..Self::default()
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    pub fn collect_stats(&self) -> bool {
        self.collect_stats
    }

    /// Where cancellation was observed
    pub fn message(&self) -> String {
        self.message.lock().clone()
    }

    pub fn set_message(&self, message: impl Into<String>) {
        *self.message.lock() = message.into();
    }

    /// Overwrite a statistic. Timings are stored in seconds.
    pub fn set_stat(&self, name: &str, value: f64) {
        self.stats.lock().insert(name.to_string(), value);
    }

    pub fn add_time(&self, name: &str, elapsed: Duration) {
        *self.stats.lock().entry(name.to_string()).or_insert(0.0) += elapsed.as_secs_f64();
    }

    pub fn stat(&self, name: &str) -> Option<f64> {
        self.stats.lock().get(name).copied()
    }

    pub fn stats(&self) -> BTreeMap<String, f64> {
        self.stats.lock().clone()
    }

    /// Remove and return all statistics
    pub fn take_stats(&self) -> BTreeMap<String, f64> {
        std::mem::take(&mut *self.stats.lock())
    }
}

/// True when `progress` is present and canceled
pub(crate) fn is_canceled(progress: Option<&Progress>) -> bool {
    progress.is_some_and(|p| p.is_canceled())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_sticky() {
        let p = Progress::new();
        assert!(!p.is_canceled());
        p.cancel();
        assert!(p.is_canceled());
        assert!(is_canceled(Some(&p)));
        assert!(!is_canceled(None));
    }

    #[test]
    fn test_stats_accumulate() {
        let p = Progress::with_stats();
        p.add_time("factory.create", Duration::from_millis(250));
        p.add_time("factory.create", Duration::from_millis(250));
        p.set_stat("# drawables", 3.0);
        assert!((p.stat("factory.create").unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(p.take_stats().len(), 2);
        assert!(p.stats().is_empty());
    }

    #[test]
    fn test_child_shares_cancel_not_stats() {
        let parent = Progress::with_stats();
        let child = parent.child();
        child.set_stat("# drawables", 1.0);
        assert!(child.collect_stats());
        assert!(parent.stats().is_empty());

        parent.cancel();
        assert!(child.is_canceled());
    }
}
