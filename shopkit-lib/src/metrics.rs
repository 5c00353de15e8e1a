//! Counters for monitoring store activity.
//!
//! # Example
//!
//! ```rust
//! use shopkit_lib::metrics::StoreMetrics;
//!
//! let metrics = StoreMetrics::new();
//! metrics.record_purchase_started();
//! metrics.record_grant();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.purchases_started, 1);
//! assert_eq!(snapshot.grants, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Store activity counters. Thread-safe via atomics.
#[derive(Debug)]
pub struct StoreMetrics {
    // Purchase flow
    purchases_started: AtomicU64,
    purchases_completed: AtomicU64,
    purchases_cancelled: AtomicU64,
    purchases_failed: AtomicU64,
    purchases_rejected: AtomicU64,

    // Economy effects
    grants: AtomicU64,
    revokes: AtomicU64,
    refunds_forgiven: AtomicU64,

    // Restore
    restores_succeeded: AtomicU64,
    restores_failed: AtomicU64,

    // Errors
    verification_failures: AtomicU64,
    unexpected_errors: AtomicU64,

    start_time: Instant,
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreMetrics {
    /// Create a new collector with all counters at zero.
    pub fn new() -> Self {
        Self {
            purchases_started: AtomicU64::new(0),
            purchases_completed: AtomicU64::new(0),
            purchases_cancelled: AtomicU64::new(0),
            purchases_failed: AtomicU64::new(0),
            purchases_rejected: AtomicU64::new(0),
            grants: AtomicU64::new(0),
            revokes: AtomicU64::new(0),
            refunds_forgiven: AtomicU64::new(0),
            restores_succeeded: AtomicU64::new(0),
            restores_failed: AtomicU64::new(0),
            verification_failures: AtomicU64::new(0),
            unexpected_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    // === Purchase flow ===

    /// Record a launched purchase flow.
    pub fn record_purchase_started(&self) {
        self.purchases_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a purchase that reached reconciliation.
    pub fn record_purchase_completed(&self) {
        self.purchases_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a purchase the user cancelled.
    pub fn record_purchase_cancelled(&self) {
        self.purchases_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a purchase the billing service failed.
    pub fn record_purchase_failed(&self) {
        self.purchases_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a purchase rejected by receipt or payload checks.
    pub fn record_purchase_rejected(&self) {
        self.purchases_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // === Economy ===

    /// Record a grant.
    pub fn record_grant(&self) {
        self.grants.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a revoke.
    pub fn record_revoke(&self) {
        self.revokes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refund that kept the item.
    pub fn record_refund_forgiven(&self) {
        self.refunds_forgiven.fetch_add(1, Ordering::Relaxed);
    }

    // === Restore ===

    /// Record the outcome of a restore.
    pub fn record_restore(&self, success: bool) {
        if success {
            self.restores_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.restores_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    // === Errors ===

    /// Record a receipt that failed signature verification.
    pub fn record_verification_failure(&self) {
        self.verification_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an unexpected-error event.
    pub fn record_unexpected_error(&self) {
        self.unexpected_errors.fetch_add(1, Ordering::Relaxed);
    }

    // === Snapshot ===

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            purchases_started: self.purchases_started.load(Ordering::Relaxed),
            purchases_completed: self.purchases_completed.load(Ordering::Relaxed),
            purchases_cancelled: self.purchases_cancelled.load(Ordering::Relaxed),
            purchases_failed: self.purchases_failed.load(Ordering::Relaxed),
            purchases_rejected: self.purchases_rejected.load(Ordering::Relaxed),
            grants: self.grants.load(Ordering::Relaxed),
            revokes: self.revokes.load(Ordering::Relaxed),
            refunds_forgiven: self.refunds_forgiven.load(Ordering::Relaxed),
            restores_succeeded: self.restores_succeeded.load(Ordering::Relaxed),
            restores_failed: self.restores_failed.load(Ordering::Relaxed),
            verification_failures: self.verification_failures.load(Ordering::Relaxed),
            unexpected_errors: self.unexpected_errors.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.purchases_started,
            &self.purchases_completed,
            &self.purchases_cancelled,
            &self.purchases_failed,
            &self.purchases_rejected,
            &self.grants,
            &self.revokes,
            &self.refunds_forgiven,
            &self.restores_succeeded,
            &self.restores_failed,
            &self.verification_failures,
            &self.unexpected_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time snapshot of [`StoreMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Seconds since the collector was created.
    pub uptime_secs: u64,

    pub purchases_started: u64,
    pub purchases_completed: u64,
    pub purchases_cancelled: u64,
    pub purchases_failed: u64,
    pub purchases_rejected: u64,

    pub grants: u64,
    pub revokes: u64,
    pub refunds_forgiven: u64,

    pub restores_succeeded: u64,
    pub restores_failed: u64,

    pub verification_failures: u64,
    pub unexpected_errors: u64,
}

impl MetricsSnapshot {
    /// Share of started purchases that completed (0.0 to 1.0).
    pub fn completion_rate(&self) -> f64 {
        if self.purchases_started == 0 {
            return 1.0;
        }
        self.purchases_completed as f64 / self.purchases_started as f64
    }

    /// Total error-like outcomes.
    pub fn total_errors(&self) -> u64 {
        self.purchases_failed + self.verification_failures + self.unexpected_errors
    }

    /// Format as JSON for logging.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}
