//! Metrics definitions for the call client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `call_client_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! The client is a library: it records through the `metrics` facade and the
//! embedding application installs whatever recorder/exporter it wants. With
//! no recorder installed every call here is a no-op.
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: connection attempt outcomes (5 values)
//! - `reason`: termination reasons (5 values)
//! - `event_type`: coordinator event types (~25 values)
//! - `action`: action names (11 values)
//! - `operation`: backend operations (21 values)
//! - `status`: success, error
//! - `error_kind`: `CallError` kinds (6 values)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Session Metrics
// ============================================================================

/// Record a connection attempt.
///
/// Metric: `call_client_connection_attempts_total`
/// Labels: `outcome` (success, network, authentication, rejected, timeout)
pub fn record_connection_attempt(outcome: &'static str) {
    counter!("call_client_connection_attempts_total", "outcome" => outcome).increment(1);
}

/// Record a reconnect being scheduled after a live connection ended.
///
/// Metric: `call_client_reconnects_total`
/// Labels: `reason` (normal_close, cancelled, network, authentication, rejected)
pub fn record_reconnect(reason: &'static str) {
    counter!("call_client_reconnects_total", "reason" => reason).increment(1);
}

/// Record a credential refresh forced by an authentication rejection.
///
/// Metric: `call_client_credential_refreshes_total`
/// Labels: `trigger` (connect, backend_call)
pub fn record_credential_refresh(trigger: &'static str) {
    counter!("call_client_credential_refreshes_total", "trigger" => trigger).increment(1);
}

/// Set whether the coordinator connection is currently up.
///
/// Metric: `call_client_connected`
/// Labels: none
pub fn set_connected(connected: bool) {
    gauge!("call_client_connected").set(if connected { 1.0 } else { 0.0 });
}

// ============================================================================
// Store Metrics
// ============================================================================

/// Record a coordinator event consumed by the store.
///
/// Metric: `call_client_events_processed_total`
/// Labels: `event_type`
pub fn record_event_processed(event_type: &'static str) {
    counter!("call_client_events_processed_total", "event_type" => event_type).increment(1);
}

/// Record an event dropped because it belonged to an earlier session.
///
/// Metric: `call_client_stale_events_dropped_total`
/// Labels: none
pub fn record_stale_event_dropped() {
    counter!("call_client_stale_events_dropped_total").increment(1);
}

/// Record an action applied by the store.
///
/// Metric: `call_client_actions_dispatched_total`
/// Labels: `action`
pub fn record_action_dispatched(action: &'static str) {
    counter!("call_client_actions_dispatched_total", "action" => action).increment(1);
}

/// Set the number of participants in the current snapshot.
///
/// Metric: `call_client_participants`
/// Labels: none
pub fn set_participants(count: usize) {
    // usize to f64 is exact for any realistic participant count
    #[allow(clippy::cast_precision_loss)]
    gauge!("call_client_participants").set(count as f64);
}

// ============================================================================
// Backend Call Metrics
// ============================================================================

/// Record a backend call with its latency.
///
/// Metrics: `call_client_backend_call_duration_seconds`, `call_client_backend_calls_total`
/// Labels: `operation`, `status` (success, error)
pub fn record_backend_call(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!(
        "call_client_backend_call_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!(
        "call_client_backend_calls_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record a failed backend call by error category.
///
/// Metric: `call_client_backend_errors_total`
/// Labels: `operation`, `error_kind`
pub fn record_backend_error(operation: &'static str, error_kind: &'static str) {
    counter!(
        "call_client_backend_errors_total",
        "operation" => operation,
        "error_kind" => error_kind
    )
    .increment(1);
}
