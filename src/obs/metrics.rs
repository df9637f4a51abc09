// std
use std::time::Duration;
// self
use crate::{
	gate::{GateDecision, GateState},
	obs::{FlowKind, FlowOutcome},
};

/// Counter of flow attempts and settlements.
pub const FLOW_TOTAL: &str = "oidc_session_flow_total";
/// Histogram of settled flow durations, in seconds.
pub const FLOW_SECONDS: &str = "oidc_session_flow_seconds";
/// Counter of gate decisions.
pub const GATE_TOTAL: &str = "oidc_session_gate_total";

/// Counts one flow event. A no-op without the `metrics` feature.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(FLOW_TOTAL, "flow" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Records how long a settled flow took. A no-op without the `metrics` feature.
pub fn record_flow_duration(kind: FlowKind, outcome: FlowOutcome, elapsed: Duration) {
	#[cfg(feature = "metrics")]
	metrics::histogram!(FLOW_SECONDS, "flow" => kind.as_str(), "outcome" => outcome.as_str())
		.record(elapsed.as_secs_f64());

	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome, elapsed);
}

/// Counts one gated request. A no-op without the `metrics` feature.
pub fn record_gate_decision(state: GateState, decision: GateDecision) {
	#[cfg(feature = "metrics")]
	metrics::counter!(GATE_TOTAL, "state" => state.as_str(), "decision" => decision.as_str())
		.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (state, decision);
}
