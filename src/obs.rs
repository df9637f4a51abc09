//! Spans and counters around the provider round-trips and the gate.
//!
//! Every provider-facing flow (sign-in callback, silent refresh, logout) runs inside an
//! `oidc_session.flow` span whose `outcome` field is filled in when the flow settles. With the
//! `metrics` feature the same settlement feeds:
//!
//! - `oidc_session_flow_total{flow,outcome}`, one increment per attempt and per settlement;
//! - `oidc_session_flow_seconds{flow,outcome}`, the wall time of each settled flow;
//! - `oidc_session_gate_total{state,decision}`, one increment per gated request.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Provider round-trips worth observing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// `grant_type=refresh_token` on behalf of an expiring session.
	Refresh,
	/// `grant_type=authorization_code` at the callback route.
	CodeExchange,
	/// ID-token re-fetch plus back-channel logout.
	SignOut,
}
impl FlowKind {
	/// Label used for the `flow` span field and metric label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Refresh => "refresh",
			Self::CodeExchange => "code_exchange",
			Self::SignOut => "sign_out",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// How far a flow got.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// The flow started.
	Attempt,
	/// The provider answered and the session was updated.
	Success,
	/// The provider refused or could not be reached.
	Failure,
}
impl FlowOutcome {
	/// Label used for the `outcome` span field and metric label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Attempt => "attempt",
			Self::Success => "success",
			Self::Failure => "failure",
		}
	}

	/// Maps a settled result onto [`FlowOutcome::Success`] or [`FlowOutcome::Failure`].
	pub fn of<T, E>(result: &std::result::Result<T, E>) -> Self {
		if result.is_ok() { Self::Success } else { Self::Failure }
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn outcome_follows_the_result() {
		let ok: std::result::Result<(), ()> = Ok(());

		assert_eq!(FlowOutcome::of(&ok), FlowOutcome::Success);
		assert_eq!(FlowOutcome::of(&Err::<(), _>("refused")), FlowOutcome::Failure);
		assert_eq!(FlowKind::CodeExchange.to_string(), "code_exchange");
	}
}
