//! Freshness classification for token records.

// self
use crate::{_prelude::*, session::TokenRecord};

/// Seconds before expiry at which a record is already treated as needing a refresh.
pub const REFRESH_SKEW: Duration = Duration::seconds(60);

/// Result of classifying a record at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
	/// Access token stays valid beyond the skew window.
	Fresh,
	/// Access token expires within the skew window (or already has).
	NeedsRefresh,
	/// A previous refresh failed; no further refresh is attempted.
	Errored,
}

/// Classifies `record` at `now`.
///
/// An errored record is never reported as needing a refresh, so a failed refresh cannot be retried
/// on every request.
pub fn classify(record: &TokenRecord, now: OffsetDateTime) -> SessionState {
	if record.is_errored() {
		return SessionState::Errored;
	}

	let threshold = record.expires_at.saturating_sub(REFRESH_SKEW.whole_seconds());

	if now.unix_timestamp() >= threshold { SessionState::NeedsRefresh } else { SessionState::Fresh }
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::session::Identity;

	fn record(expires_at: i64) -> TokenRecord {
		TokenRecord::builder(Identity {
			subject_id: "user-1".into(),
			display_name: "Ada".into(),
			email: None,
		})
		.access_token("at1")
		.refresh_token("rt1")
		.expires_at(expires_at)
		.build()
		.expect("Record should build.")
	}

	#[test]
	fn skew_boundary_is_inclusive() {
		let now = macros::datetime!(2025-01-01 12:00 UTC);
		let t = now.unix_timestamp();

		assert_eq!(record(t + 3600).classify(now), SessionState::Fresh);
		assert_eq!(record(t + 61).classify(now), SessionState::Fresh);
		assert_eq!(record(t + 60).classify(now), SessionState::NeedsRefresh);
		assert_eq!(record(t + 30).classify(now), SessionState::NeedsRefresh);
		assert_eq!(record(t - 10).classify(now), SessionState::NeedsRefresh);
	}

	#[test]
	fn errored_wins_over_expiry() {
		let now = macros::datetime!(2025-01-01 12:00 UTC);

		assert_eq!(record(now.unix_timestamp() - 10).into_failed().classify(now), SessionState::Errored);
		assert_eq!(
			record(now.unix_timestamp() + 3600).into_failed().classify(now),
			SessionState::Errored
		);
	}

	#[test]
	fn extreme_expiry_does_not_overflow() {
		let now = macros::datetime!(2025-01-01 12:00 UTC);

		assert_eq!(record(i64::MIN).classify(now), SessionState::NeedsRefresh);
		assert_eq!(record(i64::MAX).classify(now), SessionState::Fresh);
	}
}
