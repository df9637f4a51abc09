//! Heuristic classification of provider failures.
//!
//! Structured OAuth fields (`error`, `error_description`) win, then body text hints, and finally
//! the HTTP status code. The kind only feeds logs and metrics; every failure ends in the same
//! errored record.

// self
use crate::_prelude::*;

/// Canonical provider error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the grant (expired, revoked, or rotated-away refresh token).
	InvalidGrant,
	/// Client authentication failed; usually a configuration problem.
	InvalidClient,
	/// Failure looks temporary (5xx, throttling, maintenance).
	Transient,
}
impl ProviderErrorKind {
	/// Classifies a failed provider response.
	pub fn classify(
		oauth_error: Option<&str>,
		error_description: Option<&str>,
		body: Option<&str>,
		status: Option<u16>,
	) -> Self {
		oauth_error
			.and_then(match_exact_value)
			.or_else(|| error_description.and_then(match_exact_value))
			.or_else(|| classify_body(error_description))
			.or_else(|| classify_body(body))
			.unwrap_or_else(|| classify_status(status))
	}

	/// Returns a stable label suitable for log or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderErrorKind::InvalidGrant => "invalid_grant",
			ProviderErrorKind::InvalidClient => "invalid_client",
			ProviderErrorKind::Transient => "transient",
		}
	}
}
impl Display for ProviderErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// OAuth `error` codes, compared case-insensitively.
const ERROR_CODES: &[(&str, ProviderErrorKind)] = &[
	("invalid_grant", ProviderErrorKind::InvalidGrant),
	("access_denied", ProviderErrorKind::InvalidGrant),
	("invalid_client", ProviderErrorKind::InvalidClient),
	("unauthorized_client", ProviderErrorKind::InvalidClient),
	("server_error", ProviderErrorKind::Transient),
	("temporarily_unavailable", ProviderErrorKind::Transient),
];
/// Substrings Keycloak puts in descriptions and HTML error pages.
const BODY_HINTS: &[(&str, ProviderErrorKind)] = &[
	("invalid_grant", ProviderErrorKind::InvalidGrant),
	("session not active", ProviderErrorKind::InvalidGrant),
	("token is not active", ProviderErrorKind::InvalidGrant),
	("stale token", ProviderErrorKind::InvalidGrant),
	("invalid_client", ProviderErrorKind::InvalidClient),
	("invalid client credentials", ProviderErrorKind::InvalidClient),
	("temporarily_unavailable", ProviderErrorKind::Transient),
	("retry", ProviderErrorKind::Transient),
];

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	let value = value.trim();

	ERROR_CODES.iter().find(|(code, _)| value.eq_ignore_ascii_case(code)).map(|&(_, kind)| kind)
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	BODY_HINTS.iter().find(|(hint, _)| lowered.contains(hint)).map(|&(_, kind)| kind)
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401 | 403) => ProviderErrorKind::InvalidClient,
		_ => ProviderErrorKind::Transient,
	}
}
