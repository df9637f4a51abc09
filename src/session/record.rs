//! The sealed token record, its builder, and the read-only session projection.

// self
use crate::{
	_prelude::*,
	provider::TokenExchange,
	session::{Identity, SessionState, TokenSecret, state},
};

/// Error marker carried by a record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorState {
	/// No failure recorded.
	#[default]
	#[serde(rename = "none")]
	Clear,
	/// The last refresh attempt failed; the record must not be refreshed again.
	RefreshFailed,
}

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Authoritative session state; only ever leaves the server sealed inside the session cookie.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Provider subject identifier.
	pub subject_id: String,
	/// Human readable name.
	pub display_name: String,
	/// E-mail address, if released by the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Access token for downstream resource APIs.
	pub access_token: TokenSecret,
	/// Refresh token; absent when the provider never issued one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Access token expiry, epoch seconds.
	pub expires_at: i64,
	/// Failure marker.
	#[serde(default)]
	pub error: ErrorState,
}
impl TokenRecord {
	/// Returns a builder for the given identity.
	pub fn builder(identity: Identity) -> TokenRecordBuilder {
		TokenRecordBuilder::new(identity)
	}

	/// Creates the initial record from an authorization-code exchange.
	pub fn from_exchange(identity: Identity, exchange: &TokenExchange, now: OffsetDateTime) -> Self {
		let Identity { subject_id, display_name, email } = identity;

		Self {
			subject_id,
			display_name,
			email,
			access_token: exchange.access_token.clone(),
			refresh_token: exchange.refresh_token.clone().filter(|secret| !secret.is_empty()),
			expires_at: expiry_after(now, exchange.expires_in),
			error: ErrorState::Clear,
		}
	}

	/// Identity claims carried by the record.
	pub fn identity(&self) -> Identity {
		Identity {
			subject_id: self.subject_id.clone(),
			display_name: self.display_name.clone(),
			email: self.email.clone(),
		}
	}

	/// Returns the refresh token unless it is absent or empty.
	pub fn refresh_secret(&self) -> Option<&TokenSecret> {
		self.refresh_token.as_ref().filter(|secret| !secret.is_empty())
	}

	/// Classifies the record at `now`.
	pub fn classify(&self, now: OffsetDateTime) -> SessionState {
		state::classify(self, now)
	}

	/// Returns `true` once a refresh has failed for this record.
	pub fn is_errored(&self) -> bool {
		matches!(self.error, ErrorState::RefreshFailed)
	}

	/// Applies a successful refresh exchange.
	///
	/// Identity is carried over untouched. The refresh token is replaced only when the provider
	/// rotated it; otherwise the prior one stays valid and is kept.
	pub fn refreshed(&self, exchange: &TokenExchange, now: OffsetDateTime) -> Self {
		let refresh_token = exchange
			.refresh_token
			.clone()
			.filter(|secret| !secret.is_empty())
			.or_else(|| self.refresh_token.clone());

		Self {
			subject_id: self.subject_id.clone(),
			display_name: self.display_name.clone(),
			email: self.email.clone(),
			access_token: exchange.access_token.clone(),
			refresh_token,
			expires_at: expiry_after(now, exchange.expires_in),
			error: ErrorState::Clear,
		}
	}

	/// Marks the record as failed.
	pub fn into_failed(mut self) -> Self {
		self.error = ErrorState::RefreshFailed;

		self
	}

	/// Builds the read-only projection handed to application code.
	pub fn session(&self) -> Session {
		Session {
			user_id: self.subject_id.clone(),
			display_name: self.display_name.clone(),
			email: self.email.clone(),
			access_token: self.access_token.clone(),
			expires_at: OffsetDateTime::from_unix_timestamp(self.expires_at)
				.unwrap_or(OffsetDateTime::UNIX_EPOCH),
			error: self.is_errored().then_some(SessionError::RefreshAccessToken),
		}
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("subject_id", &self.subject_id)
			.field("display_name", &self.display_name)
			.field("email", &self.email)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.field("error", &self.error)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug)]
pub struct TokenRecordBuilder {
	identity: Identity,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<i64>,
	expires_in: Option<Duration>,
	error: ErrorState,
}
impl TokenRecordBuilder {
	fn new(identity: Identity) -> Self {
		Self {
			identity,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
			error: ErrorState::Clear,
		}
	}

	/// Sets the instant relative expiries are measured from (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry in epoch seconds.
	pub fn expires_at(mut self, epoch_seconds: i64) -> Self {
		self.expires_at = Some(epoch_seconds);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value; empty strings count as absent.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token)).filter(|secret| !secret.is_empty());

		self
	}

	/// Sets the failure marker.
	pub fn error(mut self, error: ErrorState) -> Self {
		self.error = error;

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(epoch_seconds), _) => epoch_seconds,
			(None, Some(delta)) =>
				expiry_after(self.issued_at.unwrap_or_else(OffsetDateTime::now_utc), delta),
			(None, None) => return Err(TokenRecordBuilderError::MissingExpiry),
		};
		let Identity { subject_id, display_name, email } = self.identity;

		Ok(TokenRecord {
			subject_id,
			display_name,
			email,
			access_token,
			refresh_token: self.refresh_token,
			expires_at,
			error: self.error,
		})
	}
}

/// Failure surfaced to application code through [`Session::error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionError {
	/// The access token could not be renewed; the user must sign in again.
	RefreshAccessToken,
}
impl SessionError {
	/// Stable label for templates and logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			SessionError::RefreshAccessToken => "RefreshAccessTokenError",
		}
	}
}
impl Display for SessionError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Read-only view of a record, created fresh on every read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
	/// Provider subject identifier.
	pub user_id: String,
	/// Human readable name.
	pub display_name: String,
	/// E-mail address, if released by the provider.
	pub email: Option<String>,
	/// Access token for calling protected resource APIs server-side.
	pub access_token: TokenSecret,
	/// Access token expiry.
	pub expires_at: OffsetDateTime,
	/// Set when the session can no longer be renewed.
	pub error: Option<SessionError>,
}

fn expiry_after(now: OffsetDateTime, expires_in: Duration) -> i64 {
	now.unix_timestamp().saturating_add(expires_in.whole_seconds())
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn identity() -> Identity {
		Identity {
			subject_id: "user-1".into(),
			display_name: "Ada".into(),
			email: Some("ada@example.com".into()),
		}
	}

	fn exchange(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenExchange {
		TokenExchange {
			access_token: TokenSecret::new(access),
			refresh_token: refresh.map(TokenSecret::new),
			id_token: None,
			expires_in: Duration::seconds(expires_in),
		}
	}

	#[test]
	fn builder_handles_relative_expiry_and_empty_refresh() {
		let record = TokenRecord::builder(identity())
			.access_token("secret")
			.refresh_token("")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Builder should support relative expiry.");

		assert_eq!(record.expires_at, macros::datetime!(2025-01-01 00:30 UTC).unix_timestamp());
		assert!(record.refresh_token.is_none());
		assert!(record.refresh_secret().is_none());
	}

	#[test]
	fn builder_requires_access_token_and_expiry() {
		assert_eq!(
			TokenRecord::builder(identity()).expires_at(0).build(),
			Err(TokenRecordBuilderError::MissingAccessToken)
		);
		assert_eq!(
			TokenRecord::builder(identity()).access_token("a").build(),
			Err(TokenRecordBuilderError::MissingExpiry)
		);
	}

	#[test]
	fn refresh_keeps_prior_refresh_token_when_not_rotated() {
		let now = macros::datetime!(2025-01-01 12:00 UTC);
		let record = TokenRecord::builder(identity())
			.access_token("at1")
			.refresh_token("rt1")
			.expires_at(now.unix_timestamp() - 1)
			.build()
			.expect("Record should build.");
		let updated = record.refreshed(&exchange("at2", None, 3600), now);

		assert_eq!(updated.access_token.expose(), "at2");
		assert_eq!(updated.refresh_secret().map(TokenSecret::expose), Some("rt1"));
		assert_eq!(updated.expires_at, now.unix_timestamp() + 3600);
		assert_eq!(updated.error, ErrorState::Clear);
		assert_eq!(updated.identity(), record.identity());

		let rotated = record.refreshed(&exchange("at3", Some("rt2"), 60), now);

		assert_eq!(rotated.refresh_secret().map(TokenSecret::expose), Some("rt2"));
	}

	#[test]
	fn failed_record_projects_session_error() {
		let record = TokenRecord::builder(identity())
			.access_token("at1")
			.expires_at(1_700_000_000)
			.build()
			.expect("Record should build.")
			.into_failed();
		let session = record.session();

		assert_eq!(session.error, Some(SessionError::RefreshAccessToken));
		assert_eq!(session.user_id, "user-1");
		assert_eq!(session.expires_at.unix_timestamp(), 1_700_000_000);
		assert_eq!(
			session.error.map(SessionError::as_str),
			Some("RefreshAccessTokenError")
		);
	}

	#[test]
	fn error_state_uses_wire_labels() {
		assert_eq!(
			serde_json::to_string(&ErrorState::Clear).expect("State should serialize."),
			"\"none\""
		);
		assert_eq!(
			serde_json::to_string(&ErrorState::RefreshFailed).expect("State should serialize."),
			"\"refresh_failed\""
		);
	}

	#[test]
	fn debug_redacts_tokens() {
		let record = TokenRecord::builder(identity())
			.access_token("very-secret-access")
			.refresh_token("very-secret-refresh")
			.expires_at(0)
			.build()
			.expect("Record should build.");
		let rendered = format!("{record:?}");

		assert!(!rendered.contains("very-secret"));
	}
}
