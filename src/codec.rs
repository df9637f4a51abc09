//! Authenticated encryption of session artifacts.
//!
//! Records are wrapped in a versioned envelope carrying the issue time, serialized to JSON, and
//! sealed with AES-256-GCM through the `cookie` crate's private jar (the cookie name is bound as
//! associated data, so an artifact cannot be replayed under a different cookie). The artifact is
//! only ever readable by the server.

// crates.io
use cookie::{Cookie, CookieJar, Key};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha512};
// self
use crate::{
	_prelude::*,
	config::SessionConfig,
	error::{ConfigError, DecodeError},
	session::TokenRecord,
};

/// Validity window of the pending-login artifact.
pub const LOGIN_MAX_AGE: Duration = Duration::minutes(10);

const ENVELOPE_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
	v: u8,
	iat: i64,
	rec: T,
}

/// State carried across the provider round trip between `/signin` and the callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
	/// CSRF state echoed by the provider.
	pub state: String,
	/// Nonce expected inside the ID token.
	pub nonce: String,
	/// PKCE code verifier.
	pub pkce_verifier: String,
	/// Normalized destination after sign-in.
	pub callback_url: String,
}

/// Seals and opens session artifacts.
#[derive(Clone)]
pub struct TokenCodec {
	key: Key,
	cookie_name: String,
	login_cookie_name: String,
	max_age: Duration,
}
impl TokenCodec {
	/// Derives the sealing key and cookie names from configuration.
	pub fn new(config: &SessionConfig) -> Result<Self, ConfigError> {
		Self::from_secret(
			&config.signing_secret,
			config.session_cookie_name(),
			config.login_cookie_name(),
			config.max_age,
		)
	}

	/// Builds a codec from raw parts.
	///
	/// The 512-bit key is the SHA-512 digest of `secret`; rotating the secret invalidates every
	/// outstanding artifact.
	pub fn from_secret(
		secret: &str,
		cookie_name: impl Into<String>,
		login_cookie_name: impl Into<String>,
		max_age: Duration,
	) -> Result<Self, ConfigError> {
		let digest = Sha512::digest(secret.as_bytes());
		let key = Key::try_from(digest.as_slice()).map_err(|_| ConfigError::SealingKey)?;

		Ok(Self {
			key,
			cookie_name: cookie_name.into(),
			login_cookie_name: login_cookie_name.into(),
			max_age,
		})
	}

	/// Name of the session cookie.
	pub fn cookie_name(&self) -> &str {
		&self.cookie_name
	}

	/// Name of the pending-login cookie.
	pub fn login_cookie_name(&self) -> &str {
		&self.login_cookie_name
	}

	/// Session lifetime.
	pub fn max_age(&self) -> Duration {
		self.max_age
	}

	/// Seals `record` into an opaque artifact.
	pub fn encode(&self, record: &TokenRecord) -> Result<String> {
		self.encode_at(record, OffsetDateTime::now_utc())
	}

	/// Seals `record`, stamping the envelope with `now`.
	///
	/// Each re-issue restarts the validity window.
	pub fn encode_at(&self, record: &TokenRecord, now: OffsetDateTime) -> Result<String> {
		self.seal(&self.cookie_name, record, now)
	}

	/// Opens an artifact.
	pub fn decode(&self, artifact: Option<&str>) -> Result<TokenRecord, DecodeError> {
		self.decode_at(artifact, OffsetDateTime::now_utc())
	}

	/// Opens an artifact, judging its age against `now`.
	pub fn decode_at(
		&self,
		artifact: Option<&str>,
		now: OffsetDateTime,
	) -> Result<TokenRecord, DecodeError> {
		self.open(&self.cookie_name, artifact, self.max_age, now)
	}

	/// Seals the pending-login state.
	pub fn encode_login(&self, pending: &PendingLogin) -> Result<String> {
		self.seal(&self.login_cookie_name, pending, OffsetDateTime::now_utc())
	}

	/// Opens the pending-login state.
	pub fn decode_login(&self, artifact: Option<&str>) -> Result<PendingLogin, DecodeError> {
		self.open(&self.login_cookie_name, artifact, LOGIN_MAX_AGE, OffsetDateTime::now_utc())
	}

	fn seal<T>(&self, name: &str, rec: &T, now: OffsetDateTime) -> Result<String>
	where
		T: Serialize,
	{
		let envelope = Envelope { v: ENVELOPE_VERSION, iat: now.unix_timestamp(), rec };
		let plaintext = serde_json::to_string(&envelope)?;
		let mut jar = CookieJar::new();

		jar.private_mut(&self.key).add(Cookie::new(name.to_owned(), plaintext));

		// The jar holds the sealed form; the plaintext never leaves this function.
		jar.get(name).map(|cookie| cookie.value().to_owned()).ok_or(Error::Decode(DecodeError::Malformed))
	}

	fn open<T>(
		&self,
		name: &str,
		artifact: Option<&str>,
		max_age: Duration,
		now: OffsetDateTime,
	) -> Result<T, DecodeError>
	where
		T: DeserializeOwned,
	{
		let artifact = artifact.map(str::trim).filter(|value| !value.is_empty()).ok_or(DecodeError::Absent)?;
		let jar = CookieJar::new();
		let opened = jar
			.private(&self.key)
			.decrypt(Cookie::new(name.to_owned(), artifact.to_owned()))
			.ok_or(DecodeError::SignatureInvalid)?;
		let envelope = serde_json::from_str::<Envelope<T>>(opened.value())
			.map_err(|_| DecodeError::Malformed)?;

		if envelope.v != ENVELOPE_VERSION {
			return Err(DecodeError::Malformed);
		}
		if now.unix_timestamp().saturating_sub(envelope.iat) > max_age.whole_seconds() {
			return Err(DecodeError::Expired);
		}

		Ok(envelope.rec)
	}
}
impl Debug for TokenCodec {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCodec")
			.field("key", &"<redacted>")
			.field("cookie_name", &self.cookie_name)
			.field("login_cookie_name", &self.login_cookie_name)
			.field("max_age", &self.max_age)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::session::Identity;

	const SECRET: &str = "0123456789abcdef0123456789abcdef-codec";

	fn codec(secret: &str) -> TokenCodec {
		TokenCodec::from_secret(secret, "app-session-token", "app-login-state", Duration::hours(4))
			.expect("Codec should build.")
	}

	fn record() -> TokenRecord {
		TokenRecord::builder(Identity {
			subject_id: "user-1".into(),
			display_name: "Ada".into(),
			email: Some("ada@example.com".into()),
		})
		.access_token("at1")
		.refresh_token("rt1")
		.expires_at(1_735_732_800)
		.build()
		.expect("Record should build.")
	}

	#[test]
	fn round_trip_preserves_record() {
		let codec = codec(SECRET);
		let now = macros::datetime!(2025-01-01 12:00 UTC);
		let artifact = codec.encode_at(&record(), now).expect("Record should seal.");

		assert!(!artifact.contains("at1"));
		assert!(!artifact.contains("ada@example.com"));
		assert_eq!(codec.decode_at(Some(&artifact), now), Ok(record()));
	}

	#[test]
	fn tampered_or_foreign_artifacts_are_rejected() {
		let codec = codec(SECRET);
		let now = macros::datetime!(2025-01-01 12:00 UTC);
		let artifact = codec.encode_at(&record(), now).expect("Record should seal.");
		let mut bytes = artifact.clone().into_bytes();
		let middle = bytes.len() / 2;

		bytes[middle] = if bytes[middle] == b'A' { b'B' } else { b'A' };

		let tampered = String::from_utf8(bytes).expect("Artifact should stay ASCII.");

		assert_eq!(codec.decode_at(Some(&tampered), now), Err(DecodeError::SignatureInvalid));
		assert_eq!(
			self::codec("another-secret-another-secret-another").decode_at(Some(&artifact), now),
			Err(DecodeError::SignatureInvalid)
		);
		assert_eq!(codec.decode_at(Some("not base64 at all"), now), Err(DecodeError::SignatureInvalid));
	}

	#[test]
	fn artifact_is_bound_to_cookie_name() {
		let codec = codec(SECRET);
		let artifact = codec.encode(&record()).expect("Record should seal.");

		assert!(codec.decode_login(Some(&artifact)).is_err());
	}

	#[test]
	fn absent_and_expired_artifacts() {
		let codec = codec(SECRET);
		let issued = macros::datetime!(2025-01-01 12:00 UTC);
		let artifact = codec.encode_at(&record(), issued).expect("Record should seal.");

		assert_eq!(codec.decode_at(None, issued), Err(DecodeError::Absent));
		assert_eq!(codec.decode_at(Some(""), issued), Err(DecodeError::Absent));
		assert!(codec.decode_at(Some(&artifact), issued + Duration::hours(4)).is_ok());
		assert_eq!(
			codec.decode_at(Some(&artifact), issued + Duration::hours(4) + Duration::seconds(1)),
			Err(DecodeError::Expired)
		);
	}

	#[test]
	fn pending_login_round_trip() {
		let codec = codec(SECRET);
		let pending = PendingLogin {
			state: "s".into(),
			nonce: "n".into(),
			pkce_verifier: "v".into(),
			callback_url: "http://localhost:3000/dashboard".into(),
		};
		let artifact = codec.encode_login(&pending).expect("Pending login should seal.");

		assert_eq!(codec.decode_login(Some(&artifact)), Ok(pending));
		assert!(!format!("{codec:?}").contains(SECRET));
	}
}
