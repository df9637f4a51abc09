//! Identity claims read from the provider's ID token at sign-in.
//!
//! The ID token arrives over the back channel (TLS to the token endpoint), so its payload is read
//! without re-verifying the signature; the issuer, audience, and nonce are still checked.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, error::ProviderError};

/// Identity claims carried by a token record; set once, never changed by refreshes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
	/// Provider subject identifier (`sub`).
	pub subject_id: String,
	/// Human readable name.
	pub display_name: String,
	/// E-mail address, when the provider released one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
}

/// Raw ID token claims consumed at sign-in.
#[derive(Clone, Debug, Deserialize)]
pub struct IdTokenClaims {
	/// Issuer.
	pub iss: String,
	/// Subject.
	pub sub: String,
	/// Audience; a single string or an array.
	#[serde(default)]
	pub aud: Audience,
	/// Nonce echoed from the authorization request.
	#[serde(default)]
	pub nonce: Option<String>,
	/// Full name.
	#[serde(default)]
	pub name: Option<String>,
	/// Login name.
	#[serde(default)]
	pub preferred_username: Option<String>,
	/// E-mail address.
	#[serde(default)]
	pub email: Option<String>,
}
impl IdTokenClaims {
	/// Reads the claims from the payload segment of a compact JWS.
	pub fn from_jwt(id_token: &str) -> Result<Self, ProviderError> {
		let mut segments = id_token.split('.');
		let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
			(Some(_), Some(payload), Some(_), None) => payload,
			_ => return Err(invalid("expected three segments")),
		};
		let bytes = URL_SAFE_NO_PAD
			.decode(payload.trim_end_matches('='))
			.map_err(|_| invalid("payload is not base64url"))?;

		serde_json::from_slice(&bytes).map_err(|_| invalid("payload is not a claims object"))
	}

	/// Checks issuer, audience, and nonce against the values this client expects.
	pub fn validate(
		&self,
		issuer: &Url,
		client_id: &str,
		nonce: Option<&str>,
	) -> Result<(), ProviderError> {
		if self.iss.trim_end_matches('/') != issuer.as_str().trim_end_matches('/') {
			return Err(invalid("issuer mismatch"));
		}
		if !self.aud.contains(client_id) {
			return Err(invalid("audience mismatch"));
		}
		if nonce.is_some_and(|expected| self.nonce.as_deref() != Some(expected)) {
			return Err(invalid("nonce mismatch"));
		}

		Ok(())
	}

	/// Projects the claims into the record's identity fields.
	pub fn identity(&self) -> Identity {
		let display_name = self
			.name
			.clone()
			.or_else(|| self.preferred_username.clone())
			.or_else(|| self.email.clone())
			.unwrap_or_else(|| self.sub.clone());

		Identity { subject_id: self.sub.clone(), display_name, email: self.email.clone() }
	}
}

/// `aud` claim, which OIDC allows to be a string or an array of strings.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(untagged)]
pub enum Audience {
	/// Single audience.
	One(String),
	/// Multiple audiences.
	Many(Vec<String>),
	/// Claim absent.
	#[default]
	None,
}
impl Audience {
	/// Returns `true` if `client_id` is among the audiences.
	pub fn contains(&self, client_id: &str) -> bool {
		match self {
			Audience::One(value) => value == client_id,
			Audience::Many(values) => values.iter().any(|value| value == client_id),
			Audience::None => false,
		}
	}
}

fn invalid(reason: &str) -> ProviderError {
	ProviderError::InvalidIdToken { reason: reason.into() }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn jwt(claims: serde_json::Value) -> String {
		let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
		let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

		format!("{header}.{payload}.signature")
	}

	#[test]
	fn reads_identity_from_payload() {
		let token = jwt(serde_json::json!({
			"iss": "https://sso.example.com/realms/cemetery",
			"sub": "8f2c",
			"aud": ["cemetery-web", "account"],
			"nonce": "n-1",
			"preferred_username": "ada",
			"email": "ada@example.com",
		}));
		let claims = IdTokenClaims::from_jwt(&token).expect("Claims should decode.");
		let issuer = Url::parse("https://sso.example.com/realms/cemetery")
			.expect("Issuer fixture should parse.");

		claims.validate(&issuer, "cemetery-web", Some("n-1")).expect("Claims should validate.");

		let identity = claims.identity();

		assert_eq!(identity.subject_id, "8f2c");
		assert_eq!(identity.display_name, "ada");
		assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
	}

	#[test]
	fn rejects_wrong_audience_and_nonce() {
		let token = jwt(serde_json::json!({
			"iss": "https://sso.example.com/realms/cemetery",
			"sub": "8f2c",
			"aud": "someone-else",
			"nonce": "n-1",
		}));
		let claims = IdTokenClaims::from_jwt(&token).expect("Claims should decode.");
		let issuer = Url::parse("https://sso.example.com/realms/cemetery")
			.expect("Issuer fixture should parse.");

		assert!(claims.validate(&issuer, "cemetery-web", Some("n-1")).is_err());

		let token = jwt(serde_json::json!({
			"iss": "https://sso.example.com/realms/cemetery",
			"sub": "8f2c",
			"aud": "cemetery-web",
			"nonce": "other",
		}));
		let claims = IdTokenClaims::from_jwt(&token).expect("Claims should decode.");

		assert!(claims.validate(&issuer, "cemetery-web", Some("n-1")).is_err());
	}

	#[test]
	fn rejects_garbage() {
		assert!(IdTokenClaims::from_jwt("not-a-jwt").is_err());
		assert!(IdTokenClaims::from_jwt("a.!!!.c").is_err());
	}
}
