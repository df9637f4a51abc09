//! Redacting wrapper for access and refresh tokens.

// self
use crate::_prelude::*;

/// Access or refresh token that never prints its value.
///
/// Serialization is transparent so the sealed cookie stores the raw token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a token.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw token, for provider calls and the `Authorization` header only.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Keycloak occasionally answers with an empty refresh token; callers treat it as absent.
	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TokenSecret(<{} bytes redacted>)", self.0.len())
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
