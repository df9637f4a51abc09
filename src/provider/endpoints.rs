//! Keycloak endpoint layout derived from the realm issuer.

// self
use crate::{_prelude::*, error::ConfigError};

/// OpenID Connect endpoints of a Keycloak realm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderEndpoints {
	/// Authorization endpoint (`/protocol/openid-connect/auth`).
	pub authorization: Url,
	/// Token endpoint (`/protocol/openid-connect/token`).
	pub token: Url,
	/// End-session endpoint (`/protocol/openid-connect/logout`).
	pub end_session: Url,
}
impl ProviderEndpoints {
	/// Derives the endpoints from a realm issuer such as `https://sso.example.com/realms/app`.
	pub fn from_issuer(issuer: &Url) -> Result<Self, ConfigError> {
		let base = issuer.as_str().trim_end_matches('/');
		let endpoint = |suffix: &str| {
			Url::parse(&format!("{base}/protocol/openid-connect/{suffix}"))
				.map_err(|source| ConfigError::InvalidUrl { key: "KEYCLOAK_ISSUER", source })
		};

		Ok(Self {
			authorization: endpoint("auth")?,
			token: endpoint("token")?,
			end_session: endpoint("logout")?,
		})
	}
}
