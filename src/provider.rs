//! Outbound calls to the identity provider.
//!
//! `endpoints` derives the Keycloak realm URLs from the issuer, `authorize` builds Authorization
//! Code + PKCE requests, and `classify` maps provider failures into [`ProviderErrorKind`].
//! [`ProviderClient`] owns every HTTP request the crate sends to Keycloak.

pub mod authorize;
pub mod classify;
pub mod endpoints;

pub use authorize::*;
pub use classify::*;
pub use endpoints::*;

// self
use crate::{
	_prelude::*,
	config::SessionConfig,
	http::TokenHttpClient,
	oauth::OidcFacade,
	session::{IdTokenClaims, Identity, TokenSecret},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Successful token endpoint answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenExchange {
	/// New access token.
	pub access_token: TokenSecret,
	/// Rotated refresh token, when the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// ID token; used transiently and never persisted.
	pub id_token: Option<String>,
	/// Access token lifetime.
	pub expires_in: Duration,
}

/// Client for the realm's token and logout endpoints.
pub struct ProviderClient<C>
where
	C: ?Sized + TokenHttpClient,
{
	issuer: Url,
	client_id: String,
	client_secret: String,
	redirect_uri: Url,
	post_logout_redirect_uri: Url,
	scopes: Vec<String>,
	endpoints: ProviderEndpoints,
	facade: OidcFacade<C>,
}
#[cfg(feature = "reqwest")]
impl ProviderClient<ReqwestHttpClient> {
	/// Builds a client backed by reqwest, bounded by the configured provider timeout.
	pub fn new(config: &SessionConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(config.provider_timeout)?;

		Self::with_http_client(config, http_client)
	}
}
impl<C> ProviderClient<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Builds a client on top of a caller-supplied transport.
	pub fn with_http_client(config: &SessionConfig, http_client: impl Into<Arc<C>>) -> Result<Self> {
		let endpoints = ProviderEndpoints::from_issuer(&config.issuer)?;
		let facade = OidcFacade::new(
			&endpoints.token,
			&config.client_id,
			&config.client_secret,
			http_client,
		);

		Ok(Self {
			issuer: config.issuer.clone(),
			client_id: config.client_id.clone(),
			client_secret: config.client_secret.clone(),
			redirect_uri: config.redirect_uri(),
			post_logout_redirect_uri: config.post_logout_redirect_uri(),
			scopes: config.scopes.clone(),
			endpoints,
			facade,
		})
	}

	/// Realm endpoints used by this client.
	pub fn endpoints(&self) -> &ProviderEndpoints {
		&self.endpoints
	}

	/// Exchanges a refresh token (`grant_type=refresh_token`, client credentials in the body).
	pub async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenExchange> {
		self.facade.refresh_token(refresh_token).await
	}

	/// Exchanges an authorization code plus PKCE verifier for the initial token set.
	pub async fn exchange_code(&self, code: &str, pkce_verifier: &str) -> Result<TokenExchange> {
		self.facade.exchange_code(code, pkce_verifier, &self.redirect_uri).await
	}

	/// Starts an Authorization Code + PKCE sign-in.
	pub fn authorization_request(&self) -> AuthorizationRequest {
		AuthorizationRequest::build(
			&self.endpoints.authorization,
			&self.client_id,
			&self.redirect_uri,
			&self.scopes,
		)
	}

	/// Reads and validates the identity carried by a code exchange's ID token.
	pub fn identity_from(&self, exchange: &TokenExchange, nonce: &str) -> Result<Identity> {
		let id_token = exchange
			.id_token
			.as_deref()
			.ok_or(crate::error::ProviderError::MissingIdToken)?;
		let claims = IdTokenClaims::from_jwt(id_token)?;

		claims.validate(&self.issuer, &self.client_id, Some(nonce))?;

		Ok(claims.identity())
	}

	/// Builds the provider's end-session URL.
	///
	/// `id_token_hint` is attached only when available. Keycloak insists on either the hint or
	/// `client_id` next to `post_logout_redirect_uri`, so the client id fills in when no hint
	/// could be obtained.
	pub fn build_end_session_url(&self, id_token_hint: Option<&str>) -> Url {
		let mut url = self.endpoints.end_session.clone();
		let mut pairs = url.query_pairs_mut();

		match id_token_hint.filter(|hint| !hint.is_empty()) {
			Some(hint) => {
				pairs.append_pair("id_token_hint", hint);
			},
			None => {
				pairs.append_pair("client_id", &self.client_id);
			},
		}

		pairs.append_pair("post_logout_redirect_uri", self.post_logout_redirect_uri.as_str());

		drop(pairs);

		url
	}

	/// Ends the provider-side session through Keycloak's back-channel logout.
	///
	/// Callers treat failures as best effort; nothing local depends on the outcome.
	pub async fn revoke_at_provider(&self, refresh_token: &str) -> Result<()> {
		let form = vec![
			("client_id", self.client_id.clone()),
			("client_secret", self.client_secret.clone()),
			("refresh_token", refresh_token.to_owned()),
		];

		self.facade.post_form(&self.endpoints.end_session, form).await
	}
}
impl<C> Debug for ProviderClient<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderClient")
			.field("issuer", &self.issuer.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("endpoints", &self.endpoints)
			.finish()
	}
}
