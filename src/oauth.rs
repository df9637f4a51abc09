//! OAuth client facade over the `oauth2` crate, specialized for OIDC token responses.
//!
//! The facade owns request construction and error mapping; [`crate::provider::ProviderClient`]
//! layers Keycloak endpoint knowledge, identity validation, and logout URLs on top.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, AuthorizationCode, Client, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, ExtraTokenFields, HttpClientError, HttpRequest, PkceCodeVerifier, RedirectUrl,
	RefreshToken, RequestTokenError, StandardRevocableToken, StandardTokenResponse, TokenResponse,
	TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenType,
	},
	http::{
		Method,
		header::{ACCEPT, CONTENT_TYPE, HeaderValue},
	},
};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, ProviderError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{ProviderErrorKind, TokenExchange},
	session::TokenSecret,
};

/// Extra token response fields returned by an OpenID Connect provider.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OidcTokenFields {
	/// ID token (compact JWS), present for `openid` scoped grants.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for OidcTokenFields {}

/// Token response type produced by the facade.
pub type OidcTokenResponse = StandardTokenResponse<OidcTokenFields, BasicTokenType>;

type ConfiguredClient = Client<
	BasicErrorResponse,
	OidcTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;
type FacadeRequestError<E> = RequestTokenError<HttpClientError<E>, BasicErrorResponse>;

pub(crate) struct OidcFacade<C>
where
	C: ?Sized + TokenHttpClient,
{
	oauth_client: ConfiguredClient,
	http_client: Arc<C>,
}
impl<C> OidcFacade<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Builds a client that authenticates with `client_secret_post`, which Keycloak confidential
	/// clients accept and which keeps the secret out of logged headers.
	pub(crate) fn new(
		token_endpoint: &Url,
		client_id: &str,
		client_secret: &str,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		let oauth_client = Client::new(ClientId::new(client_id.to_owned()))
			.set_client_secret(ClientSecret::new(client_secret.to_owned()))
			.set_token_uri(TokenUrl::from_url(token_endpoint.clone()))
			.set_auth_type(AuthType::RequestBody);

		Self { oauth_client, http_client: http_client.into() }
	}

	pub(crate) fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> FacadeFuture<'a, TokenExchange> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&refresh_secret)
				.request_async(&instrumented)
				.await
				.map_err(|err| map_request_error(meta.take(), err))?;

			map_token_response(response)
		})
	}

	pub(crate) fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		pkce_verifier: &'a str,
		redirect_uri: &'a Url,
	) -> FacadeFuture<'a, TokenExchange> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_owned()))
				.set_redirect_uri(Cow::Owned(RedirectUrl::from_url(redirect_uri.clone())))
				.request_async(&instrumented)
				.await
				.map_err(|err| map_request_error(meta.take(), err))?;

			map_token_response(response)
		})
	}

	/// POSTs a form to a provider endpoint outside the token grant machinery.
	///
	/// Any 2xx answer counts as success.
	pub(crate) fn post_form<'a>(
		&'a self,
		endpoint: &'a Url,
		form: Vec<(&'static str, String)>,
	) -> FacadeFuture<'a, ()> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let body = url::form_urlencoded::Serializer::new(String::new())
				.extend_pairs(form.iter().map(|(key, value)| (*key, value.as_str())))
				.finish();
			let request: HttpRequest = oauth2::http::Request::builder()
				.method(Method::POST)
				.uri(endpoint.as_str())
				.header(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"))
				.header(ACCEPT, HeaderValue::from_static("application/json"))
				.body(body.into_bytes())
				.map_err(ConfigError::from)?;
			let response = instrumented
				.call(request)
				.await
				.map_err(|err| map_transport_error(meta.take().as_ref(), err))?;
			let status = response.status();

			if status.is_success() {
				return Ok(());
			}

			let body = crate::http::preview(response.body());
			let kind = ProviderErrorKind::classify(None, None, Some(&body), Some(status.as_u16()));

			Err(ProviderError::Rejected { status: status.as_u16(), kind, body }.into())
		})
	}
}

fn map_token_response(response: OidcTokenResponse) -> Result<TokenExchange> {
	let expires_in = response.expires_in().ok_or(ProviderError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ProviderError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ProviderError::NonPositiveExpiresIn.into());
	}

	Ok(TokenExchange {
		access_token: TokenSecret::new(response.access_token().secret().to_owned()),
		refresh_token: response
			.refresh_token()
			.map(|token| TokenSecret::new(token.secret().to_owned()))
			.filter(|secret| !secret.is_empty()),
		id_token: response.extra_fields().id_token.clone().filter(|token| !token.is_empty()),
		expires_in: Duration::seconds(expires_in),
	})
}

fn map_request_error<E>(meta: Option<ResponseMetadata>, err: FacadeRequestError<E>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => {
			let status = meta_status(meta_ref).unwrap_or(400);
			let body = meta_body(meta_ref);
			let kind = ProviderErrorKind::classify(
				Some(response.error().as_ref()),
				response.error_description().map(String::as_str),
				Some(&body),
				Some(status),
			);

			ProviderError::Rejected { status, kind, body }.into()
		},
		RequestTokenError::Request(error) => map_transport_error(meta_ref, error),
		RequestTokenError::Parse(source, _body) => match rejection(meta_ref) {
			Some(rejected) => rejected.into(),
			None => ProviderError::MalformedResponse { source, status: meta_status(meta_ref) }.into(),
		},
		RequestTokenError::Other(message) => match rejection(meta_ref) {
			Some(rejected) => rejected.into(),
			None => ProviderError::Unexpected { message, status: meta_status(meta_ref) }.into(),
		},
	}
}

fn map_transport_error<E>(meta: Option<&ResponseMetadata>, err: HttpClientError<E>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		HttpClientError::Reqwest(inner) => ProviderError::Network { source: inner }.into(),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => ProviderError::Io(inner).into(),
		HttpClientError::Other(message) =>
			ProviderError::Unexpected { message, status: meta_status(meta) }.into(),
		_ => ProviderError::Unexpected {
			message: "HTTP client error occurred while calling the identity provider".into(),
			status: meta_status(meta),
		}
		.into(),
	}
}

/// Non-2xx answers whose body was not an OAuth error document.
fn rejection(meta: Option<&ResponseMetadata>) -> Option<ProviderError> {
	let meta = meta.filter(|meta| meta.is_failure())?;
	let status = meta.status?;
	let body = meta.body_preview.clone().unwrap_or_default();
	let kind = ProviderErrorKind::classify(None, None, Some(&body), Some(status));

	Some(ProviderError::Rejected { status, kind, body })
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_body(meta: Option<&ResponseMetadata>) -> String {
	meta.and_then(|value| value.body_preview.clone()).unwrap_or_default()
}
