//! Default-deny request gate for axum.
//!
//! Every request runs the same strictly ordered pipeline: decode the session cookie, classify the
//! record, refresh it if it is about to expire, then decide. Allowlisted paths skip the pipeline
//! entirely. Anything without a usable session is redirected to the login page, except the login
//! page itself.

pub mod cookie;
pub mod paths;
pub mod routes;

pub use self::cookie::CookieSettings;
pub use paths::PublicPaths;
pub use routes::{LoginErrorCode, SIGNIN_PATH, auth_routes};

// std
use std::convert::Infallible;
// crates.io
use axum::{
	Router,
	extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
	http::{HeaderMap, StatusCode, request::Parts},
	middleware::{self, Next},
	response::{IntoResponse, Redirect, Response},
};
// self
use crate::{
	_prelude::*,
	codec::TokenCodec,
	config::{DEFAULT_SINGLEFLIGHT_TTL, SessionConfig},
	error::DecodeError,
	http::TokenHttpClient,
	obs,
	provider::ProviderClient,
	redirect::RedirectNormalizer,
	refresh::RefreshCoordinator,
	session::{Session, SessionState, TokenRecord},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Provider callback route, relative to the base path.
pub const CALLBACK_PATH: &str = "/api/auth/callback/keycloak";

/// Per-request gate state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
	/// Allowlisted path; no checks.
	Public,
	/// Valid (possibly just refreshed) session.
	Authenticated,
	/// No artifact, or one that could not be opened.
	Unauthenticated,
	/// Session whose refresh failed.
	Errored,
}
impl GateState {
	/// Label used in logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Public => "public",
			Self::Authenticated => "authenticated",
			Self::Unauthenticated => "unauthenticated",
			Self::Errored => "errored",
		}
	}
}

/// Outcome of [`decide`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
	/// Hand the request to the application.
	Continue,
	/// Send the browser to the login page.
	RedirectToLogin,
}
impl GateDecision {
	/// Label used in logs and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Continue => "continue",
			Self::RedirectToLogin => "redirect_to_login",
		}
	}
}

/// Transition rule of the gate.
///
/// `Public` and `Authenticated` continue. `Unauthenticated` and `Errored` redirect, unless the
/// request already targets the login page.
pub fn decide(state: GateState, on_login_page: bool) -> GateDecision {
	match state {
		GateState::Public | GateState::Authenticated => GateDecision::Continue,
		GateState::Unauthenticated | GateState::Errored if on_login_page => GateDecision::Continue,
		GateState::Unauthenticated | GateState::Errored => GateDecision::RedirectToLogin,
	}
}

/// Everything the gate and the auth routes share.
pub struct SessionGate<C>
where
	C: ?Sized + TokenHttpClient,
{
	config: Arc<SessionConfig>,
	codec: TokenCodec,
	cookies: CookieSettings,
	coordinator: Arc<RefreshCoordinator<C>>,
	normalizer: RedirectNormalizer,
	public_paths: PublicPaths,
}
#[cfg(feature = "reqwest")]
impl SessionGate<ReqwestHttpClient> {
	/// Builds the gate with a reqwest-backed provider client.
	pub fn new(config: SessionConfig) -> Result<Self> {
		let provider = ProviderClient::new(&config)?;

		Self::with_provider(config, provider)
	}
}
impl<C> SessionGate<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Builds the gate around an existing provider client.
	pub fn with_provider(config: SessionConfig, provider: ProviderClient<C>) -> Result<Self> {
		let codec = TokenCodec::new(&config)?;
		let mut coordinator = RefreshCoordinator::new(Arc::new(provider));

		if config.singleflight {
			coordinator = coordinator.with_singleflight(DEFAULT_SINGLEFLIGHT_TTL);
		}

		Ok(Self {
			codec,
			cookies: CookieSettings::from_config(&config),
			coordinator: Arc::new(coordinator),
			normalizer: RedirectNormalizer::from_config(&config),
			public_paths: PublicPaths::from_config(&config),
			config: Arc::new(config),
		})
	}

	/// Replaces the public-path allowlist.
	pub fn with_public_paths(mut self, public_paths: PublicPaths) -> Self {
		self.public_paths = public_paths;

		self
	}

	/// Shared configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Artifact codec.
	pub fn codec(&self) -> &TokenCodec {
		&self.codec
	}

	/// Cookie names and attributes.
	pub fn cookies(&self) -> &CookieSettings {
		&self.cookies
	}

	/// Refresh coordinator.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator<C>> {
		&self.coordinator
	}

	/// Redirect normalizer.
	pub fn normalizer(&self) -> &RedirectNormalizer {
		&self.normalizer
	}

	/// Public-path allowlist.
	pub fn public_paths(&self) -> &PublicPaths {
		&self.public_paths
	}

	/// Reads the session carried by `headers` without refreshing it.
	///
	/// Behind the gate, prefer the [`Session`] extractor: it sees the record after any refresh the
	/// gate performed for this request.
	pub fn session(&self, headers: &HeaderMap) -> Option<Session> {
		let artifact = self.cookies.read_session(headers);

		self.codec.decode(artifact.as_deref()).ok().map(|record| record.session())
	}

	/// Redirect to the login page carrying the original target as `callbackUrl`.
	pub fn login_redirect(&self, original: &str) -> Response {
		let query = url::form_urlencoded::Serializer::new(String::new())
			.append_pair("callbackUrl", original)
			.finish();
		let location = format!("{}?{query}", self.config.app_path(&self.config.login_path));

		Redirect::to(&location).into_response()
	}

	fn write_record(&self, headers: &mut HeaderMap, record: &TokenRecord, now: OffsetDateTime) {
		match self.codec.encode_at(record, now) {
			Ok(sealed) => cookie::append(headers, &self.cookies.session(sealed)),
			Err(err) => tracing::error!(error = %err, "Session record could not be sealed."),
		}
	}
}
impl<C> Debug for SessionGate<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionGate")
			.field("config", &self.config)
			.field("codec", &self.codec)
			.field("public_paths", &self.public_paths)
			.finish()
	}
}

/// Installs [`session_gate`] on `router`.
pub fn protect<C, S>(router: Router<S>, gate: Arc<SessionGate<C>>) -> Router<S>
where
	C: ?Sized + TokenHttpClient,
	S: 'static + Clone + Send + Sync,
{
	router.layer(middleware::from_fn_with_state(gate, session_gate::<C>))
}

/// Session gate middleware, for use with [`axum::middleware::from_fn_with_state`].
pub async fn session_gate<C>(
	State(gate): State<Arc<SessionGate<C>>>,
	mut request: Request,
	next: Next,
) -> Response
where
	C: ?Sized + TokenHttpClient,
{
	let path = request.uri().path().to_owned();

	if gate.public_paths.is_public(&path) {
		tracing::trace!(path, "Gate bypassed.");
		obs::record_gate_decision(GateState::Public, GateDecision::Continue);

		return next.run(request).await;
	}

	let now = OffsetDateTime::now_utc();
	let artifact = gate.cookies.read_session(request.headers());
	let (state, record, reissue, clear) = match gate.codec.decode_at(artifact.as_deref(), now) {
		Err(reason) => {
			tracing::debug!(path, %reason, "No usable session.");

			(GateState::Unauthenticated, None, false, reason != DecodeError::Absent)
		},
		Ok(record) => {
			let needs_refresh = record.classify(now) == SessionState::NeedsRefresh;
			let record =
				if needs_refresh { refresh_detached(&gate, record, now).await } else { record };
			let state =
				if record.is_errored() { GateState::Errored } else { GateState::Authenticated };

			(state, Some(record), needs_refresh, false)
		},
	};
	let decision = decide(state, gate.public_paths.is_login(&path));

	tracing::debug!(path, state = state.as_str(), decision = decision.as_str(), "Gate decided.");
	obs::record_gate_decision(state, decision);

	let mut response = match decision {
		GateDecision::Continue => {
			if let Some(record) = &record {
				request.extensions_mut().insert(record.session());
			}

			next.run(request).await
		},
		GateDecision::RedirectToLogin => {
			let original = request
				.uri()
				.path_and_query()
				.map(|value| value.as_str().to_owned())
				.unwrap_or(path);

			gate.login_redirect(&original)
		},
	};

	// A refreshed or newly errored record is written back either way, so a failed refresh is not
	// retried on the next request.
	match record {
		Some(record) if reissue => gate.write_record(response.headers_mut(), &record, now),
		None if clear => cookie::append(response.headers_mut(), &gate.cookies.clear_session()),
		_ => {},
	}

	response
}

/// Runs the refresh on its own task, so an aborted request still lets the provider call finish
/// (its result is then simply dropped).
async fn refresh_detached<C>(
	gate: &Arc<SessionGate<C>>,
	record: TokenRecord,
	now: OffsetDateTime,
) -> TokenRecord
where
	C: ?Sized + TokenHttpClient,
{
	let coordinator = Arc::clone(&gate.coordinator);
	let fallback = record.clone();

	match tokio::spawn(async move { coordinator.ensure_fresh_at(record, now).await }).await {
		Ok(record) => record,
		Err(err) => {
			tracing::error!(error = %err, "Refresh task did not complete.");

			fallback.into_failed()
		},
	}
}

impl<S> FromRequestParts<S> for Session
where
	S: Send + Sync,
{
	type Rejection = StatusCode;

	async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
		parts.extensions.get::<Session>().cloned().ok_or(StatusCode::UNAUTHORIZED)
	}
}
impl<S> OptionalFromRequestParts<S> for Session
where
	S: Send + Sync,
{
	type Rejection = Infallible;

	async fn from_request_parts(
		parts: &mut Parts,
		_: &S,
	) -> Result<Option<Self>, Self::Rejection> {
		Ok(parts.extensions.get::<Session>().cloned())
	}
}
