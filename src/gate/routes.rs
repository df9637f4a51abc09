//! Sign-in, provider callback, and logout routes.
//!
//! Routes are registered at application-relative paths; nest the router under the base path when
//! the server sees it (most reverse proxies strip it).

// crates.io
use axum::{
	Router,
	extract::{Query, State},
	http::HeaderMap,
	response::{IntoResponse, Redirect, Response},
	routing::{get, post},
};
// self
use super::{CALLBACK_PATH, SessionGate, cookie};
use crate::{
	_prelude::*,
	codec::PendingLogin,
	http::TokenHttpClient,
	obs::{FlowKind, FlowOutcome, FlowSpan},
	session::TokenRecord,
};

/// Route that starts an Authorization Code + PKCE sign-in.
pub const SIGNIN_PATH: &str = "/api/auth/signin";

/// Error codes reported to the login page as `?error=`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginErrorCode {
	/// Server-side failure preparing or sealing sign-in state.
	Configuration,
	/// The provider could not be reached or rejected the code exchange.
	OAuthCallback,
	/// The user declined consent at the provider.
	AccessDenied,
	/// The pending login was missing, expired, or did not match the callback.
	State,
}
impl LoginErrorCode {
	/// Returns the query value.
	pub const fn as_str(self) -> &'static str {
		match self {
			LoginErrorCode::Configuration => "Configuration",
			LoginErrorCode::OAuthCallback => "OAuthCallback",
			LoginErrorCode::AccessDenied => "AccessDenied",
			LoginErrorCode::State => "State",
		}
	}
}

#[derive(Debug, Deserialize)]
struct SigninQuery {
	#[serde(rename = "callbackUrl")]
	callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
	code: Option<String>,
	state: Option<String>,
	error: Option<String>,
}

/// Builds the sign-in, callback, and logout routes around `gate`.
///
/// Logout only answers `POST`, so a cross-site link or image cannot end the session.
pub fn auth_routes<C, S>(gate: Arc<SessionGate<C>>) -> Router<S>
where
	C: ?Sized + TokenHttpClient,
	S: 'static + Clone + Send + Sync,
{
	let logout_path = gate.config().logout_path.clone();

	Router::new()
		.route(SIGNIN_PATH, get(signin::<C>))
		.route(CALLBACK_PATH, get(callback::<C>))
		.route(&logout_path, post(logout::<C>))
		.with_state(gate)
}

async fn signin<C>(
	State(gate): State<Arc<SessionGate<C>>>,
	Query(query): Query<SigninQuery>,
) -> Response
where
	C: ?Sized + TokenHttpClient,
{
	let normalizer = gate.normalizer();
	let requested = query.callback_url.unwrap_or_else(|| normalizer.landing());
	let callback_url = match normalizer.checked(&requested, &gate.config().login_path) {
		Ok(target) => target,
		Err(err) => {
			tracing::debug!(error = %err, "Sign-in target replaced with the landing page.");

			normalizer.landing()
		},
	};
	let request = gate.coordinator().provider().authorization_request();
	let pending = PendingLogin {
		state: request.state.clone(),
		nonce: request.nonce.clone(),
		pkce_verifier: request.pkce_verifier.clone(),
		callback_url,
	};
	let sealed = match gate.codec().encode_login(&pending) {
		Ok(sealed) => sealed,
		Err(err) => {
			tracing::error!(error = %err, "Pending login could not be sealed.");

			return login_error(&gate, LoginErrorCode::Configuration);
		},
	};
	let mut response = Redirect::to(request.url.as_str()).into_response();

	cookie::append(response.headers_mut(), &gate.cookies().pending_login(sealed));

	response
}

async fn callback<C>(
	State(gate): State<Arc<SessionGate<C>>>,
	Query(query): Query<CallbackQuery>,
	headers: HeaderMap,
) -> Response
where
	C: ?Sized + TokenHttpClient,
{
	let artifact = gate.cookies().read_pending_login(&headers);
	let pending = match gate.codec().decode_login(artifact.as_deref()) {
		Ok(pending) => pending,
		Err(reason) => {
			tracing::warn!(%reason, "Callback without a usable pending login.");

			return login_error(&gate, LoginErrorCode::State);
		},
	};

	if let Some(error) = query.error.as_deref() {
		tracing::info!(error, "Provider returned an authorization error.");

		let code = if error == "access_denied" {
			LoginErrorCode::AccessDenied
		} else {
			LoginErrorCode::OAuthCallback
		};

		return login_error(&gate, code);
	}
	if query.state.as_deref() != Some(pending.state.as_str()) {
		tracing::warn!("Callback state does not match the pending login.");

		return login_error(&gate, LoginErrorCode::State);
	}

	let Some(code) = query.code.as_deref().filter(|code| !code.is_empty()) else {
		return login_error(&gate, LoginErrorCode::OAuthCallback);
	};
	let record = match complete_sign_in(&gate, code, &pending).await {
		Ok(record) => record,
		Err(err) => {
			tracing::warn!(error = %err, "Code exchange failed.");

			return login_error(&gate, LoginErrorCode::OAuthCallback);
		},
	};
	let now = OffsetDateTime::now_utc();
	let sealed = match gate.codec().encode_at(&record, now) {
		Ok(sealed) => sealed,
		Err(err) => {
			tracing::error!(error = %err, "Session record could not be sealed.");

			return login_error(&gate, LoginErrorCode::Configuration);
		},
	};
	let target = gate
		.normalizer()
		.checked(&pending.callback_url, &gate.config().login_path)
		.unwrap_or_else(|_| gate.normalizer().landing());
	let mut response = Redirect::to(&target).into_response();

	cookie::append(response.headers_mut(), &gate.cookies().session(sealed));
	cookie::append(response.headers_mut(), &gate.cookies().clear_pending_login());

	tracing::info!(subject = %record.subject_id, "Signed in.");

	response
}

async fn complete_sign_in<C>(
	gate: &SessionGate<C>,
	code: &str,
	pending: &PendingLogin,
) -> Result<TokenRecord>
where
	C: ?Sized + TokenHttpClient,
{
	let span = FlowSpan::new(FlowKind::CodeExchange, "callback");
	let provider = gate.coordinator().provider();
	let result = span
		.instrument(async move {
			let exchange = provider.exchange_code(code, &pending.pkce_verifier).await?;
			let identity = provider.identity_from(&exchange, &pending.nonce)?;

			Ok(TokenRecord::from_exchange(identity, &exchange, OffsetDateTime::now_utc()))
		})
		.await;

	span.settle(FlowOutcome::of(&result));

	result
}

async fn logout<C>(State(gate): State<Arc<SessionGate<C>>>, headers: HeaderMap) -> Response
where
	C: ?Sized + TokenHttpClient,
{
	let artifact = gate.cookies().read_session(&headers);
	let record = gate.codec().decode(artifact.as_deref()).ok();
	let end_session = gate.coordinator().sign_out(record.as_ref()).await;
	let mut response = Redirect::to(end_session.as_str()).into_response();

	cookie::append(response.headers_mut(), &gate.cookies().clear_session());

	response
}

fn login_error<C>(gate: &SessionGate<C>, code: LoginErrorCode) -> Response
where
	C: ?Sized + TokenHttpClient,
{
	let config = gate.config();
	let location = format!("{}?error={}", config.app_path(&config.login_path), code.as_str());
	let mut response = Redirect::to(&location).into_response();

	cookie::append(response.headers_mut(), &gate.cookies().clear_pending_login());

	response
}
