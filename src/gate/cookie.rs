//! Session and pending-login cookie construction and parsing.
//!
//! Cookies are host-only (no `Domain`), `HttpOnly`, `SameSite=Lax`, scoped to the base path, and
//! `Secure` whenever the application is served over TLS.

// crates.io
use axum::http::{
	HeaderMap, HeaderValue,
	header::{COOKIE, SET_COOKIE},
};
use cookie::{Cookie, SameSite};
// self
use crate::{_prelude::*, codec::LOGIN_MAX_AGE, config::SessionConfig};

/// Cookie names and attributes derived from configuration.
#[derive(Clone, Debug)]
pub struct CookieSettings {
	session_name: String,
	login_name: String,
	path: String,
	secure: bool,
	max_age: Duration,
}
impl CookieSettings {
	/// Derives the settings from configuration.
	pub fn from_config(config: &SessionConfig) -> Self {
		Self {
			session_name: config.session_cookie_name(),
			login_name: config.login_cookie_name(),
			path: config.cookie_path().to_owned(),
			secure: config.secure_cookies(),
			max_age: config.max_age,
		}
	}

	/// Session cookie name.
	pub fn session_name(&self) -> &str {
		&self.session_name
	}

	/// Session cookie carrying a sealed record.
	pub fn session(&self, sealed: String) -> Cookie<'static> {
		self.build(self.session_name.clone(), sealed, self.max_age)
	}

	/// Pending-login cookie carrying sealed state, nonce, and PKCE verifier.
	pub fn pending_login(&self, sealed: String) -> Cookie<'static> {
		self.build(self.login_name.clone(), sealed, LOGIN_MAX_AGE)
	}

	/// Removal cookie for the session.
	pub fn clear_session(&self) -> Cookie<'static> {
		self.build(self.session_name.clone(), String::new(), Duration::ZERO)
	}

	/// Removal cookie for the pending login.
	pub fn clear_pending_login(&self) -> Cookie<'static> {
		self.build(self.login_name.clone(), String::new(), Duration::ZERO)
	}

	/// Reads the sealed session artifact from request headers.
	pub fn read_session(&self, headers: &HeaderMap) -> Option<String> {
		read(headers, &self.session_name)
	}

	/// Reads the sealed pending-login artifact from request headers.
	pub fn read_pending_login(&self, headers: &HeaderMap) -> Option<String> {
		read(headers, &self.login_name)
	}

	fn build(&self, name: String, value: String, max_age: Duration) -> Cookie<'static> {
		Cookie::build((name, value))
			.http_only(true)
			.secure(self.secure)
			.same_site(SameSite::Lax)
			.path(self.path.clone())
			.max_age(max_age)
			.build()
	}
}

/// Appends a `Set-Cookie` header; a cookie that cannot form a header value is dropped and logged.
pub fn append(headers: &mut HeaderMap, cookie: &Cookie<'_>) {
	match HeaderValue::from_str(&cookie.to_string()) {
		Ok(value) => {
			headers.append(SET_COOKIE, value);
		},
		Err(_) => tracing::error!(name = cookie.name(), "Cookie could not be encoded as a header."),
	}
}

fn read(headers: &HeaderMap, name: &str) -> Option<String> {
	headers
		.get_all(COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(Cookie::split_parse)
		.filter_map(|cookie| cookie.ok())
		.find(|cookie| cookie.name() == name)
		.map(|cookie| cookie.value().to_owned())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn settings(app_url: &str, base_path: &str) -> CookieSettings {
		let config = SessionConfig::builder()
			.issuer("https://sso.example.com/realms/app")
			.client_id("web")
			.client_secret("secret")
			.signing_secret("0123456789abcdef0123456789abcdef")
			.app_url(app_url)
			.base_path(base_path)
			.app_name("cemetery")
			.build()
			.expect("Configuration should build.");

		CookieSettings::from_config(&config)
	}

	#[test]
	fn session_cookie_attributes() {
		let rendered = settings("https://cemetery.example.com", "/app").session("sealed".into()).to_string();

		assert!(rendered.starts_with("__Secure-cemetery-session-token=sealed"));
		assert!(rendered.contains("HttpOnly"));
		assert!(rendered.contains("SameSite=Lax"));
		assert!(rendered.contains("Secure"));
		assert!(rendered.contains("Path=/app"));
		assert!(rendered.contains("Max-Age=14400"));
		assert!(!rendered.contains("Domain"));
	}

	#[test]
	fn dev_cookie_is_not_secure() {
		let rendered = settings("http://localhost:3000", "").session("sealed".into()).to_string();

		assert!(rendered.starts_with("cemetery-session-token=sealed"));
		assert!(rendered.contains("Path=/"));
		assert!(!rendered.contains("Secure"));
	}

	#[test]
	fn reads_named_cookie_among_many() {
		let settings = settings("http://localhost:3000", "");
		let mut headers = HeaderMap::new();

		headers.append(COOKIE, HeaderValue::from_static("theme=dark; cemetery-session-token=abc+/="));
		headers.append(COOKIE, HeaderValue::from_static("cemetery-login-state=xyz"));

		assert_eq!(settings.read_session(&headers).as_deref(), Some("abc+/="));
		assert_eq!(settings.read_pending_login(&headers).as_deref(), Some("xyz"));
		assert!(settings.read_session(&HeaderMap::new()).is_none());
	}

	#[test]
	fn clear_expires_immediately() {
		let mut headers = HeaderMap::new();

		append(&mut headers, &settings("http://localhost:3000", "").clear_session());

		let value = headers.get(SET_COOKIE).and_then(|value| value.to_str().ok()).unwrap_or_default();

		assert!(value.contains("Max-Age=0"));
	}
}
