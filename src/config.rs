//! Immutable session configuration, loaded once at process start.
//!
//! [`SessionConfig::from_env`] reads the process environment a single time; everything downstream
//! (provider client, codec, gate) receives the resulting struct and never touches the environment
//! again. Missing provider credentials or signing secret fail closed here rather than surfacing as
//! per-request authentication failures.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, error::ConfigError};

/// Minimum signing secret length accepted for key derivation.
pub const MIN_SIGNING_SECRET_LEN: usize = 32;
/// Session lifetime (cookie `Max-Age` and artifact validity window).
pub const SESSION_MAX_AGE: Duration = Duration::hours(4);
/// Default upper bound for a single provider round trip.
pub const DEFAULT_PROVIDER_TIMEOUT: StdDuration = StdDuration::from_secs(10);
/// Default time a deduplicated refresh result stays reusable when singleflight is enabled.
pub const DEFAULT_SINGLEFLIGHT_TTL: StdDuration = StdDuration::from_secs(30);

const ENV_ISSUER: &str = "KEYCLOAK_ISSUER";
const ENV_CLIENT_ID: &str = "KEYCLOAK_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "KEYCLOAK_CLIENT_SECRET";
const ENV_SIGNING_SECRET: &str = "SESSION_SECRET";
const ENV_APP_URL: &str = "APP_URL";
const ENV_BASE_PATH: &str = "APP_BASE_PATH";
const ENV_APP_NAME: &str = "APP_NAME";
const ENV_PROVIDER_TIMEOUT: &str = "PROVIDER_TIMEOUT_SECS";
const ENV_SINGLEFLIGHT: &str = "SESSION_SINGLEFLIGHT";

/// Validated, immutable configuration shared by every session component.
#[derive(Clone)]
pub struct SessionConfig {
	/// OIDC issuer (Keycloak realm URL).
	pub issuer: Url,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// OAuth 2.0 client secret.
	pub client_secret: String,
	/// Secret the sealing key is derived from.
	pub signing_secret: String,
	/// Canonical application URL; its origin is the only trusted redirect domain.
	pub app_url: Url,
	/// Path prefix the application is served under (`""` or `/segment...`, no trailing slash).
	pub base_path: String,
	/// Short application name used in cookie names.
	pub app_name: String,
	/// Login page path, relative to the base path.
	pub login_path: String,
	/// Logout route path, relative to the base path.
	pub logout_path: String,
	/// Public landing path users end up on after logout.
	pub landing_path: String,
	/// Scopes requested at sign-in.
	pub scopes: Vec<String>,
	/// Session lifetime.
	pub max_age: Duration,
	/// Timeout applied to every provider call.
	pub provider_timeout: StdDuration,
	/// Enables cross-request refresh deduplication keyed by refresh token.
	pub singleflight: bool,
}
impl SessionConfig {
	/// Returns a builder seeded with defaults.
	pub fn builder() -> SessionConfigBuilder {
		SessionConfigBuilder::default()
	}

	/// Loads configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Loads configuration through an arbitrary key lookup (environment, file, test map).
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
		let mut builder = Self::builder();

		if let Some(value) = get(ENV_ISSUER) {
			builder = builder.issuer(value);
		}
		if let Some(value) = get(ENV_CLIENT_ID) {
			builder = builder.client_id(value);
		}
		if let Some(value) = get(ENV_CLIENT_SECRET) {
			builder = builder.client_secret(value);
		}
		if let Some(value) = get(ENV_SIGNING_SECRET) {
			builder = builder.signing_secret(value);
		}
		if let Some(value) = get(ENV_APP_URL) {
			builder = builder.app_url(value);
		}
		if let Some(value) = get(ENV_BASE_PATH) {
			builder = builder.base_path(value);
		}
		if let Some(value) = get(ENV_APP_NAME) {
			builder = builder.app_name(value);
		}
		if let Some(value) = get(ENV_PROVIDER_TIMEOUT) {
			let secs = value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
				key: ENV_PROVIDER_TIMEOUT,
				value: value.clone(),
			})?;

			builder = builder.provider_timeout(StdDuration::from_secs(secs));
		}
		if let Some(value) = get(ENV_SINGLEFLIGHT) {
			let enabled = match value.trim().to_ascii_lowercase().as_str() {
				"1" | "true" | "yes" | "on" => true,
				"0" | "false" | "no" | "off" => false,
				_ => return Err(ConfigError::InvalidValue { key: ENV_SINGLEFLIGHT, value }),
			};

			builder = builder.singleflight(enabled);
		}

		builder.build()
	}

	/// Whether cookies must carry the `Secure` attribute (and the `__Secure-` prefix).
	pub fn secure_cookies(&self) -> bool {
		self.app_url.scheme() == "https"
	}

	/// Session cookie name, `__Secure-` prefixed on TLS deployments.
	pub fn session_cookie_name(&self) -> String {
		if self.secure_cookies() {
			format!("__Secure-{}-session-token", self.app_name)
		} else {
			format!("{}-session-token", self.app_name)
		}
	}

	/// Cookie name for the short-lived pending-login state.
	pub fn login_cookie_name(&self) -> String {
		if self.secure_cookies() {
			format!("__Secure-{}-login-state", self.app_name)
		} else {
			format!("{}-login-state", self.app_name)
		}
	}

	/// Cookie `Path` attribute.
	pub fn cookie_path(&self) -> &str {
		if self.base_path.is_empty() { "/" } else { &self.base_path }
	}

	/// Absolute path (base path included) for an application-relative path.
	pub fn app_path(&self, path: &str) -> String {
		format!("{}{}", self.base_path, path)
	}

	/// Absolute URL for an application-relative path.
	pub fn app_absolute_url(&self, path: &str) -> Url {
		let mut url = self.app_url.clone();

		url.set_path(&self.app_path(path));
		url.set_query(None);
		url.set_fragment(None);

		url
	}

	/// Redirect URI registered with the provider for the authorization-code callback.
	pub fn redirect_uri(&self) -> Url {
		self.app_absolute_url(crate::gate::CALLBACK_PATH)
	}

	/// Where the provider sends the browser after ending the session.
	pub fn post_logout_redirect_uri(&self) -> Url {
		self.app_absolute_url(&self.landing_path)
	}
}
impl Debug for SessionConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionConfig")
			.field("issuer", &self.issuer.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("signing_secret", &"<redacted>")
			.field("app_url", &self.app_url.as_str())
			.field("base_path", &self.base_path)
			.field("app_name", &self.app_name)
			.field("login_path", &self.login_path)
			.field("logout_path", &self.logout_path)
			.field("landing_path", &self.landing_path)
			.field("scopes", &self.scopes)
			.field("max_age", &self.max_age)
			.field("provider_timeout", &self.provider_timeout)
			.field("singleflight", &self.singleflight)
			.finish()
	}
}

/// Builder for [`SessionConfig`]; validation happens in [`SessionConfigBuilder::build`].
#[derive(Clone, Debug)]
pub struct SessionConfigBuilder {
	issuer: Option<String>,
	client_id: Option<String>,
	client_secret: Option<String>,
	signing_secret: Option<String>,
	app_url: String,
	base_path: String,
	app_name: String,
	login_path: String,
	logout_path: String,
	landing_path: String,
	scopes: Vec<String>,
	provider_timeout: StdDuration,
	singleflight: bool,
}
impl Default for SessionConfigBuilder {
	fn default() -> Self {
		Self {
			issuer: None,
			client_id: None,
			client_secret: None,
			signing_secret: None,
			app_url: "http://localhost:3000".into(),
			base_path: String::new(),
			app_name: "app".into(),
			login_path: "/login".into(),
			logout_path: "/logout".into(),
			landing_path: "/".into(),
			scopes: vec!["openid".into(), "email".into(), "profile".into()],
			provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
			singleflight: false,
		}
	}
}
impl SessionConfigBuilder {
	/// Sets the OIDC issuer URL.
	pub fn issuer(mut self, value: impl Into<String>) -> Self {
		self.issuer = Some(value.into());

		self
	}

	/// Sets the OAuth 2.0 client identifier.
	pub fn client_id(mut self, value: impl Into<String>) -> Self {
		self.client_id = Some(value.into());

		self
	}

	/// Sets the OAuth 2.0 client secret.
	pub fn client_secret(mut self, value: impl Into<String>) -> Self {
		self.client_secret = Some(value.into());

		self
	}

	/// Sets the secret the cookie sealing key is derived from.
	pub fn signing_secret(mut self, value: impl Into<String>) -> Self {
		self.signing_secret = Some(value.into());

		self
	}

	/// Sets the canonical application URL.
	pub fn app_url(mut self, value: impl Into<String>) -> Self {
		self.app_url = value.into();

		self
	}

	/// Sets the base path the application is served under.
	pub fn base_path(mut self, value: impl Into<String>) -> Self {
		self.base_path = value.into();

		self
	}

	/// Sets the short application name used in cookie names.
	pub fn app_name(mut self, value: impl Into<String>) -> Self {
		self.app_name = value.into();

		self
	}

	/// Overrides the login page path.
	pub fn login_path(mut self, value: impl Into<String>) -> Self {
		self.login_path = value.into();

		self
	}

	/// Overrides the logout route path.
	pub fn logout_path(mut self, value: impl Into<String>) -> Self {
		self.logout_path = value.into();

		self
	}

	/// Overrides the public landing path.
	pub fn landing_path(mut self, value: impl Into<String>) -> Self {
		self.landing_path = value.into();

		self
	}

	/// Overrides the scopes requested at sign-in.
	pub fn scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Overrides the provider call timeout.
	pub fn provider_timeout(mut self, timeout: StdDuration) -> Self {
		self.provider_timeout = timeout;

		self
	}

	/// Enables or disables refresh deduplication.
	pub fn singleflight(mut self, enabled: bool) -> Self {
		self.singleflight = enabled;

		self
	}

	/// Validates the settings and produces a [`SessionConfig`].
	pub fn build(self) -> Result<SessionConfig, ConfigError> {
		let issuer = required(self.issuer, ENV_ISSUER)?;
		let client_id = required(self.client_id, ENV_CLIENT_ID)?;
		let client_secret = required(self.client_secret, ENV_CLIENT_SECRET)?;
		let signing_secret = required(self.signing_secret, ENV_SIGNING_SECRET)?;

		if signing_secret.len() < MIN_SIGNING_SECRET_LEN {
			return Err(ConfigError::WeakSigningSecret { min: MIN_SIGNING_SECRET_LEN });
		}

		let issuer = parse_http_url(ENV_ISSUER, &issuer)?;
		let app_url = parse_http_url(ENV_APP_URL, &self.app_url)?;
		let base_path = normalize_base_path(&self.base_path)?;
		let app_name = self.app_name.trim().to_owned();

		if app_name.is_empty() || !app_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
			return Err(ConfigError::InvalidValue { key: ENV_APP_NAME, value: self.app_name });
		}
		if self.provider_timeout.is_zero() {
			return Err(ConfigError::InvalidValue {
				key: ENV_PROVIDER_TIMEOUT,
				value: "0".into(),
			});
		}

		Ok(SessionConfig {
			issuer,
			client_id,
			client_secret,
			signing_secret,
			app_url,
			base_path,
			app_name,
			login_path: normalize_route(&self.login_path),
			logout_path: normalize_route(&self.logout_path),
			landing_path: normalize_route(&self.landing_path),
			scopes: self.scopes,
			max_age: SESSION_MAX_AGE,
			provider_timeout: self.provider_timeout,
			singleflight: self.singleflight,
		})
	}
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
	value
		.map(|value| value.trim().to_owned())
		.filter(|value| !value.is_empty())
		.ok_or(ConfigError::Missing { key })
}

fn parse_http_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
	let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { key, source })?;

	if !matches!(url.scheme(), "http" | "https") {
		return Err(ConfigError::UnsupportedScheme { key, url: url.to_string() });
	}

	Ok(url)
}

/// Normalizes a base path to `""` or `/segment[/segment...]` without a trailing slash.
fn normalize_base_path(raw: &str) -> Result<String, ConfigError> {
	let trimmed = raw.trim().trim_end_matches('/');

	if trimmed.is_empty() {
		return Ok(String::new());
	}
	// Only characters a URL path keeps verbatim, so the prefix compares equal to `Uri::path`.
	if !trimmed.chars().all(is_path_safe)
		|| trimmed.contains("//")
		|| trimmed.split('/').any(|segment| matches!(segment, "." | ".."))
	{
		return Err(ConfigError::InvalidBasePath { value: raw.to_owned() });
	}

	if trimmed.starts_with('/') { Ok(trimmed.to_owned()) } else { Ok(format!("/{trimmed}")) }
}

fn is_path_safe(c: char) -> bool {
	c.is_ascii_alphanumeric()
		|| matches!(
			c,
			'/' | '-' | '.' | '_' | '~' | '!' | '$' | '&' | '\'' | '(' | ')' | '*' | '+' | ',' | ';'
				| '=' | ':' | '@'
		)
}

fn normalize_route(raw: &str) -> String {
	let trimmed = raw.trim();

	if trimmed.starts_with('/') { trimmed.to_owned() } else { format!("/{trimmed}") }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
		move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| (*v).to_owned())
	}

	const COMPLETE: &[(&str, &str)] = &[
		("KEYCLOAK_ISSUER", "https://sso.example.com/realms/cemetery"),
		("KEYCLOAK_CLIENT_ID", "cemetery-web"),
		("KEYCLOAK_CLIENT_SECRET", "shh"),
		("SESSION_SECRET", "a-signing-secret-that-is-long-enough-1234"),
		("APP_URL", "https://cemetery.example.com"),
		("APP_BASE_PATH", "/app/"),
		("APP_NAME", "cemetery"),
	];

	#[test]
	fn loads_complete_environment() {
		let config =
			SessionConfig::from_lookup(lookup(COMPLETE)).expect("Complete lookup should load.");

		assert_eq!(config.base_path, "/app");
		assert_eq!(config.session_cookie_name(), "__Secure-cemetery-session-token");
		assert_eq!(config.cookie_path(), "/app");
		assert!(config.secure_cookies());
		assert_eq!(config.max_age, Duration::seconds(14_400));
		assert_eq!(config.provider_timeout, DEFAULT_PROVIDER_TIMEOUT);
		assert!(!config.singleflight);
		assert_eq!(
			config.redirect_uri().as_str(),
			"https://cemetery.example.com/app/api/auth/callback/keycloak"
		);
		assert_eq!(config.post_logout_redirect_uri().as_str(), "https://cemetery.example.com/app/");
	}

	#[test]
	fn missing_provider_settings_fail_closed() {
		for key in ["KEYCLOAK_ISSUER", "KEYCLOAK_CLIENT_ID", "KEYCLOAK_CLIENT_SECRET", "SESSION_SECRET"]
		{
			let pairs = COMPLETE.iter().copied().filter(|(k, _)| *k != key).collect::<Vec<_>>();
			let err = SessionConfig::from_lookup(lookup(&pairs))
				.expect_err("Missing provider settings must be fatal.");

			assert!(matches!(err, ConfigError::Missing { key: missing } if missing == key));
		}
	}

	#[test]
	fn blank_values_count_as_missing() {
		let mut pairs = COMPLETE.to_vec();

		pairs[1] = ("KEYCLOAK_CLIENT_ID", "   ");

		let err = SessionConfig::from_lookup(lookup(&pairs))
			.expect_err("Blank client id must be rejected.");

		assert!(matches!(err, ConfigError::Missing { key: "KEYCLOAK_CLIENT_ID" }));
	}

	#[test]
	fn rejects_weak_secret_and_bad_urls() {
		let mut pairs = COMPLETE.to_vec();

		pairs[3] = ("SESSION_SECRET", "short");

		assert!(matches!(
			SessionConfig::from_lookup(lookup(&pairs)),
			Err(ConfigError::WeakSigningSecret { .. })
		));

		let mut pairs = COMPLETE.to_vec();

		pairs[0] = ("KEYCLOAK_ISSUER", "ftp://sso.example.com");

		assert!(matches!(
			SessionConfig::from_lookup(lookup(&pairs)),
			Err(ConfigError::UnsupportedScheme { key: "KEYCLOAK_ISSUER", .. })
		));

		let mut pairs = COMPLETE.to_vec();

		for base_path in ["/app?x", "/café", "/a{b}", "/a%20b", "/a b", "/a//b", "/a/../b"] {
			pairs[5] = ("APP_BASE_PATH", base_path);

			assert!(
				matches!(
					SessionConfig::from_lookup(lookup(&pairs)),
					Err(ConfigError::InvalidBasePath { .. })
				),
				"base path: {base_path}"
			);
		}

		pairs[5] = ("APP_BASE_PATH", "org/plots-v2.1/");

		assert_eq!(
			SessionConfig::from_lookup(lookup(&pairs)).expect("Safe base path should load.").base_path,
			"/org/plots-v2.1"
		);
	}

	#[test]
	fn plain_http_uses_unprefixed_cookie_and_root_path() {
		let config = SessionConfig::builder()
			.issuer("http://localhost:8080/realms/dev")
			.client_id("dev")
			.client_secret("dev")
			.signing_secret("dev-signing-secret-dev-signing-secret")
			.build()
			.expect("Dev configuration should build.");

		assert!(!config.secure_cookies());
		assert_eq!(config.session_cookie_name(), "app-session-token");
		assert_eq!(config.cookie_path(), "/");
		assert_eq!(config.base_path, "");
	}

	#[test]
	fn debug_redacts_secrets() {
		let config =
			SessionConfig::from_lookup(lookup(COMPLETE)).expect("Complete lookup should load.");
		let rendered = format!("{config:?}");

		assert!(!rendered.contains("shh"));
		assert!(!rendered.contains("a-signing-secret"));
	}

	#[test]
	fn singleflight_flag_parses() {
		let mut pairs = COMPLETE.to_vec();

		pairs.push(("SESSION_SINGLEFLIGHT", "true"));

		assert!(SessionConfig::from_lookup(lookup(&pairs)).expect("Flag should parse.").singleflight);

		pairs.pop();
		pairs.push(("SESSION_SINGLEFLIGHT", "maybe"));

		assert!(matches!(
			SessionConfig::from_lookup(lookup(&pairs)),
			Err(ConfigError::InvalidValue { key: "SESSION_SINGLEFLIGHT", .. })
		));
	}
}
