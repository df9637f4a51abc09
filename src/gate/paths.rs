//! Public-path allowlist; every other path is gated.

// self
use crate::config::SessionConfig;

/// Prefixes that bypass the session gate, matched at path-segment boundaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicPaths {
	base_path: String,
	login_path: String,
	prefixes: Vec<String>,
}
impl PublicPaths {
	/// Default allowlist: logout, the auth namespace, static assets, and the health check.
	///
	/// The login page stays gated so it still sees the (possibly errored) session;
	/// [`decide`](super::decide) never redirects it to itself.
	pub fn from_config(config: &SessionConfig) -> Self {
		let prefixes = [
			config.logout_path.as_str(),
			"/api/auth",
			"/static",
			"/assets",
			"/favicon.ico",
			"/health",
		]
		.into_iter()
		.map(normalize)
		.collect();

		Self {
			base_path: config.base_path.clone(),
			login_path: normalize(&config.login_path),
			prefixes,
		}
	}

	/// Adds another public prefix.
	pub fn with_prefix(mut self, prefix: &str) -> Self {
		self.prefixes.push(normalize(prefix));

		self
	}

	/// Returns `true` when `path` (with or without the base path) is allowlisted.
	pub fn is_public(&self, path: &str) -> bool {
		let path = self.app_relative(path);

		self.prefixes.iter().any(|prefix| has_segment_prefix(path, prefix))
	}

	/// Returns `true` when `path` is the login page itself.
	pub fn is_login(&self, path: &str) -> bool {
		normalize(self.app_relative(path)) == self.login_path
	}

	fn app_relative<'a>(&self, path: &'a str) -> &'a str {
		if self.base_path.is_empty() {
			return path;
		}

		match path.strip_prefix(self.base_path.as_str()) {
			Some("") => "/",
			Some(rest) if rest.starts_with('/') => rest,
			_ => path,
		}
	}
}

fn normalize(path: &str) -> String {
	let trimmed = path.trim_end_matches('/');

	if trimmed.is_empty() { "/".into() } else { trimmed.to_owned() }
}

fn has_segment_prefix(path: &str, prefix: &str) -> bool {
	path.strip_prefix(prefix)
		.is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn paths(base_path: &str) -> PublicPaths {
		let config = SessionConfig::builder()
			.issuer("https://sso.example.com/realms/app")
			.client_id("web")
			.client_secret("secret")
			.signing_secret("0123456789abcdef0123456789abcdef")
			.base_path(base_path)
			.build()
			.expect("Configuration should build.");

		PublicPaths::from_config(&config)
	}

	#[test]
	fn allowlist_is_default_deny() {
		let paths = paths("");

		for public in [
			"/logout",
			"/api/auth/callback/keycloak",
			"/api/auth/signin",
			"/static/app.css",
			"/assets/logo.svg",
			"/favicon.ico",
			"/health",
		] {
			assert!(paths.is_public(public), "{public} should be public");
		}
		for gated in ["/", "/login", "/dashboard", "/loginx", "/api/authx", "/api/plots", "/healthcheck"] {
			assert!(!paths.is_public(gated), "{gated} should be gated");
		}
	}

	#[test]
	fn base_path_is_stripped_before_matching() {
		let paths = paths("/app").with_prefix("/docs");

		assert!(paths.is_public("/app/logout"));
		assert!(!paths.is_public("/app/login"));
		assert!(paths.is_public("/app/static/x.js"));
		assert!(paths.is_public("/docs/intro"));
		assert!(!paths.is_public("/app/dashboard"));
		assert!(!paths.is_public("/app"));
		assert!(paths.is_login("/app/login/"));
		assert!(paths.is_login("/login"));
		assert!(!paths.is_login("/app/dashboard"));
	}
}
