//! Base-path aware normalization of post-login and callback redirect targets.
//!
//! Auth callbacks behind a reverse proxy tend to come back with the base path doubled
//! (`/app/app/...`) or wrapped around the auth namespace (`/app/api/auth/app/...`). Every redirect
//! target passes through [`RedirectNormalizer::normalize`] exactly once before it reaches a
//! `Location` header.
//!
//! Only the configured application origin is ever rewritten. Foreign absolute URLs come back
//! byte-identical, and [`RedirectNormalizer::checked`] refuses them outright, so path tricks can
//! never turn the normalizer into an open redirect.

// self
use crate::{_prelude::*, config::SessionConfig};

const AUTH_NAMESPACE: &str = "/api/auth";

/// Rewrites redirect targets against the application origin and base path.
#[derive(Clone, Debug)]
pub struct RedirectNormalizer {
	origin: Url,
	base_path: String,
}
impl RedirectNormalizer {
	/// Creates a normalizer for `app_url` served under `base_path` (`""` or `/segment...`).
	pub fn new(app_url: &Url, base_path: &str) -> Self {
		let mut origin = app_url.clone();

		origin.set_path("/");
		origin.set_query(None);
		origin.set_fragment(None);

		let base_path = match base_path.trim_end_matches('/') {
			"" => String::new(),
			raw => {
				// Compare against the encoded form `Url::path` reports.
				let mut encoded = origin.clone();

				encoded.set_path(raw);

				encoded.path().trim_end_matches('/').to_owned()
			},
		};

		Self { origin, base_path }
	}

	/// Creates a normalizer from the session configuration.
	pub fn from_config(config: &SessionConfig) -> Self {
		Self::new(&config.app_url, &config.base_path)
	}

	/// The application's landing URL, `{origin}{base_path}/`.
	pub fn landing(&self) -> String {
		let mut url = self.origin.clone();

		url.set_path(&format!("{}/", self.base_path));

		url.into()
	}

	/// Returns `true` when `url` has the application's scheme, host, and port.
	pub fn is_same_origin(&self, url: &Url) -> bool {
		url.origin() == self.origin.origin()
	}

	/// Normalizes a redirect target.
	///
	/// - Relative paths resolve against the application origin with the base path applied.
	/// - Same-origin absolute URLs get the base path injected unless already present.
	/// - Foreign `http(s)` URLs are returned unchanged.
	/// - Anything else (protocol-relative, other schemes, garbage) becomes the landing URL.
	///
	/// `normalize(normalize(x)) == normalize(x)` for every input.
	pub fn normalize(&self, target: &str) -> String {
		if is_local_path(target) {
			return match self.origin.join(target) {
				Ok(url) => self.rebase(url),
				Err(_) => self.landing(),
			};
		}

		match Url::parse(target) {
			Ok(url) if self.is_same_origin(&url) => self.rebase(url),
			Ok(url) if matches!(url.scheme(), "http" | "https") => target.to_owned(),
			_ => self.landing(),
		}
	}

	/// Normalizes a post-login target and refuses anything unsafe to follow.
	///
	/// Foreign targets yield [`Error::UntrustedRedirect`]; targets that land on the login page
	/// yield [`Error::RedirectLoop`]. Callers fall back to [`landing`](Self::landing).
	pub fn checked(&self, target: &str, login_path: &str) -> Result<String> {
		let normalized = self.normalize(target);
		let url = Url::parse(&normalized)
			.map_err(|_| Error::UntrustedRedirect { target: normalized.clone() })?;

		if !self.is_same_origin(&url) {
			return Err(Error::UntrustedRedirect { target: normalized });
		}

		let login = format!("{}{}", self.base_path, login_path);

		if url.path().trim_end_matches('/') == login.trim_end_matches('/') {
			return Err(Error::RedirectLoop { target: normalized });
		}

		Ok(normalized)
	}

	fn rebase(&self, mut url: Url) -> String {
		let path = self.rebase_path(url.path());

		url.set_path(&path);

		url.into()
	}

	fn rebase_path(&self, path: &str) -> String {
		let base = self.base_path.as_str();

		if base.is_empty() {
			return path.to_owned();
		}

		let mut path =
			if has_segment_prefix(path, base) { path.to_owned() } else { format!("{base}{path}") };
		let doubled = format!("{base}{base}");
		let wrapped = format!("{base}{AUTH_NAMESPACE}{base}");

		loop {
			let collapsed = [&doubled, &wrapped].into_iter().find_map(|pattern| {
				has_segment_prefix(&path, pattern).then(|| format!("{base}{}", &path[pattern.len()..]))
			});

			match collapsed {
				Some(shorter) => path = shorter,
				None => break,
			}
		}

		path
	}
}

/// `/x` paths, excluding protocol-relative `//host` and the `/\host` form browsers treat alike.
fn is_local_path(target: &str) -> bool {
	target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\")
}

fn has_segment_prefix(path: &str, prefix: &str) -> bool {
	path.strip_prefix(prefix).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const APP: &str = "https://cemetery.example.com";

	fn normalizer(base_path: &str) -> RedirectNormalizer {
		RedirectNormalizer::new(&Url::parse(APP).expect("App URL should parse."), base_path)
	}

	#[test]
	fn normalizes_table() {
		let cases = [
			("/dashboard", "https://cemetery.example.com/app/dashboard"),
			("/app/dashboard", "https://cemetery.example.com/app/dashboard"),
			("/app/app/dashboard", "https://cemetery.example.com/app/dashboard"),
			("/app/app/app/dashboard", "https://cemetery.example.com/app/dashboard"),
			("/app/api/auth/app/dashboard", "https://cemetery.example.com/app/dashboard"),
			("/app/api/auth/callback/keycloak", "https://cemetery.example.com/app/api/auth/callback/keycloak"),
			("/appendix", "https://cemetery.example.com/app/appendix"),
			("/app", "https://cemetery.example.com/app"),
			("/plots?row=3#top", "https://cemetery.example.com/app/plots?row=3#top"),
			("https://cemetery.example.com/dashboard", "https://cemetery.example.com/app/dashboard"),
			("https://cemetery.example.com/app/app/x?y=1", "https://cemetery.example.com/app/x?y=1"),
			("https://evil.example.org/app/app/x", "https://evil.example.org/app/app/x"),
			("https://cemetery.example.com@evil.example.org/", "https://cemetery.example.com@evil.example.org/"),
			("http://cemetery.example.com/dashboard", "http://cemetery.example.com/dashboard"),
			("//evil.example.org/x", "https://cemetery.example.com/app/"),
			("/\\evil.example.org/x", "https://cemetery.example.com/app/"),
			("javascript:alert(1)", "https://cemetery.example.com/app/"),
			("dashboard", "https://cemetery.example.com/app/"),
			("", "https://cemetery.example.com/app/"),
		];
		let normalizer = normalizer("/app");

		for (input, expected) in cases {
			assert_eq!(normalizer.normalize(input), expected, "input: {input}");
		}
	}

	#[test]
	fn root_base_path_only_resolves() {
		let normalizer = normalizer("");

		assert_eq!(normalizer.normalize("/dashboard"), "https://cemetery.example.com/dashboard");
		assert_eq!(normalizer.normalize("/a/a"), "https://cemetery.example.com/a/a");
		assert_eq!(normalizer.landing(), "https://cemetery.example.com/");
	}

	#[test]
	fn normalize_is_idempotent() {
		let inputs = [
			"/dashboard",
			"/app/app/dashboard",
			"/app/api/auth/app/x",
			"/appendix",
			"/",
			"https://cemetery.example.com/plots?id=4",
			"https://evil.example.org/app/app/dashboard",
			"//evil.example.org",
			"mailto:someone@example.com",
			"",
		];

		for base_path in ["", "/app", "/a/b", "/café", "/a{b}"] {
			let normalizer = normalizer(base_path);

			for input in inputs {
				let once = normalizer.normalize(input);

				assert_eq!(normalizer.normalize(&once), once, "input: {input}, base: {base_path}");
			}
		}
	}

	#[test]
	fn encoded_base_path_is_not_prefixed_twice() {
		let normalizer = normalizer("/café");
		let once = normalizer.normalize("/dashboard");

		assert_eq!(once, "https://cemetery.example.com/caf%C3%A9/dashboard");
		assert_eq!(normalizer.normalize(&once), once);
		assert_eq!(normalizer.landing(), "https://cemetery.example.com/caf%C3%A9/");
	}

	#[test]
	fn foreign_targets_stay_byte_identical() {
		let raw = "https://Evil.Example.org:8443/a/../b?c=%2F";

		assert_eq!(normalizer("/app").normalize(raw), raw);
	}

	#[test]
	fn checked_rejects_foreign_and_login_targets() {
		let normalizer = normalizer("/app");

		assert!(matches!(
			normalizer.checked("https://evil.example.org/", "/login"),
			Err(Error::UntrustedRedirect { .. })
		));
		assert!(matches!(
			normalizer.checked("/login", "/login"),
			Err(Error::RedirectLoop { .. })
		));
		assert!(matches!(
			normalizer.checked("/app/app/login/", "/login"),
			Err(Error::RedirectLoop { .. })
		));
		assert_eq!(
			normalizer.checked("/plots", "/login").expect("Local target should pass."),
			"https://cemetery.example.com/app/plots"
		);
	}
}
