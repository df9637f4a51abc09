// self
use oidc_session::{error::Error, redirect::RedirectNormalizer, url::Url};

fn normalizer(base_path: &str) -> RedirectNormalizer {
	let app = Url::parse("https://plots.example.com").expect("App URL should parse.");

	RedirectNormalizer::new(&app, base_path)
}

#[test]
fn proxy_doubled_callbacks_collapse_once() {
	let normalizer = normalizer("/cemetery");
	let once = normalizer.normalize("/cemetery/api/auth/cemetery/cemetery/plots?id=12");

	assert_eq!(once, "https://plots.example.com/cemetery/plots?id=12");
	assert_eq!(normalizer.normalize(&once), once);
}

#[test]
fn nested_base_path_is_idempotent() {
	let normalizer = normalizer("/org/cemetery");

	for input in [
		"/plots",
		"/org/cemetery/org/cemetery/plots",
		"https://plots.example.com/plots#map",
		"https://other.example.com/org/cemetery/org/cemetery",
		"ftp://plots.example.com/file",
	] {
		let once = normalizer.normalize(input);

		assert_eq!(normalizer.normalize(&once), once, "input: {input}");
	}
}

#[test]
fn landing_follows_the_base_path() {
	assert_eq!(normalizer("/cemetery").landing(), "https://plots.example.com/cemetery/");
	assert_eq!(normalizer("").landing(), "https://plots.example.com/");
}

#[test]
fn checked_refuses_open_redirects() {
	let normalizer = normalizer("/cemetery");

	for target in ["https://evil.example.org/cemetery", "https://plots.example.com.evil.org/"] {
		assert!(
			matches!(normalizer.checked(target, "/login"), Err(Error::UntrustedRedirect { .. })),
			"target: {target}"
		);
	}

	assert_eq!(
		normalizer.checked("//evil.example.org", "/login").expect("Protocol-relative falls back."),
		"https://plots.example.com/cemetery/"
	);
}
