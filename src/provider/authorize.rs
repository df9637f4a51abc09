//! Authorization Code + PKCE request construction.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

const STATE_LEN: usize = 32;
const NONCE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Everything the sign-in route needs to redirect the browser and later verify the callback.
#[derive(Clone)]
pub struct AuthorizationRequest {
	/// Fully formed authorize URL the browser is sent to.
	pub url: Url,
	/// Opaque state value that must round-trip via the callback.
	pub state: String,
	/// Nonce expected in the ID token.
	pub nonce: String,
	/// PKCE verifier kept server-side (sealed) until the code exchange.
	pub pkce_verifier: String,
}
impl AuthorizationRequest {
	pub(crate) fn build(
		authorization_endpoint: &Url,
		client_id: &str,
		redirect_uri: &Url,
		scopes: &[String],
	) -> Self {
		let state = random_string(STATE_LEN);
		let nonce = random_string(NONCE_LEN);
		let pkce_verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&pkce_verifier);
		let mut url = authorization_endpoint.clone();
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", client_id);
		pairs.append_pair("redirect_uri", redirect_uri.as_str());

		if !scopes.is_empty() {
			pairs.append_pair("scope", &scopes.join(" "));
		}

		pairs.append_pair("state", &state);
		pairs.append_pair("nonce", &nonce);
		pairs.append_pair("code_challenge", &challenge);
		pairs.append_pair("code_challenge_method", PkceCodeChallengeMethod::S256.as_str());

		drop(pairs);

		Self { url, state, nonce, pkce_verifier }
	}

	/// Returns `true` when the callback's `state` matches this request.
	pub fn matches_state(&self, returned_state: &str) -> bool {
		returned_state == self.state
	}
}
impl Debug for AuthorizationRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationRequest")
			.field("url", &self.url.as_str())
			.field("state", &self.state)
			.field("nonce", &self.nonce)
			.field("pkce_verifier", &"<redacted>")
			.finish()
	}
}

/// Derives the S256 challenge for a PKCE verifier.
pub fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}
