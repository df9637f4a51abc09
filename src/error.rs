//! Session-level error types shared across the codec, provider client, and gate.

// self
use crate::{_prelude::*, provider::ProviderErrorKind};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; fatal at startup.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Identity provider call failed; absorbed into the errored record state.
	#[error(transparent)]
	Provider(#[from] ProviderError),
	/// Session artifact could not be opened; treated as anonymous.
	#[error(transparent)]
	Decode(#[from] DecodeError),
	/// Session payload could not be serialized before sealing.
	#[error("Session payload could not be serialized.")]
	Serialize(#[from] serde_json::Error),

	/// Record has no refresh token to exchange.
	#[error("Token record is missing a refresh token.")]
	MissingRefreshToken,
	/// Redirect target resolves to the login path and would loop.
	#[error("Redirect target `{target}` points back at the login path.")]
	RedirectLoop {
		/// Normalized target that was rejected.
		target: String,
	},
	/// Redirect target lives on a domain other than the application's own.
	#[error("Redirect target `{target}` is not on the application domain.")]
	UntrustedRedirect {
		/// Target that was rejected.
		target: String,
	},
}

/// Configuration and validation failures raised while assembling the session stack.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Required setting is absent.
	#[error("Required setting `{key}` is missing.")]
	Missing {
		/// Setting name (environment variable or builder field).
		key: &'static str,
	},
	/// Setting holds a URL that cannot be parsed.
	#[error("Setting `{key}` is not a valid URL.")]
	InvalidUrl {
		/// Setting name.
		key: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// URL uses a scheme other than http(s).
	#[error("Setting `{key}` must use http or https: {url}.")]
	UnsupportedScheme {
		/// Setting name.
		key: &'static str,
		/// Offending URL.
		url: String,
	},
	/// Base path contains characters that cannot appear in a path prefix.
	#[error("Base path `{value}` is invalid.")]
	InvalidBasePath {
		/// Raw value supplied.
		value: String,
	},
	/// Setting holds a value that cannot be parsed.
	#[error("Setting `{key}` has an invalid value `{value}`.")]
	InvalidValue {
		/// Setting name.
		key: &'static str,
		/// Raw value supplied.
		value: String,
	},
	/// Signing secret is too short to derive a sealing key from.
	#[error("Signing secret must be at least {min} bytes long.")]
	WeakSigningSecret {
		/// Minimum accepted length in bytes.
		min: usize,
	},
	/// Sealing key could not be derived.
	#[error("Sealing key could not be derived from the signing secret.")]
	SealingKey,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures talking to the identity provider.
#[derive(Debug, ThisError)]
pub enum ProviderError {
	/// Provider answered with a non-2xx status.
	#[error("Provider rejected the request with HTTP {status} ({kind}).")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Heuristic classification of the failure.
		kind: ProviderErrorKind,
		/// Truncated response body, for logs only.
		body: String,
	},
	/// Provider answered 2xx with a body that is not a valid token response.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Authorization-code exchange did not return an ID token.
	#[error("Token endpoint response is missing id_token.")]
	MissingIdToken,
	/// ID token payload could not be read.
	#[error("ID token is invalid: {reason}.")]
	InvalidIdToken {
		/// What was wrong with the token.
		reason: String,
	},
	/// Underlying HTTP client reported a network failure (including timeouts).
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] std::io::Error),
	/// Anything else the OAuth client reported.
	#[error("Identity provider call failed: {message}.")]
	Unexpected {
		/// Human readable summary.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl ProviderError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// HTTP status code reported by the provider, if the call got that far.
	pub fn http_status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. } => Some(*status),
			Self::MalformedResponse { status, .. } | Self::Unexpected { status, .. } => *status,
			_ => None,
		}
	}

	/// Truncated provider response body for non-2xx answers.
	pub fn body(&self) -> Option<&str> {
		match self {
			Self::Rejected { body, .. } => Some(body),
			_ => None,
		}
	}
}

/// Reasons a session artifact could not be opened.
///
/// Every variant means "no session"; the distinction only matters for logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum DecodeError {
	/// No artifact was presented.
	#[error("Session artifact is absent.")]
	Absent,
	/// Artifact opened but its payload is not a session.
	#[error("Session artifact is malformed.")]
	Malformed,
	/// Artifact failed authentication (tampered, wrong key, or not base64).
	#[error("Session artifact signature is invalid.")]
	SignatureInvalid,
	/// Artifact is authentic but older than the session lifetime.
	#[error("Session artifact has expired.")]
	Expired,
}
