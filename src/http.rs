//! Transport seam between the provider client and the network.
//!
//! [`TokenHttpClient`] hands out one [`AsyncHttpClient`] handle per provider call, bound to a
//! [`ResponseMetadataSlot`]. The handle clears the slot before sending and fills it once the
//! provider answers, so a Keycloak `400 invalid_grant` can be told apart from a body that failed
//! to parse. Swap the transport (or stub it in tests) by implementing the trait.

// std
#[cfg(feature = "reqwest")] use std::time::Duration as StdDuration;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")] use crate::error::ConfigError;

/// Longest response body excerpt kept for diagnostics.
pub const BODY_PREVIEW_LIMIT: usize = 256;

/// Abstraction over HTTP transports able to reach the identity provider.
///
/// Implementations must be `Send + Sync + 'static` so one instance can be shared by the provider
/// client, the refresh coordinator, and every request task. The handles they return must own
/// whatever state they need so request futures stay `Send` while in flight.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the request.
	/// - Once a response arrives, save its status (and, for non-2xx answers, a body preview of at
	///   most [`BODY_PREVIEW_LIMIT`] characters) with [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Metadata from the most recent HTTP response, used for error mapping and logs.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response was received.
	pub status: Option<u16>,
	/// Truncated body of a non-2xx response.
	pub body_preview: Option<String>,
}
impl ResponseMetadata {
	/// Captures metadata for a response, keeping a body preview only for failures.
	pub fn capture(status: u16, body: &[u8]) -> Self {
		let body_preview = (!(200..300).contains(&status)).then(|| preview(body));

		Self { status: Some(status), body_preview }
	}

	/// Returns `true` when the status is present and outside the 2xx range.
	pub fn is_failure(&self) -> bool {
		self.status.is_some_and(|status| !(200..300).contains(&status))
	}
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Truncates a response body to [`BODY_PREVIEW_LIMIT`] characters.
pub fn preview(body: &[u8]) -> String {
	String::from_utf8_lossy(body).chars().take(BODY_PREVIEW_LIMIT).collect()
}

/// reqwest-backed transport used by default.
///
/// Provider calls never follow redirects, so a misconfigured issuer surfaces as a 3xx rejection
/// instead of silently landing on a login page.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient {
	client: ReqwestClient,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a client that gives up on a provider call after `timeout`.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.timeout(timeout)
			.redirect(reqwest::redirect::Policy::none())
			.build()?;

		Ok(Self { client })
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = ProviderCall;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ProviderCall { client: self.client.clone(), slot }
	}
}

/// One provider round-trip through [`ReqwestHttpClient`], reporting into its slot.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ProviderCall {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for ProviderCall {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let endpoint = request.uri().path().to_owned();
			let sent = self.client.execute(request.try_into().map_err(Box::new)?).await;
			let answer = sent.map_err(|err| {
				tracing::debug!(endpoint = %endpoint, error = %err, "Provider unreachable.");

				Box::new(err)
			})?;
			let status = answer.status();
			let headers = answer.headers().clone();
			let body = answer.bytes().await.map_err(Box::new)?.to_vec();

			tracing::trace!(endpoint = %endpoint, status = status.as_u16(), "Provider answered.");
			self.slot.store(ResponseMetadata::capture(status.as_u16(), &body));

			let mut response = HttpResponse::new(body);

			*response.status_mut() = status;
			*response.headers_mut() = headers;

			Ok(response)
		})
	}
}
