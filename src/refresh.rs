//! Silent renewal of token records and the sign-out exchange.
//!
//! [`RefreshCoordinator::ensure_fresh`] is the only place provider failures are absorbed: a fresh
//! or already errored record passes through untouched, an expiring one is exchanged, and any
//! failure turns the record into its errored form instead of surfacing as an error. Nothing is
//! retried within a request; the gate sends errored sessions back to the login page.

mod metrics;
mod singleflight;

pub use metrics::RefreshMetrics;

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	http::TokenHttpClient,
	obs::{FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderClient,
	session::{SessionState, TokenRecord},
};
use metrics::RefreshTally;
use singleflight::RefreshSingleflight;

/// Decides whether a record needs renewal and performs it.
pub struct RefreshCoordinator<C>
where
	C: ?Sized + TokenHttpClient,
{
	provider: Arc<ProviderClient<C>>,
	metrics: Arc<RefreshMetrics>,
	singleflight: Option<RefreshSingleflight>,
}
impl<C> RefreshCoordinator<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates a coordinator without cross-request deduplication.
	pub fn new(provider: Arc<ProviderClient<C>>) -> Self {
		Self { provider, metrics: Default::default(), singleflight: None }
	}

	/// Shares one provider round trip between concurrent refreshes of the same refresh token.
	///
	/// Successful results stay reusable for `ttl`.
	pub fn with_singleflight(mut self, ttl: StdDuration) -> Self {
		self.singleflight = Some(RefreshSingleflight::new(ttl));

		self
	}

	/// Provider client used for exchanges.
	pub fn provider(&self) -> &Arc<ProviderClient<C>> {
		&self.provider
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Returns a record that is fresh, or the errored form of `record`; never fails.
	pub async fn ensure_fresh(&self, record: TokenRecord) -> TokenRecord {
		self.ensure_fresh_at(record, OffsetDateTime::now_utc()).await
	}

	/// [`ensure_fresh`](Self::ensure_fresh) against an explicit clock.
	pub async fn ensure_fresh_at(&self, record: TokenRecord, now: OffsetDateTime) -> TokenRecord {
		match record.classify(now) {
			SessionState::Fresh | SessionState::Errored => {
				self.metrics.bump(RefreshTally::Skipped);

				record
			},
			SessionState::NeedsRefresh => match self.refresh(&record, now).await {
				Ok(updated) => updated,
				Err(err) => {
					tracing::warn!(
						status = err_status(&err),
						error = %err,
						"Token refresh failed; marking the session as errored."
					);

					record.into_failed()
				},
			},
		}
	}

	/// Exchanges the record's refresh token and applies the result.
	///
	/// A record without a refresh token fails with [`Error::MissingRefreshToken`] before any I/O.
	pub async fn refresh(&self, record: &TokenRecord, now: OffsetDateTime) -> Result<TokenRecord> {
		let span = FlowSpan::new(FlowKind::Refresh, "refresh");

		self.metrics.bump(RefreshTally::Attempted);

		let result = span
			.instrument(async move {
				let secret = record.refresh_secret().ok_or(Error::MissingRefreshToken)?;
				let (exchange, obtained_at) = match &self.singleflight {
					Some(singleflight) =>
						singleflight
							.run(secret.expose(), now, || {
								self.provider.exchange_refresh_token(secret.expose())
							})
							.await?,
					None => (self.provider.exchange_refresh_token(secret.expose()).await?, now),
				};

				Ok(record.refreshed(&exchange, obtained_at))
			})
			.await;

		match &result {
			Ok(_) => self.metrics.bump(RefreshTally::Renewed),
			Err(_) => self.metrics.bump(RefreshTally::Failed),
		}

		span.settle(FlowOutcome::of(&result));

		result
	}

	/// Prepares a logout and returns the provider end-session URL to send the browser to.
	///
	/// A fresh refresh exchange supplies the `id_token_hint` (ID tokens are never stored), and the
	/// provider-side session is ended through the back channel. Both steps are best effort: any
	/// failure degrades to a URL without the hint.
	pub async fn sign_out(&self, record: Option<&TokenRecord>) -> Url {
		let span = FlowSpan::new(FlowKind::SignOut, "sign_out");

		span.instrument(async {
			let Some(secret) = record.and_then(TokenRecord::refresh_secret) else {
				span.settle(FlowOutcome::Success);

				return self.provider.build_end_session_url(None);
			};
			let (id_token, revoke_token) =
				match self.provider.exchange_refresh_token(secret.expose()).await {
					Ok(exchange) => {
						let rotated = exchange.refresh_token.unwrap_or_else(|| secret.clone());

						(exchange.id_token, rotated)
					},
					Err(err) => {
						tracing::warn!(error = %err, "Could not obtain an ID token for logout.");

						(None, secret.clone())
					},
				};
			let revoked = match self.provider.revoke_at_provider(revoke_token.expose()).await {
				Ok(()) => true,
				Err(err) => {
					tracing::warn!(error = %err, "Back-channel logout failed.");

					false
				},
			};
			let outcome = if revoked && id_token.is_some() {
				FlowOutcome::Success
			} else {
				FlowOutcome::Failure
			};

			span.settle(outcome);

			self.provider.build_end_session_url(id_token.as_deref())
		})
		.await
	}
}
impl<C> Debug for RefreshCoordinator<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("provider", &self.provider)
			.field("metrics", &self.metrics)
			.field("singleflight", &self.singleflight.is_some())
			.finish()
	}
}

fn err_status(err: &Error) -> Option<u16> {
	match err {
		Error::Provider(provider) => provider.http_status(),
		_ => None,
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		_preludet::{test_config, test_record},
		http::ReqwestHttpClient,
		session::ErrorState,
	};

	// Points at a closed port; any accidental provider call fails fast.
	fn coordinator() -> RefreshCoordinator<ReqwestHttpClient> {
		let provider = ProviderClient::new(&test_config("http://127.0.0.1:9/realms/app", ""))
			.expect("Provider client should build.");

		RefreshCoordinator::new(Arc::new(provider))
	}

	#[tokio::test]
	async fn fresh_and_errored_records_pass_through() {
		let coordinator = coordinator();
		let now = macros::datetime!(2025-01-01 12:00 UTC);
		let fresh = test_record("at1", Some("rt1"), now.unix_timestamp() + 3600);
		let errored = test_record("at1", Some("rt1"), now.unix_timestamp() - 10).into_failed();

		assert_eq!(coordinator.ensure_fresh_at(fresh.clone(), now).await, fresh);
		assert_eq!(coordinator.ensure_fresh_at(errored.clone(), now).await, errored);
		assert_eq!(coordinator.metrics().skipped(), 2);
		assert_eq!(coordinator.metrics().attempts(), 0);
	}

	#[tokio::test]
	async fn missing_refresh_token_fails_without_io() {
		let coordinator = coordinator();
		let now = macros::datetime!(2025-01-01 12:00 UTC);
		let record = test_record("at1", Some(""), now.unix_timestamp() - 1);
		let updated = coordinator.ensure_fresh_at(record.clone(), now).await;

		assert_eq!(updated.error, ErrorState::RefreshFailed);
		assert_eq!(updated.access_token, record.access_token);
		assert!(matches!(
			coordinator.refresh(&record, now).await,
			Err(Error::MissingRefreshToken)
		));
	}
}
