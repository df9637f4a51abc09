//! Opt-in deduplication of concurrent refreshes that carry the same refresh token.
//!
//! Keys are SHA-256 digests of the refresh token so raw tokens never sit in memory longer than a
//! request. Only successful exchanges are cached, and only for the configured TTL.

// std
use std::time::{Duration as StdDuration, Instant};
// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, provider::TokenExchange};

type Cell = Arc<AsyncMutex<Option<(TokenExchange, OffsetDateTime)>>>;

struct Slot {
	created: Instant,
	cell: Cell,
}

pub(crate) struct RefreshSingleflight {
	ttl: StdDuration,
	slots: Mutex<HashMap<[u8; 32], Slot>>,
}
impl RefreshSingleflight {
	pub(crate) fn new(ttl: StdDuration) -> Self {
		Self { ttl, slots: Mutex::new(HashMap::new()) }
	}

	/// Runs `exchange` unless an exchange for the same refresh token already succeeded within the
	/// TTL, in which case that result (and the instant it was obtained) is returned instead.
	///
	/// The per-key async lock is held across the provider call; the map lock never is.
	pub(crate) async fn run<F, Fut>(
		&self,
		refresh_token: &str,
		now: OffsetDateTime,
		exchange: F,
	) -> Result<(TokenExchange, OffsetDateTime)>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<TokenExchange>>,
	{
		let cell = self.cell(refresh_token);
		let mut guard = cell.lock().await;

		if let Some(hit) = guard.as_ref() {
			tracing::debug!("Reusing a deduplicated refresh result.");

			return Ok(hit.clone());
		}

		let fresh = exchange().await?;

		*guard = Some((fresh.clone(), now));

		Ok((fresh, now))
	}

	fn cell(&self, refresh_token: &str) -> Cell {
		let key: [u8; 32] = Sha256::digest(refresh_token.as_bytes()).into();
		let mut slots = self.slots.lock();
		let ttl = self.ttl;

		slots.retain(|_, slot| slot.created.elapsed() < ttl);

		Arc::clone(
			&slots
				.entry(key)
				.or_insert_with(|| Slot { created: Instant::now(), cell: Arc::new(AsyncMutex::new(None)) })
				.cell,
		)
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::session::TokenSecret;

	fn exchange(access: &str) -> TokenExchange {
		TokenExchange {
			access_token: TokenSecret::new(access),
			refresh_token: None,
			id_token: None,
			expires_in: Duration::seconds(300),
		}
	}

	#[tokio::test]
	async fn reuses_success_within_ttl() {
		let singleflight = RefreshSingleflight::new(StdDuration::from_secs(30));
		let calls = AtomicUsize::new(0);
		let counter = &calls;
		let now = OffsetDateTime::now_utc();
		let call = move || async move {
			counter.fetch_add(1, Ordering::SeqCst);

			Ok(exchange("at2"))
		};
		let (first, first_at) =
			singleflight.run("rt1", now, call).await.expect("First exchange should succeed.");
		let (second, second_at) = singleflight
			.run("rt1", now + Duration::seconds(5), call)
			.await
			.expect("Second exchange should reuse.");

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(first, second);
		assert_eq!(first_at, second_at);

		singleflight.run("rt-other", now, call).await.expect("Other key should call through.");

		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn failures_are_not_cached() {
		let singleflight = RefreshSingleflight::new(StdDuration::from_secs(30));
		let now = OffsetDateTime::now_utc();

		assert!(
			singleflight
				.run("rt1", now, || async { Err(Error::MissingRefreshToken) })
				.await
				.is_err()
		);
		assert!(singleflight.run("rt1", now, || async { Ok(exchange("at2")) }).await.is_ok());
	}

	#[tokio::test]
	async fn expired_slots_are_pruned() {
		let singleflight = RefreshSingleflight::new(StdDuration::ZERO);
		let now = OffsetDateTime::now_utc();

		singleflight
			.run("rt1", now, || async { Ok(exchange("at2")) })
			.await
			.expect("Exchange should succeed.");

		let (again, _) = singleflight
			.run("rt1", now, || async { Ok(exchange("at3")) })
			.await
			.expect("Exchange should succeed.");

		assert_eq!(again.access_token.expose(), "at3");
	}
}
