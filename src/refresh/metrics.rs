// std
use std::sync::atomic::{AtomicU64, Ordering};

/// What happened to one record handed to the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RefreshTally {
	Attempted,
	Renewed,
	Failed,
	Skipped,
}

/// In-process refresh counters, readable without a metrics recorder.
///
/// `attempts` counts provider exchanges plus records that had no refresh token to exchange.
/// `successes` includes results shared through single-flight deduplication. `skipped` counts
/// records that were still fresh or had already errored.
#[derive(Debug, Default)]
pub struct RefreshMetrics([AtomicU64; 4]);
impl RefreshMetrics {
	/// Refresh attempts so far.
	pub fn attempts(&self) -> u64 {
		self.read(RefreshTally::Attempted)
	}

	/// Records renewed by the provider.
	pub fn successes(&self) -> u64 {
		self.read(RefreshTally::Renewed)
	}

	/// Records marked errored by a failed refresh.
	pub fn failures(&self) -> u64 {
		self.read(RefreshTally::Failed)
	}

	/// Records passed through untouched.
	pub fn skipped(&self) -> u64 {
		self.read(RefreshTally::Skipped)
	}

	pub(crate) fn bump(&self, tally: RefreshTally) {
		self.0[tally as usize].fetch_add(1, Ordering::Relaxed);
	}

	fn read(&self, tally: RefreshTally) -> u64 {
		self.0[tally as usize].load(Ordering::Relaxed)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn tallies_are_independent() {
		let metrics = RefreshMetrics::default();

		metrics.bump(RefreshTally::Attempted);
		metrics.bump(RefreshTally::Attempted);
		metrics.bump(RefreshTally::Failed);

		assert_eq!((metrics.attempts(), metrics.failures()), (2, 1));
		assert_eq!((metrics.successes(), metrics.skipped()), (0, 0));
	}
}
