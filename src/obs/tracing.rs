// std
use std::time::Instant;
// crates.io
use tracing::{field::Empty, instrument::Instrumented};
// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome},
};

/// Span plus stopwatch for one provider round-trip.
///
/// Creating the span counts an attempt; [`FlowSpan::settle`] records the outcome on the span and
/// in the metrics.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	kind: FlowKind,
	span: tracing::Span,
	started: Instant,
}
impl FlowSpan {
	/// Opens an `oidc_session.flow` span for `kind`, tagged with the calling `stage`.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		let span =
			tracing::info_span!("oidc_session.flow", flow = kind.as_str(), stage, outcome = Empty);

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		Self { kind, span, started: Instant::now() }
	}

	/// Runs `fut` inside the span. No guard is held across `.await`.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		tracing::Instrument::instrument(fut, self.span.clone())
	}

	/// Records the final outcome and the elapsed time.
	pub fn settle(&self, outcome: FlowOutcome) {
		let elapsed = self.started.elapsed();

		self.span.record("outcome", outcome.as_str());
		self.span.in_scope(|| {
			tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "Flow settled as {outcome}.")
		});

		obs::record_flow_outcome(self.kind, outcome);
		obs::record_flow_duration(self.kind, outcome, elapsed);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrumented_future_settles() {
		let span = FlowSpan::new(FlowKind::Refresh, "test");
		let result = span.instrument(async { Ok::<_, ()>(7) }).await;

		span.settle(FlowOutcome::of(&result));

		assert_eq!(result, Ok(7));
	}
}
