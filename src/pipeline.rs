use std::time::{Duration, Instant};

use tracing::info;

use crate::aggregate::{EntityAggregator, EntityOutcome, RawDocumentSink};
use crate::domain::{
    Dataset, Endpoint, EntityIdentity, EntityRecord, FailureLog, FailureRecord, RunMetadata,
    RunMode, iso_timestamp,
};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub dataset: Dataset,
    pub failure_log: FailureLog,
}

impl RunOutput {
    pub fn attempted(&self) -> usize {
        self.dataset.metadata.total_companies_attempted
    }

    pub fn success_rate(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            return 0.0;
        }
        self.dataset.companies.len() as f64 / attempted as f64 * 100.0
    }
}

/// Accumulated results of a run in progress.
#[derive(Debug, Default)]
struct RunState {
    attempted: usize,
    entities: Vec<EntityRecord>,
    failures: Vec<FailureRecord>,
}

impl RunState {
    fn absorb(&mut self, outcome: EntityOutcome) {
        self.attempted += 1;
        self.entities.extend(outcome.record);
        self.failures.extend(outcome.failures);
    }

    fn finish(self, mode: RunMode) -> RunOutput {
        let metadata = RunMetadata {
            scrape_date: iso_timestamp(),
            total_companies_attempted: self.attempted,
            successful_companies: self.entities.len(),
            failed_companies: self.failures.len(),
            endpoints_per_company: Endpoint::ALL.len(),
            test_mode: mode.is_test(),
        };
        RunOutput {
            dataset: Dataset {
                metadata: metadata.clone(),
                companies: self.entities,
            },
            failure_log: FailureLog {
                metadata,
                failed_requests: self.failures,
            },
        }
    }
}

pub struct DatasetBuilder<T: Transport, S: RawDocumentSink> {
    aggregator: EntityAggregator<T, S>,
    progress_every: usize,
}

impl<T: Transport, S: RawDocumentSink> DatasetBuilder<T, S> {
    pub fn new(aggregator: EntityAggregator<T, S>, progress_every: usize) -> Self {
        Self {
            aggregator,
            progress_every: progress_every.max(1),
        }
    }

    /// Scrapes `identities` in order and returns both run documents. Always
    /// completes, even when every entity fails.
    pub fn run(
        &self,
        identities: &[EntityIdentity],
        mode: RunMode,
        sink: &dyn ProgressSink,
    ) -> RunOutput {
        let total = identities.len();
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Scrape; processing {total} companies"),
            elapsed: None,
        });

        let mut state = RunState::default();
        for (index, identity) in identities.iter().enumerate() {
            info!(
                "[{}/{}] scraping {} ({})",
                index + 1,
                total,
                identity.name,
                identity.composite_key()
            );
            state.absorb(self.aggregator.scrape_entity(identity));

            if (index + 1) % self.progress_every == 0 {
                sink.event(ProgressEvent {
                    message: format!(
                        "progress {}/{} companies; successful={} failed={}",
                        index + 1,
                        total,
                        state.entities.len(),
                        state.failures.len()
                    ),
                    elapsed: Some(start.elapsed()),
                });
            }
        }

        let output = state.finish(mode);
        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; successful={} failed={}",
                output.dataset.companies.len(),
                output.failure_log.failed_requests.len()
            ),
            elapsed: Some(start.elapsed()),
        });
        output
    }
}

/// Rough wall-clock estimate for a full run: one politeness delay per
/// endpoint per company, ignoring response time.
pub fn estimated_duration(companies: usize, request_delay: Duration) -> Duration {
    let requests = companies.saturating_mul(Endpoint::ALL.len());
    request_delay.saturating_mul(u32::try_from(requests).unwrap_or(u32::MAX))
}
