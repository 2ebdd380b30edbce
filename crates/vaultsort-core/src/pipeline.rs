//! Run orchestration
//!
//! A run partitions the records into rule matches and model work, sends the
//! model work in concurrent batches, and merges everything back into input
//! order. Batch failures never fail the run: each batch ends either with the
//! model's answer or with fallback classifications that record the cause.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::ai::{
    fallback_batch, parse_batch_response, resolve_batch, AIBackend, AIClient, BatchState,
    RetryPolicy,
};
use crate::batch::{batches, validate_batch_size};
use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::export::{assemble_rows, ExportOptions, OutputRow};
use crate::merge::merge_classifications;
use crate::models::{Classification, Record};
use crate::prompts::PromptLibrary;
use crate::rules::DeterministicMatcher;

/// Run-wide stop signal
///
/// The first reason given wins. Clones observe the same signal.
#[derive(Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<Option<String>>>,
    rx: watch::Receiver<Option<String>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self, reason: &str) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason.to_string());
                true
            } else {
                false
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Resolves with the reason once the run is cancelled
    pub async fn cancelled(&self) -> String {
        let mut rx = self.rx.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if rx.changed().await.is_err() {
                // Sender gone; nobody can cancel any more
                std::future::pending::<()>().await;
            }
        }
    }

    /// Cancel with "run timeout" after `timeout` unless cancelled earlier
    pub fn cancel_after(&self, timeout: Duration) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => this.cancel("run timeout"),
                _ = this.cancelled() => {}
            }
        })
    }
}

/// Knobs for one run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_size: i64,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Send only the first item per domain; the rest inherit its result
    pub reuse_domain_results: bool,
    pub run_timeout: Option<Duration>,
    pub export: ExportOptions,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            concurrency: config.concurrency,
            retry: config.retry_policy(),
            reuse_domain_results: false,
            run_timeout: config.run_timeout,
            export: ExportOptions::default(),
        }
    }
}

/// Counts describing a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub total: usize,
    /// Matched by the domain-folder map or homelab detection
    pub deterministic: usize,
    /// Classified by the model, including items that reused a domain result
    pub model: usize,
    /// Fallback classifications (`Uncategorized`, confidence 0)
    pub fallback: usize,
    /// Items that inherited a same-domain result
    pub reused: usize,
    pub batches: usize,
    /// Requests repeated after a transport failure
    pub retries: u32,
    pub cancelled: bool,
    pub cancel_reason: Option<String>,
}

/// Everything a run produces, in input order
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub classifications: Vec<Classification>,
    pub rows: Vec<OutputRow>,
    pub report: RunReport,
}

/// Classifies vault records end to end
pub struct Categorizer {
    client: AIClient,
    matcher: DeterministicMatcher,
    prompts: PromptLibrary,
    settings: PipelineSettings,
}

impl Categorizer {
    /// Fails with a configuration error for unusable batch settings
    pub fn new(
        client: AIClient,
        matcher: DeterministicMatcher,
        settings: PipelineSettings,
    ) -> Result<Self> {
        validate_batch_size(settings.batch_size)?;
        if settings.concurrency == 0 {
            return Err(Error::Configuration(
                "Concurrency must be greater than 0".into(),
            ));
        }
        Ok(Self {
            client,
            matcher,
            prompts: PromptLibrary::new(),
            settings,
        })
    }

    /// Use a specific prompt library instead of the default lookup
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    /// Classify `records` and assemble the output rows
    pub async fn run(&mut self, records: &[Record], cancel: &Cancellation) -> Result<RunOutput> {
        let partition = self.matcher.partition(records);
        let deterministic = partition.matched.len();

        let (to_send, followers) = if self.settings.reuse_domain_results {
            share_by_domain(partition.unmatched)
        } else {
            (partition.unmatched, Vec::new())
        };

        let work: Vec<Vec<Record>> = batches(&to_send, self.settings.batch_size)?
            .map(|b| b.to_vec())
            .collect();

        info!(
            total = records.len(),
            deterministic,
            model = to_send.len(),
            reused = followers.len(),
            batches = work.len(),
            "Classifying vault items"
        );

        // Render every prompt before any request so template errors stay fatal
        let prompts = work
            .iter()
            .map(|batch| self.prompts.render_batch(batch))
            .collect::<Result<Vec<_>>>()?;

        let timer = self.settings.run_timeout.map(|t| cancel.cancel_after(t));
        let outcomes = self.send_batches(work, prompts, cancel).await;
        if let Some(timer) = timer {
            timer.abort();
        }

        let mut report = RunReport {
            total: records.len(),
            deterministic,
            batches: outcomes.len(),
            ..Default::default()
        };

        let mut model_results: Vec<Classification> = Vec::with_capacity(to_send.len());
        for outcome in outcomes {
            report.retries += outcome.retries;
            report.cancelled |= outcome.cancelled;
            model_results.extend(outcome.classifications);
        }

        let inherited = inherit_domain_results(&model_results, &followers);
        report.reused = inherited.len();
        model_results.extend(inherited);

        report.fallback = model_results.iter().filter(|c| c.is_fallback()).count();
        report.model = model_results.len() - report.fallback;
        if report.cancelled {
            report.cancel_reason = cancel.reason();
        }

        let classifications =
            merge_classifications(records, partition.matched.into_iter().chain(model_results))?;
        let rows = assemble_rows(records, &classifications, self.settings.export)?;

        info!(
            deterministic = report.deterministic,
            model = report.model,
            fallback = report.fallback,
            retries = report.retries,
            cancelled = report.cancelled,
            "Classification finished"
        );

        Ok(RunOutput {
            classifications,
            rows,
            report,
        })
    }

    /// Run every batch under the concurrency limit, results in batch order
    async fn send_batches(
        &self,
        work: Vec<Vec<Record>>,
        prompts: Vec<String>,
        cancel: &Cancellation,
    ) -> Vec<BatchOutcome> {
        let total = work.len();
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));
        let mut futures = FuturesUnordered::new();

        for (index, (batch, prompt)) in work.iter().cloned().zip(prompts).enumerate() {
            let client = self.client.clone();
            let sem = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let policy = self.settings.retry;

            futures.push(tokio::spawn(async move {
                run_batch(index, client, batch, prompt, policy, sem, cancel).await
            }));
        }

        let mut slots: Vec<Option<BatchOutcome>> = (0..total).map(|_| None).collect();
        let mut completed = 0;

        while let Some(joined) = futures.next().await {
            match joined {
                Ok(outcome) => {
                    completed += 1;
                    debug!(batch = outcome.index, completed, total, "Batch finished");
                    let index = outcome.index;
                    slots[index] = Some(outcome);
                }
                Err(e) => warn!(error = %e, "Batch task failed"),
            }
        }

        slots
            .into_iter()
            .zip(work)
            .enumerate()
            .map(|(index, (slot, batch))| {
                slot.unwrap_or_else(|| BatchOutcome {
                    index,
                    classifications: fallback_batch(&batch, "batch worker failed"),
                    retries: 0,
                    cancelled: false,
                })
            })
            .collect()
    }
}

/// Result of one batch's lifecycle
struct BatchOutcome {
    index: usize,
    classifications: Vec<Classification>,
    retries: u32,
    cancelled: bool,
}

/// Drive one batch through the retry state machine
async fn run_batch(
    index: usize,
    client: AIClient,
    batch: Vec<Record>,
    prompt: String,
    policy: RetryPolicy,
    semaphore: Arc<Semaphore>,
    cancel: Cancellation,
) -> BatchOutcome {
    let ids: Vec<&str> = batch.iter().map(|r| r.id.as_str()).collect();
    let mut state = BatchState::Pending;
    let mut retries = 0;

    let permit = tokio::select! {
        biased;
        reason = cancel.cancelled() => {
            state = state.cancel(&reason);
            None
        }
        permit = semaphore.acquire() => permit.ok(),
    };

    let mut answer = None;
    if permit.is_some() {
        loop {
            state = state.send();
            debug!(batch = index, attempt = state.attempts(), items = batch.len(), "Requesting batch");

            let reply = tokio::select! {
                biased;
                reason = cancel.cancelled() => {
                    state = state.cancel(&reason);
                    break;
                }
                reply = client.complete(&prompt) => reply,
            };

            match reply.and_then(|text| {
                debug!(batch = index, "Model reply: {}", text);
                parse_batch_response(&text, &ids)
            }) {
                Ok(parsed) => {
                    state = state.succeed();
                    answer = Some(resolve_batch(&batch, parsed));
                    break;
                }
                Err(cause) => {
                    warn!(batch = index, attempt = state.attempts(), error = %cause, "Batch request failed");
                    state = state.fail(cause, &policy);
                    let delay = match &state {
                        BatchState::RetryScheduled { delay, .. } => *delay,
                        _ => break,
                    };
                    retries += 1;
                    tokio::select! {
                        biased;
                        reason = cancel.cancelled() => {
                            state = state.cancel(&reason);
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    } else if !state.is_terminal() {
        state = state.cancel("concurrency limiter closed");
    }
    drop(permit);

    let (classifications, cancelled) = match (answer, &state) {
        (Some(classifications), _) => (classifications, false),
        (None, BatchState::Fallback { reason, .. }) => {
            warn!(batch = index, items = batch.len(), reason = %reason, "Batch fell back");
            (fallback_batch(&batch, reason), reason.starts_with("cancelled"))
        }
        (None, other) => (
            fallback_batch(&batch, &format!("batch ended in state {:?}", other)),
            false,
        ),
    };

    BatchOutcome {
        index,
        classifications,
        retries,
        cancelled,
    }
}

/// Keep the first record per non-empty domain; pair the rest with it
///
/// Returns the records to send and `(follower_id, leader_id)` pairs.
fn share_by_domain(records: Vec<Record>) -> (Vec<Record>, Vec<(String, String)>) {
    let mut leaders: HashMap<String, String> = HashMap::new();
    let mut to_send = Vec::with_capacity(records.len());
    let mut followers = Vec::new();

    for record in records {
        if record.domain.is_empty() {
            to_send.push(record);
            continue;
        }
        match leaders.get(&record.domain) {
            Some(leader) => followers.push((record.id.clone(), leader.clone())),
            None => {
                leaders.insert(record.domain.clone(), record.id.clone());
                to_send.push(record);
            }
        }
    }

    (to_send, followers)
}

fn inherit_domain_results(
    results: &[Classification],
    followers: &[(String, String)],
) -> Vec<Classification> {
    let by_id: HashMap<&str, &Classification> =
        results.iter().map(|c| (c.item_id.as_str(), c)).collect();

    followers
        .iter()
        .map(|(follower, leader)| match by_id.get(leader.as_str()) {
            Some(source) => Classification {
                item_id: follower.clone(),
                reason: format!("{} (same domain as {})", source.reason, leader)
                    .trim_start()
                    .to_string(),
                ..(*source).clone()
            },
            None => Classification::fallback(follower, "no response"),
        })
        .collect()
}
