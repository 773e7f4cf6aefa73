//! Sweep coordinator - main orchestration logic
//!
//! This module contains the main sweep loop that coordinates all aspects of
//! a session, including:
//! - Selecting candidate IDs (resume, forbidden filtering, rescrape lists)
//! - Running one worker task per ID under a bounded in-flight window
//! - Committing outcomes in ascending ID order
//! - Boundary cancellation and ban termination
//! - Progress reporting and the end-of-run summary
//!
//! Worker tasks never touch an output file. Every record, forbidden-list
//! and carry-forward write happens here, on the coordinator's own task.

use crate::config::{Config, OutputMode};
use crate::crawler::assets::{AssetDownloader, AssetOutcome, StorageQuota};
use crate::crawler::classifier::{PageClass, PageClassifier};
use crate::crawler::fetcher::{FetchEngine, FetchOutcome, HttpTransport, Transport, TransportError};
use crate::crawler::scheduler::{CommitQueue, Gate};
use crate::output::{format_duration, RunSummary, Termination};
use crate::record::{format_id, Record};
use crate::state::TaskStatus;
use crate::storage::{
    load_indexed_ids, load_rescrape_entries, record_output, ForbiddenList, LineSink,
    RecordSink, SinkMode, SinkResult,
};
use crate::SweepError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{AbortHandle, JoinSet};

/// What one worker task produced for one ID
#[derive(Debug)]
enum Outcome {
    Entry {
        record: Record,
        asset: Option<AssetOutcome>,
    },
    Removed(Record),
    Unparseable,
    Boundary,
    NetworkError(TransportError),
    BanSuspected,
    Cancelled,
}

/// Per-ID pipeline run inside worker tasks: fetch, classify, download
struct Worker {
    engine: FetchEngine,
    classifier: PageClassifier,
    assets: Option<AssetDownloader>,
    id_width: usize,
}

impl Worker {
    async fn process(&self, id: u64) -> Outcome {
        let padded = format_id(id, self.id_width);

        let html = match self.engine.fetch(&padded).await {
            FetchOutcome::Success(html) => html,
            FetchOutcome::TransientFailure(e) => return Outcome::NetworkError(e),
            FetchOutcome::BanSuspected => return Outcome::BanSuspected,
            FetchOutcome::Cancelled => return Outcome::Cancelled,
        };

        match self.classifier.classify(&padded, &html) {
            PageClass::BoundaryReached => Outcome::Boundary,
            PageClass::Removed(record) => Outcome::Removed(record),
            PageClass::Unparseable => {
                tracing::warn!("Could not extract an entry from the page for {}", padded);
                Outcome::Unparseable
            }
            PageClass::Valid(mut record) => {
                let asset = match &self.assets {
                    Some(assets) => {
                        let outcome = assets.download(&record).await;
                        if let Some(path) = outcome.local_path() {
                            record.asset_local_path = Some(path.display().to_string());
                        }
                        Some(outcome)
                    }
                    None => None,
                };
                Outcome::Entry { record, asset }
            }
        }
    }
}

/// Existing metadata lines kept during a rescrape
#[derive(Debug, Default)]
struct CarryForward {
    /// Lines being re-fetched, written back if the new fetch yields no record
    originals: HashMap<u64, String>,

    /// Lines left out of the rescrape, written back in ID order
    passthrough: BTreeMap<u64, String>,

    /// Lines without an ID, written first
    unkeyed: Vec<String>,
}

/// IDs a session will process, and what it starts from
struct Plan {
    candidates: Vec<u64>,
    indexed: HashSet<u64>,
    carry: CarryForward,
}

/// Candidate counts reported by a dry run
#[derive(Debug, Clone)]
pub struct PlanPreview {
    pub candidates: usize,
    pub first: Option<u64>,
    pub last: Option<u64>,
    pub already_indexed: usize,
    pub forbidden: usize,
}

/// Output-side state of a running session
struct Session {
    sink: Option<Box<dyn RecordSink>>,
    forbidden: ForbiddenList,
    carry: CarryForward,
    summary: RunSummary,
    record_removed: bool,
}

impl Session {
    /// Applies one outcome to the outputs and totals
    fn commit(&mut self, id: u64, outcome: &Outcome) -> SinkResult<()> {
        self.write_passthrough(Some(id))?;
        self.summary.attempted += 1;

        match outcome {
            Outcome::Entry { record, asset } => {
                self.summary.found += 1;
                match asset {
                    Some(a) if a.is_acquired() => self.summary.assets_acquired += 1,
                    Some(AssetOutcome::QuotaExceeded) => self.summary.assets_over_quota += 1,
                    _ => {}
                }
                self.write_record(record)?;
            }
            Outcome::Removed(record) => {
                self.summary.removed += 1;
                if self.record_removed && self.sink.is_some() {
                    self.write_record(record)?;
                } else {
                    self.forbidden.add(id)?;
                }
            }
            Outcome::Unparseable => {
                self.forbidden.add(id)?;
                self.keep_original(id)?;
            }
            Outcome::Boundary => self.keep_original(id)?,
            Outcome::NetworkError(_) => {
                self.summary.network_errors += 1;
                self.keep_original(id)?;
            }
            Outcome::BanSuspected | Outcome::Cancelled => {}
        }
        Ok(())
    }

    fn write_record(&mut self, record: &Record) -> SinkResult<()> {
        if let Some(sink) = self.sink.as_mut() {
            if sink.write_record(record)? {
                self.summary.records_written += 1;
            }
        }
        Ok(())
    }

    /// Writes back the existing line for `id`, if one is being replaced
    fn keep_original(&mut self, id: u64) -> SinkResult<()> {
        let (Some(sink), Some(line)) = (self.sink.as_mut(), self.carry.originals.remove(&id))
        else {
            return Ok(());
        };
        if sink.write_line(Some(id), &line)? {
            self.summary.carried_forward += 1;
        }
        Ok(())
    }

    /// Writes back passthrough lines below `bound`, or all of them
    fn write_passthrough(&mut self, bound: Option<u64>) -> SinkResult<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        while let Some(entry) = self.carry.passthrough.first_entry() {
            if bound.is_some_and(|b| *entry.key() >= b) {
                break;
            }
            let (id, line) = entry.remove_entry();
            if sink.write_line(Some(id), &line)? {
                self.summary.carried_forward += 1;
            }
        }
        Ok(())
    }

    fn write_unkeyed(&mut self) -> SinkResult<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        for line in std::mem::take(&mut self.carry.unkeyed) {
            sink.write_line(None, &line)?;
            self.summary.carried_forward += 1;
        }
        Ok(())
    }

    /// Makes the outputs final, or abandons a replacement that did not finish
    fn finish(&mut self, mode: OutputMode, termination: &Termination) -> SinkResult<()> {
        let replacing = mode == OutputMode::Rescrape;
        if replacing && termination.is_fatal() {
            if let Some(sink) = self.sink.as_mut() {
                sink.discard()?;
            }
            return Ok(());
        }

        if replacing {
            self.write_passthrough(None)?;
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.commit()?;
        }
        Ok(())
    }
}

/// Main sweep coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    worker: Arc<Worker>,
    gate: Gate,
    quota: Option<Arc<StorageQuota>>,
}

impl Coordinator {
    /// Creates a coordinator over the given transport
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `transport` - Network seam used for pages and assets
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(SweepError)` - The asset directory could not be measured
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self, SweepError> {
        let gate = Gate::new(&config.network);
        let engine = FetchEngine::new(Arc::clone(&transport), gate.clone(), &config.network);
        let classifier = PageClassifier::new(config.markers.clone());

        let (assets, quota) = if config.downloads_assets() {
            let quota = Arc::new(StorageQuota::for_directory(
                &config.assets.directory,
                config.assets.budget_bytes(),
            )?);
            tracing::info!(
                "Asset storage: {} of {} bytes already used in {}",
                quota.used(),
                quota.budget(),
                config.assets.directory.display()
            );
            let downloader = AssetDownloader::new(
                transport,
                gate.clone(),
                Arc::clone(&quota),
                config.assets.directory.clone(),
                config.assets.download_adult,
                config.session.mode == OutputMode::Rescrape,
                config.assets.timeout(),
            );
            (Some(downloader), Some(quota))
        } else {
            (None, None)
        };

        let worker = Worker {
            engine,
            classifier,
            assets,
            id_width: config.session.id_width,
        };

        Ok(Self {
            config: Arc::new(config),
            worker: Arc::new(worker),
            gate,
            quota,
        })
    }

    /// Creates a coordinator that talks to the configured site over HTTP
    pub fn with_http(config: Config) -> Result<Self, SweepError> {
        let transport = HttpTransport::new(&config.network)?;
        Self::new(config, Arc::new(transport))
    }

    /// Runs the session until it finishes or Ctrl-C is pressed
    pub async fn run(&mut self) -> Result<RunSummary, SweepError> {
        self.run_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs the session until it finishes or `shutdown` resolves
    ///
    /// A suspected ban, an interruption or an output failure still returns
    /// `Ok` with the reason in `RunSummary::termination`; `Err` is reserved
    /// for failures before any work was issued.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<RunSummary, SweepError>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let session_config = &self.config.session;
        let mode = session_config.mode;

        let forbidden =
            ForbiddenList::load(&self.config.output.forbidden_path, session_config.id_width)?;
        let plan = plan(&self.config, &forbidden)?;

        let sink: Option<Box<dyn RecordSink>> = match record_output(&self.config) {
            Some((path, format)) => {
                let sink_mode = match mode {
                    OutputMode::Rescrape => SinkMode::Replace,
                    _ if session_config.resume => SinkMode::Append,
                    _ => SinkMode::Overwrite,
                };
                Some(Box::new(LineSink::open(path, format, sink_mode, plan.indexed)?))
            }
            None => None,
        };

        let mut session = Session {
            sink,
            forbidden,
            carry: plan.carry,
            summary: RunSummary::new(mode),
            record_removed: session_config.record_removed,
        };
        session.summary.candidates = plan.candidates.len() as u64;
        session.write_unkeyed()?;

        let total = plan.candidates.len();
        tracing::info!(
            "Starting {:?} sweep: {} candidate IDs ({}..={})",
            mode,
            total,
            plan.candidates.first().copied().unwrap_or(session_config.start_id),
            plan.candidates.last().copied().unwrap_or(session_config.end_id)
        );

        let window = (self.config.network.concurrency.max(1) as usize) * 2;
        let cancel_above_boundary = mode != OutputMode::Rescrape;

        let mut pending = plan.candidates.into_iter();
        let mut tasks: JoinSet<(u64, Outcome)> = JoinSet::new();
        let mut in_flight: HashMap<u64, AbortHandle> = HashMap::new();
        let mut queue: CommitQueue<Outcome> = CommitQueue::new();
        let mut issuing = true;
        let mut completed: u64 = 0;
        let mut termination = Termination::Completed;

        tokio::pin!(shutdown);

        loop {
            // Issued but uncommitted IDs never exceed the window
            while issuing && queue.outstanding() < window {
                let Some(id) = pending.next() else {
                    issuing = false;
                    break;
                };
                if !queue.admits(id) {
                    issuing = false;
                    break;
                }
                let worker = Arc::clone(&self.worker);
                let handle = tasks.spawn(async move { (id, worker.process(id).await) });
                in_flight.insert(id, handle);
                queue.issue(id);
            }

            if tasks.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = tasks.join_next() => joined,
                _ = &mut shutdown => {
                    tracing::warn!("Interrupt received, stopping the sweep");
                    termination = Termination::Interrupted;
                    break;
                }
            };
            let Some(joined) = joined else {
                break;
            };

            let (id, outcome) = match joined {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    tracing::error!("Worker task failed: {}", e);
                    termination = Termination::TaskFailed(e.to_string());
                    break;
                }
            };

            // Cancelled after it had already finished
            if in_flight.remove(&id).is_none() {
                continue;
            }
            completed += 1;

            match &outcome {
                Outcome::Boundary if cancel_above_boundary => {
                    let above = queue.record_boundary(id);
                    if !above.is_empty() || issuing {
                        tracing::info!(
                            "Reached the end of the ID range at {}, cancelling {} tasks above it",
                            format_id(id, session_config.id_width),
                            above.len()
                        );
                    }
                    for above_id in above {
                        if let Some(handle) = in_flight.remove(&above_id) {
                            handle.abort();
                        }
                        queue.cancel(above_id);
                    }
                }
                Outcome::BanSuspected => {
                    termination = Termination::BanSuspected { id };
                }
                _ => {}
            }

            self.report_progress(id, &outcome, completed, total, &session.summary, start_time);

            if termination.is_fatal() {
                break;
            }

            for (ready_id, ready) in queue.resolve(id, outcome) {
                if let Err(e) = session.commit(ready_id, &ready) {
                    tracing::error!("Failed to write output for {}: {}", ready_id, e);
                    termination = Termination::SinkFailed(e.to_string());
                    break;
                }
            }
            if termination.is_fatal() {
                break;
            }
        }

        if termination.is_fatal() {
            self.gate.close();
            for (_, handle) in in_flight.drain() {
                handle.abort();
            }

            // Outcomes already received are kept; nothing is rolled back
            if !matches!(termination, Termination::SinkFailed(_)) {
                for (ready_id, ready) in queue.flush() {
                    if let Err(e) = session.commit(ready_id, &ready) {
                        tracing::error!("Failed to write output for {}: {}", ready_id, e);
                        termination = Termination::SinkFailed(e.to_string());
                        break;
                    }
                }
            }
        }
        tasks.shutdown().await;

        if let Err(e) = session.finish(mode, &termination) {
            tracing::error!("Failed to finalize output: {}", e);
            if !termination.is_fatal() {
                termination = Termination::SinkFailed(e.to_string());
            }
        }

        let mut summary = session.summary;
        summary.forbidden_added = session.forbidden.added();
        summary.boundary = queue.boundary();
        if let Some(quota) = &self.quota {
            summary.storage_used = quota.used();
            summary.storage_budget = quota.budget();
        }
        summary.elapsed = start_time.elapsed();
        summary.termination = termination;

        match &summary.termination {
            Termination::Completed => tracing::info!(
                "Sweep complete: {} attempted, {} found in {}",
                summary.attempted,
                summary.found,
                format_duration(summary.elapsed)
            ),
            other => tracing::error!("Sweep {}", other),
        }

        Ok(summary)
    }

    fn report_progress(
        &self,
        id: u64,
        outcome: &Outcome,
        completed: u64,
        total: usize,
        summary: &RunSummary,
        start_time: Instant,
    ) {
        let padded = format_id(id, self.config.session.id_width);
        let detail = match (outcome, self.task_status(outcome)) {
            (Outcome::Entry { record, .. }, _) => format!("'{}'", record.title),
            (_, Some(status)) => status.to_string(),
            (_, None) => "cancelled".to_string(),
        };
        let percentage = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };

        tracing::info!(
            "ID {} -> {} | Progress: {}/{} ({:.2}%) | Found: {} | Assets: {} | Elapsed: {}",
            padded,
            detail,
            completed,
            total,
            percentage,
            summary.found,
            summary.assets_acquired,
            format_duration(start_time.elapsed())
        );
    }

    fn task_status(&self, outcome: &Outcome) -> Option<TaskStatus> {
        let status = match outcome {
            Outcome::Entry { .. } => TaskStatus::Found,
            Outcome::Removed(_)
                if self.config.session.record_removed && self.config.session.mode.writes_records() =>
            {
                TaskStatus::RecordedRemoved
            }
            Outcome::Removed(_) | Outcome::Unparseable => TaskStatus::Forbidden,
            Outcome::Boundary => TaskStatus::BoundaryReached,
            Outcome::NetworkError(_) => TaskStatus::NetworkError,
            Outcome::BanSuspected => TaskStatus::BanSuspected,
            Outcome::Cancelled => return None,
        };
        Some(status)
    }
}

/// Selects the IDs a session processes
fn plan(config: &Config, forbidden: &ForbiddenList) -> Result<Plan, SweepError> {
    let session = &config.session;

    if session.mode == OutputMode::Rescrape {
        let mut carry = CarryForward::default();
        let entries =
            load_rescrape_entries(&config.output.metadata_path, &config.markers.completed_label)?;
        for entry in entries {
            match entry.id {
                None => carry.unkeyed.push(entry.line),
                Some(id) if carry.originals.contains_key(&id) => {}
                Some(id) if session.skip_completed && entry.completed => {
                    carry.passthrough.entry(id).or_insert(entry.line);
                }
                Some(id) => {
                    carry.passthrough.remove(&id);
                    carry.originals.insert(id, entry.line);
                }
            }
        }

        let mut candidates: Vec<u64> = carry.originals.keys().copied().collect();
        candidates.sort_unstable();
        tracing::info!(
            "Rescraping {} entries from {} ({} kept as they are)",
            candidates.len(),
            config.output.metadata_path.display(),
            carry.passthrough.len() + carry.unkeyed.len()
        );

        return Ok(Plan {
            candidates,
            indexed: HashSet::new(),
            carry,
        });
    }

    let indexed = match record_output(config) {
        Some((path, format)) if session.resume => load_indexed_ids(path, format)?,
        _ => HashSet::new(),
    };

    let candidates = (session.start_id..=session.end_id)
        .filter(|id| !indexed.contains(id))
        .filter(|id| session.ignore_forbidden || !forbidden.contains(*id))
        .collect();

    Ok(Plan {
        candidates,
        indexed,
        carry: CarryForward::default(),
    })
}

/// Computes what a session would process, without touching the network
pub fn preview(config: &Config) -> Result<PlanPreview, SweepError> {
    let forbidden = ForbiddenList::load(&config.output.forbidden_path, config.session.id_width)?;
    let plan = plan(config, &forbidden)?;

    Ok(PlanPreview {
        candidates: plan.candidates.len(),
        first: plan.candidates.first().copied(),
        last: plan.candidates.last().copied(),
        already_indexed: plan.indexed.len(),
        forbidden: forbidden.len(),
    })
}

/// Runs a complete sweep over HTTP
///
/// This is the main entry point for starting a session. It will:
/// 1. Select candidate IDs from the range or the rescrape source
/// 2. Fetch, classify and optionally download assets for each ID
/// 3. Persist outcomes in ID order
/// 4. Stop at the range boundary or on a suspected ban
pub async fn run_sweep(config: Config) -> Result<RunSummary, SweepError> {
    let mut coordinator = Coordinator::with_http(config)?;
    coordinator.run().await
}
