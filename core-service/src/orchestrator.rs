//! # Job Orchestrator
//!
//! Drives a [`ProcessingJob`] through its state machine and turns whatever
//! happens into a [`JobOutcome`].
//!
//! ## Admission
//!
//! Two semaphores bound the work in flight:
//!
//! - an admission semaphore of `workers + queue_depth` permits, taken with
//!   `try_acquire` so a full service answers `ServiceBusy` immediately
//! - a worker semaphore of `workers` permits that admitted jobs wait on
//!
//! The job's wall-clock budget starts once it holds a worker permit, and
//! spans decoding and processing, including any external encode.
//!
//! ## Stages
//!
//! CPU-bound stages run on tokio's blocking pool via [`run_blocking`]. When
//! the deadline passes first the stage is cancelled through its
//! [`CancellationToken`] and the job fails with `JobTimeout`. The job's
//! permits travel with the blocking closure, so a stage that is still winding
//! down keeps its worker slot until it returns. Time spent in the external
//! codec is bounded by the encoder itself and surfaces as `TranscodeTimeout`.

use crate::error::{FailureKind, JobError, Result};
use crate::job::{segment_duration, JobRequest, JobState, Operation, ProcessingJob};
use crate::result::{JobOutcome, ProcessingResult};
use bytes::Bytes;
use core_analysis::{Analyzer, FeatureError, FeatureReport};
use core_decoder::{decode_cancellable, AudioBuffer};
use core_runtime::ServiceConfig;
use core_transcode::{
    concat, conform_cancellable, trim, EncodedArtifact, ExternalEncoder, TargetFormat, TranscodeError,
    Transcoder,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Admission and worker permits of a running job.
#[derive(Debug)]
struct Permits {
    _admitted: OwnedSemaphorePermit,
    _worker: OwnedSemaphorePermit,
}

/// Time budget shared by every stage of one job.
#[derive(Debug, Clone)]
struct StageBudget {
    started: Instant,
    deadline: Instant,
    cancel: CancellationToken,
    /// Released once the budget and every blocking stage holding a clone
    /// are gone.
    permits: Arc<Permits>,
}

impl StageBudget {
    fn start(max_seconds: Duration, permits: Permits) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + max_seconds,
            cancel: CancellationToken::new(),
            permits: Arc::new(permits),
        }
    }

    fn timeout(&self, stage: &'static str) -> JobError {
        JobError::JobTimeout {
            stage,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Output of the CPU part of an artifact-producing operation.
enum Rendered {
    /// Natively encoded, nothing left to do
    Encoded(EncodedArtifact),
    /// Conformed to the target, waiting for the external encoder
    Prepared(AudioBuffer),
}

/// Runs jobs against a frozen service configuration.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<ServiceConfig>,
    transcoder: Transcoder,
    analyzer: Analyzer,
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
}

impl Orchestrator {
    /// Orchestrator encoding through the configured `ffmpeg`.
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        let transcoder = Transcoder::from_config(&config);
        Self::with_transcoder(config, transcoder)
    }

    /// Orchestrator with a custom external encoder.
    pub fn with_encoder(config: Arc<ServiceConfig>, encoder: Arc<dyn ExternalEncoder>) -> Self {
        let transcoder = Transcoder::new(encoder, config.limits.max_seconds);
        Self::with_transcoder(config, transcoder)
    }

    fn with_transcoder(config: Arc<ServiceConfig>, transcoder: Transcoder) -> Self {
        info!(
            workers = config.workers,
            queue_depth = config.queue_depth,
            max_seconds = ?config.limits.max_seconds,
            "Job orchestrator ready"
        );

        Self {
            analyzer: Analyzer::new(config.analysis.clone()),
            admission: Arc::new(Semaphore::new(config.admission_capacity())),
            workers: Arc::new(Semaphore::new(config.workers)),
            transcoder,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Jobs that can still be admitted right now.
    pub fn available_capacity(&self) -> usize {
        self.admission.available_permits()
    }

    /// Build a job from a request and run it.
    pub async fn submit(&self, request: JobRequest, payloads: Vec<Bytes>) -> JobOutcome {
        let job = ProcessingJob::new(request, payloads, self.config.limits.clone());
        self.run(job).await
    }

    /// Run a job to its terminal state.
    ///
    /// Never fails: every error becomes a `Failed` outcome carrying its
    /// [`FailureKind`](crate::FailureKind).
    #[instrument(skip_all, fields(job_id = %job.id(), operation = job.operation().name()))]
    pub async fn run(&self, mut job: ProcessingJob) -> JobOutcome {
        let started = Instant::now();

        let result = match self.execute(&mut job).await {
            Ok(result) => result,
            Err(err) => {
                let failure = err.to_failure();
                if failure.kind == FailureKind::InternalFault {
                    error!(error = %err, state = %job.state(), "Job failed with internal fault");
                } else {
                    error!(kind = %failure.kind, error = %err, state = %job.state(), "Job failed");
                }
                job.fail();
                ProcessingResult::Failure(failure)
            }
        };

        JobOutcome {
            job_id: job.id(),
            state: job.state(),
            result,
            history: job.history().to_vec(),
            elapsed: started.elapsed(),
        }
    }

    async fn execute(&self, job: &mut ProcessingJob) -> Result<ProcessingResult> {
        let admitted = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| JobError::ServiceBusy {
                capacity: self.config.admission_capacity(),
            })?;

        job.validate()?;
        debug!(payloads = job.payload_count(), "Job validated");

        let worker = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| JobError::Internal(format!("worker pool closed: {}", e)))?;

        let permits = Permits {
            _admitted: admitted,
            _worker: worker,
        };
        let budget = StageBudget::start(job.limits().max_seconds, permits);
        let operation = job.operation().clone();

        info!("Stage 1: decoding {} payload(s)", job.payload_count());
        let buffers = self.decode(job, &budget).await?;
        job.transition(JobState::Decoded)?;

        info!("Stage 2: {}", operation.name());
        let result = match operation {
            Operation::DecodeOnly => ProcessingResult::Features(describe(&single(buffers)?)),
            Operation::Analyze => {
                ProcessingResult::Features(self.analyze(single(buffers)?, &budget).await?)
            }
            Operation::Transcode { target } => {
                let buffer = single(buffers)?;
                let rendered = run_blocking("transcode", &budget, {
                    let target = target.clone();
                    move |cancel| render(buffer, &target, &cancel)
                })
                .await?;
                ProcessingResult::Artifact(self.finish(rendered, &target, &budget).await?)
            }
            Operation::Mashup {
                segment_seconds,
                target,
            } => {
                let segment = segment_duration(segment_seconds)?;
                let target = target.unwrap_or_else(TargetFormat::mp3);
                let rendered = run_blocking("mashup", &budget, {
                    let target = target.clone();
                    move |cancel| {
                        let joined = assemble_mashup(buffers, segment, &cancel)?;
                        render(joined, &target, &cancel)
                    }
                })
                .await?;
                ProcessingResult::Artifact(self.finish(rendered, &target, &budget).await?)
            }
        };
        job.transition(JobState::Processed)?;

        job.transition(JobState::Completed)?;
        info!(elapsed = ?budget.started.elapsed(), "Job completed");
        Ok(result)
    }

    async fn decode(&self, job: &mut ProcessingJob, budget: &StageBudget) -> Result<Vec<AudioBuffer>> {
        let payloads = job.take_payloads();
        let limits = job.limits().clone();

        run_blocking("decode", budget, move |cancel| {
            payloads
                .into_iter()
                .map(|payload| decode_cancellable(payload, &limits, &cancel).map_err(JobError::from))
                .collect()
        })
        .await
    }

    /// Compute the feature report and apply the partial-results policy: the
    /// job succeeds when at least one feature was computed, otherwise it
    /// fails with the first failure in feature order.
    async fn analyze(&self, buffer: AudioBuffer, budget: &StageBudget) -> Result<FeatureReport> {
        let analyzer = self.analyzer.clone();
        let started = budget.started;

        let report = run_blocking("analyze", budget, move |cancel| {
            analyzer
                .analyze_cancellable(&buffer, &cancel)
                .map_err(|e| match e {
                    FeatureError::Cancelled => JobError::JobTimeout {
                        stage: "analyze",
                        elapsed: started.elapsed(),
                    },
                    other => JobError::Internal(other.to_string()),
                })
        })
        .await?;

        if report.has_values() {
            return Ok(report);
        }

        match report.first_failure() {
            Some(failure) => Err(JobError::Analysis {
                kind: failure.kind,
                message: failure.message.clone(),
            }),
            None => Err(JobError::Internal("analysis produced an empty report".to_string())),
        }
    }

    async fn finish(
        &self,
        rendered: Rendered,
        target: &TargetFormat,
        budget: &StageBudget,
    ) -> Result<EncodedArtifact> {
        match rendered {
            Rendered::Encoded(artifact) => Ok(artifact),
            Rendered::Prepared(buffer) => {
                if budget.cancel.is_cancelled() {
                    return Err(budget.timeout("encode"));
                }
                Ok(self.transcoder.encode(&buffer, target, budget.deadline).await?)
            }
        }
    }
}

/// Run `work` on the blocking pool, bounded by the job deadline.
///
/// On timeout the stage's token is cancelled so the work stops at its next
/// checkpoint, and the job fails with `JobTimeout` without waiting for it.
/// The closure owns a share of the job's permits until it returns.
async fn run_blocking<T, F>(stage: &'static str, budget: &StageBudget, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> Result<T> + Send + 'static,
{
    let token = budget.cancel.child_token();
    let handle = tokio::task::spawn_blocking({
        let token = token.clone();
        let permits = Arc::clone(&budget.permits);
        move || {
            let _permits = permits;
            work(token)
        }
    });

    match timeout_at(budget.deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(JobError::Internal(format!("{} stage join error: {}", stage, e))),
        Err(_) => {
            token.cancel();
            warn!(stage, "Stage exceeded the job deadline");
            Err(budget.timeout(stage))
        }
    }
}

fn single(buffers: Vec<AudioBuffer>) -> Result<AudioBuffer> {
    let count = buffers.len();
    let mut buffers = buffers.into_iter();
    match (buffers.next(), buffers.next()) {
        (Some(buffer), None) => Ok(buffer),
        _ => Err(JobError::Internal(format!(
            "expected one decoded buffer, got {}",
            count
        ))),
    }
}

/// Stream description returned for decode-only jobs.
fn describe(buffer: &AudioBuffer) -> FeatureReport {
    let mut report = FeatureReport::new()
        .with_value("sample_rate", buffer.sample_rate() as f64)
        .with_value("channels", buffer.channels() as f64)
        .with_value("frames", buffer.frames() as f64)
        .with_value("duration_seconds", buffer.duration().as_secs_f64());

    if let Some(bits) = buffer.precision().bits_per_sample() {
        report.insert("bits_per_sample", bits as f64);
    }
    report
}

fn render(
    buffer: AudioBuffer,
    target: &TargetFormat,
    cancel: &CancellationToken,
) -> Result<Rendered> {
    let prepared = Transcoder::prepare_cancellable(buffer, target, cancel)?;
    if target.container.is_native() {
        Ok(Rendered::Encoded(Transcoder::encode_native(&prepared, target)?))
    } else {
        Ok(Rendered::Prepared(prepared))
    }
}

/// Leading `segment` of every input, conformed to the highest sample rate
/// and channel count among the inputs, joined and capped at
/// `segment × inputs`.
fn assemble_mashup(
    buffers: Vec<AudioBuffer>,
    segment: Duration,
    cancel: &CancellationToken,
) -> Result<AudioBuffer> {
    let inputs = buffers.len();
    let sample_rate = buffers.iter().map(AudioBuffer::sample_rate).max();
    let channels = buffers.iter().map(AudioBuffer::channels).max();
    let (sample_rate, channels) = match sample_rate.zip(channels) {
        Some(layout) => layout,
        None => return Err(JobError::InvalidRequest("mashup has no inputs".to_string())),
    };

    let mut segments = Vec::with_capacity(inputs);
    for (index, buffer) in buffers.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(TranscodeError::Cancelled.into());
        }

        if buffer.duration() < segment {
            warn!(
                input = index,
                duration = ?buffer.duration(),
                segment = ?segment,
                "Input shorter than the segment, using it whole"
            );
        }

        let clipped = trim(buffer, Duration::ZERO, segment)?;
        segments.push(conform_cancellable(clipped, sample_rate, channels, cancel)?);
    }

    let cap = segment.checked_mul(inputs as u32).unwrap_or(Duration::MAX);
    let joined = concat(segments)?;
    if joined.duration() < cap {
        warn!(
            duration = ?joined.duration(),
            requested = ?cap,
            "Mashup is shorter than requested"
        );
    }

    debug!(inputs, sample_rate, channels, "Mashup assembled");
    Ok(trim(joined, Duration::ZERO, cap)?)
}
