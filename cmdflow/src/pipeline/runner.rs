//! Pipeline runner: the public entry point.

use super::config::{InputMode, OutputMode, PipelineConfig};
use super::coordinator::{CrashGate, TerminateOnDrop};
use super::stage::{MonitorContext, Stage};
use super::wiring::wire;
use crate::cancellation::CancellationToken;
use crate::core::{CommandSpec, PipelineEvent, PipelineOutput, StageReport, StageStatus};
use crate::errors::PipelineError;
use crate::events::{emit_event, EventSink, NoOpEventSink};
use crate::utils::generate_run_id;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, debug_span, info, info_span, Instrument};

/// A stage as supplied by the caller, before wiring.
struct StageCommand {
    program: String,
    command: Command,
}

/// A linear chain of external programs, `a | b | c`.
///
/// Build one with [`Pipeline::new`] or [`Pipeline::from_commands`], then
/// consume it with one of the `run*` methods. Every `run*` future resolves only
/// after every stage process has exited or been killed.
pub struct Pipeline {
    stages: Vec<StageCommand>,
    config: PipelineConfig,
    sink: Arc<dyn EventSink>,
}

impl Pipeline {
    /// Creates a pipeline from stage descriptors.
    pub fn new(stages: impl IntoIterator<Item = CommandSpec>) -> Self {
        let stages = stages
            .into_iter()
            .map(|spec| StageCommand {
                command: spec.to_command(),
                program: spec.program,
            })
            .collect();
        Self::with_stages(stages)
    }

    /// Creates a pipeline from pre-configured commands.
    ///
    /// Use this when a stage needs a working directory or environment of its
    /// own. Standard streams are always rewired by the pipeline.
    pub fn from_commands(commands: impl IntoIterator<Item = std::process::Command>) -> Self {
        let stages = commands
            .into_iter()
            .map(|command| StageCommand {
                program: command.get_program().to_string_lossy().into_owned(),
                command: Command::from(command),
            })
            .collect();
        Self::with_stages(stages)
    }

    fn with_stages(stages: Vec<StageCommand>) -> Self {
        Self {
            stages,
            config: PipelineConfig::default(),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the sink that receives lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets where the first stage reads stdin from.
    #[must_use]
    pub fn stdin(mut self, stdin: InputMode) -> Self {
        self.config.stdin = stdin;
        self
    }

    /// Sets where the last stage writes stdout to.
    #[must_use]
    pub fn stdout(mut self, stdout: OutputMode) -> Self {
        self.config.stdout = stdout;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the pipeline, applying the configured deadline if there is one.
    pub async fn run(self) -> Result<PipelineOutput, PipelineError> {
        let deadline = self.config.deadline();
        self.execute(deadline, None).await
    }

    /// Runs the pipeline, aborting it if `deadline` elapses first.
    pub async fn run_with_deadline(self, deadline: Duration) -> Result<PipelineOutput, PipelineError> {
        self.execute(Some(deadline), None).await
    }

    /// Runs the pipeline, aborting it if `token` is cancelled first.
    ///
    /// Cancelling after the pipeline finished has no effect on the result.
    pub async fn run_with_context(
        self,
        token: &CancellationToken,
    ) -> Result<PipelineOutput, PipelineError> {
        let deadline = self.config.deadline();
        self.execute(deadline, Some(token)).await
    }

    async fn execute(
        self,
        deadline: Option<Duration>,
        external: Option<&CancellationToken>,
    ) -> Result<PipelineOutput, PipelineError> {
        let Self {
            stages,
            config,
            sink,
        } = self;

        if stages.is_empty() {
            return Err(PipelineError::Empty);
        }
        config.validate()?;
        if let Some(token) = external.filter(|token| token.is_cancelled()) {
            return Err(cancelled(token));
        }

        let run_id = generate_run_id().to_string();
        let span = info_span!(
            "pipeline",
            run_id = %run_id,
            name = %config.name,
            stages = stages.len(),
        );

        async move {
            let started = Instant::now();
            let endpoints = wire(
                stages.len(),
                config.pipe_capacity,
                config.stdin.clone(),
                config.stdout,
            )?;

            let ctx = Arc::new(MonitorContext {
                run_id: run_id.clone(),
                gate: Arc::new(CrashGate::new()),
                sink,
                tolerate_broken_pipe: config.tolerate_broken_pipe,
            });
            emit_event(
                ctx.sink.as_ref(),
                PipelineEvent::pipeline_started(&run_id, &config.name, stages.len()),
            )
            .await;

            let mut guard = TerminateOnDrop::new(ctx.gate.clone());
            let last = stages.len() - 1;
            let programs: Vec<String> = stages.iter().map(|s| s.program.clone()).collect();

            let monitors: Vec<_> = stages
                .into_iter()
                .zip(endpoints)
                .enumerate()
                .map(|(index, (stage, (input, output)))| {
                    let span = debug_span!("stage", index, program = %stage.program);
                    let stage = Stage {
                        index,
                        program: stage.program,
                        command: stage.command,
                        input,
                        output,
                        is_last: index == last,
                    };
                    tokio::spawn(stage.monitor(ctx.clone()).instrument(span))
                })
                .collect();

            let all = futures::future::join_all(monitors);
            tokio::pin!(all);

            let results = tokio::select! {
                biased;
                results = &mut all => results,
                elapsed = expire(deadline) => {
                    ctx.report(PipelineError::DeadlineExceeded { deadline: elapsed });
                    all.await
                }
                error = revoked(external) => {
                    ctx.report(error);
                    all.await
                }
            };
            guard.disarm();

            let mut stdout = Vec::new();
            let mut reports = Vec::with_capacity(results.len());
            for (index, result) in results.into_iter().enumerate() {
                match result {
                    Ok(outcome) => {
                        if let Some(bytes) = outcome.captured {
                            stdout = bytes;
                        }
                        reports.push(outcome.report);
                    }
                    Err(join_error) => {
                        ctx.report(PipelineError::Internal(format!(
                            "monitor for stage {index} failed: {join_error}"
                        )));
                        reports.push(StageReport::unstarted(
                            index,
                            programs[index].clone(),
                            StageStatus::Failed,
                        ));
                    }
                }
            }

            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
            match ctx.gate.take_verdict() {
                Some(error) => {
                    info!(error = %error, kind = %error.kind(), "pipeline failed");
                    emit_event(
                        ctx.sink.as_ref(),
                        PipelineEvent::pipeline_failed(&run_id, &error, duration_ms),
                    )
                    .await;
                    Err(error)
                }
                None => {
                    debug!(duration_ms, "pipeline completed");
                    emit_event(
                        ctx.sink.as_ref(),
                        PipelineEvent::pipeline_completed(&run_id, duration_ms),
                    )
                    .await;
                    Ok(PipelineOutput {
                        run_id,
                        stdout,
                        stages: reports,
                        duration_ms,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.program.as_str()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Resolves with the deadline once it has elapsed; never resolves without one.
async fn expire(deadline: Option<Duration>) -> Duration {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep(deadline).await;
            deadline
        }
        None => std::future::pending().await,
    }
}

/// Resolves once the caller's token is cancelled; never resolves without one.
async fn revoked(token: Option<&CancellationToken>) -> PipelineError {
    match token {
        Some(token) => {
            token.cancelled().await;
            cancelled(token)
        }
        None => std::future::pending().await,
    }
}

fn cancelled(token: &CancellationToken) -> PipelineError {
    PipelineError::Cancelled {
        reason: token.reason().unwrap_or_else(|| "cancelled".to_string()),
    }
}

/// Runs `stages` as a pipeline with no deadline.
///
/// # Errors
///
/// Returns the first stage failure, or `Empty` for an empty slice.
pub async fn run(stages: &[CommandSpec]) -> Result<(), PipelineError> {
    Pipeline::new(stages.iter().cloned()).run().await.map(|_| ())
}

/// Runs `stages` as a pipeline, aborting it when `deadline` elapses.
///
/// # Errors
///
/// Returns the first stage failure, or `DeadlineExceeded` if the deadline
/// elapsed first.
pub async fn run_with_deadline(stages: &[CommandSpec], deadline: Duration) -> Result<(), PipelineError> {
    Pipeline::new(stages.iter().cloned())
        .run_with_deadline(deadline)
        .await
        .map(|_| ())
}

/// Runs `stages` as a pipeline, aborting it when `token` is cancelled.
///
/// # Errors
///
/// Returns the first stage failure, or `Cancelled` if the token fired first.
pub async fn run_with_context(
    stages: &[CommandSpec],
    token: &CancellationToken,
) -> Result<(), PipelineError> {
    Pipeline::new(stages.iter().cloned())
        .run_with_context(token)
        .await
        .map(|_| ())
}
