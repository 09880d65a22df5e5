//! Stage runtime and its monitor.
//!
//! A [`Stage`] is a descriptor bound to its wired endpoints. Its monitor
//! starts the process, waits for it (or for the kill switch), releases the
//! stage's pipe ends in the right order, and classifies the exit.

use super::coordinator::CrashGate;
use super::wiring::{Drained, StageInput, StageOutput};
use crate::core::{ExitSummary, PipelineEvent, StageReport, StageStatus};
use crate::errors::PipelineError;
use crate::events::{emit_event, EventSink};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// State shared by every monitor of one run.
pub(crate) struct MonitorContext {
    pub(crate) run_id: String,
    pub(crate) gate: Arc<CrashGate>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) tolerate_broken_pipe: bool,
}

impl MonitorContext {
    /// Claims the gate with `error`, announcing the termination if it won.
    pub(crate) fn report(&self, error: PipelineError) -> bool {
        let reason = error.to_string();
        if self.gate.try_claim(error) {
            warn!(reason = %reason, "terminating pipeline");
            self.sink.try_emit(
                "pipeline.terminating",
                Some(PipelineEvent::pipeline_terminating(&self.run_id, &reason).payload()),
            );
            true
        } else {
            false
        }
    }
}

/// One stage of a running pipeline.
pub(crate) struct Stage {
    pub(crate) index: usize,
    pub(crate) program: String,
    pub(crate) command: Command,
    pub(crate) input: StageInput,
    pub(crate) output: StageOutput,
    pub(crate) is_last: bool,
}

/// What a monitor hands back to the runner.
#[derive(Debug)]
pub(crate) struct MonitorOutcome {
    pub(crate) report: StageReport,
    pub(crate) captured: Option<Vec<u8>>,
}

impl MonitorOutcome {
    fn unstarted(index: usize, program: String, status: StageStatus) -> Self {
        Self {
            report: StageReport::unstarted(index, program, status),
            captured: None,
        }
    }
}

impl Stage {
    /// Runs the stage to completion and classifies its exit.
    pub(crate) async fn monitor(self, ctx: Arc<MonitorContext>) -> MonitorOutcome {
        let Self {
            index,
            program,
            mut command,
            input,
            output,
            is_last,
        } = self;

        // Dropping `output` here closes a pipe write end, so the downstream
        // stage still sees end-of-stream.
        if ctx.gate.is_terminating() {
            debug!("pipeline already terminating; stage not started");
            return MonitorOutcome::unstarted(index, program, StageStatus::NotStarted);
        }

        command
            .stdin(input.stdio())
            .stdout(output.stdio())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                warn!(error = %source, "failed to start stage");
                emit_event(
                    ctx.sink.as_ref(),
                    PipelineEvent::stage_spawn_failed(&ctx.run_id, index, &program, &source.to_string()),
                )
                .await;
                ctx.report(PipelineError::spawn(index, program.clone(), source));
                return MonitorOutcome::unstarted(index, program, StageStatus::SpawnFailed);
            }
        };
        debug!(pid = ?child.id(), "stage started");
        emit_event(
            ctx.sink.as_ref(),
            PipelineEvent::stage_started(&ctx.run_id, index, &program),
        )
        .await;

        let stdin_task = input.feed(child.stdin.take());
        let stdout_task = output.drain(child.stdout.take());
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                if let Err(e) = stderr.read_to_end(&mut buf).await {
                    debug!(error = %e, "stderr capture ended early");
                }
                buf
            })
        });

        let (status, killed) = tokio::select! {
            status = child.wait() => (status, false),
            () = ctx.gate.terminated() => (kill_and_reap(&mut child).await, true),
        };

        // Releases this stage's pipe read end; an upstream producer that is
        // still writing sees a broken pipe, as in a shell.
        if let Some(task) = stdin_task {
            task.abort();
        }

        let exit = match status {
            Ok(status) => ExitSummary::from(status),
            Err(e) => {
                warn!(error = %e, "failed to reap stage");
                ExitSummary::Unknown
            }
        };
        let succeeded =
            exit.success() || (ctx.tolerate_broken_pipe && !is_last && exit.is_broken_pipe());
        let failed = !succeeded && !killed;

        let drained = match stdout_task {
            Some(task) => settle(task, &ctx.gate, killed).await,
            None => None,
        };
        let (mut write_end, captured) = match drained {
            Some(Drained::Pipe(write_end)) => (Some(write_end), None),
            Some(Drained::Captured(bytes)) => (None, Some(bytes)),
            None => (None, None),
        };

        // Downstream sees end-of-stream once the write end is dropped. A
        // failing stage holds it until it has claimed the gate, so a consumer
        // failing on the truncated stream cannot be reported first.
        if !failed {
            drop(write_end.take());
        }

        let stderr = match stderr_task {
            Some(task) => settle(task, &ctx.gate, killed).await.unwrap_or_default(),
            None => Vec::new(),
        };

        let status = if succeeded {
            if ctx.gate.is_decided() {
                debug!("stage succeeded after pipeline was decided");
            }
            StageStatus::Succeeded
        } else if killed {
            StageStatus::Killed
        } else {
            let diagnostic = String::from_utf8_lossy(&stderr).into_owned();
            ctx.report(PipelineError::stage_failed(index, program.clone(), exit, diagnostic));
            StageStatus::Failed
        };
        drop(write_end);

        let report = StageReport {
            index,
            program,
            status,
            exit: Some(exit),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        debug!(status = %report.status, exit = %exit, "stage exited");
        emit_event(ctx.sink.as_ref(), PipelineEvent::stage_exited(&ctx.run_id, &report)).await;

        MonitorOutcome { report, captured }
    }
}

/// Kills the child and reaps it.
///
/// Safe on a child that already exited, reaped or not: the kill is skipped
/// and the recorded exit status is returned.
async fn kill_and_reap(child: &mut Child) -> std::io::Result<ExitStatus> {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill skipped");
    }
    child.wait().await
}

/// Collects an I/O task's result after its process exited.
///
/// Gives up as soon as the pipeline is terminating: a killed stage may have
/// left descendants holding the stream open.
async fn settle<T>(mut task: JoinHandle<T>, gate: &CrashGate, killed: bool) -> Option<T> {
    if killed {
        task.abort();
        return None;
    }
    tokio::select! {
        biased;
        result = &mut task => result.ok(),
        () = gate.terminated() => {
            task.abort();
            None
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::pipeline::wiring::wire;
    use crate::pipeline::{InputMode, OutputMode};
    use std::time::Duration;

    fn context(sink: Arc<CollectingEventSink>) -> Arc<MonitorContext> {
        Arc::new(MonitorContext {
            run_id: "test-run".to_string(),
            gate: Arc::new(CrashGate::new()),
            sink,
            tolerate_broken_pipe: true,
        })
    }

    fn single(program: &str, args: &[&str], stdout: OutputMode) -> Stage {
        let (input, output) = wire(1, 1024, InputMode::Null, stdout)
            .unwrap()
            .pop()
            .unwrap();
        let mut command = Command::new(program);
        command.args(args);
        Stage {
            index: 0,
            program: program.to_string(),
            command,
            input,
            output,
            is_last: true,
        }
    }

    #[tokio::test]
    async fn test_monitor_success_captures_stdout() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = context(sink.clone());

        let outcome = single("sh", &["-c", "echo hi"], OutputMode::Capture)
            .monitor(ctx.clone())
            .await;

        assert_eq!(outcome.report.status, StageStatus::Succeeded);
        assert_eq!(outcome.captured.as_deref(), Some(&b"hi\n"[..]));
        assert!(!ctx.gate.is_decided());
        assert_eq!(sink.event_types(), vec!["stage.started", "stage.exited"]);
    }

    #[tokio::test]
    async fn test_monitor_failure_claims_gate() {
        let ctx = context(Arc::new(CollectingEventSink::new()));

        let outcome = single("sh", &["-c", "echo oops >&2; exit 4"], OutputMode::Null)
            .monitor(ctx.clone())
            .await;

        assert_eq!(outcome.report.status, StageStatus::Failed);
        assert_eq!(outcome.report.exit, Some(ExitSummary::Code(4)));
        let verdict = ctx.gate.take_verdict().unwrap();
        assert_eq!(verdict.diagnostic(), Some("oops\n"));
    }

    #[tokio::test]
    async fn test_monitor_spawn_failure() {
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = context(sink.clone());

        let outcome = single("cmdflow-no-such-program", &[], OutputMode::Null)
            .monitor(ctx.clone())
            .await;

        assert_eq!(outcome.report.status, StageStatus::SpawnFailed);
        assert!(matches!(ctx.gate.take_verdict(), Some(PipelineError::Spawn { .. })));
        assert_eq!(sink.events_of_type("stage.spawn_failed").len(), 1);
    }

    #[tokio::test]
    async fn test_monitor_skips_start_when_terminating() {
        let ctx = context(Arc::new(CollectingEventSink::new()));
        ctx.gate.terminate("test");

        let outcome = single("sh", &["-c", "exit 1"], OutputMode::Null)
            .monitor(ctx.clone())
            .await;

        assert_eq!(outcome.report.status, StageStatus::NotStarted);
        assert!(!ctx.gate.is_decided());
    }

    #[tokio::test]
    async fn test_kill_and_reap_exited_but_unreaped_child() {
        let mut child = Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
        // Exited, still a zombie until waited on.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = tokio::time::timeout(Duration::from_secs(5), kill_and_reap(&mut child))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ExitSummary::from(status), ExitSummary::Code(3));
    }

    #[tokio::test]
    async fn test_kill_and_reap_already_reaped_child() {
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().await.unwrap();

        let status = tokio::time::timeout(Duration::from_secs(5), kill_and_reap(&mut child))
            .await
            .unwrap()
            .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_kill_after_exit_leaves_report_alone() {
        let ctx = context(Arc::new(CollectingEventSink::new()));

        let outcome = single("sh", &["-c", "echo oops >&2; exit 4"], OutputMode::Null)
            .monitor(ctx.clone())
            .await;
        ctx.gate.terminate("late");

        assert_eq!(outcome.report.status, StageStatus::Failed);
        assert_eq!(outcome.report.exit, Some(ExitSummary::Code(4)));
        assert_eq!(ctx.gate.take_verdict().unwrap().diagnostic(), Some("oops\n"));
    }

    #[tokio::test]
    async fn test_failing_stage_holds_write_end_until_reported() {
        let ctx = context(Arc::new(CollectingEventSink::new()));
        let mut wiring = wire(2, 1024, InputMode::Null, OutputMode::Null).unwrap();
        let (downstream, _) = wiring.pop().unwrap();
        let (input, output) = wiring.pop().unwrap();
        let StageInput::Pipe(mut read_end) = downstream else {
            panic!("expected pipe input");
        };

        let mut command = Command::new("sh");
        command.args(["-c", "sleep 1 >/dev/null & printf root >&2; exit 1"]);
        let stage = Stage {
            index: 0,
            program: "sh".to_string(),
            command,
            input,
            output,
            is_last: false,
        };
        let monitor = tokio::spawn(stage.monitor(ctx.clone()));

        let mut buf = Vec::new();
        read_end.read_to_end(&mut buf).await.unwrap();
        // End-of-stream is only observed after the failure was recorded.
        assert!(ctx.gate.is_decided());

        let outcome = monitor.await.unwrap();
        assert_eq!(outcome.report.status, StageStatus::Failed);
    }

    #[tokio::test]
    async fn test_monitor_kill_is_not_reported() {
        let ctx = context(Arc::new(CollectingEventSink::new()));
        let gate = ctx.gate.clone();

        let handle = tokio::spawn(single("sleep", &["30"], OutputMode::Null).monitor(ctx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        gate.terminate("test");

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.report.status, StageStatus::Killed);
        assert!(!gate.is_decided());
    }
}
