//! Pipe wiring between adjacent stages.
//!
//! A pipeline of N stages gets N-1 in-memory pipes. Pipe `i` is split at
//! construction: its write end goes to stage `i`, its read end to stage
//! `i + 1`. No stage ever holds an endpoint belonging to a non-adjacent stage.

use super::config::{InputMode, OutputMode};
use crate::errors::PipelineError;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tracing::debug;

/// One anonymous in-memory byte pipe.
#[derive(Debug)]
pub(crate) struct Pipe {
    write_end: DuplexStream,
    read_end: DuplexStream,
}

impl Pipe {
    fn new(capacity: usize) -> Self {
        let (write_end, read_end) = tokio::io::duplex(capacity);
        Self {
            write_end,
            read_end,
        }
    }
}

/// Where a stage's stdin comes from.
#[derive(Debug)]
pub(crate) enum StageInput {
    Inherit,
    Null,
    Bytes(Vec<u8>),
    Pipe(DuplexStream),
}

/// Where a stage's stdout goes to.
#[derive(Debug)]
pub(crate) enum StageOutput {
    Inherit,
    Null,
    Capture,
    Pipe(DuplexStream),
}

/// What is left of a stage's stdout once it has been drained.
#[derive(Debug)]
pub(crate) enum Drained {
    /// The pipe write end, still open until the caller drops it.
    Pipe(DuplexStream),
    /// Bytes collected from the last stage.
    Captured(Vec<u8>),
}

impl StageInput {
    /// Returns the stdio handle the process should be spawned with.
    pub(crate) fn stdio(&self) -> Stdio {
        match self {
            Self::Inherit => Stdio::inherit(),
            Self::Null => Stdio::null(),
            Self::Bytes(_) | Self::Pipe(_) => Stdio::piped(),
        }
    }

    /// Starts copying this input into the child's stdin.
    ///
    /// The child's stdin is closed when the source is exhausted.
    pub(crate) fn feed(self, stdin: Option<ChildStdin>) -> Option<JoinHandle<()>> {
        let mut stdin = stdin?;
        match self {
            Self::Pipe(mut read_end) => Some(tokio::spawn(async move {
                if let Err(e) = tokio::io::copy(&mut read_end, &mut stdin).await {
                    debug!(error = %e, "stdin copy ended early");
                }
            })),
            Self::Bytes(bytes) => Some(tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&bytes).await {
                    debug!(error = %e, "stdin feed ended early");
                }
            })),
            Self::Inherit | Self::Null => None,
        }
    }
}

impl StageOutput {
    /// Returns the stdio handle the process should be spawned with.
    pub(crate) fn stdio(&self) -> Stdio {
        match self {
            Self::Inherit => Stdio::inherit(),
            Self::Null => Stdio::null(),
            Self::Capture | Self::Pipe(_) => Stdio::piped(),
        }
    }

    /// Starts draining the child's stdout into this output.
    ///
    /// A pipe write end is handed back rather than closed, so the monitor
    /// decides when downstream sees end-of-stream.
    pub(crate) fn drain(self, stdout: Option<ChildStdout>) -> Option<JoinHandle<Drained>> {
        let mut stdout = stdout?;
        match self {
            Self::Pipe(mut write_end) => Some(tokio::spawn(async move {
                if let Err(e) = tokio::io::copy(&mut stdout, &mut write_end).await {
                    debug!(error = %e, "downstream closed its end of the pipe");
                }
                Drained::Pipe(write_end)
            })),
            Self::Capture => Some(tokio::spawn(async move {
                let mut buf = Vec::new();
                if let Err(e) = stdout.read_to_end(&mut buf).await {
                    debug!(error = %e, "stdout capture ended early");
                }
                Drained::Captured(buf)
            })),
            Self::Inherit | Self::Null => None,
        }
    }
}

/// Allocates the pipes for `stage_count` stages and assigns every endpoint.
///
/// Returns one `(input, output)` pair per stage, in pipeline order. Fails
/// before anything is allocated if the topology cannot be built.
pub(crate) fn wire(
    stage_count: usize,
    capacity: usize,
    stdin: InputMode,
    stdout: OutputMode,
) -> Result<Vec<(StageInput, StageOutput)>, PipelineError> {
    if stage_count == 0 {
        return Err(PipelineError::Empty);
    }
    if capacity == 0 {
        return Err(PipelineError::InvalidConfig(
            "pipe_capacity must be greater than zero".to_string(),
        ));
    }

    let mut inputs = Vec::with_capacity(stage_count);
    let mut outputs = Vec::with_capacity(stage_count);

    inputs.push(match stdin {
        InputMode::Inherit => StageInput::Inherit,
        InputMode::Null => StageInput::Null,
        InputMode::Bytes(bytes) => StageInput::Bytes(bytes),
    });

    for _ in 1..stage_count {
        let pipe = Pipe::new(capacity);
        outputs.push(StageOutput::Pipe(pipe.write_end));
        inputs.push(StageInput::Pipe(pipe.read_end));
    }

    outputs.push(match stdout {
        OutputMode::Inherit => StageOutput::Inherit,
        OutputMode::Null => StageOutput::Null,
        OutputMode::Capture => StageOutput::Capture,
    });

    Ok(inputs.into_iter().zip(outputs).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_stage_has_no_pipes() {
        let wiring = wire(1, 1024, InputMode::Null, OutputMode::Capture).unwrap();
        assert_eq!(wiring.len(), 1);
        assert!(matches!(wiring[0], (StageInput::Null, StageOutput::Capture)));
    }

    #[test]
    fn test_linear_chain() {
        let wiring = wire(3, 1024, InputMode::Inherit, OutputMode::Inherit).unwrap();
        assert_eq!(wiring.len(), 3);

        assert!(matches!(wiring[0], (StageInput::Inherit, StageOutput::Pipe(_))));
        assert!(matches!(wiring[1], (StageInput::Pipe(_), StageOutput::Pipe(_))));
        assert!(matches!(wiring[2], (StageInput::Pipe(_), StageOutput::Inherit)));
    }

    #[test]
    fn test_rejects_empty() {
        let err = wire(0, 1024, InputMode::Null, OutputMode::Null).unwrap_err();
        assert!(matches!(err, PipelineError::Empty));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = wire(2, 0, InputMode::Null, OutputMode::Null).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_pipe_connects_adjacent_stages() {
        let mut wiring = wire(2, 64, InputMode::Null, OutputMode::Null).unwrap();
        let (second_in, _) = wiring.pop().unwrap();
        let (_, first_out) = wiring.pop().unwrap();

        let (StageOutput::Pipe(mut write_end), StageInput::Pipe(mut read_end)) = (first_out, second_in)
        else {
            panic!("expected pipe endpoints");
        };

        write_end.write_all(b"hello").await.unwrap();
        drop(write_end);

        let mut received = Vec::new();
        read_end.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hello");
    }
}
