//! Stage descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inert description of one pipeline stage: a program and its arguments.
///
/// The program is resolved on `PATH` at spawn time. No shell is involved, so
/// arguments are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandSpec {
    /// The program to execute.
    pub program: String,
    /// Arguments passed to the program, in order.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Creates a descriptor with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builds the process command for this descriptor.
    pub(crate) fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

impl From<&str> for CommandSpec {
    fn from(program: &str) -> Self {
        Self::new(program)
    }
}

impl From<String> for CommandSpec {
    fn from(program: String) -> Self {
        Self::new(program)
    }
}
