//! Error taxonomy shared by every stage of a tool run.
//!
//! Errors that belong to a single tool are carried inside that tool's
//! [`InstallOutcome`](crate::installer::InstallOutcome) as a [`ToolError`];
//! only a [`GraphError`] affecting a whole requested closure is returned
//! to the caller directly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure while expanding a directive inside a definition document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown directive `!{tag}`")]
    UnknownDirective { tag: String },
    #[error("invalid argument to `!{directive}`: {reason}")]
    InvalidArgument { directive: String, reason: String },
    #[error("default config key `{key}` is not defined")]
    ConfigKey { key: String },
    #[error("unresolved tool reference `{reference}`: {reason}")]
    UnresolvedToolReference { reference: String, reason: String },
    #[error("template cycle: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },
}

/// A definition document that could not be turned into a [`ToolDefinition`](crate::definition::ToolDefinition).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("definition document must be a mapping")]
    NotAMapping,
    #[error("tool name must not be empty")]
    EmptyName,
    #[error("missing required field `commands`")]
    MissingCommands,
    #[error("`commands` must contain at least one command")]
    EmptyCommands,
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("dependency #{index} is not a string")]
    InvalidDependency { index: usize },
    #[error("command #{index} in `{field}` is invalid: {reason}")]
    InvalidCommand {
        field: &'static str,
        index: usize,
        reason: String,
    },
    #[error("tool `{name}` is already defined by {}", .first.display())]
    DuplicateTool { name: String, first: PathBuf },
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Problems in the dependency graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("cyclic dependency between {}", .members.join(", "))]
    CyclicDependency { members: Vec<String> },
    #[error("tool `{tool}` depends on unknown tool `{missing}`")]
    UnknownDependency { tool: String, missing: String },
    #[error("unknown tool `{name}`")]
    UnknownTool { name: String },
}

/// The install state of a tool could not be determined.
#[derive(Debug, Clone, Error)]
#[error("cannot probe {}: {reason}", .path.display())]
pub struct ProbeError {
    pub path: PathBuf,
    pub reason: String,
}

/// Failure of one command out of a tool's command list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("command #{index} `{command}` could not be started: {reason}")]
    Spawn {
        index: usize,
        command: String,
        reason: String,
    },
    #[error("command #{index} `{command}` exited with {}{}", exit_label(.code), diagnostic_suffix(.output))]
    NonZeroExit {
        index: usize,
        command: String,
        code: Option<i32>,
        output: String,
    },
    #[error("command #{index} `{command}` timed out after {:?}", .after)]
    Timeout {
        index: usize,
        command: String,
        after: Duration,
    },
    #[error("command #{index} `{command}` was cancelled")]
    Cancelled { index: usize, command: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn diagnostic_suffix(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!(": {output}")
    }
}

/// Anything that makes a single tool's outcome `failed`.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("definition could not be loaded: {0}")]
    Load(Arc<LoadError>),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("tool `{name}` has no uninstall commands")]
    NotUninstallable { name: String },
    #[error("worker for `{name}` stopped unexpectedly: {reason}")]
    Worker { name: String, reason: String },
}
