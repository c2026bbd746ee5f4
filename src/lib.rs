//! # recon-tools Core Library
//!
//! This crate contains the core logic of the `recon-tools` installer: it reads a directory of
//! declarative YAML tool definitions and installs, uninstalls and probes the external
//! command-line tools they describe, respecting the dependencies between them.
//!
//! Install state is never recorded anywhere. It is derived from the host every time a tool is
//! probed, so manual installs and removals are picked up automatically.
//!
//! This library is built for the `recon-tools` CLI, but the [`installer::Installer`] can also be
//! embedded by anything that needs to ask "is tool X ready, and where is it?".
//!
//! ## Modules Overview
//! - [`template`] – The `!join`, `!join_path`, `!get_default` and `!get_tool_path` directives
//! - [`definition`] – Loading definition documents into an immutable [`definition::Catalog`]
//! - [`graph`] – Dependency ordering, cycle and unknown-dependency detection
//! - [`probe`] – Stateless install-state checks
//! - [`executor`] – Running install/uninstall commands as child processes
//! - [`installer`] – Install, uninstall, reinstall and status operations
//! - [`config`] – `config.toml` and the shared default values
//! - [`error`] – Error types carried in outcomes
//! - [`util`] – Shared utilities (word splitting, `PATH` lookup)
//! - [`global`] – Per-user config and data directories


pub mod template;
pub mod definition;
pub mod graph;
pub mod probe;
pub mod executor;
pub mod installer;
pub mod config;
pub mod error;
pub mod util;
pub mod global;

pub use config::{ConfigFile, DefaultConfig};
pub use definition::{Catalog, CommandSpec, ToolDefinition};
pub use error::*;
pub use graph::Target;
pub use installer::{InstallOutcome, Installer, OutcomeKind, Report, RunOptions, SkipReason};
pub use probe::ProbeStatus;
