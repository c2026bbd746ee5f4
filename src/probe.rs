use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use crate::definition::ToolDefinition;
use crate::error::ProbeError;
use crate::util::find_in_path;

/// Install state of a tool, derived from the host on every call.
#[derive(Debug, Clone)]
pub enum ProbeStatus {
    /// The artifact exists; `location` is where it lives.
    Installed { location: PathBuf },
    NotInstalled,
    /// The probe itself failed. Callers treat this as "attempt install".
    Indeterminate(ProbeError),
}

impl ProbeStatus {
    pub fn is_installed(&self) -> bool {
        matches!(self, ProbeStatus::Installed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProbeStatus::Installed { .. } => "installed",
            ProbeStatus::NotInstalled => "missing",
            ProbeStatus::Indeterminate(_) => "unknown",
        }
    }
}

/// Determines whether `definition` is installed.
///
/// With a `path`, the path must exist and, if it is a file, be non-empty.
/// Without one, the host `PATH` is searched for an executable named after
/// the tool. Nothing is cached.
pub fn probe(definition: &ToolDefinition) -> ProbeStatus {
    match &definition.probe_path {
        Some(path) => probe_path(path),
        None => match find_in_path(&definition.name) {
            Some(location) => ProbeStatus::Installed { location },
            None => ProbeStatus::NotInstalled,
        },
    }
}

/// Location of the tool's artifact, if it is installed.
pub fn locate(definition: &ToolDefinition) -> Option<PathBuf> {
    match probe(definition) {
        ProbeStatus::Installed { location } => Some(location),
        ProbeStatus::NotInstalled | ProbeStatus::Indeterminate(_) => None,
    }
}

/// Checks a single artifact path.
pub fn probe_path(path: &Path) -> ProbeStatus {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => ProbeStatus::Installed {
            location: path.to_path_buf(),
        },
        Ok(meta) if meta.len() > 0 => ProbeStatus::Installed {
            location: path.to_path_buf(),
        },
        Ok(_) => ProbeStatus::NotInstalled,
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            ProbeStatus::NotInstalled
        }
        Err(e) => ProbeStatus::Indeterminate(ProbeError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}
