//! Install/uninstall orchestration over a loaded [`Catalog`].
//!
//! A run resolves a [`Plan`], then walks it with a small scheduler: a step
//! starts once every dependency in its `after` list has an outcome, and at
//! most [`RunOptions::concurrency`] steps run at a time. Outcomes are written
//! by the scheduler alone, into the slot of their plan position, so the
//! report keeps plan order no matter which worker finishes first.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::definition::Catalog;
use crate::error::{GraphError, ToolError};
use crate::executor::execute;
use crate::graph::{resolve, resolve_without_closure, Plan, PlanStep, Target};
use crate::probe::{locate, probe, ProbeStatus};

/// Knobs for a single run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Maximum number of tools processed at the same time. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// Limit for every single command.
    pub command_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            command_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyInstalled,
    NotInstalled,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyInstalled => write!(f, "already installed"),
            SkipReason::NotInstalled => write!(f, "not installed"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum OutcomeKind {
    Installed,
    Uninstalled,
    Skipped(SkipReason),
    Failed(ToolError),
}

impl OutcomeKind {
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeKind::Installed => "installed",
            OutcomeKind::Uninstalled => "uninstalled",
            OutcomeKind::Skipped(_) => "skipped",
            OutcomeKind::Failed(_) => "failed",
        }
    }
}

/// Result of processing one tool.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub name: String,
    pub kind: OutcomeKind,
}

impl InstallOutcome {
    fn new(name: impl Into<String>, kind: OutcomeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.kind, OutcomeKind::Failed(_))
    }

    /// Skip reason or error text, if any.
    pub fn detail(&self) -> Option<String> {
        match &self.kind {
            OutcomeKind::Skipped(reason) => Some(reason.to_string()),
            OutcomeKind::Failed(error) => Some(error.to_string()),
            OutcomeKind::Installed | OutcomeKind::Uninstalled => None,
        }
    }
}

#[derive(Serialize)]
struct OutcomeRecord<'a> {
    name: &'a str,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Every outcome of a run, in plan order.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub outcomes: Vec<InstallOutcome>,
}

impl Report {
    pub fn get(&self, name: &str) -> Option<&InstallOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &InstallOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Process exit code for this report: 0 unless some outcome failed.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn extend(&mut self, other: Report) {
        self.outcomes.extend(other.outcomes);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let records: Vec<OutcomeRecord> = self
            .outcomes
            .iter()
            .map(|o| OutcomeRecord {
                name: &o.name,
                outcome: o.kind.label(),
                detail: o.detail(),
            })
            .collect();
        serde_json::to_string_pretty(&records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Install,
    Uninstall,
}

/// Entry point for install, uninstall and status queries.
#[derive(Debug, Clone)]
pub struct Installer {
    catalog: Arc<Catalog>,
}

impl Installer {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Installs `target` and everything it depends on.
    ///
    /// # Errors
    /// Only when a single requested tool is unknown or its closure has a
    /// graph error; nothing is executed in that case.
    pub async fn install(
        &self,
        target: &Target,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<Report, GraphError> {
        let plan = resolve(&self.catalog, target)?;
        info!("Installing {} ({} tools in plan)", target, plan.len());
        let mut report = self.run(plan, Action::Install, options, cancel).await;
        if *target == Target::All {
            report.outcomes.extend(self.shadowed_failures());
        }
        Ok(report)
    }

    /// Uninstalls a single tool, or every known tool for [`Target::All`].
    /// Dependencies of a single tool are left alone.
    pub async fn uninstall(
        &self,
        target: &Target,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<Report, GraphError> {
        let plan = resolve_without_closure(&self.catalog, target)?;
        info!("Uninstalling {} ({} tools in plan)", target, plan.len());
        let mut report = self.run(plan, Action::Uninstall, options, cancel).await;
        if *target == Target::All {
            report.outcomes.extend(self.shadowed_failures());
        }
        Ok(report)
    }

    /// Uninstalls then installs `target`; the outcomes of both passes are
    /// concatenated.
    pub async fn reinstall(
        &self,
        target: &Target,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<Report, GraphError> {
        let mut report = self.uninstall(target, options, cancel).await?;
        report.extend(self.install(target, options, cancel).await?);
        Ok(report)
    }

    /// Probes every loaded tool. Executes nothing.
    pub fn status(&self) -> BTreeMap<String, ProbeStatus> {
        self.catalog
            .definitions()
            .map(|def| (def.name.clone(), probe(def)))
            .collect()
    }

    /// Where the artifact of `name` lives, if the tool is installed.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        self.catalog.get(name).and_then(locate)
    }

    /// Duplicate documents never make it into a plan since their name
    /// belongs to the first definition.
    fn shadowed_failures(&self) -> Vec<InstallOutcome> {
        self.catalog
            .failures()
            .iter()
            .filter(|failure| self.catalog.get(&failure.name).is_some())
            .map(|failure| {
                InstallOutcome::new(
                    failure.name.clone(),
                    OutcomeKind::Failed(ToolError::Load(failure.error.clone())),
                )
            })
            .collect()
    }

    async fn run(
        &self,
        plan: Plan,
        action: Action,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Report {
        let steps = plan.steps;
        let concurrency = options.concurrency.max(1);
        let in_plan: HashSet<&str> = steps.iter().map(PlanStep::name).collect();
        let mut outcomes: Vec<Option<InstallOutcome>> = vec![None; steps.len()];
        let mut started = vec![false; steps.len()];
        let mut finished: HashSet<String> = HashSet::new();
        let mut running = JoinSet::new();
        let mut slots = HashMap::new();

        loop {
            for (position, step) in steps.iter().enumerate() {
                if started[position] {
                    continue;
                }
                match step {
                    PlanStep::Unavailable { name, error } => {
                        started[position] = true;
                        let error = ToolError::Load(error.clone());
                        warn!("Tool `{}` is unavailable: {}", name, error);
                        outcomes[position] =
                            Some(InstallOutcome::new(name.clone(), OutcomeKind::Failed(error)));
                        finished.insert(name.clone());
                    }
                    PlanStep::Blocked { name, error } => {
                        started[position] = true;
                        warn!("Tool `{}` is blocked: {}", name, error);
                        outcomes[position] = Some(InstallOutcome::new(
                            name.clone(),
                            OutcomeKind::Failed(error.clone().into()),
                        ));
                        finished.insert(name.clone());
                    }
                    PlanStep::Run { name, after } => {
                        if cancel.is_cancelled() || running.len() >= concurrency {
                            continue;
                        }
                        let ready = after
                            .iter()
                            .all(|dep| finished.contains(dep) || !in_plan.contains(dep.as_str()));
                        if !ready {
                            continue;
                        }
                        started[position] = true;
                        let catalog = Arc::clone(&self.catalog);
                        let name = name.clone();
                        let cancel = cancel.clone();
                        let timeout = options.command_timeout;
                        let handle = running.spawn(async move {
                            process_tool(&catalog, &name, action, timeout, &cancel).await
                        });
                        slots.insert(handle.id(), position);
                    }
                }
            }

            let Some(joined) = running.join_next_with_id().await else {
                break;
            };
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(e) => {
                    let Some(&position) = slots.get(&e.id()) else { continue };
                    let name = steps[position].name().to_string();
                    let error = ToolError::Worker {
                        name: name.clone(),
                        reason: e.to_string(),
                    };
                    (e.id(), InstallOutcome::new(name, OutcomeKind::Failed(error)))
                }
            };
            if let Some(position) = slots.remove(&id) {
                debug!("Tool `{}` finished: {}", outcome.name, outcome.kind.label());
                finished.insert(outcome.name.clone());
                outcomes[position] = Some(outcome);
            }
        }

        let outcomes = outcomes
            .into_iter()
            .zip(&steps)
            .map(|(outcome, step)| {
                outcome.unwrap_or_else(|| {
                    InstallOutcome::new(step.name(), OutcomeKind::Skipped(SkipReason::Cancelled))
                })
            })
            .collect();
        Report { outcomes }
    }
}

async fn process_tool(
    catalog: &Catalog,
    name: &str,
    action: Action,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> InstallOutcome {
    let Some(def) = catalog.get(name) else {
        let error = GraphError::UnknownTool {
            name: name.to_string(),
        };
        return InstallOutcome::new(name, OutcomeKind::Failed(error.into()));
    };

    let kind = match action {
        Action::Install => {
            match probe(def) {
                ProbeStatus::Installed { location } => {
                    info!("{} is already installed at {}", name, location.display());
                    return InstallOutcome::new(name, OutcomeKind::Skipped(SkipReason::AlreadyInstalled));
                }
                ProbeStatus::NotInstalled => {}
                ProbeStatus::Indeterminate(e) => warn!("{}; attempting install of {}", e, name),
            }
            info!("Installing {}", name);
            match execute(&def.commands, &def.environ, timeout, cancel).await {
                Ok(()) => {
                    if !probe(def).is_installed() {
                        warn!("{} reported success but its artifact is still missing", name);
                    }
                    OutcomeKind::Installed
                }
                Err(e) => OutcomeKind::Failed(e.into()),
            }
        }
        Action::Uninstall => {
            let Some(commands) = def.uninstall_commands.as_deref().filter(|c| !c.is_empty()) else {
                return InstallOutcome::new(
                    name,
                    OutcomeKind::Failed(ToolError::NotUninstallable {
                        name: name.to_string(),
                    }),
                );
            };
            match probe(def) {
                ProbeStatus::NotInstalled => {
                    info!("{} is not installed", name);
                    return InstallOutcome::new(name, OutcomeKind::Skipped(SkipReason::NotInstalled));
                }
                ProbeStatus::Indeterminate(e) => warn!("{}; attempting removal of {}", e, name),
                ProbeStatus::Installed { .. } => {}
            }
            info!("Removing {}", name);
            match execute(commands, &def.environ, timeout, cancel).await {
                Ok(()) => OutcomeKind::Uninstalled,
                Err(e) => OutcomeKind::Failed(e.into()),
            }
        }
    };
    if let OutcomeKind::Failed(e) = &kind {
        warn!("{} failed: {}", name, e);
    }
    InstallOutcome::new(name, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultConfig;
    use crate::definition::Document;
    use crate::error::ExecutionError;

    fn installer(docs: Vec<(&str, String)>) -> Installer {
        let documents = docs
            .into_iter()
            .map(|(name, content)| Document::new(name, content))
            .collect();
        Installer::new(Catalog::from_documents(documents, &DefaultConfig::new()))
    }

    #[test]
    fn test_report_exit_code() {
        let mut report = Report::default();
        report.outcomes.push(InstallOutcome::new("a", OutcomeKind::Installed));
        report
            .outcomes
            .push(InstallOutcome::new("b", OutcomeKind::Skipped(SkipReason::AlreadyInstalled)));
        assert_eq!(report.exit_code(), 0);
        report.outcomes.push(InstallOutcome::new(
            "c",
            OutcomeKind::Failed(ToolError::NotUninstallable { name: "c".into() }),
        ));
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.failed().count(), 1);
    }

    #[test]
    fn test_report_json() {
        let report = Report {
            outcomes: vec![
                InstallOutcome::new("a", OutcomeKind::Installed),
                InstallOutcome::new("b", OutcomeKind::Skipped(SkipReason::NotInstalled)),
            ],
        };
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["name"], "a");
        assert_eq!(json[0]["outcome"], "installed");
        assert!(json[0].get("detail").is_none());
        assert_eq!(json[1]["detail"], "not installed");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error() {
        let installer = installer(vec![("a", "commands: [\"true\"]".into())]);
        let err = installer
            .install(&Target::Tool("nope".into()), RunOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownTool { name: "nope".into() });
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use tempfile::{tempdir, TempDir};

        fn touch_tool(dir: &TempDir, name: &str, deps: &[&str]) -> String {
            let artifact = dir.path().join(name);
            let log = dir.path().join("log");
            format!(
                "shell: true\npath: {artifact}\ndependencies: [{deps}]\ncommands:\n  - echo {name} >> {log}\n  - printf x > {artifact}\nuninstall_commands:\n  - rm {artifact}\n",
                artifact = artifact.display(),
                log = log.display(),
                deps = deps.join(", "),
            )
        }

        fn log_lines(dir: &TempDir) -> Vec<String> {
            std::fs::read_to_string(dir.path().join("log"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        #[tokio::test]
        async fn test_install_runs_dependencies_first() {
            let dir = tempdir().unwrap();
            let installer = installer(vec![
                ("amass", touch_tool(&dir, "amass", &["go"])),
                ("go", touch_tool(&dir, "go", &[])),
                ("unrelated", touch_tool(&dir, "unrelated", &[])),
            ]);
            let report = installer
                .install(&Target::Tool("amass".into()), RunOptions::default(), &CancellationToken::new())
                .await
                .unwrap();
            assert!(report.is_success());
            assert_eq!(log_lines(&dir), vec!["go", "amass"]);
            assert!(matches!(report.get("amass").unwrap().kind, OutcomeKind::Installed));
            assert!(report.get("unrelated").is_none());
        }

        #[tokio::test]
        async fn test_second_install_is_skipped() {
            let dir = tempdir().unwrap();
            let installer = installer(vec![("masscan", touch_tool(&dir, "masscan", &[]))]);
            let target = Target::Tool("masscan".into());
            let cancel = CancellationToken::new();
            installer.install(&target, RunOptions::default(), &cancel).await.unwrap();
            let report = installer.install(&target, RunOptions::default(), &cancel).await.unwrap();
            assert!(matches!(
                report.get("masscan").unwrap().kind,
                OutcomeKind::Skipped(SkipReason::AlreadyInstalled)
            ));
            assert_eq!(log_lines(&dir), vec!["masscan"]);
        }

        #[tokio::test]
        async fn test_cycle_executes_nothing() {
            let dir = tempdir().unwrap();
            let installer = installer(vec![
                ("a", touch_tool(&dir, "a", &["b"])),
                ("b", touch_tool(&dir, "b", &["c"])),
                ("c", touch_tool(&dir, "c", &["a"])),
            ]);
            let err = installer
                .install(&Target::Tool("a".into()), RunOptions::default(), &CancellationToken::new())
                .await
                .unwrap_err();
            match err {
                GraphError::CyclicDependency { mut members } => {
                    members.sort();
                    assert_eq!(members, vec!["a", "b", "c"]);
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(log_lines(&dir).is_empty());
        }

        #[tokio::test]
        async fn test_install_all_isolates_malformed_document() {
            let dir = tempdir().unwrap();
            let installer = installer(vec![
                ("a", touch_tool(&dir, "a", &[])),
                ("b", touch_tool(&dir, "b", &[])),
                ("broken", "shell: true\npath: /nonexistent\n".to_string()),
                ("c", touch_tool(&dir, "c", &[])),
                ("d", touch_tool(&dir, "d", &[])),
            ]);
            let report = installer
                .install(&Target::All, RunOptions::default(), &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(report.outcomes.len(), 5);
            for name in ["a", "b", "c", "d"] {
                assert!(matches!(report.get(name).unwrap().kind, OutcomeKind::Installed));
            }
            assert!(report.get("broken").unwrap().is_failed());
            assert_eq!(report.exit_code(), 1);
        }

        #[tokio::test]
        async fn test_failed_dependency_still_attempts_dependent() {
            let dir = tempdir().unwrap();
            let installer = installer(vec![
                ("dep", "shell: true\ncommands: [\"exit 1\"]\npath: /nonexistent/dep\n".to_string()),
                ("tool", touch_tool(&dir, "tool", &["dep"])),
            ]);
            let report = installer
                .install(&Target::Tool("tool".into()), RunOptions::default(), &CancellationToken::new())
                .await
                .unwrap();
            assert!(report.get("dep").unwrap().is_failed());
            assert!(matches!(report.get("tool").unwrap().kind, OutcomeKind::Installed));
        }

        #[tokio::test]
        async fn test_siblings_see_only_their_own_environment() {
            let dir = tempdir().unwrap();
            let doc = |name: &str, var: &str, other: &str| {
                let out = dir.path().join(name);
                format!(
                    "shell: true\npath: {out}\nenviron:\n  {var}: {name}\ncommands:\n  - sleep 0.2\n  - printf '%s:%s' \"${var}\" \"${other}\" > {out}\n",
                    out = out.display(),
                )
            };
            let installer = installer(vec![
                ("first", doc("first", "RECON_FIRST", "RECON_SECOND")),
                ("second", doc("second", "RECON_SECOND", "RECON_FIRST")),
            ]);
            let options = RunOptions {
                concurrency: 2,
                command_timeout: None,
            };
            let report = installer
                .install(&Target::All, options, &CancellationToken::new())
                .await
                .unwrap();
            assert!(report.is_success());
            assert_eq!(report.outcomes[0].name, "first");
            assert_eq!(report.outcomes[1].name, "second");
            assert_eq!(std::fs::read_to_string(dir.path().join("first")).unwrap(), "first:");
            assert_eq!(std::fs::read_to_string(dir.path().join("second")).unwrap(), "second:");
        }

        #[tokio::test]
        async fn test_uninstall_paths() {
            let dir = tempdir().unwrap();
            let installer = installer(vec![
                ("kept", "commands: [\"true\"]\npath: /nonexistent/kept\n".to_string()),
                ("gone", touch_tool(&dir, "gone", &[])),
            ]);
            let cancel = CancellationToken::new();
            let options = RunOptions::default();

            let report = installer.uninstall(&Target::Tool("kept".into()), options, &cancel).await.unwrap();
            assert!(matches!(
                report.outcomes[0].kind,
                OutcomeKind::Failed(ToolError::NotUninstallable { .. })
            ));

            let report = installer.uninstall(&Target::Tool("gone".into()), options, &cancel).await.unwrap();
            assert!(matches!(
                report.outcomes[0].kind,
                OutcomeKind::Skipped(SkipReason::NotInstalled)
            ));

            installer.install(&Target::Tool("gone".into()), options, &cancel).await.unwrap();
            assert!(installer.locate("gone").is_some());
            let report = installer.uninstall(&Target::Tool("gone".into()), options, &cancel).await.unwrap();
            assert!(matches!(report.outcomes[0].kind, OutcomeKind::Uninstalled));
            assert!(installer.locate("gone").is_none());
        }

        #[tokio::test]
        async fn test_uninstall_all_ignores_graph_errors() {
            let dir = tempdir().unwrap();
            let installer = installer(vec![
                ("amass", touch_tool(&dir, "amass", &["go"])),
                ("a", touch_tool(&dir, "a", &["b"])),
                ("b", touch_tool(&dir, "b", &["a"])),
            ]);
            for name in ["amass", "a", "b"] {
                std::fs::write(dir.path().join(name), "bin").unwrap();
            }
            let report = installer
                .uninstall(&Target::All, RunOptions::default(), &CancellationToken::new())
                .await
                .unwrap();
            assert!(report.is_success());
            for name in ["amass", "a", "b"] {
                assert!(matches!(report.get(name).unwrap().kind, OutcomeKind::Uninstalled));
                assert!(!dir.path().join(name).exists());
            }
        }

        fn unreadable_path_tool(dir: &TempDir) -> String {
            let log = dir.path().join("log");
            format!(
                "shell: true\npath: \"/tmp/x\\0y\"\ncommands:\n  - echo install >> {log}\nuninstall_commands:\n  - echo uninstall >> {log}\n",
                log = log.display(),
            )
        }

        #[tokio::test]
        async fn test_indeterminate_status_attempts_install() {
            let dir = tempdir().unwrap();
            let installer = installer(vec![("odd", unreadable_path_tool(&dir))]);
            assert!(matches!(installer.status()["odd"], ProbeStatus::Indeterminate(_)));
            let report = installer
                .install(&Target::Tool("odd".into()), RunOptions::default(), &CancellationToken::new())
                .await
                .unwrap();
            assert!(matches!(report.get("odd").unwrap().kind, OutcomeKind::Installed));
            assert_eq!(log_lines(&dir), vec!["install"]);
        }

        #[tokio::test]
        async fn test_indeterminate_status_attempts_uninstall() {
            let dir = tempdir().unwrap();
            let installer = installer(vec![("odd", unreadable_path_tool(&dir))]);
            let report = installer
                .uninstall(&Target::Tool("odd".into()), RunOptions::default(), &CancellationToken::new())
                .await
                .unwrap();
            assert!(matches!(report.get("odd").unwrap().kind, OutcomeKind::Uninstalled));
            assert_eq!(log_lines(&dir), vec!["uninstall"]);
        }

        #[tokio::test]
        async fn test_reinstall_concatenates_passes() {
            let dir = tempdir().unwrap();
            let installer = installer(vec![("tool", touch_tool(&dir, "tool", &[]))]);
            let cancel = CancellationToken::new();
            let target = Target::Tool("tool".into());
            installer.install(&target, RunOptions::default(), &cancel).await.unwrap();
            let report = installer.reinstall(&target, RunOptions::default(), &cancel).await.unwrap();
            let kinds: Vec<&str> = report.outcomes.iter().map(|o| o.kind.label()).collect();
            assert_eq!(kinds, vec!["uninstalled", "installed"]);
            assert_eq!(log_lines(&dir), vec!["tool", "tool"]);
        }

        #[tokio::test]
        async fn test_timeout_fails_tool() {
            let installer = installer(vec![(
                "slow",
                "shell: true\ncommands: [\"sleep 5\"]\npath: /nonexistent/slow\n".to_string(),
            )]);
            let options = RunOptions {
                concurrency: 1,
                command_timeout: Some(Duration::from_millis(200)),
            };
            let report = installer
                .install(&Target::All, options, &CancellationToken::new())
                .await
                .unwrap();
            assert!(matches!(
                report.outcomes[0].kind,
                OutcomeKind::Failed(ToolError::Execution(ExecutionError::Timeout { .. }))
            ));
        }

        #[tokio::test]
        async fn test_cancel_skips_pending_tools() {
            let dir = tempdir().unwrap();
            let installer = installer(vec![
                (
                    "first",
                    "shell: true\ncommands: [\"sleep 10\"]\npath: /nonexistent/first\n".to_string(),
                ),
                ("second", touch_tool(&dir, "second", &[])),
            ]);
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                trigger.cancel();
            });
            let report = installer
                .install(&Target::All, RunOptions::default(), &cancel)
                .await
                .unwrap();
            assert!(matches!(
                report.get("first").unwrap().kind,
                OutcomeKind::Failed(ToolError::Execution(ExecutionError::Cancelled { .. }))
            ));
            assert!(matches!(
                report.get("second").unwrap().kind,
                OutcomeKind::Skipped(SkipReason::Cancelled)
            ));
            assert!(log_lines(&dir).is_empty());
        }
    }
}
