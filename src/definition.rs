//! Tool definitions and the loader that builds them from YAML documents.
//!
//! Loading happens in three passes over the corpus:
//!
//! 1. every document is parsed into a YAML mapping (syntax errors isolate to that tool)
//! 2. the `path` of every tool is expanded, following `!get_tool_path` references
//!    between tools with cycle detection
//! 3. the remaining fields are expanded and validated into a [`ToolDefinition`]
//!
//! Malformed documents never abort the load; they are kept as
//! [`LoadFailure`]s so the tool stays known by name and can be reported.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};
use walkdir::WalkDir;
use crate::config::DefaultConfig;
use crate::error::{LoadError, TemplateError};
use crate::template::{expand, expand_value, Directive, ToolPaths};
use crate::util::split_words;

const COMMANDS_KEYS: &[&str] = &["commands", "install_commands"];
const UNINSTALL_KEYS: &[&str] = &["uninstall_commands", "uninstallCommands"];
const PATH_KEYS: &[&str] = &["path", "probe_path", "probePath"];

/// One command of an install or uninstall list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// Handed to the system shell as a single line.
    ShellLine(String),
    /// Executed directly; the first element is the program.
    Argv(Vec<String>),
}

impl CommandSpec {
    /// Builds the command representation chosen by a definition's `shell` flag.
    pub fn new(line: &str, shell: bool) -> anyhow::Result<CommandSpec> {
        if line.trim().is_empty() {
            anyhow::bail!("command is empty");
        }
        if shell {
            return Ok(CommandSpec::ShellLine(line.to_string()));
        }
        let argv = split_words(line)?;
        if argv.is_empty() {
            anyhow::bail!("command is empty");
        }
        Ok(CommandSpec::Argv(argv))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::ShellLine(line) => write!(f, "{}", line),
            CommandSpec::Argv(argv) => write!(f, "{}", argv.join(" ")),
        }
    }
}

/// A fully expanded, validated tool definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    pub name: String,
    pub commands: Vec<CommandSpec>,
    /// `None` means the tool cannot be uninstalled.
    pub uninstall_commands: Option<Vec<CommandSpec>>,
    pub dependencies: Vec<String>,
    /// Overlaid on the host environment for this tool's commands only.
    pub environ: Vec<(String, String)>,
    pub shell: bool,
    pub probe_path: Option<PathBuf>,
    /// Document this definition was loaded from.
    pub source: PathBuf,
}

impl ToolDefinition {
    pub fn is_uninstallable(&self) -> bool {
        self.uninstall_commands
            .as_ref()
            .is_some_and(|cmds| !cmds.is_empty())
    }
}

/// A document that could not be loaded.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub name: String,
    pub source: PathBuf,
    pub error: Arc<LoadError>,
}

/// The immutable set of tools known to one process.
#[derive(Debug, Default)]
pub struct Catalog {
    definitions: HashMap<String, ToolDefinition>,
    failures: Vec<LoadFailure>,
    /// Every known tool name in load order, available or not.
    order: Vec<String>,
}

/// A raw definition document waiting to be loaded.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub source: PathBuf,
    pub content: String,
}

impl Document {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: PathBuf::from(format!("{name}.yaml")),
            name,
            content: content.into(),
        }
    }
}

impl Catalog {
    /// Loads every `*.yaml`/`*.yml` file directly inside `dir`, in file name order.
    ///
    /// # Errors
    /// Only when the directory itself cannot be read; broken documents are
    /// recorded as failures instead.
    pub fn load_dir<P: AsRef<Path>>(dir: P, defaults: &DefaultConfig) -> anyhow::Result<Catalog> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            anyhow::bail!("Definitions directory {} does not exist", dir.display());
        }
        let mut entries = Vec::new();

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| {
                anyhow::anyhow!("Could not read definitions directory {}: {}", dir.display(), e)
            })?;
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if !entry.file_type().is_file() || !is_yaml {
                continue;
            }
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let loaded = match std::fs::read_to_string(path) {
                Ok(content) => Ok(Document {
                    name: stem,
                    source: path.to_path_buf(),
                    content,
                }),
                Err(source) => Err(LoadFailure {
                    name: stem,
                    source: path.to_path_buf(),
                    error: Arc::new(LoadError::Io {
                        path: path.to_path_buf(),
                        source,
                    }),
                }),
            };
            entries.push(loaded);
        }
        Ok(Catalog::from_entries(entries, defaults))
    }

    /// Loads documents in the given order. The document name is used unless
    /// the document sets `name` itself.
    pub fn from_documents(documents: Vec<Document>, defaults: &DefaultConfig) -> Catalog {
        Catalog::from_entries(documents.into_iter().map(Ok).collect(), defaults)
    }

    /// Like [`Catalog::from_documents`], with documents that could not be read
    /// kept at their place in load order.
    fn from_entries(entries: Vec<Result<Document, LoadFailure>>, defaults: &DefaultConfig) -> Catalog {
        let mut catalog = Catalog::default();

        // pass 1: parse and name every document
        let mut parsed: Vec<(String, PathBuf, Mapping)> = Vec::new();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        for entry in entries {
            let doc = match entry {
                Ok(doc) => doc,
                Err(failure) => {
                    if let Some(first) = seen.get(&failure.name) {
                        let error = LoadError::DuplicateTool {
                            name: failure.name.clone(),
                            first: first.clone(),
                        };
                        catalog.fail(&failure.name, &failure.source, error);
                        continue;
                    }
                    warn!("Skipping {}: {}", failure.source.display(), failure.error);
                    seen.insert(failure.name.clone(), failure.source.clone());
                    catalog.order.push(failure.name.clone());
                    catalog.failures.push(failure);
                    continue;
                }
            };
            let result = parse_document(&doc);
            let name = match &result {
                Ok((name, _)) => name.clone(),
                Err(_) => doc.name.clone(),
            };
            if let Some(first) = seen.get(&name) {
                catalog.fail(
                    &name,
                    &doc.source,
                    LoadError::DuplicateTool {
                        name: name.clone(),
                        first: first.clone(),
                    },
                );
                continue;
            }
            seen.insert(name.clone(), doc.source.clone());
            catalog.order.push(name.clone());
            match result {
                Ok((_, mapping)) => parsed.push((name, doc.source, mapping)),
                Err(err) => catalog.fail(&name, &doc.source, err),
            }
        }

        // pass 2: probe paths, which other tools may reference
        let mut path_directives = HashMap::new();
        let mut broken_paths = HashMap::new();
        for (name, _, mapping) in &parsed {
            match field(mapping, PATH_KEYS) {
                None | Some(Value::Null) => {}
                Some(value) => match Directive::parse(value) {
                    Ok(directive) => {
                        path_directives.insert(name.clone(), directive);
                    }
                    Err(err) => {
                        broken_paths.insert(name.clone(), err);
                    }
                },
            }
        }
        let mut paths = PathTable::new(&path_directives, &broken_paths, defaults);

        // pass 3: everything else
        for (name, source, mapping) in parsed {
            match build_definition(&name, &source, &mapping, defaults, &mut paths) {
                Ok(definition) => {
                    debug!("Loaded tool definition `{}` from {}", name, source.display());
                    catalog.definitions.insert(name, definition);
                }
                Err(err) => catalog.fail(&name, &source, err),
            }
        }
        catalog
    }

    fn fail(&mut self, name: &str, source: &Path, error: LoadError) {
        warn!("Tool `{}` ({}) is unavailable: {}", name, source.display(), error);
        self.failures.push(LoadFailure {
            name: name.to_string(),
            source: source.to_path_buf(),
            error: Arc::new(error),
        });
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.get(name)
    }

    /// The load failure recorded under `name`, if the tool is known but unavailable.
    pub fn failure(&self, name: &str) -> Option<&LoadFailure> {
        if self.definitions.contains_key(name) {
            return None;
        }
        self.failures.iter().find(|f| f.name == name)
    }

    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    /// Whether `name` was seen in the corpus at all.
    pub fn is_known(&self, name: &str) -> bool {
        self.definitions.contains_key(name) || self.failure(name).is_some()
    }

    /// Known tool names in load order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Position of `name` in load order.
    pub fn load_index(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }

    /// Available definitions in load order.
    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.order.iter().filter_map(|name| self.definitions.get(name))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn parse_document(doc: &Document) -> Result<(String, Mapping), LoadError> {
    let value: Value = serde_yaml::from_str(&doc.content)?;
    let Value::Mapping(mapping) = value else {
        return Err(LoadError::NotAMapping);
    };
    let name = match field(&mapping, &["name"]) {
        None | Some(Value::Null) => doc.name.clone(),
        Some(Value::String(name)) => name.clone(),
        Some(_) => {
            return Err(LoadError::InvalidField {
                field: "name",
                reason: "expected a string".to_string(),
            })
        }
    };
    if name.trim().is_empty() {
        return Err(LoadError::EmptyName);
    }
    Ok((name, mapping))
}

fn field<'a>(mapping: &'a Mapping, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| mapping.get(*key))
}

fn build_definition(
    name: &str,
    source: &Path,
    mapping: &Mapping,
    defaults: &DefaultConfig,
    paths: &mut PathTable<'_>,
) -> Result<ToolDefinition, LoadError> {
    let shell = match field(mapping, &["shell"]) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(LoadError::InvalidField {
                field: "shell",
                reason: "expected true or false".to_string(),
            })
        }
    };

    let commands = match field(mapping, COMMANDS_KEYS) {
        None | Some(Value::Null) => return Err(LoadError::MissingCommands),
        Some(value) => command_list("commands", value, shell, defaults, paths)?,
    };
    if commands.is_empty() {
        return Err(LoadError::EmptyCommands);
    }

    let uninstall_commands = match field(mapping, UNINSTALL_KEYS) {
        None | Some(Value::Null) => None,
        Some(value) => Some(command_list("uninstall_commands", value, shell, defaults, paths)?),
    };

    let dependencies = match field(mapping, &["dependencies"]) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => {
            let mut deps: Vec<String> = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::String(dep) if !dep.is_empty() => {
                        if !deps.contains(dep) {
                            deps.push(dep.clone());
                        }
                    }
                    _ => return Err(LoadError::InvalidDependency { index }),
                }
            }
            deps
        }
        Some(_) => {
            return Err(LoadError::InvalidField {
                field: "dependencies",
                reason: "expected a list of tool names".to_string(),
            })
        }
    };

    let environ = match field(mapping, &["environ"]) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Mapping(vars)) => {
            let mut environ = Vec::with_capacity(vars.len());
            for (key, value) in vars {
                let Value::String(key) = key else {
                    return Err(LoadError::InvalidField {
                        field: "environ",
                        reason: "variable names must be strings".to_string(),
                    });
                };
                environ.push((key.clone(), expand_value(value, defaults, paths)?));
            }
            environ
        }
        Some(_) => {
            return Err(LoadError::InvalidField {
                field: "environ",
                reason: "expected a mapping".to_string(),
            })
        }
    };

    let probe_path = paths.own_path(name)?.map(PathBuf::from);

    Ok(ToolDefinition {
        name: name.to_string(),
        commands,
        uninstall_commands,
        dependencies,
        environ,
        shell,
        probe_path,
        source: source.to_path_buf(),
    })
}

fn command_list(
    field_name: &'static str,
    value: &Value,
    shell: bool,
    defaults: &DefaultConfig,
    paths: &mut PathTable<'_>,
) -> Result<Vec<CommandSpec>, LoadError> {
    let Value::Sequence(items) = value else {
        return Err(LoadError::InvalidField {
            field: field_name,
            reason: "expected a list of commands".to_string(),
        });
    };
    let mut commands = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let line = expand_value(item, defaults, paths)?;
        let command = CommandSpec::new(&line, shell).map_err(|e| LoadError::InvalidCommand {
            field: field_name,
            index,
            reason: e.to_string(),
        })?;
        commands.push(command);
    }
    Ok(commands)
}

/// Lazily expanded `path` values of every tool, memoized.
struct PathTable<'a> {
    directives: &'a HashMap<String, Directive>,
    broken: &'a HashMap<String, TemplateError>,
    defaults: &'a DefaultConfig,
    resolved: HashMap<String, Result<String, TemplateError>>,
    stack: Vec<String>,
}

impl<'a> PathTable<'a> {
    fn new(
        directives: &'a HashMap<String, Directive>,
        broken: &'a HashMap<String, TemplateError>,
        defaults: &'a DefaultConfig,
    ) -> Self {
        Self {
            directives,
            broken,
            defaults,
            resolved: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// The expanded `path` of `name` itself, `None` if it has none.
    fn own_path(&mut self, name: &str) -> Result<Option<String>, TemplateError> {
        if let Some(err) = self.broken.get(name) {
            return Err(err.clone());
        }
        if !self.directives.contains_key(name) {
            return Ok(None);
        }
        self.resolve(name).map(Some)
    }

    fn resolve(&mut self, name: &str) -> Result<String, TemplateError> {
        if let Some(result) = self.resolved.get(name) {
            return result.clone();
        }
        if let Some(pos) = self.stack.iter().position(|n| n == name) {
            let mut chain = self.stack[pos..].to_vec();
            chain.push(name.to_string());
            return Err(TemplateError::Cycle { chain });
        }
        if let Some(err) = self.broken.get(name) {
            return Err(TemplateError::UnresolvedToolReference {
                reference: name.to_string(),
                reason: err.to_string(),
            });
        }
        let directives = self.directives;
        let Some(directive) = directives.get(name) else {
            return Err(TemplateError::UnresolvedToolReference {
                reference: name.to_string(),
                reason: "tool is unknown or has no `path`".to_string(),
            });
        };

        self.stack.push(name.to_string());
        let defaults = self.defaults;
        let result = expand(directive, defaults, self);
        self.stack.pop();

        self.resolved.insert(name.to_string(), result.clone());
        result
    }
}

impl ToolPaths for PathTable<'_> {
    fn tool_path(&mut self, tool: &str) -> Result<String, TemplateError> {
        self.resolve(tool)
    }
}
