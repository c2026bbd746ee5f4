//! Install ordering over the "depends on" graph of a [`Catalog`].
//!
//! The resolver runs an iterative depth-first traversal with three-color
//! marking from the requested roots and emits tools in post-order, so every
//! dependency precedes its dependents. Roots and the dependencies of a tool
//! are visited in load order, which makes the order reproducible.
//!
//! Tools caught in a cycle, or depending on a tool that was never loaded,
//! are `Blocked` together with all of their dependents. Unrelated tools are
//! unaffected.

use std::collections::HashMap;
use crate::definition::Catalog;
use crate::error::{GraphError, LoadError};
use std::sync::Arc;

/// What to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Tool(String),
}

impl Target {
    pub fn parse(s: &str) -> Target {
        if s == "all" {
            Target::All
        } else {
            Target::Tool(s.to_string())
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::All => write!(f, "all"),
            Target::Tool(name) => write!(f, "{}", name),
        }
    }
}

/// One entry of a resolved plan.
#[derive(Debug, Clone)]
pub enum PlanStep {
    /// The tool can be processed once its `after` dependencies are done.
    Run { name: String, after: Vec<String> },
    /// The tool's definition failed to load.
    Unavailable { name: String, error: Arc<LoadError> },
    /// The tool is affected by a graph error and must not be processed.
    Blocked { name: String, error: GraphError },
}

impl PlanStep {
    pub fn name(&self) -> &str {
        match self {
            PlanStep::Run { name, .. }
            | PlanStep::Unavailable { name, .. }
            | PlanStep::Blocked { name, .. } => name,
        }
    }
}

/// A dependency-respecting sequence of steps.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Names of the steps in order.
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(PlanStep::name).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Visiting,
    Done,
}

struct Frame {
    name: String,
    deps: Vec<String>,
    next: usize,
}

struct Resolver<'a> {
    catalog: &'a Catalog,
    color: HashMap<String, Color>,
    blocked: HashMap<String, GraphError>,
    steps: Vec<PlanStep>,
}

impl<'a> Resolver<'a> {
    fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            color: HashMap::new(),
            blocked: HashMap::new(),
            steps: Vec::new(),
        }
    }

    /// Dependencies of `name` sorted by load order; unknown names go first.
    fn sorted_deps(&self, name: &str) -> Vec<String> {
        let Some(def) = self.catalog.get(name) else {
            return Vec::new();
        };
        let mut deps = def.dependencies.clone();
        deps.sort_by_key(|dep| self.catalog.load_index(dep).map_or(0, |i| i + 1));
        deps
    }

    fn block(&mut self, name: &str, error: GraphError) {
        self.blocked.entry(name.to_string()).or_insert(error);
    }

    fn visit(&mut self, root: &str) {
        if self.color.contains_key(root) {
            return;
        }
        self.color.insert(root.to_string(), Color::Visiting);
        let mut stack = vec![Frame {
            name: root.to_string(),
            deps: self.sorted_deps(root),
            next: 0,
        }];

        while let Some(top) = stack.last_mut() {
            if top.next < top.deps.len() {
                let dep = top.deps[top.next].clone();
                top.next += 1;
                let current = top.name.clone();

                if !self.catalog.is_known(&dep) {
                    self.block(
                        &current,
                        GraphError::UnknownDependency {
                            tool: current.clone(),
                            missing: dep,
                        },
                    );
                    continue;
                }
                match self.color.get(&dep).copied() {
                    None => {
                        self.color.insert(dep.clone(), Color::Visiting);
                        let deps = self.sorted_deps(&dep);
                        stack.push(Frame {
                            name: dep,
                            deps,
                            next: 0,
                        });
                    }
                    Some(Color::Visiting) => {
                        let start = stack.iter().position(|f| f.name == dep).unwrap_or(0);
                        let members: Vec<String> =
                            stack[start..].iter().map(|f| f.name.clone()).collect();
                        let error = GraphError::CyclicDependency {
                            members: members.clone(),
                        };
                        for member in &members {
                            self.block(member, error.clone());
                        }
                    }
                    Some(Color::Done) => {}
                }
                continue;
            }

            let Some(frame) = stack.pop() else { break };
            self.finish(frame);
        }
    }

    fn finish(&mut self, frame: Frame) {
        if !self.blocked.contains_key(&frame.name) {
            let inherited = frame
                .deps
                .iter()
                .find_map(|dep| self.blocked.get(dep).cloned());
            if let Some(error) = inherited {
                self.block(&frame.name, error);
            }
        }
        self.color.insert(frame.name.clone(), Color::Done);

        let step = if let Some(error) = self.blocked.get(&frame.name) {
            PlanStep::Blocked {
                name: frame.name,
                error: error.clone(),
            }
        } else if let Some(failure) = self.catalog.failure(&frame.name) {
            PlanStep::Unavailable {
                name: frame.name,
                error: failure.error.clone(),
            }
        } else {
            PlanStep::Run {
                name: frame.name,
                after: frame.deps,
            }
        };
        self.steps.push(step);
    }
}

/// Resolves an install order for `target`.
///
/// # Errors
/// For a single tool, any [`GraphError`] in its closure fails the whole call.
/// For [`Target::All`], affected tools come back as [`PlanStep::Blocked`].
pub fn resolve(catalog: &Catalog, target: &Target) -> Result<Plan, GraphError> {
    let mut resolver = Resolver::new(catalog);
    match target {
        Target::All => {
            for name in catalog.names() {
                resolver.visit(name);
            }
        }
        Target::Tool(name) => {
            if !catalog.is_known(name) {
                return Err(GraphError::UnknownTool { name: name.clone() });
            }
            resolver.visit(name);
            if let Some(error) = resolver.blocked.get(name) {
                return Err(error.clone());
            }
        }
    }
    Ok(Plan {
        steps: resolver.steps,
    })
}

/// Plan containing only `target` itself, or every known tool in load order,
/// without dependency edges. Graph errors block nothing here; only tools that
/// failed to load come back as [`PlanStep::Unavailable`].
pub fn resolve_without_closure(catalog: &Catalog, target: &Target) -> Result<Plan, GraphError> {
    let steps = match target {
        Target::All => catalog
            .names()
            .iter()
            .map(|name| independent_step(catalog, name))
            .collect(),
        Target::Tool(name) => {
            if !catalog.is_known(name) {
                return Err(GraphError::UnknownTool { name: name.clone() });
            }
            vec![independent_step(catalog, name)]
        }
    };
    Ok(Plan { steps })
}

fn independent_step(catalog: &Catalog, name: &str) -> PlanStep {
    match catalog.failure(name) {
        Some(failure) => PlanStep::Unavailable {
            name: name.to_string(),
            error: failure.error.clone(),
        },
        None => PlanStep::Run {
            name: name.to_string(),
            after: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultConfig;
    use crate::definition::Document;

    fn catalog(docs: Vec<(&str, Vec<&str>)>) -> Catalog {
        let documents = docs
            .into_iter()
            .map(|(name, deps)| {
                let deps = deps
                    .iter()
                    .map(|d| format!("'{d}'"))
                    .collect::<Vec<_>>()
                    .join(", ");
                Document::new(name, format!("commands: [true]\ndependencies: [{deps}]\n"))
            })
            .collect();
        Catalog::from_documents(documents, &DefaultConfig::new())
    }

    fn position(plan: &Plan, name: &str) -> usize {
        plan.order().iter().position(|n| *n == name).unwrap()
    }

    fn assert_topological(catalog: &Catalog, plan: &Plan) {
        for step in &plan.steps {
            if let PlanStep::Run { name, .. } = step {
                for dep in &catalog.get(name).unwrap().dependencies {
                    assert!(
                        position(plan, dep) < position(plan, name),
                        "{dep} must come before {name} in {:?}",
                        plan.order()
                    );
                }
            }
        }
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let catalog = catalog(vec![
            ("amass", vec!["go"]),
            ("gobuster", vec!["go", "seclists"]),
            ("go", vec![]),
            ("recursive-gobuster", vec!["gobuster", "seclists"]),
            ("seclists", vec![]),
        ]);
        let plan = resolve(&catalog, &Target::All).unwrap();
        assert_eq!(plan.len(), 5);
        assert_topological(&catalog, &plan);
    }

    #[test]
    fn test_order_is_load_order_for_siblings() {
        let catalog = catalog(vec![("c", vec![]), ("a", vec![]), ("b", vec!["a", "c"])]);
        let plan = resolve(&catalog, &Target::All).unwrap();
        assert_eq!(plan.order(), vec!["c", "a", "b"]);

        let plan = resolve(&catalog, &Target::Tool("b".into())).unwrap();
        // deps visited in load order, not declaration order
        assert_eq!(plan.order(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_single_target_only_resolves_closure() {
        let catalog = catalog(vec![("go", vec![]), ("amass", vec!["go"]), ("masscan", vec![])]);
        let plan = resolve(&catalog, &Target::Tool("amass".into())).unwrap();
        assert_eq!(plan.order(), vec!["go", "amass"]);
    }

    #[test]
    fn test_cycle_names_all_members() {
        let catalog = catalog(vec![("a", vec!["b"]), ("b", vec!["c"]), ("c", vec!["a"])]);
        let err = resolve(&catalog, &Target::Tool("a".into())).unwrap_err();
        match err {
            GraphError::CyclicDependency { mut members } => {
                members.sort();
                assert_eq!(members, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_cycle_blocks_dependents_but_not_unrelated() {
        let catalog = catalog(vec![
            ("a", vec!["b"]),
            ("b", vec!["a"]),
            ("user", vec!["a"]),
            ("free", vec![]),
        ]);
        let plan = resolve(&catalog, &Target::All).unwrap();
        let blocked: Vec<&str> = plan
            .steps
            .iter()
            .filter(|s| matches!(s, PlanStep::Blocked { .. }))
            .map(PlanStep::name)
            .collect();
        assert_eq!(blocked.len(), 3);
        assert!(blocked.contains(&"user"));
        assert!(matches!(
            plan.steps.iter().find(|s| s.name() == "free"),
            Some(PlanStep::Run { .. })
        ));

        let err = resolve(&catalog, &Target::Tool("user".into())).unwrap_err();
        assert!(matches!(err, GraphError::CyclicDependency { .. }));
    }

    #[test]
    fn test_unknown_dependency() {
        let catalog = catalog(vec![("amass", vec!["go"]), ("other", vec!["amass"]), ("free", vec![])]);
        let err = resolve(&catalog, &Target::Tool("other".into())).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                tool: "amass".into(),
                missing: "go".into()
            }
        );
        let plan = resolve(&catalog, &Target::All).unwrap();
        assert!(matches!(
            plan.steps.iter().find(|s| s.name() == "free"),
            Some(PlanStep::Run { .. })
        ));
    }

    #[test]
    fn test_unknown_target() {
        let catalog = catalog(vec![("go", vec![])]);
        assert_eq!(
            resolve(&catalog, &Target::Tool("nope".into())).unwrap_err(),
            GraphError::UnknownTool { name: "nope".into() }
        );
    }

    #[test]
    fn test_unavailable_dependency_is_not_unknown() {
        let documents = vec![
            Document::new("go", "dependencies: []\n"),
            Document::new("amass", "commands: [true]\ndependencies: [go]\n"),
        ];
        let catalog = Catalog::from_documents(documents, &DefaultConfig::new());
        let plan = resolve(&catalog, &Target::Tool("amass".into())).unwrap();
        assert!(matches!(plan.steps[0], PlanStep::Unavailable { .. }));
        assert!(matches!(plan.steps[1], PlanStep::Run { .. }));
    }

    #[test]
    fn test_without_closure() {
        let catalog = catalog(vec![("go", vec![]), ("amass", vec!["go"])]);
        let plan = resolve_without_closure(&catalog, &Target::Tool("amass".into())).unwrap();
        assert_eq!(plan.order(), vec!["amass"]);
    }

    #[test]
    fn test_without_closure_all_ignores_graph_errors() {
        let catalog = catalog(vec![
            ("amass", vec!["go"]),
            ("a", vec!["b"]),
            ("b", vec!["a"]),
        ]);
        let plan = resolve_without_closure(&catalog, &Target::All).unwrap();
        assert_eq!(plan.order(), vec!["amass", "a", "b"]);
        for step in &plan.steps {
            match step {
                PlanStep::Run { after, .. } => assert!(after.is_empty()),
                other => panic!("unexpected step: {other:?}"),
            }
        }
    }

    #[test]
    fn test_target_parse() {
        assert_eq!(Target::parse("all"), Target::All);
        assert_eq!(Target::parse("go"), Target::Tool("go".into()));
    }
}
