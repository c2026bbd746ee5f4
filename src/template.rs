//! Directive expansion for tool definition documents.
//!
//! Definition documents embed four YAML tags that are evaluated before a
//! definition is interpreted:
//!
//! - `!join [..]` joins the expanded elements with a single space
//! - `!join_path [..]` joins the expanded elements as path components
//! - `!get_default "key"` or `!get_default "{key}/suffix"` reads [`DefaultConfig`]
//! - `!get_tool_path "{tool[path]}"` substitutes another tool's expanded `path`
//!
//! A document node is first parsed into a [`Directive`] tree and then
//! evaluated by [`expand`]. Expansion is pure; the only lookup with state is
//! the [`ToolPaths`] implementation supplied by the caller.

use std::path::PathBuf;
use std::sync::LazyLock;
use regex::Regex;
use serde_yaml::Value;
use crate::config::DefaultConfig;
use crate::error::TemplateError;

static DEFAULT_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("valid placeholder regex"));

static TOOL_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([^{}\[\]]+)\[([^{}\[\]]+)\]\}").expect("valid tool placeholder regex")
});

/// A parsed document node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Literal(String),
    Join(Vec<Directive>),
    JoinPath(Vec<Directive>),
    GetDefault(String),
    GetToolPath(String),
}

/// Resolves the expanded `path` of another tool for `!get_tool_path`.
pub trait ToolPaths {
    fn tool_path(&mut self, tool: &str) -> Result<String, TemplateError>;
}

/// A [`ToolPaths`] that knows no tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoToolPaths;

impl ToolPaths for NoToolPaths {
    fn tool_path(&mut self, tool: &str) -> Result<String, TemplateError> {
        Err(TemplateError::UnresolvedToolReference {
            reference: tool.to_string(),
            reason: "no tool paths are available here".to_string(),
        })
    }
}

impl Directive {
    /// Parses a YAML node into a directive tree.
    pub fn parse(value: &Value) -> Result<Directive, TemplateError> {
        match value {
            Value::String(s) => Ok(Directive::Literal(s.clone())),
            Value::Number(n) => Ok(Directive::Literal(n.to_string())),
            Value::Bool(b) => Ok(Directive::Literal(b.to_string())),
            Value::Tagged(tagged) => {
                let tag = tagged.tag.to_string();
                let tag = tag.trim_start_matches('!');
                match tag {
                    "join" => Ok(Directive::Join(parse_list(tag, &tagged.value)?)),
                    "join_path" => Ok(Directive::JoinPath(parse_list(tag, &tagged.value)?)),
                    "get_default" => Ok(Directive::GetDefault(parse_scalar(tag, &tagged.value)?)),
                    "get_tool_path" => {
                        Ok(Directive::GetToolPath(parse_scalar(tag, &tagged.value)?))
                    }
                    other => Err(TemplateError::UnknownDirective {
                        tag: other.to_string(),
                    }),
                }
            }
            Value::Null => Err(invalid("literal", "null is not a value")),
            Value::Sequence(_) => Err(invalid("literal", "a list needs `!join` or `!join_path`")),
            Value::Mapping(_) => Err(invalid("literal", "a mapping is not a value")),
        }
    }

    /// Names of the tools this directive reads through `!get_tool_path`.
    pub fn tool_references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, refs: &mut Vec<String>) {
        match self {
            Directive::Join(items) | Directive::JoinPath(items) => {
                for item in items {
                    item.collect_references(refs);
                }
            }
            Directive::GetToolPath(format) => {
                for caps in TOOL_PLACEHOLDER.captures_iter(format) {
                    refs.push(caps[1].to_string());
                }
            }
            Directive::Literal(_) | Directive::GetDefault(_) => {}
        }
    }
}

fn invalid(directive: &str, reason: &str) -> TemplateError {
    TemplateError::InvalidArgument {
        directive: directive.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_list(tag: &str, value: &Value) -> Result<Vec<Directive>, TemplateError> {
    match value {
        Value::Sequence(items) => items.iter().map(Directive::parse).collect(),
        _ => Err(invalid(tag, "expected a list")),
    }
}

fn parse_scalar(tag: &str, value: &Value) -> Result<String, TemplateError> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::String(_) => Err(invalid(tag, "expected a non-empty string")),
        _ => Err(invalid(tag, "expected a string")),
    }
}

/// Evaluates a directive tree into a plain string.
pub fn expand(
    directive: &Directive,
    defaults: &DefaultConfig,
    tools: &mut dyn ToolPaths,
) -> Result<String, TemplateError> {
    match directive {
        Directive::Literal(s) => Ok(s.clone()),
        Directive::Join(items) => {
            let parts = items
                .iter()
                .map(|item| expand(item, defaults, tools))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(parts.join(" "))
        }
        Directive::JoinPath(items) => {
            if items.is_empty() {
                return Err(invalid("join_path", "expected at least one component"));
            }
            let mut path = PathBuf::new();
            for item in items {
                path.push(expand(item, defaults, tools)?);
            }
            Ok(path.to_string_lossy().to_string())
        }
        Directive::GetDefault(arg) => expand_default(arg, defaults),
        Directive::GetToolPath(arg) => expand_tool_path(arg, tools),
    }
}

/// Parses and evaluates a YAML node in one step.
pub fn expand_value(
    value: &Value,
    defaults: &DefaultConfig,
    tools: &mut dyn ToolPaths,
) -> Result<String, TemplateError> {
    expand(&Directive::parse(value)?, defaults, tools)
}

fn expand_default(arg: &str, defaults: &DefaultConfig) -> Result<String, TemplateError> {
    let lookup = |key: &str| {
        defaults
            .get(key)
            .map(str::to_string)
            .ok_or_else(|| TemplateError::ConfigKey {
                key: key.to_string(),
            })
    };
    if !DEFAULT_PLACEHOLDER.is_match(arg) {
        return lookup(arg);
    }
    substitute(&DEFAULT_PLACEHOLDER, arg, |caps| lookup(&caps[1]))
}

fn expand_tool_path(arg: &str, tools: &mut dyn ToolPaths) -> Result<String, TemplateError> {
    if !TOOL_PLACEHOLDER.is_match(arg) {
        return Err(invalid(
            "get_tool_path",
            "expected a `{tool[path]}` reference",
        ));
    }
    substitute(&TOOL_PLACEHOLDER, arg, |caps| {
        let (tool, attr) = (&caps[1], &caps[2]);
        if attr != "path" {
            return Err(TemplateError::UnresolvedToolReference {
                reference: caps[0].to_string(),
                reason: format!("unsupported attribute `{attr}`"),
            });
        }
        tools.tool_path(tool).map_err(|e| match e {
            TemplateError::Cycle { .. } | TemplateError::UnresolvedToolReference { .. } => e,
            other => TemplateError::UnresolvedToolReference {
                reference: caps[0].to_string(),
                reason: other.to_string(),
            },
        })
    })
}

fn substitute<F>(re: &Regex, input: &str, mut replace: F) -> Result<String, TemplateError>
where
    F: FnMut(&regex::Captures<'_>) -> Result<String, TemplateError>,
{
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&input[last..whole.start()]);
        out.push_str(&replace(&caps)?);
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}
