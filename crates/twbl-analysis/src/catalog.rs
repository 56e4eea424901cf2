//! The definition catalogue: function signatures and type docs loaded once
//! at startup from a definition file of documented stub declarations.
//!
//! Declarations look like `NAME(param: Type, ...) => ReturnType`, each
//! preceded by a JSDoc-style block comment. Malformed entries are logged
//! and skipped; the catalogue itself always loads.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

const BUILTIN_DEFINITIONS: &str = include_str!("../assets/standard.twbl-def");

/// Aggregation function names, used by the nested-aggregation advisory.
static AGGREGATIONS: Lazy<crate::HashSet<&'static str>> = Lazy::new(|| {
    [
        "SUM", "AVG", "MIN", "MAX", "COUNT", "COUNTD", "MEDIAN", "PERCENTILE", "STDEV", "STDEVP",
        "VAR", "VARP", "ATTR", "CORR", "COVAR", "COVARP",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDoc {
    pub name: String,
    pub ty: String,
    pub optional: bool,
    pub variadic: bool,
    pub default: Option<String>,
    pub doc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub min_args: usize,
    /// `None` means unbounded (the declaration has a rest parameter).
    pub max_args: Option<usize>,
    pub parameters: Vec<ParameterDoc>,
    pub return_type: String,
    pub return_doc: String,
    pub doc: String,
    pub examples: Vec<String>,
    pub since: Option<String>,
    pub deprecated: Option<String>,
    pub author: Option<String>,
}

impl FunctionSignature {
    /// `SUM(expression) => Number` style one-liner.
    #[must_use]
    pub fn label(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| {
                let mut s = String::new();
                if p.variadic {
                    s.push_str("...");
                }
                s.push_str(&p.name);
                if p.optional {
                    s.push('?');
                }
                s
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!("{}({}) => {}", self.name, params, self.return_type)
    }

    /// Human-readable arity, for wrong-arity messages.
    #[must_use]
    pub fn arity_label(&self) -> String {
        match (self.min_args, self.max_args) {
            (min, None) => format!("at least {min}"),
            (min, Some(max)) if min == max => format!("{min}"),
            (min, Some(max)) => format!("between {min} and {max}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDoc {
    pub name: String,
    pub ty: String,
    pub doc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub ty: String,
    pub doc: String,
    pub properties: Vec<PropertyDoc>,
    pub template: Option<String>,
}

/// Immutable after load; shared freely between providers.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    functions: crate::HashMap<String, FunctionSignature>,
    types: crate::HashMap<String, TypeDef>,
}

impl Catalog {
    /// Parse a definition file. Never fails: malformed entries are skipped
    /// with a warning.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut catalog = Self::default();
        let mut lines = text.lines().peekable();

        while let Some(line) = lines.next() {
            let trimmed = line.trim();
            if !trimmed.starts_with("/**") {
                continue;
            }

            let mut comment = Vec::new();
            if !trimmed.ends_with("*/") {
                for line in lines.by_ref() {
                    let inner = line.trim();
                    if inner.ends_with("*/") {
                        break;
                    }
                    comment.push(inner.trim_start_matches('*').trim().to_string());
                }
            }

            let block = JsdocBlock::parse(&comment);

            if let Some(typedef) = block.typedef {
                catalog.types.insert(typedef.name.to_uppercase(), typedef);
                continue;
            }

            // The next non-empty line must be a stub declaration.
            let decl = loop {
                match lines.peek() {
                    Some(l) if l.trim().is_empty() => {
                        lines.next();
                    }
                    Some(l) => break Some(l.trim().to_string()),
                    None => break None,
                }
            };

            let Some(decl) = decl else { break };

            if decl.starts_with("/*") {
                tracing::warn!("catalogue comment block without a declaration");
                continue;
            }

            match parse_declaration(&decl, &block) {
                Some(sig) => {
                    lines.next();
                    catalog.functions.insert(sig.name.clone(), sig);
                }
                None => {
                    tracing::warn!(declaration = %decl, "skipping malformed catalogue entry");
                    lines.next();
                }
            }
        }

        catalog
    }

    /// The catalogue bundled with the server, used when no definition file
    /// is configured or the configured one cannot be read.
    #[must_use]
    pub fn builtin() -> Self {
        Self::parse(BUILTIN_DEFINITIONS)
    }

    /// Lookup by name; comparison is by uppercase.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(&name.to_uppercase())
    }

    #[must_use]
    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(&name.to_uppercase())
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionSignature> {
        self.functions.values()
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    #[must_use]
    pub fn is_aggregation(&self, name: &str) -> bool {
        AGGREGATIONS.contains(name.to_uppercase().as_str())
    }

    /// The catalogued name closest to `name`, for did-you-mean hints.
    #[must_use]
    pub fn nearest_function(&self, name: &str) -> Option<&str> {
        let upper = name.to_uppercase();
        self.functions
            .keys()
            .map(|candidate| (candidate, strsim::jaro_winkler(&upper, candidate)))
            .filter(|(_, score)| *score >= 0.85)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(candidate, _)| candidate.as_str())
    }
}

/// The tags of one JSDoc comment block.
#[derive(Debug, Default)]
struct JsdocBlock {
    description: Vec<String>,
    params: Vec<(String, String, bool, Option<String>, String)>,
    return_type: String,
    return_doc: String,
    examples: Vec<String>,
    since: Option<String>,
    deprecated: Option<String>,
    author: Option<String>,
    template: Option<String>,
    typedef: Option<TypeDef>,
}

impl JsdocBlock {
    fn parse(lines: &[String]) -> Self {
        let mut block = Self::default();
        let mut current_example: Option<String> = None;

        for line in lines {
            let line = line.trim();

            if let Some(rest) = line.strip_prefix('@') {
                if let Some(example) = current_example.take() {
                    block.examples.push(example.trim().to_string());
                }

                let (tag, rest) = rest.split_once(' ').unwrap_or((rest, ""));
                let rest = rest.trim();

                match tag {
                    "param" => {
                        let (ty, rest) = take_braced(rest);
                        let (raw_name, doc) = split_name_and_doc(rest);
                        let (name, optional, default) = parse_param_name(&raw_name);
                        block.params.push((name, ty, optional, default, doc));
                    }
                    "returns" | "return" => {
                        let (ty, doc) = take_braced(rest);
                        block.return_type = ty;
                        block.return_doc = doc.to_string();
                    }
                    "example" => current_example = Some(rest.to_string()),
                    "since" => block.since = non_empty(rest),
                    "deprecated" => {
                        block.deprecated = Some(if rest.is_empty() {
                            "deprecated".to_string()
                        } else {
                            rest.to_string()
                        });
                    }
                    "author" => block.author = non_empty(rest),
                    "template" => block.template = non_empty(rest),
                    "typedef" => {
                        let (ty, name) = take_braced(rest);
                        block.typedef = Some(TypeDef {
                            name: name.trim().to_string(),
                            ty,
                            doc: block.description.join("\n"),
                            properties: Vec::new(),
                            template: block.template.take(),
                        });
                    }
                    "property" => {
                        let (ty, rest) = take_braced(rest);
                        let (name, doc) = split_name_and_doc(rest);
                        if let Some(typedef) = block.typedef.as_mut() {
                            typedef.properties.push(PropertyDoc { name, ty, doc });
                        }
                    }
                    _ => {
                        tracing::debug!(tag, "ignoring unknown catalogue tag");
                    }
                }
            } else if let Some(example) = current_example.as_mut() {
                example.push('\n');
                example.push_str(line);
            } else if !line.is_empty() {
                block.description.push(line.to_string());
            }
        }

        if let Some(example) = current_example.take() {
            block.examples.push(example.trim().to_string());
        }

        block
    }

    fn param_doc(&self, name: &str) -> (bool, Option<String>, String) {
        self.params
            .iter()
            .find(|(n, ..)| n.eq_ignore_ascii_case(name))
            .map(|(_, _, optional, default, doc)| (*optional, default.clone(), doc.clone()))
            .unwrap_or((false, None, String::new()))
    }

    fn param_type(&self, name: &str) -> Option<String> {
        self.params
            .iter()
            .find(|(n, ..)| n.eq_ignore_ascii_case(name))
            .map(|(_, ty, ..)| ty.clone())
    }
}

/// `NAME(param: Type, ...) => ReturnType`
fn parse_declaration(decl: &str, block: &JsdocBlock) -> Option<FunctionSignature> {
    let open = decl.find('(')?;
    let close = decl.rfind(')')?;
    if close < open {
        return None;
    }

    let name = decl[..open].trim();
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }

    let return_type = decl[close + 1..]
        .trim()
        .strip_prefix("=>")
        .map(str::trim)
        .unwrap_or("")
        .to_string();

    let mut parameters = Vec::new();
    let params_src = &decl[open + 1..close];

    for raw in params_src.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let variadic = raw.starts_with("...");
        let raw = raw.trim_start_matches("...");

        let (raw_name, ty) = match raw.split_once(':') {
            Some((n, t)) => (n.trim(), t.trim().to_string()),
            None => (raw, String::new()),
        };

        let optional_marker = raw_name.ends_with('?');
        let name = raw_name.trim_end_matches('?').to_string();

        let (doc_optional, default, doc) = block.param_doc(&name);
        let ty = if ty.is_empty() {
            block.param_type(&name).unwrap_or_default()
        } else {
            ty
        };

        parameters.push(ParameterDoc {
            optional: optional_marker || doc_optional || default.is_some(),
            variadic,
            name,
            ty,
            default,
            doc,
        });
    }

    let min_args = parameters
        .iter()
        .filter(|p| !p.optional && !p.variadic)
        .count();
    let max_args = if parameters.iter().any(|p| p.variadic) {
        None
    } else {
        Some(parameters.len())
    };

    Some(FunctionSignature {
        name: name.to_uppercase(),
        min_args,
        max_args,
        parameters,
        return_type: if return_type.is_empty() {
            block.return_type.clone()
        } else {
            return_type
        },
        return_doc: block.return_doc.clone(),
        doc: block.description.join("\n"),
        examples: block.examples.clone(),
        since: block.since.clone(),
        deprecated: block.deprecated.clone(),
        author: block.author.clone(),
    })
}

/// `{Type} rest` -> (`Type`, `rest`)
fn take_braced(text: &str) -> (String, &str) {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('{') {
        if let Some(end) = rest.find('}') {
            return (rest[..end].trim().to_string(), rest[end + 1..].trim());
        }
    }
    (String::new(), text)
}

/// `name - description` / `[name=default] - description`
fn split_name_and_doc(text: &str) -> (String, String) {
    let text = text.trim();
    let (name, doc) = match text.split_once(" - ") {
        Some((n, d)) => (n.trim(), d.trim()),
        None => match text.split_once(' ') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (text, ""),
        },
    };
    (name.to_string(), doc.to_string())
}

/// `[name=default]` marks an optional parameter with a default value.
fn parse_param_name(raw: &str) -> (String, bool, Option<String>) {
    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        match inner.split_once('=') {
            Some((name, default)) => (
                name.trim().to_string(),
                true,
                Some(default.trim().to_string()),
            ),
            None => (inner.trim().to_string(), true, None),
        }
    } else {
        (raw.to_string(), false, None)
    }
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
/**
 * Returns the running total.
 * @param {Expression} expression - The aggregated expression.
 * @param {Number} [start=0] - First row of the window.
 * @returns {Number} The running total.
 * @example RUNNING_SUM(SUM([Sales]))
 * @since 8.0
 */
RUNNING_SUM(expression: Expression, start?: Number) => Number

/**
 * @typedef {Object} FieldInfo
 * @property {String} name - Column name.
 * @property {String} role - Dimension or measure.
 */

/**
 * Largest of the given values.
 * @param {Number} values - Values to compare.
 * @returns {Number} The largest value.
 */
GREATEST(...values: Number) => Number

this is not a declaration
"#;

    #[test]
    fn parses_functions_and_arity() {
        let catalog = Catalog::parse(SAMPLE);

        let f = catalog.function("running_sum").unwrap();
        assert_eq!(f.name, "RUNNING_SUM");
        assert_eq!(f.min_args, 1);
        assert_eq!(f.max_args, Some(2));
        assert_eq!(f.parameters.len(), 2);
        assert!(f.parameters[1].optional);
        assert_eq!(f.parameters[1].default.as_deref(), Some("0"));
        assert_eq!(f.return_type, "Number");
        assert_eq!(f.since.as_deref(), Some("8.0"));
        assert_eq!(f.examples, vec!["RUNNING_SUM(SUM([Sales]))"]);
    }

    #[test]
    fn variadic_means_unbounded() {
        let catalog = Catalog::parse(SAMPLE);
        let f = catalog.function("GREATEST").unwrap();
        assert_eq!(f.min_args, 0);
        assert_eq!(f.max_args, None);
        assert_eq!(f.arity_label(), "at least 0");
    }

    #[test]
    fn typedefs_are_extracted() {
        let catalog = Catalog::parse(SAMPLE);
        let t = catalog.type_def("FieldInfo").unwrap();
        assert_eq!(t.ty, "Object");
        assert_eq!(t.properties.len(), 2);
        assert_eq!(t.properties[0].name, "name");
    }

    #[test]
    fn builtin_catalogue_loads() {
        let catalog = Catalog::builtin();
        assert!(!catalog.is_empty());
        for name in ["SUM", "AVG", "IIF", "DATEDIFF", "ZN"] {
            assert!(catalog.function(name).is_some(), "missing {name}");
        }
        assert!(catalog.is_aggregation("sum"));
        assert!(!catalog.is_aggregation("ZN"));
    }

    #[test]
    fn nearest_function_suggests_close_names() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.nearest_function("SUMM"), Some("SUM"));
    }

    #[test]
    fn label_renders_signature() {
        let catalog = Catalog::parse(SAMPLE);
        let f = catalog.function("RUNNING_SUM").unwrap();
        assert_eq!(f.label(), "RUNNING_SUM(expression, start?) => Number");
    }
}
