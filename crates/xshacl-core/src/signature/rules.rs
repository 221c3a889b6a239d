//! Per-constraint-component parameter extraction rules
//!
//! Each rule names the parameters that identify a failing constraint
//! independently of the node that triggered it. Parameters are looked up in
//! the record's `context` first and then recovered from the validator
//! message with a regular expression (pySHACL phrasing). The table is
//! extensible: callers can register rules for components the built-in table
//! does not know.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::violation::ViolationRecord;

/// Parameter key used when no rule applies
pub const MESSAGE_PARAM: &str = "message";

const FOCUS_PLACEHOLDER: &str = "{focus}";
const VALUE_PLACEHOLDER: &str = "{value}";

/// Extraction rule for a single constraint parameter
#[derive(Debug, Clone)]
pub struct ParamRule {
    /// Parameter name; matches the shape predicate local name (`minCount`)
    pub key: String,
    /// Regex with one capture group applied to the validator message
    pub message_pattern: Option<Regex>,
    /// Whether the rule is unusable without this parameter
    pub required: bool,
}

impl ParamRule {
    pub fn required(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message_pattern: None,
            required: true,
        }
    }

    pub fn optional(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message_pattern: None,
            required: false,
        }
    }

    /// Attach a message pattern. Invalid patterns are ignored with a warning.
    pub fn from_message(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => self.message_pattern = Some(re),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Ignoring invalid message pattern")
            }
        }
        self
    }

    fn extract(&self, record: &ViolationRecord) -> Option<String> {
        let snake = to_snake_case(&self.key);
        let candidates = [self.key.clone(), format!("sh:{}", self.key), snake];

        for candidate in &candidates {
            if let Some(value) = record.context.get(candidate) {
                let rendered = render_json(value);
                if !rendered.is_empty() {
                    return Some(rendered);
                }
            }
        }

        let message = record.message.as_deref()?;
        let captures = self.message_pattern.as_ref()?.captures(message)?;
        let raw = captures.get(1)?.as_str();
        let normalized = normalize_value(raw);
        (!normalized.is_empty()).then_some(normalized)
    }
}

/// Extraction rule for one constraint component
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    /// Component local name without the `ConstraintComponent` suffix
    pub component: String,
    pub params: Vec<ParamRule>,
}

impl ExtractionRule {
    pub fn new(component: impl Into<String>, params: Vec<ParamRule>) -> Self {
        Self {
            component: component.into(),
            params,
        }
    }

    /// Shape predicate local names that evidence this component
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.key.as_str())
    }

    /// Extract all parameters, or `None` if a required one is missing
    fn apply(&self, record: &ViolationRecord) -> Option<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        for param in &self.params {
            match param.extract(record) {
                Some(value) => {
                    params.insert(param.key.clone(), value);
                }
                None if param.required => return None,
                None => {}
            }
        }
        Some(params)
    }
}

/// Ordered table of extraction rules keyed by component name
#[derive(Debug, Clone)]
pub struct ExtractionTable {
    rules: BTreeMap<String, ExtractionRule>,
}

impl Default for ExtractionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExtractionTable {
    /// Create an empty table (every component falls back to the message)
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// The built-in SHACL Core table
    pub fn builtin() -> Self {
        let mut table = Self::empty();

        table.register(ExtractionRule::new(
            "MinCount",
            vec![ParamRule::required("minCount").from_message(r"Less than (\d+) values")],
        ));
        table.register(ExtractionRule::new(
            "MaxCount",
            vec![ParamRule::required("maxCount").from_message(r"More than (\d+) values")],
        ));
        table.register(ExtractionRule::new(
            "MinInclusive",
            vec![ParamRule::required("minInclusive").from_message(r"Value is not >= (.+)$")],
        ));
        table.register(ExtractionRule::new(
            "MaxInclusive",
            vec![ParamRule::required("maxInclusive").from_message(r"Value is not <= (.+)$")],
        ));
        table.register(ExtractionRule::new(
            "MinExclusive",
            vec![ParamRule::required("minExclusive").from_message(r"Value is not > (.+)$")],
        ));
        table.register(ExtractionRule::new(
            "MaxExclusive",
            vec![ParamRule::required("maxExclusive").from_message(r"Value is not < (.+)$")],
        ));
        table.register(ExtractionRule::new(
            "MinLength",
            vec![ParamRule::required("minLength").from_message(r"String length not >= (\d+)")],
        ));
        table.register(ExtractionRule::new(
            "MaxLength",
            vec![ParamRule::required("maxLength").from_message(r"String length not <= (\d+)")],
        ));
        table.register(ExtractionRule::new(
            "Pattern",
            vec![
                ParamRule::required("pattern")
                    .from_message(r#"(?s)does not match pattern\s+["'](.*)["']"#),
                ParamRule::optional("flags"),
            ],
        ));
        table.register(ExtractionRule::new(
            "Datatype",
            vec![ParamRule::required("datatype")
                .from_message(r"Literal with datatype\s+(\S+)")],
        ));
        table.register(ExtractionRule::new(
            "Class",
            vec![ParamRule::required("class").from_message(r"does not have class\s+(\S+)")],
        ));
        table.register(ExtractionRule::new(
            "NodeKind",
            vec![ParamRule::required("nodeKind").from_message(r"Node Kind\s+(\S+)")],
        ));
        table.register(ExtractionRule::new(
            "In",
            vec![ParamRule::required("in").from_message(r"not in list\s+(.+)$")],
        ));
        table.register(ExtractionRule::new("HasValue", vec![ParamRule::required("hasValue")]));
        table.register(ExtractionRule::new(
            "LanguageIn",
            vec![ParamRule::required("languageIn")],
        ));
        table.register(ExtractionRule::new("UniqueLang", vec![ParamRule::optional("uniqueLang")]));
        table.register(ExtractionRule::new("Equals", vec![ParamRule::required("equals")]));
        table.register(ExtractionRule::new("Disjoint", vec![ParamRule::required("disjoint")]));
        table.register(ExtractionRule::new("LessThan", vec![ParamRule::required("lessThan")]));
        table.register(ExtractionRule::new(
            "LessThanOrEquals",
            vec![ParamRule::required("lessThanOrEquals")],
        ));
        table.register(ExtractionRule::new("Node", vec![ParamRule::required("node")]));
        table.register(ExtractionRule::new(
            "QualifiedMinCount",
            vec![
                ParamRule::required("qualifiedMinCount"),
                ParamRule::optional("qualifiedValueShape"),
            ],
        ));
        table.register(ExtractionRule::new(
            "QualifiedMaxCount",
            vec![
                ParamRule::required("qualifiedMaxCount"),
                ParamRule::optional("qualifiedValueShape"),
            ],
        ));
        table.register(ExtractionRule::new(
            "Closed",
            vec![ParamRule::optional("closed"), ParamRule::optional("ignoredProperties")],
        ));

        table
    }

    /// Process-wide built-in table
    pub fn shared() -> &'static ExtractionTable {
        static BUILTIN: OnceLock<ExtractionTable> = OnceLock::new();
        BUILTIN.get_or_init(ExtractionTable::builtin)
    }

    /// Shape predicate local names evidencing a component.
    ///
    /// Components without a rule map to their lower-camel-case name
    /// (`Closed` to `closed`).
    pub fn parameter_names(&self, component: &str) -> Vec<String> {
        match self.rule_for(component) {
            Some(rule) => rule.parameter_names().map(str::to_string).collect(),
            None => {
                let mut chars = component.chars();
                match chars.next() {
                    Some(first) => vec![first.to_lowercase().chain(chars).collect()],
                    None => Vec::new(),
                }
            }
        }
    }

    /// Register or replace the rule for a component
    pub fn register(&mut self, rule: ExtractionRule) {
        self.rules.insert(rule.component.clone(), rule);
    }

    /// Look up the rule for a component name (suffix already stripped)
    pub fn rule_for(&self, component: &str) -> Option<&ExtractionRule> {
        self.rules.get(component)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Extract normalized constraint parameters for a record.
    ///
    /// Unknown components, and known components whose required parameters
    /// cannot be found, degrade to the node-independent message blob.
    pub fn extract(&self, record: &ViolationRecord) -> BTreeMap<String, String> {
        if let Some(params) = self
            .rule_for(record.component_name())
            .and_then(|rule| rule.apply(record))
        {
            return params;
        }

        tracing::debug!(
            component = %record.component_name(),
            "No extraction rule matched, falling back to message parameters"
        );

        let mut params = BTreeMap::new();
        if let Some(message) = record.message.as_deref() {
            params.insert(MESSAGE_PARAM.to_string(), anonymize_message(message, record));
        }
        params
    }
}

/// Replace node-specific text in a validator message with fixed placeholders.
///
/// Every mention of the focus node is replaced. Only the last mention of the
/// offending value is, since the same text may also be a constraint bound
/// ("must be 10, got 10").
pub fn anonymize_message(message: &str, record: &ViolationRecord) -> String {
    let mut text = message.to_string();

    let focus = record.focus_node.trim();
    if !focus.is_empty() {
        text = replace_node(&text, focus, FOCUS_PLACEHOLDER, Occurrences::All);
    }
    if let Some(value) = record.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        text = replace_node(&text, value, VALUE_PLACEHOLDER, Occurrences::Last);
    }

    collapse_whitespace(&text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occurrences {
    All,
    Last,
}

/// Replace whole-token occurrences of a node (full, bracketed or prefixed form)
fn replace_node(text: &str, node: &str, placeholder: &str, which: Occurrences) -> String {
    let escaped = regex::escape(node);
    let mut alternatives = vec![format!("<{}>", escaped), escaped];

    let local = crate::vocab::local_name(node);
    if !local.is_empty() && local != node {
        alternatives.push(format!(r"[A-Za-z][\w-]*:{}", regex::escape(local)));
    }

    let pattern = format!(r"(^|[^\w:/#-])(?:{})($|\W)", alternatives.join("|"));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => {
            return match which {
                Occurrences::All => text.replace(node, placeholder),
                Occurrences::Last => match text.rfind(node) {
                    Some(at) => format!("{}{}{}", &text[..at], placeholder, &text[at + node.len()..]),
                    None => text.to_string(),
                },
            };
        }
    };

    match which {
        Occurrences::All => re
            .replace_all(text, |caps: &regex::Captures<'_>| {
                format!("{}{}{}", &caps[1], placeholder, &caps[2])
            })
            .into_owned(),
        Occurrences::Last => {
            let Some(caps) = re.captures_iter(text).last() else {
                return text.to_string();
            };
            let (Some(whole), Some(lead), Some(trail)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                return text.to_string();
            };
            format!(
                "{}{}{}{}{}",
                &text[..whole.start()],
                lead.as_str(),
                placeholder,
                trail.as_str(),
                &text[whole.end()..]
            )
        }
    }
}

/// Normalize a raw parameter value recovered from a message or context
pub fn normalize_value(raw: &str) -> String {
    let mut value = collapse_whitespace(raw);

    if let Some(inner) = value
        .strip_prefix("Literal(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let lexical = inner.split(", datatype=").next().unwrap_or(inner);
        let lexical = lexical.split(", lang=").next().unwrap_or(lexical);
        value = lexical.trim().to_string();
    }

    if let Some(idx) = value.find("\"^^") {
        value.truncate(idx + 1);
    }

    let stripped = strip_quotes(&value);
    match stripped.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        Some(iri) if !iri.contains(char::is_whitespace) => iri.to_string(),
        _ => stripped.to_string(),
    }
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn render_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => normalize_value(s),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(render_json)
            .collect::<Vec<_>>()
            .join(", "),
        serde_json::Value::Object(_) => collapse_whitespace(&value.to_string()),
    }
}

/// Collapse all whitespace runs to single spaces and trim
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
