//! Violation records produced by the external SHACL validator
//!
//! A [`ViolationRecord`] is the normalized form of one `sh:ValidationResult`.
//! It is owned by the caller for the duration of one explanation request;
//! only the signature and justification tree derived from it are persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ExplainError, Result};
use crate::vocab::local_name;

/// Identifier of an RDF node: an IRI or a blank node id (`_:b0`)
pub type NodeId = String;

/// Category of a SHACL constraint violation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationType {
    /// minCount, maxCount, qualified value shape counts
    Cardinality,
    /// datatype, class, nodeKind
    ValueType,
    /// min/max inclusive/exclusive, min/max length
    ValueRange,
    /// pattern
    Pattern,
    /// equals, disjoint, lessThan, lessThanOrEquals
    PropertyPair,
    /// and, or, not, xone
    Logical,
    /// sh:sparql constraints
    SparqlBased,
    /// Anything else
    #[default]
    Other,
}

impl ViolationType {
    /// Stable textual form, also used in signature serialization
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::Cardinality => "cardinality",
            ViolationType::ValueType => "value-type",
            ViolationType::ValueRange => "value-range",
            ViolationType::Pattern => "pattern",
            ViolationType::PropertyPair => "property-pair",
            ViolationType::Logical => "logical",
            ViolationType::SparqlBased => "sparql-based",
            ViolationType::Other => "other",
        }
    }

    /// Classify a constraint component IRI (e.g. `sh:MinCountConstraintComponent`)
    pub fn from_constraint_component(constraint_id: &str) -> Self {
        let name = local_name(constraint_id);
        let name = name.strip_suffix("ConstraintComponent").unwrap_or(name);

        match name {
            "MinCount" | "MaxCount" | "QualifiedMinCount" | "QualifiedMaxCount" => {
                ViolationType::Cardinality
            }
            "Datatype" | "Class" | "NodeKind" => ViolationType::ValueType,
            "MinExclusive" | "MinInclusive" | "MaxExclusive" | "MaxInclusive" | "MinLength"
            | "MaxLength" => ViolationType::ValueRange,
            "Pattern" => ViolationType::Pattern,
            "Equals" | "Disjoint" | "LessThan" | "LessThanOrEquals" => ViolationType::PropertyPair,
            "Not" | "And" | "Or" | "Xone" => ViolationType::Logical,
            "SPARQL" | "Sparql" => ViolationType::SparqlBased,
            _ => ViolationType::Other,
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ViolationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "cardinality" => Ok(ViolationType::Cardinality),
            "value-type" => Ok(ViolationType::ValueType),
            "value-range" => Ok(ViolationType::ValueRange),
            "pattern" => Ok(ViolationType::Pattern),
            "property-pair" => Ok(ViolationType::PropertyPair),
            "logical" => Ok(ViolationType::Logical),
            "sparql-based" | "sparql" => Ok(ViolationType::SparqlBased),
            "other" => Ok(ViolationType::Other),
            other => Err(format!("Unknown violation type: {}", other)),
        }
    }
}

/// Severity of a validation result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Violation,
}

impl Severity {
    /// Parse `sh:Violation`, a full SHACL IRI, or a bare name
    pub fn parse(value: &str) -> Option<Self> {
        match local_name(value).to_lowercase().as_str() {
            "violation" => Some(Severity::Violation),
            "warning" => Some(Severity::Warning),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Violation => write!(f, "violation"),
        }
    }
}

/// One detected constraint failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    /// The node that failed validation
    #[serde(default)]
    pub focus_node: NodeId,
    /// The shape the node was validated against
    #[serde(default)]
    pub shape_id: NodeId,
    /// The constraint component that failed
    #[serde(default)]
    pub constraint_id: String,
    /// Category of the violation
    #[serde(default)]
    pub violation_type: ViolationType,
    /// Property path, absent for node-level constraints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_path: Option<String>,
    /// Offending value, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Validator message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    /// Auxiliary key-values, such as constraint parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl ViolationRecord {
    /// Create a record, classifying the violation type from the constraint component
    pub fn new(
        focus_node: impl Into<NodeId>,
        shape_id: impl Into<NodeId>,
        constraint_id: impl Into<String>,
    ) -> Self {
        let constraint_id = constraint_id.into();
        Self {
            focus_node: focus_node.into(),
            shape_id: shape_id.into(),
            violation_type: ViolationType::from_constraint_component(&constraint_id),
            constraint_id,
            property_path: None,
            value: None,
            message: None,
            severity: Severity::Violation,
            context: BTreeMap::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.property_path = Some(path.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_violation_type(mut self, violation_type: ViolationType) -> Self {
        self.violation_type = violation_type;
        self
    }

    /// Add an auxiliary context entry
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Check the fields canonicalization depends on
    pub fn validate(&self) -> Result<()> {
        if self.shape_id.trim().is_empty() {
            return Err(ExplainError::invalid_record("shapeId is missing"));
        }
        if self.constraint_id.trim().is_empty() {
            return Err(ExplainError::invalid_record("constraintId is missing"));
        }
        Ok(())
    }

    /// Property path with blank strings treated as absent
    pub fn path(&self) -> Option<&str> {
        self.property_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Local name of the constraint component without the `ConstraintComponent` suffix
    pub fn component_name(&self) -> &str {
        let name = local_name(&self.constraint_id);
        name.strip_suffix("ConstraintComponent").unwrap_or(name)
    }
}
