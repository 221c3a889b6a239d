//! Justification trees
//!
//! A justification tree explains a single violation: a `conclusion` root
//! ("focus fails to conform to shape") whose children are the shape's
//! declared constraints (`premise`) followed by the data triples that were
//! checked (`observation`). Child order is part of the output contract;
//! downstream generation prompts depend on it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ExplainError, Result};
use crate::graph::Triple;
use crate::signature::ExtractionTable;
use crate::violation::ViolationRecord;
use crate::vocab::{display_id, local_name};

/// Shape graph capability: declared constraint triples of a shape
pub trait ShapeLookup: Send + Sync {
    fn constraints(&self, shape_id: &str) -> Result<Vec<Triple>>;
}

/// Data graph capability: triples of a focus node, optionally restricted to a path
pub trait DataLookup: Send + Sync {
    fn triples(&self, focus_node: &str, path: Option<&str>) -> Result<Vec<Triple>>;
}

/// Statement category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Premise,
    Observation,
    Conclusion,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Premise => write!(f, "premise"),
            NodeKind::Observation => write!(f, "observation"),
            NodeKind::Conclusion => write!(f, "conclusion"),
        }
    }
}

/// A statement in a justification tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JustificationNode {
    pub statement: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<JustificationNode>,
}

impl JustificationNode {
    pub fn new(kind: NodeKind, statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            kind,
            evidence: None,
            children: Vec::new(),
        }
    }

    pub fn conclusion(statement: impl Into<String>) -> Self {
        Self::new(NodeKind::Conclusion, statement)
    }

    pub fn premise(statement: impl Into<String>) -> Self {
        Self::new(NodeKind::Premise, statement)
    }

    pub fn observation(statement: impl Into<String>) -> Self {
        Self::new(NodeKind::Observation, statement)
    }

    pub fn with_evidence(mut self, evidence: Option<String>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_child(mut self, child: JustificationNode) -> Self {
        self.children.push(child);
        self
    }

    /// Number of levels, a leaf counts as 1
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(|c| c.depth()).max().unwrap_or(0)
    }

    /// Total node count
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(|c| c.size()).sum::<usize>()
    }

    /// Direct children of the given kind
    pub fn children_of(&self, kind: NodeKind) -> impl Iterator<Item = &JustificationNode> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    /// Root is a conclusion, no descendant is, and leaves are premises or observations
    pub fn is_well_formed(&self) -> bool {
        fn descendants_ok(node: &JustificationNode) -> bool {
            node.kind != NodeKind::Conclusion && node.children.iter().all(descendants_ok)
        }
        self.kind == NodeKind::Conclusion && self.children.iter().all(descendants_ok)
    }

    /// Indented outline, one statement per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, level: usize) {
        out.push_str(&"  ".repeat(level));
        out.push_str(&format!("[{}] {}", self.kind, self.statement));
        if let Some(evidence) = &self.evidence {
            out.push_str(&format!(" (evidence: {})", evidence));
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(out, level + 1);
        }
    }
}

/// Builds justification trees from shape and data lookups
pub struct JustificationTreeBuilder<'a> {
    shapes: &'a dyn ShapeLookup,
    data: &'a dyn DataLookup,
    table: &'a ExtractionTable,
}

impl<'a> JustificationTreeBuilder<'a> {
    pub fn new(shapes: &'a dyn ShapeLookup, data: &'a dyn DataLookup) -> Self {
        Self {
            shapes,
            data,
            table: ExtractionTable::shared(),
        }
    }

    /// Use a custom extraction table to map components to shape parameters
    pub fn with_table(mut self, table: &'a ExtractionTable) -> Self {
        self.table = table;
        self
    }

    /// Build the tree, degrading to a conclusion-only tree when a lookup fails
    pub fn build(&self, record: &ViolationRecord) -> JustificationNode {
        match self.try_build(record) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!(
                    focus = %record.focus_node,
                    shape = %record.shape_id,
                    error = %e,
                    "Lookup failed, using minimal justification tree"
                );
                Self::minimal(record)
            }
        }
    }

    /// Conclusion-only tree, used when lookups are unavailable
    pub fn minimal(record: &ViolationRecord) -> JustificationNode {
        conclusion_for(record)
    }

    /// Build the tree, surfacing lookup failures as `ContextUnavailable`
    pub fn try_build(&self, record: &ViolationRecord) -> Result<JustificationNode> {
        let shape_triples = self
            .shapes
            .constraints(&record.shape_id)
            .map_err(as_context_error)?;
        let data_triples = self
            .data
            .triples(&record.focus_node, record.path())
            .map_err(as_context_error)?;

        let mut root = conclusion_for(record);
        root.children.extend(self.premises(record, &shape_triples));
        root.children.extend(observations(record, &data_triples));

        tracing::debug!(
            focus = %record.focus_node,
            premises = root.children_of(NodeKind::Premise).count(),
            observations = root.children_of(NodeKind::Observation).count(),
            "Built justification tree"
        );

        Ok(root)
    }

    fn premises(&self, record: &ViolationRecord, triples: &[Triple]) -> Vec<JustificationNode> {
        let params = self.table.parameter_names(record.component_name());
        let shape = local_name(&record.shape_id);
        let target = record
            .path()
            .map(|p| format!(" on {}", local_name(p)))
            .unwrap_or_default();

        let premises: Vec<_> = triples
            .iter()
            .filter(|t| params.iter().any(|p| p == local_name(&t.predicate)))
            .map(|t| {
                JustificationNode::premise(format!(
                    "shape {} declares {} {}{}",
                    shape,
                    local_name(&t.predicate),
                    t.object.short(),
                    target
                ))
                .with_evidence(Some(t.to_ntriples()))
            })
            .collect();

        if premises.is_empty() {
            return vec![JustificationNode::premise(format!(
                "shape {} requires {}{}",
                shape,
                local_name(&record.constraint_id),
                target
            ))];
        }
        premises
    }
}

/// Build with the default extraction table, degrading on lookup failure
pub fn build(
    record: &ViolationRecord,
    shapes: &dyn ShapeLookup,
    data: &dyn DataLookup,
) -> JustificationNode {
    JustificationTreeBuilder::new(shapes, data).build(record)
}

fn conclusion_for(record: &ViolationRecord) -> JustificationNode {
    JustificationNode::conclusion(format!(
        "{} fails to conform to {}",
        display_id(&record.focus_node),
        display_id(&record.shape_id)
    ))
    .with_evidence(record.message.clone())
}

fn observations(record: &ViolationRecord, triples: &[Triple]) -> Vec<JustificationNode> {
    let focus = display_id(&record.focus_node);

    match record.path() {
        Some(path) => triples
            .iter()
            .map(|t| {
                JustificationNode::observation(format!(
                    "{} has {} {}",
                    focus,
                    local_name(path),
                    t.object
                ))
                .with_evidence(Some(t.to_ntriples()))
            })
            .collect(),
        None => {
            let evidence = (!triples.is_empty()).then(|| {
                triples
                    .iter()
                    .map(Triple::to_ntriples)
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            let statement = match &record.value {
                Some(value) => format!("{} was checked as a whole with value {}", focus, value),
                None => format!("{} was checked as a whole ({} triples)", focus, triples.len()),
            };
            vec![JustificationNode::observation(statement).with_evidence(evidence)]
        }
    }
}

fn as_context_error(error: ExplainError) -> ExplainError {
    match error {
        ExplainError::ContextUnavailable(_) => error,
        other => ExplainError::context_unavailable(other.to_string()),
    }
}
