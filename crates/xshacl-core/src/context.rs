//! Domain context passed alongside the justification tree into generation

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::Result;
use crate::graph::{Term, TripleGraph};
use crate::violation::ViolationRecord;
use crate::vocab::{display_id, RDFS_COMMENT, RDF_TYPE, SH, XSH_APPLIES_TO_PROPERTY};

const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

/// Retrieved background knowledge for one violation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainContext {
    /// Triples describing the focus node
    #[serde(default)]
    pub ontology_fragments: Vec<String>,
    /// Shape comments and names
    #[serde(default)]
    pub shape_documentation: Vec<String>,
    /// Other nodes that likely fail the same way
    #[serde(default)]
    pub similar_cases: Vec<String>,
    /// Free-text rules attached to the property
    #[serde(default)]
    pub domain_rules: Vec<String>,
}

impl DomainContext {
    pub fn is_empty(&self) -> bool {
        self.ontology_fragments.is_empty()
            && self.shape_documentation.is_empty()
            && self.similar_cases.is_empty()
            && self.domain_rules.is_empty()
    }

    /// Plain-text rendering with one section per non-empty field
    pub fn render(&self) -> String {
        let sections = [
            ("Ontology fragments", &self.ontology_fragments),
            ("Shape documentation", &self.shape_documentation),
            ("Similar cases", &self.similar_cases),
            ("Domain rules", &self.domain_rules),
        ];

        let mut out = String::new();
        for (title, items) in sections {
            if items.is_empty() {
                continue;
            }
            out.push_str(title);
            out.push_str(":\n");
            for item in items {
                out.push_str("- ");
                out.push_str(item);
                out.push('\n');
            }
        }
        out
    }
}

/// Context retrieval capability
pub trait ContextRetriever: Send + Sync {
    fn retrieve(&self, record: &ViolationRecord) -> Result<DomainContext>;
}

/// Retriever that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

impl ContextRetriever for NoContext {
    fn retrieve(&self, _record: &ViolationRecord) -> Result<DomainContext> {
        Ok(DomainContext::default())
    }
}

/// Retriever over in-memory data and shapes graphs
#[derive(Debug, Clone)]
pub struct GraphContextRetriever {
    data: Arc<TripleGraph>,
    shapes: Arc<TripleGraph>,
}

impl GraphContextRetriever {
    pub fn new(data: Arc<TripleGraph>, shapes: Arc<TripleGraph>) -> Self {
        Self { data, shapes }
    }

    fn ontology_fragments(&self, record: &ViolationRecord) -> Vec<String> {
        self.data
            .about(&record.focus_node)
            .map(|t| t.to_ntriples())
            .collect()
    }

    fn shape_documentation(&self, record: &ViolationRecord) -> Vec<String> {
        let comments = self
            .shapes
            .objects(&record.shape_id, RDFS_COMMENT)
            .map(Term::short);
        let name_predicate = format!("{}name", SH);
        let names: Vec<_> = self
            .shapes
            .objects(&record.shape_id, &name_predicate)
            .map(|n| format!("Shape Name: {}", n.short()))
            .collect();
        comments.chain(names).collect()
    }

    /// Nodes sharing a type with the focus node that also lack the property
    fn similar_cases(&self, record: &ViolationRecord) -> Vec<String> {
        let Some(path) = record.path() else {
            return Vec::new();
        };
        let focus = Term::node(&record.focus_node);

        let mut similar = BTreeSet::new();
        for class in self.data.objects(&record.focus_node, RDF_TYPE) {
            for node in self.data.subjects_with(RDF_TYPE, class) {
                if node == &focus {
                    continue;
                }
                let key = node.key();
                if !self.data.has_property(&key, path) {
                    similar.insert(key);
                }
            }
        }
        similar.into_iter().collect()
    }

    fn domain_rules(&self, record: &ViolationRecord) -> Vec<String> {
        let Some(path) = record.path() else {
            return Vec::new();
        };
        let property = Term::node(path);

        let mut rules = BTreeSet::new();
        for rule in self.shapes.subjects_with(XSH_APPLIES_TO_PROPERTY, &property) {
            let key = rule.key();
            let label = self.shapes.objects(&key, RDFS_LABEL).next().map(Term::short);
            let comment = self.shapes.objects(&key, RDFS_COMMENT).next().map(Term::short);

            let mut text = format!("Rule {}", display_id(&key));
            if let Some(label) = label {
                text.push_str(&format!(" ({})", label));
            }
            if let Some(comment) = comment {
                text.push_str(&format!(": {}", comment));
            }
            rules.insert(text);
        }
        rules.into_iter().collect()
    }
}

impl ContextRetriever for GraphContextRetriever {
    fn retrieve(&self, record: &ViolationRecord) -> Result<DomainContext> {
        let context = DomainContext {
            ontology_fragments: self.ontology_fragments(record),
            shape_documentation: self.shape_documentation(record),
            similar_cases: self.similar_cases(record),
            domain_rules: self.domain_rules(record),
        };

        tracing::debug!(
            focus = %record.focus_node,
            fragments = context.ontology_fragments.len(),
            similar = context.similar_cases.len(),
            rules = context.domain_rules.len(),
            "Retrieved domain context"
        );

        Ok(context)
    }
}
