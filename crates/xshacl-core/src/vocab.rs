//! Namespace IRIs and small IRI helpers

/// SHACL namespace
pub const SH: &str = "http://www.w3.org/ns/shacl#";
/// RDF namespace
pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
/// RDFS namespace
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
/// XML Schema datatypes namespace
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
/// Explanation cache vocabulary
pub const XSH: &str = "http://xshacl.org/#";

/// `rdf:type`
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
/// `rdfs:comment`
pub const RDFS_COMMENT: &str = "http://www.w3.org/2000/01/rdf-schema#comment";
/// `xsh:appliesToProperty`
pub const XSH_APPLIES_TO_PROPERTY: &str = "http://xshacl.org/#appliesToProperty";

/// Return the fragment or last path segment of an IRI.
///
/// Prefixed names (`sh:minCount`) yield the part after the colon.
pub fn local_name(iri: &str) -> &str {
    let iri = iri.trim().trim_start_matches('<').trim_end_matches('>');
    if let Some(idx) = iri.rfind(|c| c == '#' || c == '/') {
        return &iri[idx + 1..];
    }
    match iri.rfind(':') {
        Some(idx) if !iri.starts_with("_:") => &iri[idx + 1..],
        _ => iri,
    }
}

/// Whether an identifier denotes a blank node (`_:b0`)
pub fn is_blank_node(id: &str) -> bool {
    id.starts_with("_:")
}

/// Render an identifier for human-readable statements.
///
/// Absolute IRIs are wrapped in angle brackets, everything else is verbatim.
pub fn display_id(id: &str) -> String {
    if id.starts_with("http://") || id.starts_with("https://") || id.starts_with("urn:") {
        format!("<{}>", id)
    } else {
        id.to_string()
    }
}
