//! Turtle rendering of cache entries with the `xsh:` vocabulary

use std::fmt::Write;
use xshacl_core::vocab::{RDFS, XSD, XSH};
use xshacl_core::{CacheEntry, Term};

/// Render entries as a Turtle document.
///
/// Each entry becomes an `xsh:ViolationSignature` node named after its hash,
/// linked to one `xsh:Explanation` node per language and one
/// `xsh:DomainRule` node per rule.
pub fn export_turtle(entries: &[CacheEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "@prefix xsh: <{}> .", XSH);
    let _ = writeln!(out, "@prefix rdfs: <{}> .", RDFS);
    let _ = writeln!(out, "@prefix xsd: <{}> .", XSD);

    for entry in entries {
        out.push('\n');
        write_entry(&mut out, entry);
    }
    out
}

fn write_entry(out: &mut String, entry: &CacheEntry) {
    let hex = entry.hash.to_hex();
    let subject = format!("xsh:sig_{}", hex);
    let sig = &entry.signature;

    let mut props: Vec<(String, String)> = vec![
        ("a".into(), "xsh:ViolationSignature".into()),
        ("xsh:signatureHash".into(), literal(&hex)),
        ("xsh:shapeId".into(), node(&sig.shape_id)),
        ("xsh:constraintId".into(), node(&sig.constraint_id)),
        ("xsh:violationType".into(), literal(sig.violation_type.as_str())),
    ];
    if let Some(path) = &sig.property_path {
        props.push(("xsh:propertyPath".into(), node(path)));
    }
    if !sig.constraint_params.is_empty() {
        let params = sig
            .constraint_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        props.push(("xsh:constraintParams".into(), literal(&params)));
    }
    for language in entry.explanations.keys() {
        props.push(("xsh:hasExplanation".into(), explanation_node(&hex, language)));
    }
    for case in &entry.similar_cases {
        props.push(("xsh:hasSimilarCase".into(), node(case)));
    }
    for idx in 0..entry.domain_rules.len() {
        props.push(("xsh:hasDomainRule".into(), format!("xsh:rule_{}_{}", hex, idx)));
    }
    props.push(("xsh:createdAt".into(), datetime(&entry.created_at)));
    write_block(out, &subject, &props);

    for (language, explanation) in &entry.explanations {
        let mut props = vec![
            ("a".to_string(), "xsh:Explanation".to_string()),
            ("xsh:languageCode".into(), literal(language)),
            (
                "xsh:naturalLanguageText".into(),
                literal(&explanation.natural_language_text),
            ),
        ];
        for suggestion in &explanation.correction_suggestions {
            props.push(("xsh:correctionSuggestion".into(), literal(suggestion)));
        }
        props.push((
            "xsh:providedByModel".into(),
            literal(&explanation.provided_by_model),
        ));
        props.push(("xsh:createdAt".into(), datetime(&explanation.created_at)));
        write_block(out, &explanation_node(&hex, language), &props);
    }

    for (idx, rule) in entry.domain_rules.iter().enumerate() {
        let props = vec![
            ("a".to_string(), "xsh:DomainRule".to_string()),
            ("rdfs:comment".into(), literal(rule)),
        ];
        write_block(out, &format!("xsh:rule_{}_{}", hex, idx), &props);
    }
}

fn explanation_node(hex: &str, language: &str) -> String {
    format!("xsh:expl_{}_{}", hex, escape_local(language))
}

/// Percent-encode everything outside `[A-Za-z0-9_-]` so any stored language
/// code yields a valid prefixed-name local part
fn escape_local(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{:02X}", byte);
        }
    }
    out
}

fn write_block(out: &mut String, subject: &str, props: &[(String, String)]) {
    let _ = write!(out, "{}", subject);
    for (i, (predicate, object)) in props.iter().enumerate() {
        let sep = if i == 0 { " " } else { " ;\n    " };
        let _ = write!(out, "{}{} {}", sep, predicate, object);
    }
    out.push_str(" .\n");
}

fn literal(value: &str) -> String {
    Term::literal(value).to_string()
}

fn datetime(value: &chrono::DateTime<chrono::Utc>) -> String {
    format!("\"{}\"^^xsd:dateTime", value.to_rfc3339())
}

/// Absolute IRIs become `<...>`, everything else a plain literal
fn node(id: &str) -> String {
    match Term::node(id) {
        Term::Iri(iri) if iri.contains("://") || iri.starts_with("urn:") => format!("<{}>", iri),
        _ => literal(id),
    }
}
