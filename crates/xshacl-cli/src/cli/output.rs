//! Output formatting for the xshacl-explain CLI
//!
//! JSON for machine processing, colored tables for people.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};
use xshacl_cache::{ExplainResponse, LanguageExplanation};
use xshacl_core::{CacheEntry, ExplainError, JustificationNode, ViolationRecord};
use xshacl_storage::StoreStats;

use crate::error::{CliError, Result};

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
}

/// Result of an `explain` run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainOutput {
    pub total: usize,
    pub explained: usize,
    pub failed: usize,
    pub violations: Vec<ViolationOutput>,
}

/// One violation and its per-language results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationOutput {
    pub focus_node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub languages: Vec<LanguageOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<JustificationNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageOutput {
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LanguageOutput {
    fn from_result(language: &str, result: &std::result::Result<LanguageExplanation, ExplainError>) -> Self {
        match result {
            Ok(found) => Self {
                language: language.to_string(),
                source: Some(found.source.to_string()),
                text: Some(found.explanation.natural_language_text.clone()),
                suggestions: found.explanation.correction_suggestions.clone(),
                model: Some(found.explanation.provided_by_model.clone()),
                warnings: found.warnings.clone(),
                error: None,
            },
            Err(e) => Self {
                language: language.to_string(),
                source: None,
                text: None,
                suggestions: Vec::new(),
                model: None,
                warnings: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

impl ExplainOutput {
    /// Pair each record with its response; both slices are in input order
    pub fn from_responses(
        records: &[ViolationRecord],
        responses: &[std::result::Result<ExplainResponse, ExplainError>],
    ) -> Self {
        let violations: Vec<ViolationOutput> = records
            .iter()
            .zip(responses)
            .map(|(record, response)| match response {
                Ok(response) => ViolationOutput {
                    focus_node: record.focus_node.clone(),
                    signature: Some(response.signature_hash.to_hex()),
                    error: None,
                    languages: response
                        .results
                        .iter()
                        .map(|(lang, result)| LanguageOutput::from_result(lang, result))
                        .collect(),
                    justification: response.justification.clone(),
                },
                Err(e) => ViolationOutput {
                    focus_node: record.focus_node.clone(),
                    signature: None,
                    error: Some(e.to_string()),
                    languages: Vec::new(),
                    justification: None,
                },
            })
            .collect();

        let failed = violations.iter().filter(|v| v.has_failure()).count();
        Self {
            total: violations.len(),
            explained: violations.len() - failed,
            failed,
            violations,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn render(&self, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Json => print_json(self),
            OutputFormat::Table => {
                self.render_table();
                Ok(())
            }
        }
    }

    fn render_table(&self) {
        let mut stdout = io::stdout();

        writeln!(stdout).ok();
        writeln!(stdout, "{}", "Explanations".cyan().bold()).ok();
        writeln!(stdout, "{}", "=".repeat(60)).ok();

        for (index, violation) in self.violations.iter().enumerate() {
            writeln!(stdout).ok();
            let marker = if violation.has_failure() { "x".red() } else { "+".green() };
            writeln!(
                stdout,
                "{} {}. {}",
                marker,
                index + 1,
                violation.focus_node.bold()
            )
            .ok();
            if let Some(signature) = &violation.signature {
                writeln!(stdout, "   Signature: {}", signature.dimmed()).ok();
            }
            if let Some(error) = &violation.error {
                writeln!(stdout, "   {}", error.red()).ok();
            }

            for lang in &violation.languages {
                match (&lang.text, &lang.error) {
                    (Some(text), _) => {
                        let source = lang.source.as_deref().unwrap_or_default();
                        writeln!(stdout, "   [{}] ({})", lang.language.cyan(), source.dimmed()).ok();
                        writeln!(stdout, "   {}", text).ok();
                        for suggestion in &lang.suggestions {
                            writeln!(stdout, "   {} {}", "->".green(), suggestion).ok();
                        }
                    }
                    (None, Some(error)) => {
                        writeln!(stdout, "   [{}] {}", lang.language.cyan(), error.red()).ok();
                    }
                    (None, None) => {}
                }
                for warning in &lang.warnings {
                    writeln!(stdout, "   {} {}", "!".yellow(), warning.yellow()).ok();
                }
            }
        }

        writeln!(stdout).ok();
        writeln!(stdout, "{}", "-".repeat(60)).ok();
        writeln!(
            stdout,
            "{} total, {} explained, {} with failures",
            self.total,
            self.explained.to_string().green(),
            if self.failed > 0 {
                self.failed.to_string().red()
            } else {
                self.failed.to_string().normal()
            }
        )
        .ok();
        stdout.flush().ok();
    }
}

impl ViolationOutput {
    fn has_failure(&self) -> bool {
        self.error.is_some() || self.languages.iter().any(|l| l.error.is_some())
    }
}

/// Canonical form and hash of one record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureOutput {
    pub focus_node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_form: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn render_signatures(signatures: &[SignatureOutput], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(&signatures);
    }

    let mut stdout = io::stdout();
    for signature in signatures {
        match (&signature.hash, &signature.error) {
            (Some(hash), _) => {
                writeln!(stdout, "{}  {}", hash.cyan(), signature.focus_node).ok();
                if let Some(form) = &signature.canonical_form {
                    for line in form.lines() {
                        writeln!(stdout, "    {}", line.dimmed()).ok();
                    }
                }
            }
            (None, error) => {
                let error = error.as_deref().unwrap_or("unknown error");
                writeln!(stdout, "{}  {}", signature.focus_node, error.red()).ok();
            }
        }
    }
    stdout.flush().ok();
    Ok(())
}

pub fn render_entry(entry: &CacheEntry, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(entry);
    }

    let mut stdout = io::stdout();
    writeln!(stdout, "{}", "Cache Entry".cyan().bold()).ok();
    writeln!(stdout, "{}", "=".repeat(60)).ok();
    writeln!(stdout, "Signature:  {}", entry.hash.to_hex()).ok();
    writeln!(stdout, "Shape:      {}", entry.signature.shape_id).ok();
    writeln!(stdout, "Constraint: {}", entry.signature.constraint_id).ok();
    writeln!(stdout, "Type:       {}", entry.signature.violation_type).ok();
    if let Some(path) = &entry.signature.property_path {
        writeln!(stdout, "Path:       {}", path).ok();
    }
    for (key, value) in &entry.signature.constraint_params {
        writeln!(stdout, "  {} = {}", key.dimmed(), value).ok();
    }
    writeln!(stdout, "Created:    {}", entry.created_at.to_rfc3339()).ok();
    writeln!(stdout, "Updated:    {}", entry.updated_at.to_rfc3339()).ok();

    for (language, explanation) in &entry.explanations {
        writeln!(stdout).ok();
        writeln!(
            stdout,
            "[{}] {}",
            language.cyan(),
            explanation.provided_by_model.dimmed()
        )
        .ok();
        writeln!(stdout, "{}", explanation.natural_language_text).ok();
        for suggestion in &explanation.correction_suggestions {
            writeln!(stdout, "{} {}", "->".green(), suggestion).ok();
        }
        if let Some(tree) = &explanation.justification {
            writeln!(stdout, "{}", "Justification:".dimmed()).ok();
            for line in tree.render().lines() {
                writeln!(stdout, "  {}", line).ok();
            }
        }
    }

    if !entry.similar_cases.is_empty() || !entry.domain_rules.is_empty() {
        writeln!(stdout).ok();
        writeln!(stdout, "{}", "Relations:".cyan().bold()).ok();
        for case in &entry.similar_cases {
            writeln!(stdout, "  similar: {}", case).ok();
        }
        for rule in &entry.domain_rules {
            writeln!(stdout, "  rule:    {}", rule).ok();
        }
    }
    stdout.flush().ok();
    Ok(())
}

pub fn render_stats(backend: &str, stats: &StoreStats, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(stats);
    }

    let mut stdout = io::stdout();
    writeln!(stdout, "{} ({})", "Cache Statistics".cyan().bold(), backend).ok();
    writeln!(stdout, "{}", "=".repeat(60)).ok();
    writeln!(stdout, "Signatures:    {}", stats.entries).ok();
    writeln!(stdout, "Explanations:  {}", stats.explanations).ok();
    writeln!(stdout, "Similar cases: {}", stats.similar_cases).ok();
    writeln!(stdout, "Domain rules:  {}", stats.domain_rules).ok();
    stdout.flush().ok();
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::SerializationError(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
