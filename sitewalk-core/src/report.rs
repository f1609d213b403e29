// Report generation from resolution results

use crate::resolve::{extract_url_host, extract_url_path};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sitewalk_scanner::{Diagnostic, ResolutionResult, ResolveStats};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub generated_at: String,
    pub roots: Vec<String>,
    pub urlsets: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ResolveStats,
    pub elapsed_ms: u128,
}

impl ReportData {
    pub fn new(roots: &[String], result: &ResolutionResult) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            roots: roots.to_vec(),
            urlsets: result.leaves.iter().cloned().collect(),
            diagnostics: result.diagnostics.clone(),
            stats: result.stats.clone(),
            elapsed_ms: result.elapsed.as_millis(),
        }
    }

    /// Urlsets grouped by host, hosts and urls in sorted order
    pub fn urlsets_by_host(&self) -> BTreeMap<String, Vec<&str>> {
        let mut by_host: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for url in &self.urlsets {
            by_host
                .entry(extract_url_host(url))
                .or_default()
                .push(url.as_str());
        }
        by_host
    }
}

pub fn generate_report(data: &ReportData, format: &ReportFormat) -> io::Result<String> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data)),
        ReportFormat::Json => generate_json_report(data),
        ReportFormat::Csv => Ok(generate_csv_report(data)),
        ReportFormat::Markdown => Ok(generate_markdown_report(data)),
    }
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  Root sitemaps: {}\n", data.roots.len()));
    report.push_str(&format!("  Urlsets found: {}\n", data.urlsets.len()));
    report.push_str(&format!("  Documents fetched: {}\n", data.stats.fetched));
    report.push_str(&format!("  Sitemap indexes expanded: {}\n", data.stats.indexes));
    report.push_str(&format!("  Unrecognized documents: {}\n", data.stats.unrecognized));
    report.push_str(&format!("  Failures: {}\n", data.stats.failed));
    report.push_str(&format!("  Elapsed: {} ms\n", data.elapsed_ms));
    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    for (host, urls) in data.urlsets_by_host() {
        report.push_str(&format!("## {}\n", host));
        report.push_str(&format!("  {} urlsets found\n\n", urls.len()));

        for url in urls {
            report.push_str(&format!("  \x1b[32m✓\x1b[0m {}\n", extract_url_path(url)));
        }
        report.push('\n');
    }

    if !data.diagnostics.is_empty() {
        report.push_str("## Failures\n\n");
        for diagnostic in &data.diagnostics {
            report.push_str(&format!(
                "  \x1b[31m✗\x1b[0m {} \x1b[90m[{}]\x1b[0m {}\n",
                diagnostic.url, diagnostic.kind, diagnostic.message
            ));
        }
        report.push('\n');
    }

    report
}

pub fn generate_json_report(data: &ReportData) -> io::Result<String> {
    serde_json::to_string_pretty(data).map_err(io::Error::other)
}

fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One row per urlset, followed by one row per failed reference.
pub fn generate_csv_report(data: &ReportData) -> String {
    let mut csv = String::from("url,status,kind,message\n");

    for url in &data.urlsets {
        csv.push_str(&format!("{},urlset,,\n", escape_csv_field(url)));
    }

    for diagnostic in &data.diagnostics {
        csv.push_str(&format!(
            "{},failed,{},{}\n",
            escape_csv_field(&diagnostic.url),
            diagnostic.kind,
            escape_csv_field(&diagnostic.message)
        ));
    }

    csv
}

pub fn generate_markdown_report(data: &ReportData) -> String {
    let mut md = String::new();
    md.push_str("# Sitemap Resolution Report\n\n");
    md.push_str(&format!("Generated: {}\n\n", data.generated_at));

    md.push_str("## Summary\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Root sitemaps | {} |\n", data.roots.len()));
    md.push_str(&format!("| Urlsets found | {} |\n", data.urlsets.len()));
    md.push_str(&format!("| Documents fetched | {} |\n", data.stats.fetched));
    md.push_str(&format!("| Indexes expanded | {} |\n", data.stats.indexes));
    md.push_str(&format!("| Unrecognized | {} |\n", data.stats.unrecognized));
    md.push_str(&format!("| Failures | {} |\n", data.stats.failed));
    md.push('\n');

    md.push_str("## Urlsets\n\n");
    if data.urlsets.is_empty() {
        md.push_str("_None found._\n\n");
    }
    for (host, urls) in data.urlsets_by_host() {
        md.push_str(&format!("### {}\n\n", host));
        for url in urls {
            md.push_str(&format!("- {}\n", url));
        }
        md.push('\n');
    }

    if !data.diagnostics.is_empty() {
        md.push_str("## Failures\n\n");
        md.push_str("| URL | Kind | Message |\n");
        md.push_str("|-----|------|---------|\n");
        for diagnostic in &data.diagnostics {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                diagnostic.url,
                diagnostic.kind,
                diagnostic.message.replace('|', "\\|")
            ));
        }
        md.push('\n');
    }

    md
}

/// Write a rendered report to `path`, or to stdout when no path is given.
pub fn write_report(content: &str, path: Option<&Path>) -> io::Result<()> {
    match path {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(content.as_bytes())?;
            Ok(())
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(content.as_bytes())?;
            handle.flush()
        }
    }
}
