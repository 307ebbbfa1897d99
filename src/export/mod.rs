//! Knowledge export formats

mod csv;
mod markdown;

pub use self::csv::{escape_field, render_csv};
pub use self::markdown::render_markdown;

use crate::error::Result;
use crate::models::KnowledgeExport;
use crate::state::IncidentFilter;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Export format for knowledge dumps
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    #[strum(to_string = "markdown", serialize = "md")]
    Markdown,
}

impl ExportFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Markdown => "md",
        }
    }

    /// Get MIME type for this format
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }

    /// Suggested download file name
    pub fn file_name(&self, generated_at: chrono::DateTime<chrono::Utc>) -> String {
        format!(
            "knowledge-export-{}.{}",
            generated_at.format("%Y%m%d-%H%M%S"),
            self.extension()
        )
    }
}

/// What to export and how
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default)]
    pub filter: IncidentFilter,
    /// Upper bound on exported incidents (all when unset)
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A rendered export
#[derive(Debug, Clone, Serialize)]
pub struct RenderedExport {
    pub format: ExportFormat,
    pub file_name: String,
    pub total_incidents: usize,
    pub body: String,
}

/// Render an export in the requested format
pub fn render(export: &KnowledgeExport, format: ExportFormat) -> Result<RenderedExport> {
    let body = match format {
        ExportFormat::Json => serde_json::to_string_pretty(export)?,
        ExportFormat::Csv => render_csv(export),
        ExportFormat::Markdown => render_markdown(export),
    };

    Ok(RenderedExport {
        format,
        file_name: format.file_name(export.generated_at),
        total_incidents: export.total_incidents,
        body,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!(
            "markdown".parse::<ExportFormat>().unwrap(),
            ExportFormat::Markdown
        );
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_render_json_round_trips() {
        let export = fixtures::sample_export();
        let rendered = render(&export, ExportFormat::Json).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&rendered.body).unwrap();
        assert_eq!(parsed["total_incidents"], 1);
        assert_eq!(parsed["entries"][0]["solutions"][0]["title"], "Add index");
        assert_eq!(rendered.file_name, "knowledge-export-20240501-100000.json");
    }
}
