//! Document rendering and writing.

use anyhow::Context;
use schemaport_core::connectors::OutputFormat;
use schemaport_core::models::SchemaDocument;
use schemaport_core::serializer::to_json_string;
use schemaport_core::validation::validate_document_output;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Encodes the document and checks it against the document JSON Schema.
///
/// # Errors
/// Returns an error if encoding fails or the output does not validate
pub fn render_document(document: &SchemaDocument, format: OutputFormat) -> anyhow::Result<String> {
    let rendered = to_json_string(document, format)?;

    let value: serde_json::Value =
        serde_json::from_str(&rendered).context("JSON parsing for validation")?;
    validate_document_output(&value).context("Schema validation failed")?;
    tracing::debug!("Output validation passed");

    Ok(rendered)
}

/// Writes rendered output to `path`, or stdout when `None`.
///
/// # Errors
/// Returns an I/O error if the file or stdout cannot be written
pub async fn write_document(rendered: &str, path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            tokio::fs::write(path, format!("{}\n", rendered))
                .await
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            tracing::info!("Schema saved to {}", path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(rendered.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
