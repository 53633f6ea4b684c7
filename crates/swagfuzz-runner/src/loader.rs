//! Swagger document loading

use std::path::Path;

use swagfuzz_core::SwaggerSpec;

use crate::FuzzError;

/// Read and parse a Swagger document from disk.
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed.
pub fn load_spec(path: &Path) -> Result<SwaggerSpec, FuzzError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| FuzzError::Io(format!("{}: {e}", path.display())))?;
    Ok(SwaggerSpec::new(parse_document(path, &content)?))
}

/// Parse a Swagger document from JSON or YAML.
///
/// A known file extension decides the format; without one, a document
/// whose first non-blank character is `{` is taken as JSON and anything
/// else as YAML.
pub fn parse_document(path: &Path, content: &str) -> Result<serde_json::Value, FuzzError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "yaml" | "yml" => {
            serde_yml::from_str(content).map_err(|e| FuzzError::Parse(format!("Invalid YAML: {e}")))
        }
        "json" => {
            serde_json::from_str(content).map_err(|e| FuzzError::Parse(format!("Invalid JSON: {e}")))
        }
        _ => {
            // No usable extension: sniff the first character.
            if content.trim_start().starts_with('{') {
                serde_json::from_str(content)
                    .map_err(|e| FuzzError::Parse(format!("Invalid JSON: {e}")))
            } else {
                serde_yml::from_str(content)
                    .map_err(|e| FuzzError::Parse(format!("Invalid YAML: {e}")))
            }
        }
    }
}
