use anyhow::{Result, anyhow};
use std::path::Path;

/// Filename used when the uploaded CSV part carries none
pub const DEFAULT_CSV_FILENAME: &str = "upload.csv";

/// Validation error with a stable code
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Sanitizes filename to prevent path traversal and injection attacks
/// Returns the sanitized filename or an error if the name is invalid
pub fn sanitize_filename(filename: &str) -> Result<String> {
    // Browsers on Windows may send the full client path
    let name = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: format!("Invalid CSV filename '{}'", filename),
        }));
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from uploaded filename: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Leave room for the "temp_" prefix within a 255 byte name
    let sanitized = if sanitized.len() > 250 {
        let mut end = 250;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    Ok(sanitized)
}

/// Parses a boolean form value the way HTML forms and API clients send it
pub fn parse_form_bool(field: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Ok(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Ok(false),
        _ => Err(anyhow!(ValidationError {
            code: "INVALID_BOOLEAN",
            message: format!("Field '{}' must be a boolean, got '{}'", field, value),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_plain_names() {
        assert_eq!(sanitize_filename("mapping.csv").unwrap(), "mapping.csv");
        assert_eq!(
            sanitize_filename("patients 2024.csv").unwrap(),
            "patients 2024.csv"
        );
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(
            sanitize_filename("C:\\Users\\jane\\ids.csv").unwrap(),
            "ids.csv"
        );
    }

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_filename("a|b?c.csv").unwrap(), "a_b_c.csv");
    }

    #[test]
    fn test_sanitize_rejects_empty_names() {
        let err = sanitize_filename("..").unwrap_err();
        let validation = err.downcast_ref::<ValidationError>().unwrap();
        assert_eq!(validation.code, "INVALID_FILENAME");
        assert!(sanitize_filename("dir/").is_err());
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let sanitized = sanitize_filename(&long).unwrap();
        assert!(sanitized.len() <= 250);
        assert!(sanitized.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_parse_form_bool() {
        assert!(parse_form_bool("anonymize_flag", "true").unwrap());
        assert!(parse_form_bool("anonymize_flag", "ON").unwrap());
        assert!(!parse_form_bool("anonymize_flag", " false ").unwrap());
        assert!(!parse_form_bool("anonymize_flag", "0").unwrap());

        let err = parse_form_bool("anonymize_flag", "maybe").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Field 'anonymize_flag' must be a boolean, got 'maybe'"
        );
    }
}
