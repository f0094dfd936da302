//! Client for the third-party link-resolution API.
//!
//! The resolver translates a Terabox share URL into direct, time-limited
//! download links. Its JSON envelope varies between deployments, so the
//! types here deserialize leniently: field-name aliases are accepted and
//! sizes/flags may arrive as numbers, booleans or strings.

use serde::{Deserialize, Deserializer};
use thiserror::Error;

mod client;
pub use client::ResolverClient;

/// Errors produced by the resolver client
#[derive(Error, Debug)]
pub enum ResolverError {
    /// The resolver answered but reported a failure
    #[error("Resolver API error: {0}")]
    Api(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    Network(String),
    /// The resolver body was not the expected JSON envelope
    #[error("Unexpected resolver response: {0}")]
    Json(String),
    /// The resolver succeeded but described no files
    #[error("The resolver returned no files for this link")]
    Empty,
}

/// One file described by the resolver
#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedFile {
    /// File name as stored on the share
    #[serde(alias = "filename", alias = "name")]
    pub file_name: String,
    /// Size in bytes; zero when the resolver does not report one
    #[serde(default, alias = "size_bytes", deserialize_with = "de_size")]
    pub size: u64,
    /// Direct, time-limited download link
    #[serde(alias = "dlink", alias = "direct_link")]
    pub download_link: String,
    /// Whether this entry is a directory rather than a file
    #[serde(default, alias = "isdir", deserialize_with = "de_flag")]
    pub is_dir: bool,
    /// Optional type hint ("video", "image", ...)
    #[serde(default, alias = "category", alias = "type")]
    pub file_type: Option<String>,
}

/// Top-level resolver envelope: a success flag plus a list of descriptors.
#[derive(Debug, Deserialize)]
struct ResolveEnvelope {
    #[serde(default, alias = "status", deserialize_with = "de_success")]
    success: bool,
    #[serde(default, alias = "list", alias = "data")]
    files: Vec<ResolvedFile>,
}

/// Interprets a raw resolver body.
///
/// A body without a success flag, with `success: false`, or with an empty
/// file list is a typed failure; it must never panic on junk input.
///
/// # Errors
///
/// Returns `ResolverError::Json` for malformed bodies, `ResolverError::Api`
/// when the resolver reports failure, and `ResolverError::Empty` when the
/// file list is missing or empty.
pub(crate) fn parse_body(body: &str) -> Result<Vec<ResolvedFile>, ResolverError> {
    let envelope: ResolveEnvelope =
        serde_json::from_str(body).map_err(|e| ResolverError::Json(e.to_string()))?;

    if !envelope.success {
        return Err(ResolverError::Api(
            "resolver reported failure for this link".to_string(),
        ));
    }
    if envelope.files.is_empty() {
        return Err(ResolverError::Empty);
    }
    Ok(envelope.files)
}

fn de_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeField {
        Num(u64),
        Text(String),
    }

    match SizeField::deserialize(deserializer)? {
        SizeField::Num(n) => Ok(n),
        SizeField::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlagField {
        Bool(bool),
        Num(i64),
        Text(String),
    }

    Ok(match FlagField::deserialize(deserializer)? {
        FlagField::Bool(b) => b,
        FlagField::Num(n) => n != 0,
        FlagField::Text(s) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
    })
}

fn de_success<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SuccessField {
        Bool(bool),
        Text(String),
    }

    Ok(match SuccessField::deserialize(deserializer)? {
        SuccessField::Bool(b) => b,
        SuccessField::Text(s) => matches!(s.trim().to_lowercase().as_str(), "success" | "ok"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_envelope() {
        let body = r#"{
            "success": true,
            "files": [
                {
                    "file_name": "movie.mp4",
                    "size": 1048576,
                    "download_link": "https://d.example.com/movie.mp4",
                    "is_dir": false,
                    "file_type": "video"
                }
            ]
        }"#;

        let files = parse_body(body).expect("envelope should parse");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "movie.mp4");
        assert_eq!(files[0].size, 1_048_576);
        assert!(!files[0].is_dir);
    }

    #[test]
    fn test_parse_aliased_stringly_envelope() {
        // Other resolver deployments: status string, "list", string sizes,
        // numeric directory flags, "dlink" links.
        let body = r#"{
            "status": "success",
            "list": [
                {
                    "filename": "photo.jpg",
                    "size": "2048",
                    "dlink": "https://d.example.com/photo.jpg",
                    "isdir": "0"
                },
                {
                    "filename": "season-1",
                    "size": 0,
                    "dlink": "https://d.example.com/dir",
                    "isdir": 1
                }
            ]
        }"#;

        let files = parse_body(body).expect("aliased envelope should parse");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].size, 2048);
        assert!(!files[0].is_dir);
        assert!(files[1].is_dir);
    }

    #[test]
    fn test_missing_success_flag_is_failure() {
        let body = r#"{"files": [{"file_name": "a", "download_link": "https://x"}]}"#;
        assert!(matches!(parse_body(body), Err(ResolverError::Api(_))));
    }

    #[test]
    fn test_reported_failure_is_api_error() {
        let body = r#"{"success": false, "files": []}"#;
        assert!(matches!(parse_body(body), Err(ResolverError::Api(_))));
    }

    #[test]
    fn test_missing_file_list_is_empty_error() {
        let body = r#"{"success": true}"#;
        assert!(matches!(parse_body(body), Err(ResolverError::Empty)));

        let body = r#"{"success": true, "files": []}"#;
        assert!(matches!(parse_body(body), Err(ResolverError::Empty)));
    }

    #[test]
    fn test_junk_body_is_json_error_not_panic() {
        for junk in ["", "not json", "<html>502</html>", "[1,2,3]", "42"] {
            assert!(matches!(parse_body(junk), Err(ResolverError::Json(_))));
        }
    }
}
