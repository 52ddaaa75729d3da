//! Manifest decoding
//!
//! Turns a byte stream of one or more YAML (or JSON) documents into
//! [`ResourceDocument`]s. Decoding is all-or-nothing: one malformed document
//! fails the whole stream and nothing is returned.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::document::ResourceDocument;

/// Errors from manifest decoding
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("document {index}: {message}")]
    InvalidDocument { index: usize, message: String },
}

/// Decode every non-empty document in `bytes`
///
/// Empty documents (a stray `---`, a comment-only block) are skipped.
/// Each remaining document must be an object carrying `apiVersion`, `kind`
/// and `metadata.name`.
///
/// # Example
///
/// ```
/// use weaver::manifest::parse_manifests;
///
/// let input = b"---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n";
/// let docs = parse_manifests(input).unwrap();
/// assert_eq!(docs.len(), 1);
/// assert_eq!(docs[0].name(), Some("a"));
/// ```
pub fn parse_manifests(bytes: &[u8]) -> Result<Vec<ResourceDocument>, ManifestError> {
    let mut documents = Vec::new();

    for (index, de) in serde_yaml::Deserializer::from_slice(bytes).enumerate() {
        let value = Value::deserialize(de).map_err(|e| ManifestError::InvalidDocument {
            index,
            message: e.to_string(),
        })?;

        let doc = ResourceDocument::new(value);
        if doc.is_empty() {
            debug!(index = index, "Skipping empty manifest document");
            continue;
        }

        validate(index, &doc)?;
        documents.push(doc);
    }

    Ok(documents)
}

/// Read a manifest file and decode it with [`parse_manifests`]
pub async fn read_manifests(
    path: impl AsRef<Path>,
) -> Result<Vec<ResourceDocument>, ManifestError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|source| ManifestError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_manifests(&bytes)
}

fn validate(index: usize, doc: &ResourceDocument) -> Result<(), ManifestError> {
    let invalid = |message: &str| ManifestError::InvalidDocument {
        index,
        message: message.to_string(),
    };

    if !doc.value().is_object() {
        return Err(invalid("expected a mapping at the top level"));
    }
    if doc.api_version().is_none() {
        return Err(invalid("missing apiVersion"));
    }
    if doc.kind().is_none() {
        return Err(invalid("missing kind"));
    }
    if doc.name().map_or(true, str::is_empty) {
        return Err(invalid("missing metadata.name"));
    }
    Ok(())
}
