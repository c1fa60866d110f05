use std::sync::atomic::{AtomicU64, Ordering};

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

pub const DEFAULT_ARTIFACT_FILENAME: &str = "geocoded.xlsx";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Standard alphabet, padding optional.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static NEXT_ARTIFACT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId(u64);

impl ArtifactId {
    fn next() -> Self {
        Self(NEXT_ARTIFACT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "artifact-{}", self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("artifact payload is not valid base64: {0}")]
    Decode(String),
}

/// Downloadable result of a run.
///
/// Not `Clone`; a state owns at most one live artifact, and replacing it
/// drops the previous bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct Artifact {
    id: ArtifactId,
    bytes: Vec<u8>,
    filename: String,
    content_type: String,
}

impl Artifact {
    /// Decodes a base64 payload; ASCII whitespace is ignored.
    pub fn from_base64(
        payload: &str,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<Self, ArtifactError> {
        let compact: Vec<u8> = payload
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let bytes = LENIENT_STANDARD
            .decode(compact)
            .map_err(|err| ArtifactError::Decode(err.to_string()))?;
        Ok(Self::from_binary(bytes, filename, content_type))
    }

    pub fn from_binary(bytes: Vec<u8>, filename: Option<&str>, content_type: Option<&str>) -> Self {
        let filename = filename
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_ARTIFACT_FILENAME);
        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(XLSX_CONTENT_TYPE);
        Self {
            id: ArtifactId::next(),
            bytes,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
        }
    }

    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
