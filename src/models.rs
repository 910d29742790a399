use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::mint::MintErrorKind;

/// Raw user input as submitted by the UI, before validation.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MintForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl MintForm {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { name: name.into(), description: description.into() }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("please provide a name and a description (name is empty)")]
    EmptyName,
    #[error("please provide a name and a description (description is empty)")]
    EmptyDescription,
}

/// A validated mint request. Both fields are guaranteed non-blank.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct MintRequest {
    name: String,
    description: String,
}

impl MintRequest {
    pub fn new(name: &str, description: &str) -> Result<Self, ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if description.trim().is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        Ok(Self { name: name.to_string(), description: description.to_string() })
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn description(&self) -> &str { &self.description }

    /// The text sent to the image model. The description doubles as the prompt.
    pub fn prompt(&self) -> &str { &self.description }
}

impl TryFrom<&MintForm> for MintRequest {
    type Error = ValidationError;

    fn try_from(form: &MintForm) -> Result<Self, Self::Error> {
        MintRequest::new(&form.name, &form.description)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self { bytes: bytes.into(), mime_type: mime_type.into() }
    }

    pub fn len(&self) -> usize { self.bytes.len() }

    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    /// File extension matching the MIME type, used to name the stored entry.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/svg+xml" => "svg",
            _ => "jpeg",
        }
    }

    pub fn file_name(&self) -> String {
        format!("image.{}", self.extension())
    }

    /// Inline `data:` URL so a browser can show the image without another fetch.
    pub fn to_data_url(&self) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.mime_type, encoded)
    }

    pub fn summary(&self) -> ImageSummary {
        ImageSummary { mime_type: self.mime_type.clone(), size: self.len() }
    }
}

/// What is kept of an image once its run has failed: enough to explain, not to display.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub mime_type: String,
    pub size: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub content_id: String,
    pub metadata_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    pub transaction_hash: String,
    pub confirmed: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Inference,
    Storage,
    Mint(MintErrorKind),
    /// The run was abandoned before any stage reported an outcome.
    Aborted,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct PipelineFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Artifacts produced by earlier stages of the failed run.
    pub image: Option<ImageSummary>,
    pub asset: Option<StoredAsset>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    Validating,
    GeneratingImage,
    Uploading,
    Minting,
    Succeeded {
        receipt: MintReceipt,
        asset: StoredAsset,
        image_data_url: String,
    },
    Failed {
        #[serde(flatten)]
        failure: PipelineFailure,
    },
}

impl PipelineState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PipelineState::Validating
                | PipelineState::GeneratingImage
                | PipelineState::Uploading
                | PipelineState::Minting
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded { .. } | PipelineState::Failed { .. })
    }

    /// Position in the run's progression; a run only ever moves to a higher rank.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            PipelineState::Idle => 0,
            PipelineState::Validating => 1,
            PipelineState::GeneratingImage => 2,
            PipelineState::Uploading => 3,
            PipelineState::Minting => 4,
            PipelineState::Succeeded { .. } | PipelineState::Failed { .. } => 5,
        }
    }

    /// Message shown next to the spinner while a run is in flight.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "",
            PipelineState::Validating => "Validating...",
            PipelineState::GeneratingImage => "Generating Image...",
            PipelineState::Uploading => "Uploading Image...",
            PipelineState::Minting => "Minting Image...",
            PipelineState::Succeeded { .. } => "Minted",
            PipelineState::Failed { .. } => "Failed",
        }
    }

    pub fn failure(&self) -> Option<&PipelineFailure> {
        match self {
            PipelineState::Failed { failure } => Some(failure),
            _ => None,
        }
    }
}

/// Point-in-time view of the controller, as served to the UI.
#[derive(Debug, Serialize, Clone)]
pub struct RunSnapshot {
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub busy: bool,
    pub label: &'static str,
    #[serde(flatten)]
    pub state: PipelineState,
}
