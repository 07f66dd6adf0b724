use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    #[default]
    Text,
    Image,
    Audio,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// The problem statement a run works on. Immutable once submitted to a run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProblemInput {
    pub modality: Modality,
    /// Raw problem text (for image/audio: the extracted transcript).
    pub content: String,
    /// Extraction confidence, 1.0 for direct text input.
    pub extraction_confidence: f32,
    /// Transcript as edited by the user during review, if any.
    pub edited_transcript: Option<String>,
}

impl ProblemInput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            modality: Modality::Text,
            content: content.into(),
            extraction_confidence: 1.0,
            edited_transcript: None,
        }
    }

    pub fn extracted(modality: Modality, content: impl Into<String>, confidence: f32) -> Self {
        Self {
            modality,
            content: content.into(),
            extraction_confidence: confidence.clamp(0.0, 1.0),
            edited_transcript: None,
        }
    }

    pub fn with_edited_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.edited_transcript = Some(transcript.into());
        self
    }

    /// The text the pipeline should solve: the edited transcript wins.
    pub fn effective_text(&self) -> &str {
        self.edited_transcript.as_deref().unwrap_or(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_input_defaults() {
        let input = ProblemInput::text("Solve for x: 2x + 5 = 15");
        assert_eq!(input.modality, Modality::Text);
        assert_eq!(input.extraction_confidence, 1.0);
        assert!(input.edited_transcript.is_none());
    }

    #[test]
    fn test_extracted_confidence_is_clamped() {
        let input = ProblemInput::extracted(Modality::Image, "x + 1 = 2", 1.5);
        assert_eq!(input.extraction_confidence, 1.0);
        let input = ProblemInput::extracted(Modality::Audio, "x + 1 = 2", -0.5);
        assert_eq!(input.extraction_confidence, 0.0);
    }

    #[test]
    fn test_effective_text_prefers_edit() {
        let input = ProblemInput::extracted(Modality::Image, "garbled", 0.4)
            .with_edited_transcript("x + 1 = 2");
        assert_eq!(input.effective_text(), "x + 1 = 2");
    }

    #[test]
    fn test_modality_roundtrip() {
        assert_eq!(Modality::parse("image"), Some(Modality::Image));
        assert_eq!(Modality::Audio.as_str(), "audio");
        assert_eq!(Modality::parse("video"), None);
    }
}
