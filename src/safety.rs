//! Safety settings and ratings for `generateContent` requests.

use serde::{Deserialize, Serialize};

/// Category of potentially harmful content
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
    #[serde(rename = "HARM_CATEGORY_CIVIC_INTEGRITY")]
    CivicIntegrity,
    /// Categories this crate does not know about yet
    #[serde(other)]
    Other,
}

/// Probability threshold at which content gets blocked
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    HarmBlockThresholdUnspecified,
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
    Off,
}

/// Safety setting attached to a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SafetySetting {
    /// The category this setting applies to
    pub category: HarmCategory,
    /// Block content at or above this probability
    pub threshold: HarmBlockThreshold,
}

impl SafetySetting {
    pub fn new(category: HarmCategory, threshold: HarmBlockThreshold) -> Self {
        Self {
            category,
            threshold,
        }
    }

    /// Hate speech and dangerous content, blocked only on high-confidence hits.
    ///
    /// Used for the address standardization pass.
    pub fn block_only_high() -> Vec<SafetySetting> {
        vec![
            Self::new(HarmCategory::HateSpeech, HarmBlockThreshold::BlockOnlyHigh),
            Self::new(
                HarmCategory::DangerousContent,
                HarmBlockThreshold::BlockOnlyHigh,
            ),
        ]
    }
}

/// Safety rating reported on a candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyRating {
    /// The category of the rating
    pub category: HarmCategory,
    /// Probability bucket, e.g. `NEGLIGIBLE`
    pub probability: String,
    /// Whether the content was blocked because of this rating
    #[serde(default)]
    pub blocked: bool,
}
