// src/detect/mod.rs
// Detection collaborator interface. The neural inference itself lives in a
// sidecar process; this module only speaks its result format.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::JetbotError;

/// Coarse shape filter derived from a detection's bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Wider than tall: tables, cars, lying objects
    Horizontal,
    /// Taller than wide: people, bottles, standing objects
    Vertical,
}

impl Orientation {
    fn as_str(self) -> &'static str {
        match self {
            Orientation::Horizontal => "horizontal",
            Orientation::Vertical => "vertical",
        }
    }
}

/// One detection from the sidecar.
///
/// `rotation_deg` is the signed intra-frame offset of the object from the
/// image's horizontal center (positive = right of center). Detectors are
/// inconsistent about the key name and sometimes emit it as a string, so
/// deserialization is lenient; an absent or unparseable offset means
/// "centered".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Annotation {
    /// Class label
    #[serde(rename = "class")]
    pub label: String,
    /// Detection confidence in [0, 1]
    #[serde(default)]
    pub confidence: f64,
    /// Bounding box as [x1, y1, x2, y2]
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    /// Box center as [x, y]
    #[serde(default)]
    pub center: Option<[f64; 2]>,
    /// Box area in pixels
    #[serde(default)]
    pub area: Option<f64>,
    /// Signed offset from image center, degrees
    #[serde(
        default,
        alias = "rotation_degree",
        deserialize_with = "lenient_degrees"
    )]
    pub rotation_deg: Option<f64>,
}

impl Annotation {
    /// The rotation offset with the "missing means centered" rule applied.
    pub fn rotation_offset(&self) -> f64 {
        self.rotation_deg.unwrap_or(0.0)
    }
}

/// Accepts a number, a numeric string, or null for the rotation offset.
fn lenient_degrees<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Async seam to the open-vocabulary object detector.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Registers target words with the detector ahead of a sweep, so its
    /// open-vocabulary prompts cover them.
    async fn register_targets(&self, words: &[String]) -> Result<(), JetbotError>;

    /// Returns current annotations for the target words, optionally
    /// filtered by object orientation.
    async fn detect(
        &self,
        words: &[String],
        orientation: Option<Orientation>,
    ) -> Result<Vec<Annotation>, JetbotError>;
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    #[serde(default)]
    annotations: Vec<Annotation>,
}

/// Detector client speaking the sidecar's HTTP surface.
pub struct HttpDetector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDetector {
    /// Points the client at a detector base URL (e.g.
    /// `http://localhost:8001/yolo`).
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpDetector {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn word_params<'a>(
        words: &'a [String],
        orientation: Option<Orientation>,
    ) -> Vec<(&'static str, &'a str)> {
        let mut params: Vec<(&'static str, &str)> =
            words.iter().map(|w| ("words", w.as_str())).collect();
        if let Some(o) = orientation {
            params.push(("orientation", o.as_str()));
        }
        params
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn register_targets(&self, words: &[String]) -> Result<(), JetbotError> {
        if words.is_empty() {
            return Ok(());
        }
        let params: Vec<(&str, &str)> = words.iter().map(|w| ("prompts", w.as_str())).collect();
        self.client
            .post(format!("{}/append-prompts/", self.base_url))
            .query(&params)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn detect(
        &self,
        words: &[String],
        orientation: Option<Orientation>,
    ) -> Result<Vec<Annotation>, JetbotError> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&Self::word_params(words, orientation))
            .send()
            .await?
            .error_for_status()?;
        let parsed: DetectionResponse = response.json().await?;
        Ok(parsed.annotations)
    }
}
