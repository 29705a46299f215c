//! Task, item and artifact data model.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{ItemId, TaskId};

/// External image-generation backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// GPT-4o-style image API (slower, ratio-limited).
    Gpt4o,
    /// Flux-Kontext-style image API (faster, wide ratio support).
    FluxKontext,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gpt4o => "gpt4o",
            ProviderKind::FluxKontext => "flux_kontext",
        }
    }
}

impl Default for ProviderKind {
    fn default() -> Self {
        Self::Gpt4o
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpt4o" | "gpt-4o" | "gpt4o_image" => Ok(Self::Gpt4o),
            "flux_kontext" | "flux-kontext" | "flux" => Ok(Self::FluxKontext),
            other => Err(DomainError::validation(format!(
                "unknown provider '{other}' (expected gpt4o or flux_kontext)"
            ))),
        }
    }
}

/// Aspect ratio hint expressed as `W:H`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    width: u32,
    height: u32,
}

impl AspectRatio {
    pub const SQUARE: AspectRatio = AspectRatio { width: 1, height: 1 };

    pub fn new(width: u32, height: u32) -> Result<Self, DomainError> {
        if width == 0 || height == 0 {
            return Err(DomainError::validation(
                "aspect ratio components must be positive",
            ));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| DomainError::validation(format!("aspect ratio '{s}' is not W:H")))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|_| DomainError::validation(format!("aspect ratio '{s}' is not W:H")))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|_| DomainError::validation(format!("aspect ratio '{s}' is not W:H")))?;
        Self::new(width, height)
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.to_string()
    }
}

/// Target image encoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }
}

/// A caller-supplied generation request, before it is bound to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Provider override; the deployment default applies when absent.
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    /// Optional reference image forwarded to the provider.
    #[serde(default)]
    pub source_image_url: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: None,
            output_format: OutputFormat::default(),
            provider: None,
            source_image_url: None,
        }
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Reject requests that can never succeed.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.prompt.trim().is_empty() {
            return Err(DomainError::validation("prompt must not be empty"));
        }
        Ok(())
    }
}

/// One generation request bound to its owning task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationItem {
    pub id: ItemId,
    pub task_id: TaskId,
    pub prompt: String,
    pub aspect_ratio: Option<AspectRatio>,
    pub output_format: OutputFormat,
    pub provider: ProviderKind,
    pub source_image_url: Option<String>,
}

impl GenerationItem {
    pub fn from_request(
        task_id: TaskId,
        request: GenerationRequest,
        default_provider: ProviderKind,
    ) -> Self {
        Self {
            id: ItemId::new(),
            task_id,
            prompt: request.prompt,
            aspect_ratio: request.aspect_ratio,
            output_format: request.output_format,
            provider: request.provider.unwrap_or(default_provider),
            source_image_url: request.source_image_url,
        }
    }
}

/// Logical artifact category; each maps to a fixed storage prefix.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCategory {
    /// Images produced by a generation provider.
    Generated,
    /// Reference images supplied alongside a prompt.
    Reference,
    /// Downscaled previews.
    Thumbnail,
}

impl ArtifactCategory {
    pub const ALL: [ArtifactCategory; 3] = [
        ArtifactCategory::Generated,
        ArtifactCategory::Reference,
        ArtifactCategory::Thumbnail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactCategory::Generated => "generated",
            ArtifactCategory::Reference => "reference",
            ArtifactCategory::Thumbnail => "thumbnail",
        }
    }
}

/// Durable reference to a stored artifact. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub public_url: String,
    pub storage_path: String,
    pub category: ArtifactCategory,
    pub filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_parses_and_displays() {
        let ratio: AspectRatio = "16:9".parse().unwrap();
        assert_eq!(ratio.width(), 16);
        assert_eq!(ratio.height(), 9);
        assert_eq!(ratio.to_string(), "16:9");
    }

    #[test]
    fn aspect_ratio_rejects_garbage() {
        assert!("16x9".parse::<AspectRatio>().is_err());
        assert!("0:9".parse::<AspectRatio>().is_err());
        assert!(":".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn aspect_ratio_serializes_as_string() {
        let ratio = AspectRatio::new(3, 2).unwrap();
        assert_eq!(serde_json::to_string(&ratio).unwrap(), "\"3:2\"");
        let back: AspectRatio = serde_json::from_str("\"3:2\"").unwrap();
        assert_eq!(back, ratio);
    }

    #[test]
    fn provider_kind_accepts_aliases() {
        assert_eq!("gpt-4o".parse::<ProviderKind>().unwrap(), ProviderKind::Gpt4o);
        assert_eq!(
            "Flux-Kontext".parse::<ProviderKind>().unwrap(),
            ProviderKind::FluxKontext
        );
        assert!("dalle".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn empty_prompt_is_rejected() {
        assert!(GenerationRequest::new("   ").validate().is_err());
        assert!(GenerationRequest::new("a fox").validate().is_ok());
    }

    #[test]
    fn item_takes_default_provider_when_unset() {
        let task_id = TaskId::new();
        let item = GenerationItem::from_request(
            task_id,
            GenerationRequest::new("a fox"),
            ProviderKind::FluxKontext,
        );
        assert_eq!(item.provider, ProviderKind::FluxKontext);
        assert_eq!(item.task_id, task_id);

        let item = GenerationItem::from_request(
            task_id,
            GenerationRequest::new("a fox").with_provider(ProviderKind::Gpt4o),
            ProviderKind::FluxKontext,
        );
        assert_eq!(item.provider, ProviderKind::Gpt4o);
    }
}
