//! Flux-Kontext-style image provider.
//!
//! Status is a numeric `successFlag` and the result lives at
//! `response.resultImageUrl`. No progress is reported.

use genflow_core::GenerationItem;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use crate::adapter::ProviderAdapter;
use crate::error::{ProviderError, mentions_content_policy};
use crate::status::ProviderStatus;

const SUPPORTED_RATIOS: &[&str] = &["21:9", "16:9", "4:3", "1:1", "3:4", "9:16"];

const DEFAULT_MODEL: &str = "flux-kontext-pro";

#[derive(Debug, Clone)]
pub struct FluxKontextAdapter {
    model: String,
}

impl Default for FluxKontextAdapter {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl FluxKontextAdapter {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordInfo {
    success_flag: Option<u8>,
    response: Option<RecordResponse>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordResponse {
    result_image_url: Option<String>,
}

impl ProviderAdapter for FluxKontextAdapter {
    fn supported_ratios(&self) -> &'static [&'static str] {
        SUPPORTED_RATIOS
    }

    fn create_path(&self) -> &'static str {
        "/api/v1/flux/kontext/generate"
    }

    fn status_path(&self) -> &'static str {
        "/api/v1/flux/kontext/record-info"
    }

    fn create_body(&self, item: &GenerationItem) -> JsonValue {
        let plan = self.plan_ratio(item);
        let mut body = json!({
            "prompt": plan.prompt,
            "outputFormat": item.output_format.as_str(),
            "model": self.model,
            "promptUpsampling": false,
            "safetyTolerance": 2,
        });
        if let Some(ratio) = plan.native_ratio {
            body["aspectRatio"] = JsonValue::String(ratio);
        }
        if let Some(url) = &item.source_image_url {
            body["inputImage"] = JsonValue::String(url.clone());
        }
        body
    }

    fn parse_status(&self, data: &JsonValue) -> Result<ProviderStatus, ProviderError> {
        let info: RecordInfo = serde_json::from_value(data.clone())
            .map_err(|e| ProviderError::MalformedResponse(format!("flux record: {e}")))?;

        match info.success_flag.unwrap_or(0) {
            0 => Ok(ProviderStatus::Processing { progress: None }),
            1 => {
                let url = info
                    .response
                    .and_then(|r| r.result_image_url)
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| {
                        ProviderError::MalformedResponse(
                            "successFlag=1 without resultImageUrl".to_string(),
                        )
                    })?;
                Ok(ProviderStatus::Completed { artifact_url: url })
            }
            flag @ (2 | 3) => {
                let reason = info.error_message.unwrap_or_else(|| {
                    if flag == 2 {
                        "task creation failed".to_string()
                    } else {
                        "generation failed".to_string()
                    }
                });
                if mentions_content_policy(&reason) {
                    return Err(ProviderError::ContentPolicy(reason));
                }
                Ok(ProviderStatus::Failed { reason })
            }
            other => Err(ProviderError::MalformedResponse(format!(
                "unknown successFlag {other}"
            ))),
        }
    }
}
