//! GPT-4o-style image provider.
//!
//! Status vocabulary is a string enum (`GENERATING`, `SUCCESS`, ...) with a
//! decimal progress string and results under `response.resultUrls`.

use genflow_core::GenerationItem;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use crate::adapter::ProviderAdapter;
use crate::error::{ProviderError, mentions_content_policy};
use crate::status::ProviderStatus;

const SUPPORTED_RATIOS: &[&str] = &["1:1", "3:2", "2:3"];

#[derive(Debug, Default, Clone, Copy)]
pub struct Gpt4oAdapter;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordInfo {
    status: Option<String>,
    progress: Option<String>,
    response: Option<RecordResponse>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordResponse {
    #[serde(default)]
    result_urls: Vec<String>,
}

impl ProviderAdapter for Gpt4oAdapter {
    fn supported_ratios(&self) -> &'static [&'static str] {
        SUPPORTED_RATIOS
    }

    fn create_path(&self) -> &'static str {
        "/api/v1/gpt4o-image/generate"
    }

    fn status_path(&self) -> &'static str {
        "/api/v1/gpt4o-image/record-info"
    }

    fn create_body(&self, item: &GenerationItem) -> JsonValue {
        let plan = self.plan_ratio(item);
        let mut body = json!({
            "prompt": plan.prompt,
            "nVariants": 1,
            "isEnhance": false,
            "enableFallback": false,
        });
        if let Some(ratio) = plan.native_ratio {
            body["size"] = JsonValue::String(ratio);
        }
        if let Some(url) = &item.source_image_url {
            body["filesUrl"] = json!([url]);
        }
        body
    }

    fn parse_status(&self, data: &JsonValue) -> Result<ProviderStatus, ProviderError> {
        let info: RecordInfo = serde_json::from_value(data.clone())
            .map_err(|e| ProviderError::MalformedResponse(format!("gpt4o record: {e}")))?;

        let status = info.status.as_deref().unwrap_or("GENERATING");
        match status {
            "SUCCESS" => {
                let url = info
                    .response
                    .and_then(|r| r.result_urls.into_iter().find(|u| !u.is_empty()))
                    .ok_or_else(|| {
                        ProviderError::MalformedResponse("SUCCESS without resultUrls".to_string())
                    })?;
                Ok(ProviderStatus::Completed { artifact_url: url })
            }
            "CREATE_TASK_FAILED" | "GENERATE_FAILED" => {
                let reason = info
                    .error_message
                    .unwrap_or_else(|| status.to_ascii_lowercase());
                if mentions_content_policy(&reason) {
                    return Err(ProviderError::ContentPolicy(reason));
                }
                Ok(ProviderStatus::Failed { reason })
            }
            _ => Ok(ProviderStatus::Processing {
                progress: info.progress.as_deref().and_then(parse_fraction),
            }),
        }
    }
}

/// `"0.45"` → `Some(45)`.
fn parse_fraction(raw: &str) -> Option<u8> {
    let value: f64 = raw.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some((value.clamp(0.0, 1.0) * 100.0).round() as u8)
}
