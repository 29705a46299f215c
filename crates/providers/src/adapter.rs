//! Per-provider adapters.
//!
//! An adapter is pure: it builds request bodies and turns the provider's
//! native response shape into [`ProviderStatus`]. All HTTP, auth and retry
//! handling lives in [`crate::client`], so shape differences never leak past
//! this boundary.

use genflow_core::{AspectRatio, GenerationItem};
use serde_json::Value as JsonValue;

use crate::error::ProviderError;
use crate::status::ProviderStatus;

/// Request/response translation for one provider.
pub trait ProviderAdapter: Send + Sync {
    /// Ratios the provider accepts as a native parameter.
    fn supported_ratios(&self) -> &'static [&'static str];

    /// Path (relative to the provider base URL) for creating a job.
    fn create_path(&self) -> &'static str;

    /// Path for looking up a job; the task id travels as the `taskId` query parameter.
    fn status_path(&self) -> &'static str;

    /// JSON body for the create-job call.
    fn create_body(&self, item: &GenerationItem) -> JsonValue;

    /// Normalize the `data` object of a status response.
    fn parse_status(&self, data: &JsonValue) -> Result<ProviderStatus, ProviderError>;

    /// Decide how the item's aspect ratio reaches the provider.
    fn plan_ratio(&self, item: &GenerationItem) -> RatioPlan {
        RatioPlan::for_ratio(&item.prompt, item.aspect_ratio, self.supported_ratios())
    }
}

/// Prompt and native ratio parameter actually sent to a provider.
///
/// Exactly one of the two carries the ratio: either `native_ratio` is set and
/// the prompt is untouched, or the prompt carries a `landscape W:H` prefix and
/// `native_ratio` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatioPlan {
    pub prompt: String,
    pub native_ratio: Option<String>,
}

impl RatioPlan {
    pub fn for_ratio(prompt: &str, ratio: Option<AspectRatio>, supported: &[&str]) -> Self {
        match ratio {
            None => RatioPlan {
                prompt: prompt.to_string(),
                native_ratio: None,
            },
            Some(ratio) => {
                let label = ratio.to_string();
                if supported.contains(&label.as_str()) {
                    RatioPlan {
                        prompt: prompt.to_string(),
                        native_ratio: Some(label),
                    }
                } else {
                    RatioPlan {
                        prompt: format!("landscape {label}, {prompt}"),
                        native_ratio: None,
                    }
                }
            }
        }
    }
}

/// Unwrap the `{code, msg, data}` envelope both providers share.
///
/// A non-200 envelope code is mapped through [`ProviderError::from_code`].
pub fn envelope_data(body: &JsonValue) -> Result<&JsonValue, ProviderError> {
    let code = body
        .get("code")
        .and_then(JsonValue::as_u64)
        .ok_or_else(|| ProviderError::MalformedResponse("missing envelope code".to_string()))?;

    if code != 200 {
        let message = body
            .get("msg")
            .or_else(|| body.get("message"))
            .and_then(JsonValue::as_str)
            .unwrap_or("no message")
            .to_string();
        let code = u16::try_from(code).unwrap_or(500);
        return Err(ProviderError::from_code(code, message));
    }

    body.get("data")
        .filter(|d| !d.is_null())
        .ok_or_else(|| ProviderError::MalformedResponse("missing envelope data".to_string()))
}

/// Extract the provider task id from a create-job response.
pub fn parse_created_task_id(body: &JsonValue) -> Result<String, ProviderError> {
    let data = envelope_data(body)?;
    data.get("taskId")
        .and_then(JsonValue::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::MalformedResponse("create response has no taskId".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SUPPORTED: &[&str] = &["1:1", "3:2", "2:3"];

    #[test]
    fn supported_ratio_is_passed_natively() {
        let plan = RatioPlan::for_ratio("a fox", Some("3:2".parse().unwrap()), SUPPORTED);
        assert_eq!(plan.native_ratio.as_deref(), Some("3:2"));
        assert_eq!(plan.prompt, "a fox");
    }

    #[test]
    fn unsupported_ratio_becomes_prompt_hint_only() {
        let plan = RatioPlan::for_ratio("a fox", Some("16:9".parse().unwrap()), SUPPORTED);
        assert_eq!(plan.native_ratio, None);
        assert!(plan.prompt.starts_with("landscape 16:9"));
        assert!(plan.prompt.ends_with("a fox"));
    }

    #[test]
    fn missing_ratio_leaves_prompt_alone() {
        let plan = RatioPlan::for_ratio("a fox", None, SUPPORTED);
        assert_eq!(plan.native_ratio, None);
        assert_eq!(plan.prompt, "a fox");
    }

    #[test]
    fn envelope_errors_are_mapped() {
        let body = json!({"code": 402, "msg": "Insufficient credits", "data": null});
        assert!(matches!(envelope_data(&body), Err(ProviderError::Quota(_))));

        let body = json!({"code": 429, "msg": "too many"});
        assert!(matches!(envelope_data(&body), Err(ProviderError::RateLimited(_))));

        let body = json!({"msg": "???"});
        assert!(matches!(
            envelope_data(&body),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn created_task_id_is_extracted() {
        let body = json!({"code": 200, "msg": "success", "data": {"taskId": "task_123"}});
        assert_eq!(parse_created_task_id(&body).unwrap(), "task_123");

        let body = json!({"code": 200, "msg": "success", "data": {"taskId": ""}});
        assert!(parse_created_task_id(&body).is_err());
    }
}
