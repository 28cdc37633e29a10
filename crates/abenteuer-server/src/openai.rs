//! OpenAI-compatible chat and moderation clients.
//!
//! Both adapters only ever see text the kernel has already redacted.

use std::time::Duration;

use abenteuer_config::{Generator, Moderation};
use abenteuer_contracts::{contract_schema, ActivityPlan};
use abenteuer_kernel::{CallError, GenerationRequest, ModerationVerdict, Moderator, PlanGenerator};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::transport_error;

pub struct OpenAiPlanGenerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    plan_schema: jsonschema::Validator,
}

impl OpenAiPlanGenerator {
    pub fn new(cfg: &Generator, api_key: String) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        let schema_text = contract_schema("activity_plan.schema.json")
            .ok_or_else(|| "activity_plan schema is not embedded".to_string())?;
        let schema: Value = serde_json::from_str(schema_text).map_err(|e| e.to_string())?;
        let plan_schema = jsonschema::validator_for(&schema).map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            model: cfg.model.clone(),
            api_key,
            plan_schema,
        })
    }

    /// Parses the model's JSON answer into a plan that satisfies the plan contract.
    fn parse_plan(&self, content: &str) -> Result<ActivityPlan, CallError> {
        let mut value: Value = serde_json::from_str(content)
            .map_err(|e| CallError::InvalidResponse(format!("plan is not JSON: {e}")))?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| CallError::InvalidResponse("plan is not an object".to_string()))?;
        object.insert("provenance".to_string(), json!("generated"));
        if let Err(first) = self.plan_schema.validate(&value) {
            return Err(CallError::InvalidResponse(format!(
                "plan violates contract: {first}"
            )));
        }
        serde_json::from_value(value).map_err(|e| CallError::InvalidResponse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl PlanGenerator for OpenAiPlanGenerator {
    async fn generate_plan(&self, request: &GenerationRequest) -> Result<ActivityPlan, CallError> {
        let body = json!({
            "model": self.model,
            "response_format": {"type": "json_object"},
            "temperature": 0.7,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt}
            ]
        });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(CallError::Status {
                status: response.status().as_u16(),
            });
        }
        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallError::InvalidResponse(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CallError::InvalidResponse("empty completion".to_string()))?;
        self.parse_plan(&content)
    }
}

pub struct OpenAiModerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiModerator {
    pub fn new(cfg: &Moderation, api_key: String) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            endpoint: format!("{}/moderations", cfg.base_url.trim_end_matches('/')),
            model: cfg.model.clone(),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: serde_json::Map<String, Value>,
}

impl ModerationResponse {
    fn verdict(self) -> Result<ModerationVerdict, CallError> {
        let result = self
            .results
            .into_iter()
            .next()
            .ok_or_else(|| CallError::InvalidResponse("no moderation result".to_string()))?;
        let mut categories: Vec<String> = result
            .categories
            .into_iter()
            .filter(|(_, hit)| hit.as_bool().unwrap_or(false))
            .map(|(name, _)| name)
            .collect();
        categories.sort();
        Ok(ModerationVerdict {
            flagged: result.flagged,
            categories,
        })
    }
}

#[async_trait]
impl Moderator for OpenAiModerator {
    async fn check(&self, text: &str) -> Result<ModerationVerdict, CallError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({"model": self.model, "input": text}))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(CallError::Status {
                status: response.status().as_u16(),
            });
        }
        let body: ModerationResponse = response
            .json()
            .await
            .map_err(|e| CallError::InvalidResponse(e.to_string()))?;
        body.verdict()
    }
}
