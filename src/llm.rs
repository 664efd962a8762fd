//! External reasoner interfaces
//!
//! The core consumes two capabilities from the LLM collaborator: intent
//! extraction (function-calling over a closed tool set) and short free-form
//! replies for open inquiries. Both are traits so the gateway can be wired
//! with scripted implementations in tests.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ReasonerConfig;
use crate::dialogue::intent::{
    Intent, IntentPayload, ModAction, Modification, PaymentMethod, RequestedLine,
};
use crate::error::KioskError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

/// Extracts a typed [`Intent`] from a transcribed utterance
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    /// `menu_info` is the catalog listing the reasoner grounds item names in.
    async fn extract(&self, text: &str, menu_info: &str) -> Result<Intent, KioskError>;
}

/// Generates a short free-form reply for open inquiries
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, KioskError>;
}

// ============================================================================
// OpenAI-compatible HTTP client
// ============================================================================

pub struct OpenAiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &ReasonerConfig) -> Result<Self, KioskError> {
        if config.api_key.is_empty() {
            return Err(KioskError::Startup(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(KioskError::Network)?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
        })
    }

    async fn chat_request(&self, body: serde_json::Value) -> Result<serde_json::Value, KioskError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(KioskError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(KioskError::IntentExtraction(format!(
                "reasoner returned {}: {}",
                status, detail
            )));
        }
        response.json().await.map_err(KioskError::Network)
    }

    /// Tool declarations for the intent extraction call; the string `type`
    /// discriminator in the arguments mirrors the wire intent schema.
    fn intent_tools() -> serde_json::Value {
        json!([
            {"type": "function", "function": {
                "name": "order",
                "description": "사용자가 메뉴를 주문할 때",
                "parameters": {"type": "object", "properties": {
                    "items": {"type": "array", "items": {"type": "object", "properties": {
                        "name": {"type": "string"},
                        "category": {"type": "string", "enum": ["단품", "세트", "라지세트"]},
                        "quantity": {"type": "integer", "minimum": 1},
                        "options": {"type": "object"}
                    }, "required": ["name"]}}
                }, "required": ["items"]}
            }},
            {"type": "function", "function": {
                "name": "modify",
                "description": "사용자가 기존 주문을 변경할 때",
                "parameters": {"type": "object", "properties": {
                    "mods": {"type": "array", "items": {"type": "object", "properties": {
                        "item_name": {"type": "string"},
                        "action": {"type": "string",
                                    "enum": ["add", "remove", "change_quantity", "change_option"]},
                        "new_quantity": {"type": "integer"},
                        "new_options": {"type": "object"}
                    }, "required": ["action"]}}
                }, "required": ["mods"]}
            }},
            {"type": "function", "function": {
                "name": "cancel",
                "description": "사용자가 주문을 취소할 때; 전체 취소면 targets는 빈 배열",
                "parameters": {"type": "object", "properties": {
                    "targets": {"type": "array", "items": {"type": "string"}}
                }}
            }},
            {"type": "function", "function": {
                "name": "payment",
                "description": "사용자가 결제를 요청할 때",
                "parameters": {"type": "object", "properties": {
                    "method": {"type": "string", "enum": ["card", "cash", "mobile"]}
                }}
            }},
            {"type": "function", "function": {
                "name": "inquiry",
                "description": "사용자가 메뉴나 주문에 대해 문의할 때",
                "parameters": {"type": "object", "properties": {
                    "text": {"type": "string"}
                }, "required": ["text"]}
            }}
        ])
    }

    fn parse_tool_call(name: &str, arguments: &str, raw_text: &str) -> Intent {
        let args: serde_json::Value = serde_json::from_str(arguments).unwrap_or(json!({}));
        let payload = match name {
            "order" => {
                let items = args["items"]
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|i| {
                                let name = i["name"].as_str()?.to_string();
                                let mut options: FxHashMap<String, String> = FxHashMap::default();
                                if let Some(map) = i["options"].as_object() {
                                    for (k, v) in map {
                                        if let Some(s) = v.as_str() {
                                            options.insert(k.clone(), s.to_string());
                                        }
                                    }
                                }
                                Some(RequestedLine {
                                    name,
                                    category: i["category"].as_str().map(|s| s.to_string()),
                                    quantity: i["quantity"].as_u64().unwrap_or(1) as u32,
                                    options,
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                IntentPayload::Order { items }
            }
            "modify" => {
                let mods = args["mods"]
                    .as_array()
                    .map(|mods| {
                        mods.iter()
                            .filter_map(|m| {
                                let action = match m["action"].as_str()? {
                                    "add" => ModAction::Add,
                                    "remove" => ModAction::Remove,
                                    "change_quantity" => ModAction::ChangeQuantity,
                                    "change_option" => ModAction::ChangeOption,
                                    _ => return None,
                                };
                                let new_options = m["new_options"].as_object().map(|map| {
                                    map.iter()
                                        .filter_map(|(k, v)| {
                                            v.as_str().map(|s| (k.clone(), s.to_string()))
                                        })
                                        .collect()
                                });
                                Some(Modification {
                                    item_name: m["item_name"].as_str().unwrap_or("").to_string(),
                                    action,
                                    new_quantity: m["new_quantity"].as_u64().map(|q| q as u32),
                                    new_options,
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                IntentPayload::Modify { mods }
            }
            "cancel" => IntentPayload::Cancel {
                targets: args["targets"]
                    .as_array()
                    .map(|t| {
                        t.iter()
                            .filter_map(|v| v.as_str().map(|s| s.to_string()))
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            "payment" => IntentPayload::Payment {
                method: match args["method"].as_str() {
                    Some("card") => Some(PaymentMethod::Card),
                    Some("cash") => Some(PaymentMethod::Cash),
                    Some("mobile") => Some(PaymentMethod::Mobile),
                    _ => None,
                },
            },
            "inquiry" => IntentPayload::Inquiry {
                text: args["text"].as_str().unwrap_or(raw_text).to_string(),
            },
            _ => IntentPayload::Unknown,
        };
        Intent::new(payload, 0.9, raw_text)
    }
}

#[async_trait]
impl IntentExtractor for OpenAiClient {
    async fn extract(&self, text: &str, menu_info: &str) -> Result<Intent, KioskError> {
        let system = format!(
            "당신은 식당 키오스크의 의도 분석기입니다. 사용자 발화를 정확히 하나의 도구 호출로 \
             분류하세요. 발음이 유사한 메뉴명은 아래 메뉴에서 가장 가까운 것으로 해석하세요.\n\n\
             현재 메뉴:\n{}",
            menu_info
        );
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": text},
            ],
            "tools": Self::intent_tools(),
            "tool_choice": "required",
            "temperature": 0.1,
        });

        let response = self.chat_request(body).await?;
        let tool_call = &response["choices"][0]["message"]["tool_calls"][0]["function"];
        match (tool_call["name"].as_str(), tool_call["arguments"].as_str()) {
            (Some(name), Some(arguments)) => Ok(Self::parse_tool_call(name, arguments, text)),
            _ => {
                tracing::warn!(target: "INTENT", "Reasoner returned no tool call, treating as unknown");
                Ok(Intent::unknown(text))
            }
        }
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, KioskError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": 50,
            "temperature": 0.3,
        });
        let response = self.chat_request(body).await?;
        response["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| KioskError::IntentExtraction("reasoner reply missing content".into()))
    }
}
