//! Typed interpretation of a user utterance
//!
//! Produced by the external reasoner; the dialogue policy only ever sees
//! these variants. The wire/tool JSON keeps a string `type` discriminator
//! for compatibility with the reasoner's function-calling schema.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Order,
    Modify,
    Cancel,
    Payment,
    Inquiry,
    Unknown,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Order => "order",
            IntentKind::Modify => "modify",
            IntentKind::Cancel => "cancel",
            IntentKind::Payment => "payment",
            IntentKind::Inquiry => "inquiry",
            IntentKind::Unknown => "unknown",
        }
    }

    /// Minimum confidence at which this kind is acted on without hedging
    pub fn confidence_threshold(&self) -> f32 {
        match self {
            IntentKind::Order | IntentKind::Modify | IntentKind::Cancel | IntentKind::Payment => {
                0.7
            }
            IntentKind::Inquiry => 0.6,
            IntentKind::Unknown => 0.5,
        }
    }
}

/// One requested menu line inside an ORDER intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedLine {
    pub name: String,
    /// Reasoner-assigned category token ("단품" / "세트" / "라지세트")
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub options: FxHashMap<String, String>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModAction {
    Add,
    Remove,
    ChangeQuantity,
    ChangeOption,
}

/// One requested change inside a MODIFY intent. An empty `item_name`
/// targets the first line of the order (terse utterances like "단품으로").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modification {
    #[serde(default)]
    pub item_name: String,
    pub action: ModAction,
    #[serde(default)]
    pub new_quantity: Option<u32>,
    #[serde(default)]
    pub new_options: Option<FxHashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Cash,
    Mobile,
}

/// Per-kind payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IntentPayload {
    Order { items: Vec<RequestedLine> },
    Modify { mods: Vec<Modification> },
    /// Empty target list means "cancel the whole order"
    Cancel { targets: Vec<String> },
    Payment { method: Option<PaymentMethod> },
    Inquiry { text: String },
    Unknown,
}

/// A user utterance interpreted by the reasoner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    #[serde(flatten)]
    pub payload: IntentPayload,
    /// Reasoner confidence in [0, 1]
    pub confidence: f32,
    pub raw_text: String,
    pub timestamp: DateTime<Utc>,
}

impl Intent {
    pub fn new(payload: IntentPayload, confidence: f32, raw_text: impl Into<String>) -> Self {
        Self {
            payload,
            confidence: confidence.clamp(0.0, 1.0),
            raw_text: raw_text.into(),
            timestamp: crate::now_micros(),
        }
    }

    pub fn unknown(raw_text: impl Into<String>) -> Self {
        Self::new(IntentPayload::Unknown, 0.0, raw_text)
    }

    pub fn kind(&self) -> IntentKind {
        match self.payload {
            IntentPayload::Order { .. } => IntentKind::Order,
            IntentPayload::Modify { .. } => IntentKind::Modify,
            IntentPayload::Cancel { .. } => IntentKind::Cancel,
            IntentPayload::Payment { .. } => IntentKind::Payment,
            IntentPayload::Inquiry { .. } => IntentKind::Inquiry,
            IntentPayload::Unknown => IntentKind::Unknown,
        }
    }

    pub fn is_reliable(&self) -> bool {
        self.confidence >= self.kind().confidence_threshold()
    }

    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= 0.8
    }
}
