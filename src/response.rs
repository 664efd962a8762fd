//! Response builder
//!
//! Converts a dialogue outcome into the wire envelope: resolves or
//! synthesizes the spoken reply (cache first), converts the order snapshot,
//! and derives UI actions from the confirmation flag, the suggested-action
//! tags and reply-text keywords. A TTS failure degrades to a silent WAV
//! placeholder; the text reply is unaffected and `success` stays true.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::dialogue::DialogueResponse;
use crate::error::ClassifiedError;
use crate::gateway::types::{
    MenuOption, OrderData, PaymentData, ServerResponse, UIAction,
};
use crate::menu::SharedCatalog;
use crate::tts::{TtsCache, TtsManager};

/// Reply-text keywords that imply a menu UI action
const MENU_KEYWORDS: [&str; 3] = ["메뉴", "선택", "주문"];
/// Reply-text keywords that imply a payment UI action
const PAYMENT_KEYWORDS: [&str; 3] = ["결제", "계산", "지불"];

pub struct ResponseBuilder {
    tts: Arc<TtsManager>,
    cache: Arc<TtsCache>,
    catalog: SharedCatalog,
    tts_base_url: String,
}

impl ResponseBuilder {
    pub fn new(tts: Arc<TtsManager>, cache: Arc<TtsCache>, catalog: SharedCatalog) -> Self {
        Self {
            tts,
            cache,
            catalog,
            tts_base_url: "/api/voice/tts".to_string(),
        }
    }

    /// Assemble the wire response for a completed dialogue turn.
    pub async fn build_from_dialogue(
        &self,
        dialogue: &DialogueResponse,
        session_id: Option<Uuid>,
        processing_time: f64,
    ) -> ServerResponse {
        let tts_audio_url = self.speak(&dialogue.text).await;

        let order_data = dialogue
            .order
            .as_ref()
            .map(|order| OrderData::from_order(order, dialogue.requires_confirmation));

        let ui_actions = self.derive_ui_actions(dialogue, order_data.as_ref());

        ServerResponse {
            success: true,
            message: dialogue.text.clone(),
            tts_audio_url,
            order_data,
            ui_actions,
            error_info: None,
            processing_time,
            session_id: session_id.map(|id| id.to_string()),
            timestamp: crate::now_micros(),
        }
    }

    /// Assemble a well-formed error response from a classified failure.
    pub async fn build_from_error(
        &self,
        classified: &ClassifiedError,
        session_id: Option<Uuid>,
        processing_time: f64,
    ) -> ServerResponse {
        let tts_audio_url = self.speak(&classified.user_message).await;
        ServerResponse {
            success: false,
            message: classified.user_message.clone(),
            tts_audio_url,
            order_data: None,
            ui_actions: classified.ui_actions.clone(),
            error_info: Some(classified.error_info()),
            processing_time,
            session_id: session_id.map(|id| id.to_string()),
            timestamp: crate::now_micros(),
        }
    }

    // ------------------------------------------------------------------
    // TTS
    // ------------------------------------------------------------------

    /// Resolve the spoken reply: cache hit, fresh synthesis, or the silent
    /// placeholder when the provider fails. Returns None only when even the
    /// placeholder cannot be produced.
    async fn speak(&self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }

        let voice_config = self.tts.voice_fingerprint();

        if let Some(path) = self.cache.get(text, &voice_config) {
            let file_id = path
                .file_stem()
                .map(|s| s.to_string_lossy().trim_start_matches("tts_").to_string())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            // Refresh the registry so the fetch endpoint still resolves the id
            self.tts.register_file(&file_id, path);
            return Some(format!("{}/{}", self.tts_base_url, file_id));
        }

        match self.tts.synthesize(text).await {
            Ok(file_id) => {
                if let Some(path) = self.tts.file_path(&file_id) {
                    self.cache.put(text, &voice_config, &path);
                }
                Some(format!("{}/{}", self.tts_base_url, file_id))
            }
            Err(e) => {
                tracing::warn!(target: "TTS", "Synthesis failed, using silent placeholder: {}", e);
                self.silent_placeholder(text)
            }
        }
    }

    /// Silent WAV whose length tracks the text; keeps playback uniform
    fn silent_placeholder(&self, text: &str) -> Option<String> {
        let file_id = Uuid::new_v4().to_string();
        let path = self.tts.output_dir().join(format!("tts_{}.wav", file_id));
        match crate::audio::write_silent_wav(&path, text) {
            Ok(()) => {
                self.tts.register_file(&file_id, path);
                Some(format!("{}/{}", self.tts_base_url, file_id))
            }
            Err(e) => {
                tracing::error!(target: "TTS", "Placeholder WAV failed: {}", e);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // UI actions
    // ------------------------------------------------------------------

    fn derive_ui_actions(
        &self,
        dialogue: &DialogueResponse,
        order_data: Option<&OrderData>,
    ) -> Vec<UIAction> {
        let mut actions = Vec::new();

        if let Some(order_data) = order_data {
            actions.push(UIAction::update_order(order_data));
        }

        if dialogue.requires_confirmation {
            // Payment confirmations offer payment-flavored choices
            let options = if dialogue.text.contains("결제") || dialogue.text.contains("계산") {
                vec!["결제 진행", "주문 수정", "취소"]
            } else {
                vec!["예", "아니오"]
            };
            actions.push(UIAction::show_confirmation(&dialogue.text, options));
        }

        for tag in &dialogue.suggested_actions {
            match tag.as_str() {
                "show_menu" => {
                    actions.push(self.menu_action(None));
                }
                "show_payment" => {
                    if let Some(order_data) = order_data {
                        actions.push(UIAction::show_payment(&self.payment_data(order_data)));
                    }
                }
                "continue_ordering" => {
                    actions.push(UIAction::show_menu(serde_json::json!({
                        "message": "추가로 주문하실 메뉴가 있으신가요?",
                    })));
                }
                _ => {}
            }
        }

        // Reply-text keyword heuristics fill in actions the tags missed
        let text = dialogue.text.to_lowercase();
        if MENU_KEYWORDS.iter().any(|k| text.contains(k))
            && !actions.iter().any(|a| a.action_type == "show_menu")
        {
            actions.push(self.menu_action(None));
        }
        if PAYMENT_KEYWORDS.iter().any(|k| text.contains(k)) {
            if let Some(order_data) = order_data {
                if !actions.iter().any(|a| a.action_type == "show_payment") {
                    actions.push(UIAction::show_payment(&self.payment_data(order_data)));
                }
            }
        }

        actions
    }

    fn menu_action(&self, category: Option<&str>) -> UIAction {
        let catalog = self.catalog.read().expect("catalog lock poisoned");
        let items = match category {
            Some(category) => catalog.items_by_category(category, true),
            None => catalog.all_items(true),
        };
        let options: Vec<MenuOption> = items.iter().map(MenuOption::from_menu_item).collect();
        UIAction::show_menu(serde_json::json!({
            "menu_options": options,
            "category": category,
        }))
    }

    fn payment_data(&self, order_data: &OrderData) -> PaymentData {
        let tax_rate = self
            .catalog
            .read()
            .map(|c| c.document().tax_rate)
            .unwrap_or_else(|_| Decimal::new(1, 1));
        PaymentData::from_order_data(order_data, tax_rate)
    }

    pub fn tts_manager(&self) -> &Arc<TtsManager> {
        &self.tts
    }

    pub fn tts_cache(&self) -> &Arc<TtsCache> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReasonerConfig, TtsConfig};
    use crate::menu::{MenuCatalog, MenuDocument};
    use serde_json::Map;
    use std::sync::RwLock;

    fn catalog() -> SharedCatalog {
        let doc = MenuDocument::from_json(
            r#"{
                "categories": ["버거"],
                "menu_items": {
                    "빅맥": {"category": "버거", "price": 6500,
                              "available_options": ["단품", "세트"]}
                },
                "set_pricing": {"세트": 2000}
            }"#,
        )
        .unwrap();
        Arc::new(RwLock::new(MenuCatalog::new(doc).unwrap()))
    }

    fn builder() -> ResponseBuilder {
        let mut reasoner = ReasonerConfig::from_env();
        reasoner.api_key = "test-key".into();
        // Unroutable endpoint: every synthesis attempt fails fast, driving
        // the placeholder path in tests
        reasoner.api_base = "http://127.0.0.1:1/v1".into();
        reasoner.timeout = std::time::Duration::from_millis(200);
        let mut tts_config = TtsConfig::from_env();
        tts_config.output_dir = std::env::temp_dir().join("voice_kiosk_builder_test");

        let tts = Arc::new(TtsManager::new(&reasoner, &tts_config).unwrap());
        let cache = Arc::new(TtsCache::new(&tts_config));
        ResponseBuilder::new(tts, cache, catalog())
    }

    fn dialogue(text: &str, requires_confirmation: bool, suggested: &[&str]) -> DialogueResponse {
        DialogueResponse {
            text: text.to_string(),
            order: None,
            requires_confirmation,
            suggested_actions: suggested.iter().map(|s| s.to_string()).collect(),
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_tts_failure_degrades_to_placeholder_success_true() {
        let builder = builder();
        let response = builder
            .build_from_dialogue(&dialogue("감사합니다", false, &[]), None, 0.1)
            .await;

        assert!(response.success);
        assert_eq!(response.message, "감사합니다");
        // Placeholder still yields a fetchable URL
        let url = response.tts_audio_url.expect("placeholder URL");
        let file_id = url.rsplit('/').next().unwrap();
        let path = builder.tts_manager().file_path(file_id).expect("registered");
        assert!(crate::audio::has_wav_header(&path).unwrap());
    }

    #[tokio::test]
    async fn test_confirmation_choices_follow_payment_keyword() {
        let builder = builder();

        let payment = builder
            .build_from_dialogue(&dialogue("결제하시겠어요?", true, &[]), None, 0.0)
            .await;
        let confirm = payment
            .ui_actions
            .iter()
            .find(|a| a.action_type == "show_confirmation")
            .unwrap();
        assert_eq!(
            confirm.data["options"],
            serde_json::json!(["결제 진행", "주문 수정", "취소"])
        );

        let plain = builder
            .build_from_dialogue(&dialogue("전체 주문을 취소하시겠습니까?", true, &[]), None, 0.0)
            .await;
        let confirm = plain
            .ui_actions
            .iter()
            .find(|a| a.action_type == "show_confirmation")
            .unwrap();
        assert_eq!(confirm.data["options"], serde_json::json!(["예", "아니오"]));
    }

    #[tokio::test]
    async fn test_order_snapshot_emits_update_order() {
        let builder = builder();
        let mut d = dialogue("빅맥 세트 1개이(가) 주문에 추가되었습니다.", false, &[]);
        let mut order = crate::order::Order::new();
        let mut options = rustc_hash::FxHashMap::default();
        options.insert("type".to_string(), "세트".to_string());
        order.lines.push(crate::order::OrderLine::new(
            "빅맥",
            "버거",
            1,
            Decimal::from(8500),
            options,
        ));
        d.order = Some(order);

        let response = builder.build_from_dialogue(&d, None, 0.0).await;
        assert_eq!(response.ui_actions[0].action_type, "update_order");
        assert_eq!(
            response.order_data.as_ref().unwrap().total_amount,
            Decimal::from(8500)
        );
    }

    #[tokio::test]
    async fn test_menu_keyword_heuristic_adds_show_menu_once() {
        let builder = builder();
        let response = builder
            .build_from_dialogue(&dialogue("메뉴를 확인해주세요", false, &["show_menu"]), None, 0.0)
            .await;
        let menu_actions = response
            .ui_actions
            .iter()
            .filter(|a| a.action_type == "show_menu")
            .count();
        assert_eq!(menu_actions, 1);
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let builder = builder();
        let classifier = crate::error::ErrorClassifier::new();
        let classified =
            classifier.classify(&crate::error::KioskError::Transcription("no audio".into()));

        let session = Uuid::new_v4();
        let response = builder.build_from_error(&classified, Some(session), 0.2).await;
        assert!(!response.success);
        assert_eq!(
            response.error_info.as_ref().unwrap().error_code,
            "speech_recognition_error"
        );
        assert_eq!(response.session_id, Some(session.to_string()));
        assert!(response
            .ui_actions
            .iter()
            .any(|a| a.action_type == "show_error"));
    }
}
