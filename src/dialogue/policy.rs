//! Menu-aware dialogue policy
//!
//! `DialogueEngine::process` is a state-dispatched function of
//! (intent kind, payment sub-state, order emptiness). It mutates the
//! session's order, mirrors every turn into the conversation context tagged
//! with the active order id, and emits a reply plus suggested UI actions.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::context::Role;
use super::intent::{Intent, IntentPayload, ModAction, Modification, RequestedLine};
use super::payment::{
    Confirmation, PAYMENT_STEPS, PaymentState, PaymentTracker, STEP_DELAYS_MS,
    classify_confirmation, completion_message,
};
use crate::llm::{ChatMessage, ReplyGenerator};
use crate::menu::SharedCatalog;
use crate::order::{Order, OrderResult};
use crate::session::SessionState;

/// Category tokens that travel as the line `type` option
const TYPE_TOKENS: [&str; 3] = ["단품", "세트", "라지세트"];

/// Keywords that route an INQUIRY to the order-status summary
const ORDER_STATUS_KEYWORDS: [&str; 5] = ["주문", "내역", "확인", "상태", "현재"];

/// Dialogue policy output consumed by the response builder
#[derive(Debug, Clone)]
pub struct DialogueResponse {
    pub text: String,
    /// Snapshot of the session's order after the turn, if any
    pub order: Option<Order>,
    pub requires_confirmation: bool,
    pub suggested_actions: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl DialogueResponse {
    fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            order: None,
            requires_confirmation: false,
            suggested_actions: Vec::new(),
            metadata: Map::new(),
        }
    }

    fn with_order(mut self, order: Option<Order>) -> Self {
        self.order = order;
        self
    }

    fn confirm(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    fn suggest(mut self, actions: &[&str]) -> Self {
        self.suggested_actions = actions.iter().map(|s| s.to_string()).collect();
        self
    }
}

pub struct DialogueEngine {
    catalog: SharedCatalog,
    replies: Arc<dyn ReplyGenerator>,
    payments: Arc<PaymentTracker>,
}

impl DialogueEngine {
    pub fn new(
        catalog: SharedCatalog,
        replies: Arc<dyn ReplyGenerator>,
        payments: Arc<PaymentTracker>,
    ) -> Self {
        Self {
            catalog,
            replies,
            payments,
        }
    }

    pub fn payments(&self) -> &Arc<PaymentTracker> {
        &self.payments
    }

    /// Run one dialogue turn against the session state.
    pub async fn process(&self, intent: &Intent, state: &mut SessionState) -> DialogueResponse {
        let order_id = state.orders.current().map(|o| o.id);

        if !intent.raw_text.is_empty() {
            state
                .context
                .add_message(Role::User, intent.raw_text.clone(), order_id);
        }

        // Payment override: while the order is mid-payment, the confirmation
        // vocabularies outrank whatever label the reasoner produced.
        let response = if let Some(oid) = order_id.filter(|oid| self.payments.is_processing(*oid)) {
            self.handle_payment_confirmation(oid, &intent.raw_text, state)
        } else {
            match &intent.payload {
                IntentPayload::Order { items } => self.handle_order(items, state),
                IntentPayload::Modify { mods } => self.handle_modify(mods, intent, state),
                IntentPayload::Cancel { targets } => self.handle_cancel(targets, state),
                IntentPayload::Payment { .. } => self.handle_payment(state),
                IntentPayload::Inquiry { text } => self.handle_inquiry(text, state).await,
                IntentPayload::Unknown => self.handle_unknown(intent, state).await,
            }
        };

        state.context.last_intent = Some(intent.kind());
        state
            .context
            .add_message(Role::Assistant, response.text.clone(), order_id);

        response
    }

    // ------------------------------------------------------------------
    // ORDER
    // ------------------------------------------------------------------

    fn handle_order(&self, items: &[RequestedLine], state: &mut SessionState) -> DialogueResponse {
        if items.is_empty() {
            return DialogueResponse::new("메뉴 말씀해 주세요")
                .with_order(state.orders.current().cloned())
                .suggest(&["specify_menu"]);
        }

        if !state.orders.has_active_order() {
            state.orders.create_new_order();
        }

        let mut results = Vec::with_capacity(items.len());
        for line in items {
            let mut options = line.options.clone();
            // The reasoner's category token travels as the `type` option
            if let Some(category) = line.category.as_deref() {
                if TYPE_TOKENS.contains(&category) && !options.contains_key("type") {
                    options.insert("type".to_string(), category.to_string());
                }
            }
            results.push(state.orders.add_item(&line.name, line.quantity, options));
        }

        let successes: Vec<&OrderResult> = results.iter().filter(|r| r.is_success()).collect();
        let failures: Vec<&OrderResult> = results.iter().filter(|r| !r.is_success()).collect();
        let order = state.orders.current().cloned();

        if !successes.is_empty() && failures.is_empty() {
            DialogueResponse::new(Self::compose_additions(&successes))
                .with_order(order)
                .suggest(&["continue_ordering", "confirm_order"])
        } else if !successes.is_empty() {
            let text = format!(
                "{}\n\n하지만 {}",
                Self::compose_additions(&successes),
                Self::compose_failures(&failures)
            );
            DialogueResponse::new(text)
                .with_order(order)
                .suggest(&["retry_failed", "continue_ordering"])
        } else {
            DialogueResponse::new(format!("죄송합니다. {}", Self::compose_failures(&failures)))
                .with_order(order)
                .suggest(&["retry", "help"])
        }
    }

    /// Enumerate successful additions with their type option, e.g.
    /// "빅맥 세트 1개이(가) 주문에 추가되었습니다."
    fn compose_additions(successes: &[&OrderResult]) -> String {
        let details: Vec<String> = successes
            .iter()
            .filter_map(|r| r.added_line())
            .map(|line| {
                let type_option = line.type_option().unwrap_or("단품");
                format!("{} {} {}개", line.name, type_option, line.quantity)
            })
            .collect();

        if details.is_empty() {
            format!("{}개 메뉴가 주문에 추가되었습니다.", successes.len())
        } else {
            format!("{}이(가) 주문에 추가되었습니다.", details.join(", "))
        }
    }

    fn compose_failures(failures: &[&OrderResult]) -> String {
        failures
            .iter()
            .map(|r| r.message().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ------------------------------------------------------------------
    // MODIFY
    // ------------------------------------------------------------------

    fn handle_modify(
        &self,
        mods: &[Modification],
        intent: &Intent,
        state: &mut SessionState,
    ) -> DialogueResponse {
        if !state.orders.has_active_order() {
            return DialogueResponse::new("현재 진행 중인 주문이 없습니다. 먼저 주문을 해주세요.")
                .suggest(&["start_order"]);
        }

        if mods.is_empty() {
            return DialogueResponse::new("어떤 것을 변경하시겠어요?")
                .with_order(state.orders.current().cloned())
                .suggest(&["specify_modification"]);
        }

        let mut results = Vec::with_capacity(mods.len());
        for modification in mods {
            // Terse utterances omit the item name; target the first line
            let item_name = if modification.item_name.trim().is_empty() {
                match state
                    .orders
                    .current()
                    .and_then(|o| o.lines.first())
                    .map(|l| l.name.clone())
                {
                    Some(name) => name,
                    None => {
                        results.push(OrderResult::failure(
                            crate::order::OrderErrorKind::NoActiveOrder,
                            "변경할 주문이 없습니다.",
                        ));
                        continue;
                    }
                }
            } else {
                modification.item_name.clone()
            };

            let result = match modification.action {
                ModAction::Add => state.orders.add_item(
                    &item_name,
                    modification.new_quantity.unwrap_or(1),
                    modification.new_options.clone().unwrap_or_default(),
                ),
                ModAction::Remove => state.orders.remove_item(&item_name, modification.new_quantity),
                ModAction::ChangeQuantity => {
                    state
                        .orders
                        .modify_item(&item_name, modification.new_quantity, None)
                }
                ModAction::ChangeOption => {
                    let new_options = modification
                        .new_options
                        .clone()
                        .or_else(|| Self::recover_type_option(&intent.raw_text));
                    state
                        .orders
                        .modify_item(&item_name, modification.new_quantity, new_options)
                }
            };
            results.push(result);
        }

        let failures: Vec<&OrderResult> = results.iter().filter(|r| !r.is_success()).collect();
        let order = state.orders.current().cloned();

        if failures.is_empty() {
            let text = if results.len() == 1 {
                results[0].message().to_string()
            } else {
                "주문이 변경되었습니다.".to_string()
            };
            DialogueResponse::new(text)
                .with_order(order)
                .suggest(&["continue_ordering", "confirm_order"])
        } else {
            DialogueResponse::new(format!(
                "변경 중 오류가 발생했습니다: {}",
                Self::compose_failures(&failures)
            ))
            .with_order(order)
            .suggest(&["retry", "help"])
        }
    }

    /// Recovery when the reasoner omitted `new_options`: re-scan the raw
    /// utterance for a type token. "라지세트" must be probed before "세트".
    fn recover_type_option(raw_text: &str) -> Option<FxHashMap<String, String>> {
        let lowered = raw_text.to_lowercase();
        let token = if lowered.contains("단품") {
            "단품"
        } else if lowered.contains("라지세트") {
            "라지세트"
        } else if lowered.contains("세트") {
            "세트"
        } else {
            return None;
        };
        let mut options = FxHashMap::default();
        options.insert("type".to_string(), token.to_string());
        Some(options)
    }

    // ------------------------------------------------------------------
    // CANCEL
    // ------------------------------------------------------------------

    fn handle_cancel(&self, targets: &[String], state: &mut SessionState) -> DialogueResponse {
        if !state.orders.has_active_order() {
            return DialogueResponse::new("현재 진행 중인 주문이 없습니다.")
                .suggest(&["start_order"]);
        }

        if targets.is_empty() {
            // Whole-order cancellation needs an explicit confirmation first;
            // the order is left untouched.
            return DialogueResponse::new("전체 주문을 취소하시겠습니까?")
                .with_order(state.orders.current().cloned())
                .confirm()
                .suggest(&["confirm_cancel", "continue_ordering"]);
        }

        let results: Vec<OrderResult> = targets
            .iter()
            .map(|name| state.orders.remove_item(name, None))
            .collect();
        let failures: Vec<&OrderResult> = results.iter().filter(|r| !r.is_success()).collect();

        let text = if failures.is_empty() {
            format!("{}개 메뉴가 주문에서 제거되었습니다.", results.len())
        } else {
            format!(
                "취소 중 오류가 발생했습니다: {}",
                Self::compose_failures(&failures)
            )
        };

        DialogueResponse::new(text)
            .with_order(state.orders.current().cloned())
            .suggest(&["continue_ordering", "confirm_order"])
    }

    // ------------------------------------------------------------------
    // PAYMENT
    // ------------------------------------------------------------------

    fn handle_payment(&self, state: &mut SessionState) -> DialogueResponse {
        let Some(order) = state.orders.current() else {
            return DialogueResponse::new("주문할 메뉴가 없어요. 먼저 메뉴를 주문해 주세요.")
                .suggest(&["start_order"]);
        };
        if order.is_empty() {
            return DialogueResponse::new("주문할 메뉴가 없어요. 먼저 메뉴를 주문해 주세요.")
                .with_order(Some(order.clone()))
                .suggest(&["start_order"]);
        }
        let order_id = order.id;

        let validation = state.orders.validate_order();
        if !validation.is_success() {
            return DialogueResponse::new(format!(
                "주문을 확정할 수 없습니다: {}",
                validation.message()
            ))
            .with_order(state.orders.current().cloned())
            .suggest(&["fix_order", "help"]);
        }

        let Some(summary) = state.orders.summary() else {
            return DialogueResponse::new("주문 요약을 생성할 수 없어요")
                .with_order(state.orders.current().cloned())
                .suggest(&["retry", "help"]);
        };
        self.payments
            .set_state(order_id, PaymentState::Processing, summary.total_amount);

        DialogueResponse::new(format!("{}\n결제하시겠어요?", summary.format()))
            .with_order(state.orders.current().cloned())
            .confirm()
            .suggest(&["confirm", "cancel"])
    }

    /// Handle a turn while the order is mid-payment: the confirmation
    /// vocabularies decide, not the intent label.
    fn handle_payment_confirmation(
        &self,
        order_id: Uuid,
        raw_text: &str,
        state: &mut SessionState,
    ) -> DialogueResponse {
        match classify_confirmation(raw_text) {
            Confirmation::Negative => {
                let total = state
                    .orders
                    .current()
                    .map(|o| o.total_amount())
                    .unwrap_or_default();
                self.payments
                    .set_state(order_id, PaymentState::Pending, total);
                DialogueResponse::new("결제가 취소되었습니다.")
                    .with_order(state.orders.current().cloned())
                    .suggest(&["confirm", "cancel"])
            }
            Confirmation::Positive => self.execute_payment(order_id, state),
            Confirmation::Ambiguous => DialogueResponse::new("결제하시겠어요?")
                .with_order(state.orders.current().cloned())
                .confirm()
                .suggest(&["confirm", "cancel"]),
        }
    }

    /// Scripted payment execution: confirm the order, publish the step
    /// progression, and attach a fresh empty order to the session.
    fn execute_payment(&self, order_id: Uuid, state: &mut SessionState) -> DialogueResponse {
        let Some(summary) = state.orders.summary().filter(|s| !s.lines.is_empty()) else {
            self.payments
                .set_state(order_id, PaymentState::Pending, Default::default());
            return DialogueResponse::new("주문 정보가 없어서 결제할 수 없습니다.")
                .suggest(&["start_order"]);
        };

        let total = summary.total_amount;
        let confirmation = state.orders.confirm_order();
        if !confirmation.is_success() {
            self.payments
                .set_state(order_id, PaymentState::Pending, total);
            return DialogueResponse::new(format!(
                "결제 처리 중 오류가 발생했습니다: {}",
                confirmation.message()
            ))
            .with_order(state.orders.current().cloned())
            .suggest(&["retry", "help"]);
        }

        self.payments
            .set_state(order_id, PaymentState::Completed, total);
        state.orders.create_new_order();

        tracing::info!(target: "PAYMENT", "Order {} paid, total {}", order_id, total);

        let mut response = DialogueResponse::new(completion_message(total))
            .with_order(state.orders.current().cloned())
            .suggest(&["start_order"]);
        response.metadata.insert(
            "payment_progress".to_string(),
            json!({
                "steps": PAYMENT_STEPS,
                "step_delays": STEP_DELAYS_MS,
                "total_amount": total,
            }),
        );
        response
    }

    // ------------------------------------------------------------------
    // INQUIRY / UNKNOWN
    // ------------------------------------------------------------------

    async fn handle_inquiry(&self, text: &str, state: &mut SessionState) -> DialogueResponse {
        if ORDER_STATUS_KEYWORDS.iter().any(|k| text.contains(k)) {
            let response_text = match state.orders.summary() {
                Some(summary) => format!("현재 주문 내역입니다:\n\n{}", summary.format()),
                None => "현재 진행 중인 주문이 없습니다.".to_string(),
            };
            return DialogueResponse::new(response_text)
                .with_order(state.orders.current().cloned())
                .suggest(&["continue_ordering", "start_order"]);
        }

        if text.contains("메뉴") {
            let menu_text = {
                let catalog = self.catalog.read().expect("catalog lock poisoned");
                catalog.format_for_customer()
            };
            return DialogueResponse::new(menu_text)
                .with_order(state.orders.current().cloned())
                .suggest(&["continue_ordering", "help"]);
        }

        let reply = self.contextual_reply(text, state).await;
        DialogueResponse::new(reply)
            .with_order(state.orders.current().cloned())
            .suggest(&["continue_ordering", "help"])
    }

    async fn handle_unknown(&self, intent: &Intent, state: &mut SessionState) -> DialogueResponse {
        // Payment override already ran in process(); anything else is
        // treated like a generic inquiry.
        let reply = self.contextual_reply(&intent.raw_text, state).await;
        DialogueResponse::new(reply)
            .with_order(state.orders.current().cloned())
            .suggest(&["continue_ordering", "help"])
    }

    /// Free-form reply via the reasoner: menu context, current order summary,
    /// this order's dialogue history and the user utterance.
    async fn contextual_reply(&self, user_input: &str, state: &SessionState) -> String {
        let menu_info = {
            let catalog = self.catalog.read().expect("catalog lock poisoned");
            catalog.format_for_reasoner()
        };

        let mut messages = vec![ChatMessage::system(format!(
            "당신은 식당 키오스크의 AI 어시스턴트입니다.\n\
             - 음성인식 오류를 고려해 발음이 유사한 단어를 실제 의도로 해석하세요\n\
             - 모든 응답은 간결하고 명확하게 (1-2문장 이내)\n\
             - 불분명한 요청에는 \"잘 못 알아들었어요. 다시 말씀해 주세요\"\n\
             - 메뉴 문의에는 아래 메뉴 정보만 사용하세요\n\n\
             현재 사용 가능한 메뉴:\n{}",
            menu_info
        ))];

        match state.orders.summary() {
            Some(summary) if !summary.lines.is_empty() => {
                messages.push(ChatMessage::system(format!(
                    "현재 주문 상태:\n{}",
                    summary.format()
                )));
            }
            _ => {
                messages.push(ChatMessage::system(
                    "현재 주문 상태: 주문된 메뉴가 없습니다.",
                ));
            }
        }

        // Scope the history to the active order so the reasoner only sees
        // turns that belong to this cart
        let history = match state.orders.current() {
            Some(order) => state.context.by_order(order.id, 10),
            None => state.context.recent(5),
        };
        for turn in history {
            messages.push(ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            });
        }

        messages.push(ChatMessage::user(user_input));

        match self.replies.chat(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(target: "DIALOGUE", "Reply generation failed: {}", e);
                "다시 말씀해 주세요".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::{MenuCatalog, MenuDocument};
    use crate::session::SessionState;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::{Arc, RwLock};

    struct CannedReplies(&'static str);

    #[async_trait]
    impl ReplyGenerator for CannedReplies {
        async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, crate::error::KioskError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingReplies;

    #[async_trait]
    impl ReplyGenerator for FailingReplies {
        async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, crate::error::KioskError> {
            Err(crate::error::KioskError::IntentExtraction("down".into()))
        }
    }

    fn catalog() -> SharedCatalog {
        let doc = MenuDocument::from_json(
            r#"{
                "categories": ["버거", "음료"],
                "menu_items": {
                    "빅맥": {"category": "버거", "price": 6500,
                              "available_options": ["단품", "세트", "라지세트"]},
                    "콜라": {"category": "음료", "price": 2000}
                },
                "set_pricing": {"세트": 2000, "라지세트": 3000}
            }"#,
        )
        .unwrap();
        Arc::new(RwLock::new(MenuCatalog::new(doc).unwrap()))
    }

    fn engine_with(replies: Arc<dyn ReplyGenerator>) -> DialogueEngine {
        DialogueEngine::new(catalog(), replies, Arc::new(PaymentTracker::new()))
    }

    fn engine() -> DialogueEngine {
        engine_with(Arc::new(CannedReplies("알겠습니다")))
    }

    fn state() -> SessionState {
        SessionState::new(uuid::Uuid::new_v4(), catalog(), 20)
    }

    fn order_intent(name: &str, category: &str, qty: u32) -> Intent {
        Intent::new(
            IntentPayload::Order {
                items: vec![RequestedLine {
                    name: name.to_string(),
                    category: Some(category.to_string()),
                    quantity: qty,
                    options: FxHashMap::default(),
                }],
            },
            0.9,
            format!("{} {} {}개", name, category, qty),
        )
    }

    #[tokio::test]
    async fn test_order_intent_adds_line_with_type_option() {
        let engine = engine();
        let mut state = state();

        let response = engine.process(&order_intent("빅맥", "세트", 1), &mut state).await;

        assert!(response.text.contains("빅맥 세트 1개"));
        assert!(response.text.contains("주문에 추가되었습니다"));
        let order = response.order.unwrap();
        assert_eq!(order.lines.len(), 1);
        assert_eq!(order.total_amount(), Decimal::from(8500));
        assert_eq!(order.lines[0].type_option(), Some("세트"));
        assert_eq!(
            response.suggested_actions,
            vec!["continue_ordering", "confirm_order"]
        );
    }

    #[tokio::test]
    async fn test_order_intent_partial_failure() {
        let engine = engine();
        let mut state = state();

        let intent = Intent::new(
            IntentPayload::Order {
                items: vec![
                    RequestedLine {
                        name: "빅맥".to_string(),
                        category: Some("단품".to_string()),
                        quantity: 1,
                        options: FxHashMap::default(),
                    },
                    RequestedLine {
                        name: "없는버거".to_string(),
                        category: None,
                        quantity: 1,
                        options: FxHashMap::default(),
                    },
                ],
            },
            0.9,
            "빅맥이랑 없는버거",
        );
        let response = engine.process(&intent, &mut state).await;
        assert!(response.text.contains("하지만"));
        assert_eq!(response.order.unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn test_modify_first_line_fallback() {
        let engine = engine();
        let mut state = state();
        engine.process(&order_intent("빅맥", "세트", 1), &mut state).await;

        let mut new_options = FxHashMap::default();
        new_options.insert("type".to_string(), "단품".to_string());
        let intent = Intent::new(
            IntentPayload::Modify {
                mods: vec![Modification {
                    item_name: String::new(),
                    action: ModAction::ChangeOption,
                    new_quantity: None,
                    new_options: Some(new_options),
                }],
            },
            0.9,
            "단품으로 바꿔줘",
        );
        let response = engine.process(&intent, &mut state).await;

        let order = response.order.unwrap();
        assert_eq!(order.lines[0].type_option(), Some("단품"));
        assert_eq!(order.total_amount(), Decimal::from(6500));
        assert!(response.text.contains("변경되었습니다"));
    }

    #[tokio::test]
    async fn test_modify_change_option_recovers_from_raw_text() {
        let engine = engine();
        let mut state = state();
        engine.process(&order_intent("빅맥", "단품", 1), &mut state).await;

        let intent = Intent::new(
            IntentPayload::Modify {
                mods: vec![Modification {
                    item_name: String::new(),
                    action: ModAction::ChangeOption,
                    new_quantity: None,
                    new_options: None,
                }],
            },
            0.9,
            "라지세트로 변경해주세요",
        );
        let response = engine.process(&intent, &mut state).await;
        let order = response.order.unwrap();
        assert_eq!(order.lines[0].type_option(), Some("라지세트"));
        assert_eq!(order.total_amount(), Decimal::from(9500));
    }

    #[tokio::test]
    async fn test_modify_on_empty_order_reports_no_active_order() {
        let engine = engine();
        let mut state = state();
        // An order exists but has no lines (e.g. right after payment)
        state.orders.create_new_order();

        let intent = Intent::new(
            IntentPayload::Modify {
                mods: vec![Modification {
                    item_name: String::new(),
                    action: ModAction::ChangeOption,
                    new_quantity: None,
                    new_options: None,
                }],
            },
            0.9,
            "단품으로",
        );
        let response = engine.process(&intent, &mut state).await;
        assert!(response.text.contains("변경할 주문이 없습니다"));
        assert!(response.order.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_modify_without_order_refuses() {
        let engine = engine();
        let mut state = state();
        let intent = Intent::new(IntentPayload::Modify { mods: vec![] }, 0.9, "바꿔줘");
        let response = engine.process(&intent, &mut state).await;
        assert!(response.text.contains("먼저 주문을 해주세요"));
        assert_eq!(response.suggested_actions, vec!["start_order"]);
    }

    #[tokio::test]
    async fn test_cancel_all_requires_confirmation_without_mutation() {
        let engine = engine();
        let mut state = state();
        engine.process(&order_intent("빅맥", "세트", 1), &mut state).await;

        let intent = Intent::new(IntentPayload::Cancel { targets: vec![] }, 0.9, "주문 취소");
        let response = engine.process(&intent, &mut state).await;

        assert!(response.requires_confirmation);
        assert_eq!(response.text, "전체 주문을 취소하시겠습니까?");
        assert_eq!(response.order.unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_specific_targets() {
        let engine = engine();
        let mut state = state();
        engine.process(&order_intent("빅맥", "세트", 1), &mut state).await;
        engine.process(&order_intent("콜라", "단품", 1), &mut state).await;

        let intent = Intent::new(
            IntentPayload::Cancel {
                targets: vec!["콜라".to_string()],
            },
            0.9,
            "콜라 빼주세요",
        );
        let response = engine.process(&intent, &mut state).await;
        assert!(response.text.contains("1개 메뉴가 주문에서 제거되었습니다"));
        assert_eq!(response.order.unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn test_payment_intent_moves_to_processing() {
        let engine = engine();
        let mut state = state();
        engine.process(&order_intent("빅맥", "세트", 1), &mut state).await;
        let order_id = state.orders.current().unwrap().id;

        let intent = Intent::new(IntentPayload::Payment { method: None }, 0.9, "결제할게요");
        let response = engine.process(&intent, &mut state).await;

        assert!(response.requires_confirmation);
        assert!(response.text.contains("- 빅맥 세트 1개 - 8,500원"));
        assert!(response.text.ends_with("결제하시겠어요?"));
        assert!(engine.payments().is_processing(order_id));
    }

    #[tokio::test]
    async fn test_payment_with_empty_order_refuses() {
        let engine = engine();
        let mut state = state();
        let intent = Intent::new(IntentPayload::Payment { method: None }, 0.9, "결제");
        let response = engine.process(&intent, &mut state).await;
        assert!(response.text.contains("주문할 메뉴가 없어요"));
    }

    #[tokio::test]
    async fn test_affirmative_during_processing_completes_payment() {
        let engine = engine();
        let mut state = state();
        engine.process(&order_intent("빅맥", "세트", 1), &mut state).await;
        let order_id = state.orders.current().unwrap().id;
        engine
            .process(
                &Intent::new(IntentPayload::Payment { method: None }, 0.9, "결제"),
                &mut state,
            )
            .await;

        // "네" arrives mislabelled as UNKNOWN; the override must still run
        let response = engine
            .process(&Intent::unknown("네"), &mut state)
            .await;

        for step in PAYMENT_STEPS {
            assert!(response.text.contains(step), "missing step {}", step);
        }
        assert!(response.text.contains("총 8,500원이 결제되었습니다."));
        assert_eq!(
            engine.payments().state_of(order_id),
            Some(PaymentState::Completed)
        );
        // A fresh empty order is attached to the session
        let new_order = state.orders.current().unwrap();
        assert_ne!(new_order.id, order_id);
        assert!(new_order.is_empty());
        assert!(response.metadata.contains_key("payment_progress"));
    }

    #[tokio::test]
    async fn test_negative_during_processing_clears_to_pending() {
        let engine = engine();
        let mut state = state();
        engine.process(&order_intent("빅맥", "세트", 1), &mut state).await;
        let order_id = state.orders.current().unwrap().id;
        engine
            .process(
                &Intent::new(IntentPayload::Payment { method: None }, 0.9, "결제"),
                &mut state,
            )
            .await;

        let response = engine.process(&Intent::unknown("아니요"), &mut state).await;

        assert_eq!(response.text, "결제가 취소되었습니다.");
        assert_eq!(
            engine.payments().state_of(order_id),
            Some(PaymentState::Pending)
        );
        // Lines untouched
        assert_eq!(state.orders.current().unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_during_processing_reprompts() {
        let engine = engine();
        let mut state = state();
        engine.process(&order_intent("빅맥", "세트", 1), &mut state).await;
        engine
            .process(
                &Intent::new(IntentPayload::Payment { method: None }, 0.9, "결제"),
                &mut state,
            )
            .await;

        let response = engine
            .process(&Intent::unknown("글쎄요 어떡하지"), &mut state)
            .await;
        assert_eq!(response.text, "결제하시겠어요?");
        assert!(response.requires_confirmation);
    }

    #[tokio::test]
    async fn test_inquiry_order_status_keyword() {
        let engine = engine();
        let mut state = state();
        engine.process(&order_intent("빅맥", "세트", 1), &mut state).await;

        let intent = Intent::new(
            IntentPayload::Inquiry {
                text: "주문 내역 알려줘".to_string(),
            },
            0.9,
            "주문 내역 알려줘",
        );
        let response = engine.process(&intent, &mut state).await;
        assert!(response.text.starts_with("현재 주문 내역입니다:"));
        assert!(response.text.contains("빅맥 세트 1개"));
    }

    #[tokio::test]
    async fn test_inquiry_menu_keyword() {
        let engine = engine();
        let mut state = state();
        let intent = Intent::new(
            IntentPayload::Inquiry {
                text: "메뉴 뭐 있어요?".to_string(),
            },
            0.9,
            "메뉴 뭐 있어요?",
        );
        let response = engine.process(&intent, &mut state).await;
        assert!(response.text.contains("**버거**"));
        assert!(response.text.contains("빅맥 (6,500원)"));
    }

    #[tokio::test]
    async fn test_free_form_inquiry_delegates_to_reasoner() {
        let engine = engine_with(Arc::new(CannedReplies("영업시간은 24시간입니다")));
        let mut state = state();
        let intent = Intent::new(
            IntentPayload::Inquiry {
                text: "영업시간이 어떻게 되나요".to_string(),
            },
            0.9,
            "영업시간이 어떻게 되나요",
        );
        let response = engine.process(&intent, &mut state).await;
        assert_eq!(response.text, "영업시간은 24시간입니다");
    }

    #[tokio::test]
    async fn test_reasoner_failure_degrades_to_reprompt() {
        let engine = engine_with(Arc::new(FailingReplies));
        let mut state = state();
        let response = engine
            .process(&Intent::unknown("웅얼웅얼"), &mut state)
            .await;
        assert_eq!(response.text, "다시 말씀해 주세요");
    }

    #[tokio::test]
    async fn test_turns_are_mirrored_into_context() {
        let engine = engine();
        let mut state = state();
        engine.process(&order_intent("빅맥", "세트", 1), &mut state).await;

        // user turn + assistant turn
        assert_eq!(state.context.len(), 2);
        let order_id = state.orders.current().unwrap().id;
        // The user turn precedes order creation, the assistant turn is tagged
        let tagged = state.context.by_order(order_id, 10);
        assert!(tagged.len() <= 2);
    }
}
