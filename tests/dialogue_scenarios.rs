//! End-to-end dialogue scenarios: one session ordering, modifying,
//! cancelling and paying through the policy engine.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use uuid::Uuid;

use voice_kiosk::dialogue::{
    DialogueEngine, Intent, IntentPayload, ModAction, Modification, PAYMENT_STEPS, PaymentState,
    PaymentTracker, RequestedLine,
};
use voice_kiosk::error::KioskError;
use voice_kiosk::llm::{ChatMessage, ReplyGenerator};
use voice_kiosk::menu::{MenuCatalog, MenuDocument, SharedCatalog};
use voice_kiosk::session::SessionState;

struct CannedReplies;

#[async_trait]
impl ReplyGenerator for CannedReplies {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, KioskError> {
        Ok("알겠습니다".to_string())
    }
}

fn catalog() -> SharedCatalog {
    let doc = MenuDocument::from_json(
        r#"{
            "restaurant_info": {"name": "테스트 버거", "type": "fast_food"},
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

fn setup() -> (DialogueEngine, SessionState) {
    let catalog = catalog();
    let engine = DialogueEngine::new(
        catalog.clone(),
        Arc::new(CannedReplies),
        Arc::new(PaymentTracker::new()),
    );
    let state = SessionState::new(Uuid::new_v4(), catalog, 20);
    (engine, state)
}

fn order_bigmac_set() -> Intent {
    Intent::new(
        IntentPayload::Order {
            items: vec![RequestedLine {
                name: "빅맥".to_string(),
                category: Some("세트".to_string()),
                quantity: 1,
                options: FxHashMap::default(),
            }],
        },
        0.92,
        "빅맥 세트 하나 주세요",
    )
}

#[tokio::test]
async fn scenario_fresh_order_then_full_payment_flow() {
    let (engine, mut state) = setup();

    // 1. ORDER: one 빅맥 세트 on a fresh session
    let response = engine.process(&order_bigmac_set(), &mut state).await;
    assert!(response.text.contains("빅맥 세트 1개"));
    let order = response.order.as_ref().unwrap();
    assert_eq!(order.lines.len(), 1);
    // 6,500 base + 2,000 set surcharge
    assert_eq!(order.total_amount(), Decimal::from(8500));

    // 2. MODIFY with empty item name targets the first line
    let modify = Intent::new(
        IntentPayload::Modify {
            mods: vec![Modification {
                item_name: String::new(),
                action: ModAction::ChangeOption,
                new_quantity: None,
                new_options: None,
            }],
        },
        0.9,
        "단품으로 바꿔주세요",
    );
    let response = engine.process(&modify, &mut state).await;
    let order = response.order.as_ref().unwrap();
    assert_eq!(order.lines[0].type_option(), Some("단품"));
    assert_eq!(order.total_amount(), Decimal::from(6500));
    assert!(response.text.contains("변경되었습니다"));

    // 3. CANCEL with no targets only asks for confirmation
    let cancel = Intent::new(IntentPayload::Cancel { targets: vec![] }, 0.9, "전부 취소");
    let response = engine.process(&cancel, &mut state).await;
    assert!(response.requires_confirmation);
    assert_eq!(response.text, "전체 주문을 취소하시겠습니까?");
    assert_eq!(response.order.as_ref().unwrap().lines.len(), 1);

    // 4. PAYMENT moves the sub-state to processing
    let order_id = state.orders.current().unwrap().id;
    let payment = Intent::new(IntentPayload::Payment { method: None }, 0.9, "결제할게요");
    let response = engine.process(&payment, &mut state).await;
    assert!(response.requires_confirmation);
    assert!(response.text.contains("- 빅맥 단품 1개 - 6,500원"));
    assert!(response.text.ends_with("결제하시겠어요?"));
    assert_eq!(
        engine.payments().state_of(order_id),
        Some(PaymentState::Processing)
    );

    // 5. "네" arrives as UNKNOWN; the payment override still executes
    let response = engine.process(&Intent::unknown("네"), &mut state).await;
    for step in PAYMENT_STEPS {
        assert!(response.text.contains(step), "missing step: {}", step);
    }
    assert!(response.text.contains("총 6,500원이 결제되었습니다."));
    assert_eq!(
        engine.payments().state_of(order_id),
        Some(PaymentState::Completed)
    );
    let new_order = state.orders.current().unwrap();
    assert!(new_order.is_empty());
    assert_ne!(new_order.id, order_id);
}

#[tokio::test]
async fn scenario_negative_confirmation_keeps_cart() {
    let (engine, mut state) = setup();
    engine.process(&order_bigmac_set(), &mut state).await;
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
    assert_eq!(state.orders.current().unwrap().lines.len(), 1);
    // The same order can go to payment again
    let response = engine
        .process(
            &Intent::new(IntentPayload::Payment { method: None }, 0.9, "결제"),
            &mut state,
        )
        .await;
    assert!(response.requires_confirmation);
}

#[tokio::test]
async fn scenario_merge_and_split_lines() {
    let (engine, mut state) = setup();

    engine.process(&order_bigmac_set(), &mut state).await;
    engine.process(&order_bigmac_set(), &mut state).await;
    // Same name and options merge into one line
    assert_eq!(state.orders.current().unwrap().lines.len(), 1);
    assert_eq!(state.orders.current().unwrap().lines[0].quantity, 2);

    // A different type option opens a second line
    let single = Intent::new(
        IntentPayload::Order {
            items: vec![RequestedLine {
                name: "빅맥".to_string(),
                category: Some("단품".to_string()),
                quantity: 1,
                options: FxHashMap::default(),
            }],
        },
        0.9,
        "빅맥 단품도 하나",
    );
    engine.process(&single, &mut state).await;
    let order = state.orders.current().unwrap();
    assert_eq!(order.lines.len(), 2);
    // Totals stay the sum of line totals
    let expected: Decimal = order.lines.iter().map(|l| l.total()).sum();
    assert_eq!(order.total_amount(), expected);
}

#[tokio::test]
async fn scenario_order_status_inquiry_formats_summary() {
    let (engine, mut state) = setup();
    engine.process(&order_bigmac_set(), &mut state).await;

    let inquiry = Intent::new(
        IntentPayload::Inquiry {
            text: "지금 주문 상태 확인해줘".to_string(),
        },
        0.9,
        "지금 주문 상태 확인해줘",
    );
    let response = engine.process(&inquiry, &mut state).await;
    assert!(response.text.contains("- 빅맥 세트 1개 - 8,500원"));
    assert!(response.text.contains("총 금액: 8,500원"));
}
