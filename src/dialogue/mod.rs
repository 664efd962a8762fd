//! Dialogue policy: intent model, conversation context, payment sub-state
//! machine and the state-dispatched policy engine

pub mod context;
pub mod intent;
pub mod payment;
pub mod policy;

pub use context::{ChatTurn, ConversationContext, Role};
pub use intent::{Intent, IntentKind, IntentPayload, ModAction, Modification, RequestedLine};
pub use payment::{
    Confirmation, PAYMENT_STEPS, PaymentState, PaymentTracker, STEP_DELAYS_MS,
    classify_confirmation,
};
pub use policy::{DialogueEngine, DialogueResponse};
