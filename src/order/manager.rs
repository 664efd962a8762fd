//! Per-session order operations
//!
//! The manager owns at most one active order and mutates it against the
//! shared catalog (validation + price snapshots). It is not thread-safe by
//! itself; the session layer serializes all access to it.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use super::models::{Order, OrderErrorKind, OrderLine, OrderResult, OrderStatus, OrderSummary};
use crate::error::MenuError;
use crate::menu::SharedCatalog;

pub struct OrderManager {
    catalog: SharedCatalog,
    current: Option<Order>,
}

impl OrderManager {
    pub fn new(catalog: SharedCatalog) -> Self {
        Self {
            catalog,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Order> {
        self.current.as_ref()
    }

    pub fn has_active_order(&self) -> bool {
        self.current.is_some()
    }

    /// Replace the active order with a fresh empty one and return its id
    pub fn create_new_order(&mut self) -> uuid::Uuid {
        let order = Order::new();
        let id = order.id;
        self.current = Some(order);
        tracing::debug!(target: "ORDER", "New order {} created", id);
        id
    }

    pub fn summary(&self) -> Option<OrderSummary> {
        self.current.as_ref().map(|o| o.summary())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Add an item, merging into an existing line iff (name, options) match.
    pub fn add_item(
        &mut self,
        name: &str,
        quantity: u32,
        options: FxHashMap<String, String>,
    ) -> OrderResult {
        let (canonical_name, category, unit_price) = {
            let catalog = self.catalog.read().expect("catalog lock poisoned");
            match catalog.validate_request(name, &options, quantity) {
                Ok(item) => (
                    item.name.clone(),
                    item.category.clone(),
                    Self::priced(&catalog, item.price, &options),
                ),
                Err(e) => return Self::menu_failure(e),
            }
        };

        let order = self.current.get_or_insert_with(Order::new);

        let candidate = OrderLine::new(canonical_name, category, quantity, unit_price, options);
        // The reported line reflects what this operation added, not the
        // post-merge quantity
        let added = if let Some(existing) = order.lines.iter_mut().find(|l| l.merges_with(&candidate))
        {
            existing.quantity += quantity;
            let mut reported = existing.clone();
            reported.quantity = quantity;
            reported
        } else {
            order.lines.push(candidate.clone());
            candidate
        };
        order.touch();

        let message = format!("{} {}개가 추가되었습니다.", added.name, quantity);
        OrderResult::success_with_line(message, added)
    }

    /// Remove an item: no quantity deletes the line, a partial quantity
    /// decrements, a quantity >= the line quantity deletes.
    pub fn remove_item(&mut self, name: &str, quantity: Option<u32>) -> OrderResult {
        let Some(order) = self.current.as_mut() else {
            return Self::no_active_order();
        };

        let Some(index) = order.lines.iter().position(|l| l.name == name) else {
            return OrderResult::failure(
                OrderErrorKind::ItemNotInOrder,
                format!("주문에 없는 메뉴입니다: {}", name),
            );
        };

        let message = match quantity {
            Some(q) if q < order.lines[index].quantity => {
                order.lines[index].quantity -= q;
                format!("{} {}개가 제거되었습니다.", name, q)
            }
            _ => {
                order.lines.remove(index);
                format!("{}이(가) 주문에서 제거되었습니다.", name)
            }
        };
        order.touch();
        OrderResult::success(message)
    }

    /// Change quantity and/or options of a line. A new quantity of zero
    /// removes the line; a new `type` option re-prices it from the catalog.
    pub fn modify_item(
        &mut self,
        name: &str,
        new_quantity: Option<u32>,
        new_options: Option<FxHashMap<String, String>>,
    ) -> OrderResult {
        if self.current.is_none() {
            return Self::no_active_order();
        }

        if new_quantity == Some(0) {
            return self.remove_item(name, None);
        }

        // Validate and price against the catalog before touching the line
        let repriced = if let Some(options) = &new_options {
            let catalog = self.catalog.read().expect("catalog lock poisoned");
            match catalog.validate_request(name, options, new_quantity.unwrap_or(1)) {
                Ok(item) => Some(Self::priced(&catalog, item.price, options)),
                Err(e) => return Self::menu_failure(e),
            }
        } else {
            None
        };

        let Some(order) = self.current.as_mut() else {
            return Self::no_active_order();
        };
        let Some(line) = order.lines.iter_mut().find(|l| l.name == name) else {
            return OrderResult::failure(
                OrderErrorKind::ItemNotInOrder,
                format!("주문에 없는 메뉴입니다: {}", name),
            );
        };

        if let Some(q) = new_quantity {
            line.quantity = q;
        }
        if let Some(options) = new_options {
            line.options = options;
            if let Some(price) = repriced {
                line.unit_price = price;
            }
        }
        let changed = line.clone();
        order.touch();

        OrderResult::success_with_line(format!("{}이(가) 변경되었습니다.", name), changed)
    }

    /// Drop every line and reset the order to a fresh pending state
    pub fn clear_order(&mut self) -> OrderResult {
        let Some(order) = self.current.as_mut() else {
            return Self::no_active_order();
        };
        order.lines.clear();
        order.status = OrderStatus::Pending;
        order.touch();
        OrderResult::success("주문이 취소되었습니다.")
    }

    /// Validate the order for checkout: non-empty, every line still orderable
    pub fn validate_order(&self) -> OrderResult {
        let Some(order) = self.current.as_ref() else {
            return Self::no_active_order();
        };
        if order.is_empty() {
            return OrderResult::failure(OrderErrorKind::EmptyOrder, "주문한 메뉴가 없습니다.");
        }

        let catalog = self.catalog.read().expect("catalog lock poisoned");
        for line in &order.lines {
            if let Err(e) = catalog.validate_request(&line.name, &line.options, line.quantity) {
                return Self::menu_failure(e);
            }
        }
        OrderResult::success("주문이 유효합니다.")
    }

    /// PENDING -> CONFIRMED transition with a final snapshot message
    pub fn confirm_order(&mut self) -> OrderResult {
        let Some(order) = self.current.as_mut() else {
            return Self::no_active_order();
        };
        if order.is_empty() {
            return OrderResult::failure(OrderErrorKind::EmptyOrder, "주문한 메뉴가 없습니다.");
        }
        if !order.status.can_transition_to(OrderStatus::Confirmed) {
            return OrderResult::failure(
                OrderErrorKind::InvalidOrderState,
                format!("확정할 수 없는 주문 상태입니다: {}", order.status),
            );
        }
        order.status = OrderStatus::Confirmed;
        order.touch();
        OrderResult::success("주문이 확정되었습니다.")
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Unit price snapshot: catalog price + type surcharge + option surcharges
    fn priced(
        catalog: &crate::menu::MenuCatalog,
        base: Decimal,
        options: &FxHashMap<String, String>,
    ) -> Decimal {
        let mut price = base;
        for (key, value) in options {
            if key == "type" {
                price += catalog.set_surcharge(value);
            } else {
                price += catalog.option_surcharge(value);
            }
        }
        price
    }

    fn no_active_order() -> OrderResult {
        OrderResult::failure(OrderErrorKind::NoActiveOrder, "진행 중인 주문이 없습니다.")
    }

    fn menu_failure(e: MenuError) -> OrderResult {
        let code = match &e {
            MenuError::ItemNotFound { .. } => OrderErrorKind::ItemNotFound,
            MenuError::ItemUnavailable { .. } => OrderErrorKind::ItemUnavailable,
            MenuError::InvalidQuantity { .. } => OrderErrorKind::InvalidQuantity,
            MenuError::InvalidOption { .. } => OrderErrorKind::InvalidOption,
            _ => OrderErrorKind::ItemNotFound,
        };
        let message = match &e {
            MenuError::ItemNotFound { name } => format!("메뉴에 없는 항목입니다: {}", name),
            MenuError::ItemUnavailable { name } => format!("현재 판매하지 않는 메뉴입니다: {}", name),
            MenuError::InvalidQuantity { .. } => "수량은 1개 이상이어야 합니다.".to_string(),
            MenuError::InvalidOption { key, value } => {
                format!("유효하지 않은 옵션입니다: {}={}", key, value)
            }
            other => other.to_string(),
        };
        OrderResult::failure(code, message)
    }
}
