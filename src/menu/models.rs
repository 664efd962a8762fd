//! Menu configuration document shapes
//!
//! The catalog is loaded from a JSON document that defines the restaurant
//! info, the ordered category list, the item map and the surcharge tables.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Restaurant metadata block of the menu document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestaurantInfo {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default = "default_restaurant_type")]
    pub kind: String,
}

fn default_restaurant_type() -> String {
    "general".to_string()
}

/// One menu item as declared in the configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Catalog key; unique, injected from the map key at load time
    #[serde(default)]
    pub name: String,
    pub category: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub available_options: Vec<String>,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

impl MenuItem {
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Whether `value` is one of this item's permitted option values
    pub fn permits_option(&self, value: &str) -> bool {
        self.available_options.iter().any(|o| o == value)
    }
}

/// Complete menu configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MenuDocument {
    #[serde(default)]
    pub restaurant_info: RestaurantInfo,
    pub categories: Vec<String>,
    pub menu_items: FxHashMap<String, MenuItem>,
    /// Surcharge per line `type` option, e.g. {"세트": 1500, "라지세트": 2500}
    #[serde(default)]
    pub set_pricing: FxHashMap<String, Decimal>,
    /// Surcharge per non-type option value
    #[serde(default)]
    pub option_pricing: FxHashMap<String, Decimal>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub service_charge: Decimal,
}

fn default_currency() -> String {
    "KRW".to_string()
}

fn default_tax_rate() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

impl MenuDocument {
    /// Parse a document from JSON, injecting map keys into item names
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut doc: MenuDocument = serde_json::from_str(json)?;
        for (name, item) in doc.menu_items.iter_mut() {
            item.name = name.clone();
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_name_injected_from_map_key() {
        let doc = MenuDocument::from_json(
            r#"{
                "categories": ["버거"],
                "menu_items": {
                    "빅맥": {"category": "버거", "price": 6500}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(doc.menu_items["빅맥"].name, "빅맥");
        assert!(doc.menu_items["빅맥"].available);
    }

    #[test]
    fn test_defaults() {
        let doc = MenuDocument::from_json(
            r#"{"categories": [], "menu_items": {}}"#,
        )
        .unwrap();
        assert_eq!(doc.currency, "KRW");
        assert_eq!(doc.tax_rate, Decimal::new(1, 1));
        assert_eq!(doc.restaurant_info.kind, "general");
    }

    #[test]
    fn test_permits_option() {
        let item = MenuItem {
            name: "불고기버거".to_string(),
            category: "버거".to_string(),
            price: Decimal::from(4500),
            description: String::new(),
            available_options: vec!["단품".to_string(), "세트".to_string()],
            available: true,
        };
        assert!(item.permits_option("세트"));
        assert!(!item.permits_option("라지세트"));
    }
}
