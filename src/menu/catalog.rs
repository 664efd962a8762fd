//! In-memory menu catalog with keyword + substring search
//!
//! The catalog is immutable after load except for item availability. Search
//! runs over three layers, in priority order:
//!
//! 1. exact name lookup (case-insensitive)
//! 2. keyword index (alphanumeric/CJK words of length >= 2, plus every
//!    adjacent 2-gram within longer words, fed from name and description)
//! 3. substring scan over item names
//!
//! Results are de-duplicated and ordered by (category, name); `limit` applies
//! after ordering. Availability changes rebuild the indexes so unavailable
//! items never surface from a stale index.

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

use super::models::{MenuDocument, MenuItem};
use crate::error::MenuError;

/// Catalog shared between the gateway, the dialogue policy and the watcher.
/// Readers take the lock briefly; the hot-reload path swaps the whole value.
pub type SharedCatalog = Arc<RwLock<MenuCatalog>>;

/// Search outcome: matching items plus the pre-limit total
#[derive(Debug, Clone)]
pub struct MenuSearchResult {
    pub items: Vec<MenuItem>,
    pub total_count: usize,
    pub query: String,
    pub category_filter: Option<String>,
}

/// Per-category availability counters for the stats endpoints
#[derive(Debug, Clone, serde::Serialize)]
pub struct CategoryStats {
    pub total: usize,
    pub available: usize,
    pub unavailable: usize,
}

pub struct MenuCatalog {
    doc: MenuDocument,
    /// lowercase name -> canonical name
    name_index: FxHashMap<String, String>,
    /// keyword -> canonical names
    keyword_index: FxHashMap<String, Vec<String>>,
}

impl MenuCatalog {
    pub fn new(doc: MenuDocument) -> Result<Self, MenuError> {
        let mut catalog = Self {
            doc,
            name_index: FxHashMap::default(),
            keyword_index: FxHashMap::default(),
        };
        catalog.validate_document()?;
        catalog.rebuild_indexes();
        Ok(catalog)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, MenuError> {
        let json = std::fs::read_to_string(path).map_err(|e| MenuError::Source {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let doc = MenuDocument::from_json(&json).map_err(|e| MenuError::Source {
            path: path.display().to_string(),
            reason: format!("JSON parse error: {}", e),
        })?;
        Self::new(doc)
    }

    fn validate_document(&self) -> Result<(), MenuError> {
        if self.doc.menu_items.is_empty() {
            return Err(MenuError::EmptyCatalog);
        }
        if self.doc.categories.is_empty() {
            return Err(MenuError::NoCategories);
        }
        for (name, item) in &self.doc.menu_items {
            if !self.doc.categories.contains(&item.category) {
                return Err(MenuError::UndeclaredCategory {
                    item: name.clone(),
                    category: item.category.clone(),
                });
            }
        }
        Ok(())
    }

    fn rebuild_indexes(&mut self) {
        self.name_index.clear();
        self.keyword_index.clear();

        for (name, item) in &self.doc.menu_items {
            self.name_index.insert(name.to_lowercase(), name.clone());

            let text = format!("{} {}", name, item.description);
            for keyword in extract_keywords(&text) {
                self.keyword_index
                    .entry(keyword)
                    .or_default()
                    .push(name.clone());
            }
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn get(&self, name: &str) -> Option<&MenuItem> {
        let canonical = self.name_index.get(&name.to_lowercase())?;
        self.doc.menu_items.get(canonical)
    }

    pub fn items_by_category(&self, category: &str, available_only: bool) -> Vec<MenuItem> {
        let mut items: Vec<MenuItem> = self
            .doc
            .menu_items
            .values()
            .filter(|i| i.category == category)
            .filter(|i| !available_only || i.available)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items
    }

    pub fn all_items(&self, available_only: bool) -> Vec<MenuItem> {
        let mut items: Vec<MenuItem> = self
            .doc
            .menu_items
            .values()
            .filter(|i| !available_only || i.available)
            .cloned()
            .collect();
        items.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        items
    }

    pub fn categories(&self) -> &[String] {
        &self.doc.categories
    }

    pub fn document(&self) -> &MenuDocument {
        &self.doc
    }

    /// Surcharge for a line `type` option value ("세트", "라지세트", ...)
    pub fn set_surcharge(&self, type_option: &str) -> Decimal {
        self.doc
            .set_pricing
            .get(type_option)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Surcharge for a non-type option value
    pub fn option_surcharge(&self, option_value: &str) -> Decimal {
        self.doc
            .option_pricing
            .get(option_value)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    pub fn search(
        &self,
        query: &str,
        category: Option<&str>,
        available_only: bool,
        limit: usize,
    ) -> MenuSearchResult {
        let query = query.to_lowercase().trim().to_string();
        let mut found: BTreeSet<String> = BTreeSet::new();

        let accepts = |item: &MenuItem| {
            (!available_only || item.available)
                && category.is_none_or(|c| item.category == c)
        };

        // 1. Exact name match takes priority
        if let Some(canonical) = self.name_index.get(&query) {
            if let Some(item) = self.doc.menu_items.get(canonical) {
                if accepts(item) {
                    found.insert(canonical.clone());
                }
            }
        }

        // 2. Keyword index
        for keyword in extract_keywords(&query) {
            if let Some(names) = self.keyword_index.get(&keyword) {
                for name in names {
                    if let Some(item) = self.doc.menu_items.get(name) {
                        if accepts(item) {
                            found.insert(name.clone());
                        }
                    }
                }
            }
        }

        // 3. Substring scan over names
        for (lower, canonical) in &self.name_index {
            if lower.contains(&query) {
                if let Some(item) = self.doc.menu_items.get(canonical) {
                    if accepts(item) {
                        found.insert(canonical.clone());
                    }
                }
            }
        }

        let mut items: Vec<MenuItem> = found
            .into_iter()
            .filter_map(|name| self.doc.menu_items.get(&name).cloned())
            .collect();
        items.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));

        let total_count = items.len();
        items.truncate(limit);

        MenuSearchResult {
            items,
            total_count,
            query,
            category_filter: category.map(|c| c.to_string()),
        }
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Check a requested (name, options, quantity) triple against the catalog.
    pub fn validate_request(
        &self,
        name: &str,
        options: &FxHashMap<String, String>,
        quantity: u32,
    ) -> Result<&MenuItem, MenuError> {
        let item = self.get(name).ok_or_else(|| MenuError::ItemNotFound {
            name: name.to_string(),
        })?;
        if !item.available {
            return Err(MenuError::ItemUnavailable {
                name: item.name.clone(),
            });
        }
        if quantity < 1 {
            return Err(MenuError::InvalidQuantity { quantity });
        }
        for (key, value) in options {
            if !item.permits_option(value) {
                return Err(MenuError::InvalidOption {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(item)
    }

    // ------------------------------------------------------------------
    // Availability
    // ------------------------------------------------------------------

    pub fn set_availability(&mut self, name: &str, available: bool) -> Result<(), MenuError> {
        let canonical = self
            .name_index
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| MenuError::ItemNotFound {
                name: name.to_string(),
            })?;
        if let Some(item) = self.doc.menu_items.get_mut(&canonical) {
            item.available = available;
        }
        self.rebuild_indexes();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stats / formatting
    // ------------------------------------------------------------------

    pub fn stats(&self) -> FxHashMap<String, CategoryStats> {
        let mut stats = FxHashMap::default();
        for category in &self.doc.categories {
            let items = self.items_by_category(category, false);
            let available = items.iter().filter(|i| i.available).count();
            stats.insert(
                category.clone(),
                CategoryStats {
                    total: items.len(),
                    available,
                    unavailable: items.len() - available,
                },
            );
        }
        stats
    }

    /// Category-grouped listing shown to the customer when they ask for the menu
    pub fn format_for_customer(&self) -> String {
        let mut lines = Vec::new();
        for category in &self.doc.categories {
            let items = self.items_by_category(category, true);
            if items.is_empty() {
                continue;
            }
            lines.push(format!("**{}**", category));
            for item in items {
                lines.push(format!(
                    "- {} ({}원)",
                    item.name,
                    crate::money::format_won(item.price)
                ));
            }
            lines.push(String::new());
        }
        lines.join("\n").trim().to_string()
    }

    /// Verbose listing handed to the reasoner as prompt context
    pub fn format_for_reasoner(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("식당명: {}", self.doc.restaurant_info.name));
        lines.push(format!("식당 유형: {}", self.doc.restaurant_info.kind));
        lines.push(String::new());
        lines.push("=== 메뉴 목록 ===".to_string());

        for category in &self.doc.categories {
            let items = self.items_by_category(category, true);
            if items.is_empty() {
                continue;
            }
            lines.push(format!("\n[{}]", category));
            for item in items {
                let mut info = format!("{}: {}원", item.name, crate::money::format_won(item.price));
                if !item.description.is_empty() {
                    info.push_str(&format!(" - {}", item.description));
                }
                if !item.available_options.is_empty() {
                    info.push_str(&format!(" (옵션: {})", item.available_options.join(", ")));
                }
                lines.push(format!("- {}", info));
            }
        }

        if !self.doc.set_pricing.is_empty() {
            lines.push("\n=== 세트 추가 요금 ===".to_string());
            let mut entries: Vec<_> = self.doc.set_pricing.iter().collect();
            entries.sort_by_key(|(k, _)| k.clone());
            for (set_type, price) in entries {
                lines.push(format!(
                    "- {}: +{}원",
                    set_type,
                    crate::money::format_won(*price)
                ));
            }
        }

        if !self.doc.option_pricing.is_empty() {
            lines.push("\n=== 옵션 추가 요금 ===".to_string());
            let mut entries: Vec<_> = self.doc.option_pricing.iter().collect();
            entries.sort_by_key(|(k, _)| k.clone());
            for (option, price) in entries {
                lines.push(format!(
                    "- {}: +{}원",
                    option,
                    crate::money::format_won(*price)
                ));
            }
        }

        lines.join("\n")
    }
}

/// Tokenize text into search keywords: lowercase words of Hangul, latin
/// letters and digits, length >= 2, plus every adjacent 2-gram inside words
/// longer than two characters.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    let mut keywords = BTreeSet::new();
    let lowered = text.to_lowercase();

    for word in lowered
        .split(|c: char| !is_keyword_char(c))
        .filter(|w| !w.is_empty())
    {
        let chars: Vec<char> = word.chars().collect();
        if chars.len() < 2 {
            continue;
        }
        keywords.insert(word.to_string());
        if chars.len() > 2 {
            for pair in chars.windows(2) {
                keywords.insert(pair.iter().collect());
            }
        }
    }

    keywords
}

fn is_keyword_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || ('가'..='힣').contains(&c)
}
