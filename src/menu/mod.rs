//! Menu catalog: configuration document, search index, hot reload

pub mod catalog;
pub mod models;
pub mod watcher;

pub use catalog::{CategoryStats, MenuCatalog, MenuSearchResult, SharedCatalog};
pub use models::{MenuDocument, MenuItem, RestaurantInfo};
pub use watcher::{MenuReloadResult, MenuReloader, menu_watcher};
