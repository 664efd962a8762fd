//! Background menu hot-reload
//!
//! Key principles:
//! - Never crash on config errors
//! - Keep the old catalog if the new one fails to parse or validate
//! - Only re-parse when the source file's modification time advances

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::catalog::{MenuCatalog, SharedCatalog};

/// Catalog reload result
pub enum MenuReloadResult {
    /// New catalog swapped in
    Success,
    /// Source unchanged since the last load
    Unchanged,
    /// Source read failed, keeping old catalog
    ReadError(String),
    /// Source parsed but failed validation, keeping old catalog
    ValidationError(String),
}

/// Re-parses the menu source when its mtime is newer than the cached one and
/// swaps the shared catalog atomically. Shared between the background task
/// and opportunistic callers.
pub struct MenuReloader {
    path: PathBuf,
    last_mtime: std::sync::Mutex<Option<SystemTime>>,
}

impl MenuReloader {
    pub fn new(path: PathBuf) -> Self {
        let last_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        Self {
            path,
            last_mtime: std::sync::Mutex::new(last_mtime),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the source mtime and swap the catalog if it advanced.
    pub fn reload_if_changed(&self, catalog: &SharedCatalog) -> MenuReloadResult {
        let mtime = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => return MenuReloadResult::ReadError(e.to_string()),
        };

        {
            let mut last = self.last_mtime.lock().expect("mtime lock poisoned");
            match *last {
                Some(prev) if mtime <= prev => return MenuReloadResult::Unchanged,
                _ => *last = Some(mtime),
            }
        }

        match MenuCatalog::load_from_file(&self.path) {
            Ok(new_catalog) => {
                // Atomic swap; readers never observe half-updated state
                *catalog.write().expect("catalog lock poisoned") = new_catalog;
                tracing::info!(target: "MENU", "Menu catalog reloaded from {}", self.path.display());
                MenuReloadResult::Success
            }
            Err(e) => {
                tracing::error!(
                    target: "MENU",
                    "Menu reload failed: {}, keeping old catalog",
                    e
                );
                MenuReloadResult::ValidationError(e.to_string())
            }
        }
    }
}

/// Background watcher loop for menu hot-reload
pub async fn menu_watcher(
    reloader: std::sync::Arc<MenuReloader>,
    catalog: SharedCatalog,
    check_interval: Duration,
) {
    loop {
        tokio::time::sleep(check_interval).await;
        match reloader.reload_if_changed(&catalog) {
            MenuReloadResult::Success | MenuReloadResult::Unchanged => {}
            MenuReloadResult::ReadError(e) | MenuReloadResult::ValidationError(e) => {
                tracing::warn!(target: "MENU", "Menu watcher kept old catalog: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, RwLock};

    const SAMPLE: &str = r#"{
        "categories": ["버거"],
        "menu_items": {"빅맥": {"category": "버거", "price": 6500}}
    }"#;

    fn temp_menu_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("menu_watcher_test_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_unchanged_source_is_not_reparsed() {
        let path = temp_menu_file(SAMPLE);
        let catalog: SharedCatalog =
            Arc::new(RwLock::new(MenuCatalog::load_from_file(&path).unwrap()));
        let reloader = MenuReloader::new(path.clone());

        assert!(matches!(
            reloader.reload_if_changed(&catalog),
            MenuReloadResult::Unchanged
        ));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_invalid_source_keeps_old_catalog() {
        let path = temp_menu_file(SAMPLE);
        let catalog: SharedCatalog =
            Arc::new(RwLock::new(MenuCatalog::load_from_file(&path).unwrap()));
        let reloader = MenuReloader::new(path.clone());

        // Corrupt the file with a future mtime so the reload fires
        std::fs::write(&path, "{not json").unwrap();
        let future = SystemTime::now() - Duration::from_secs(1);
        *reloader.last_mtime.lock().unwrap() = Some(future - Duration::from_secs(60));

        assert!(matches!(
            reloader.reload_if_changed(&catalog),
            MenuReloadResult::ValidationError(_) | MenuReloadResult::ReadError(_)
        ));
        // Old catalog still answers
        assert!(catalog.read().unwrap().get("빅맥").is_some());
        std::fs::remove_file(path).ok();
    }
}
