//! The process-wide table of sheets, keyed by name.

use crate::sheet::Sheet;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Sheets are created on first reference and never unloaded.
///
/// The registry's own lock guards only the *map* (insertion/lookup); once
/// a caller holds an `Arc<Sheet>` it locks that sheet independently. Per
/// the mandated lock order, a caller that needs both must take the sheet
/// lock first and the registry lock second; this type never reaches back
/// into a held sheet lock itself.
#[derive(Default)]
pub struct SheetRegistry {
    sheets: RwLock<FxHashMap<String, Arc<Sheet>>>,
}

impl SheetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sheet named `name`, creating it if this is the first
    /// reference to it.
    pub async fn get_or_create(&self, name: &str) -> Arc<Sheet> {
        if let Some(sheet) = self.sheets.read().await.get(name) {
            return sheet.clone();
        }

        let mut sheets = self.sheets.write().await;
        sheets
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Sheet::new(name)))
            .clone()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Sheet>> {
        self.sheets.read().await.get(name).cloned()
    }

    /// Installs a sheet loaded from disk at boot. Used only during
    /// startup, before any client can reach the registry.
    pub async fn install(&self, sheet: Sheet) {
        let mut sheets = self.sheets.write().await;
        sheets.insert(sheet.name.clone(), Arc::new(sheet));
    }

    pub async fn names(&self) -> Vec<String> {
        self.sheets.read().await.keys().cloned().collect()
    }

    pub async fn all(&self) -> Vec<Arc<Sheet>> {
        self.sheets.read().await.values().cloned().collect()
    }
}
