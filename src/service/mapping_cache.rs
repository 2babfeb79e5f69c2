use chrono::{DateTime, Local};
use dashmap::DashMap;
use serde::Serialize;

use crate::models::ColumnMapping;

/// A confirmed mapping and when it was stored.
#[derive(Debug, Clone, Serialize)]
pub struct CachedMapping {
    pub mapping: ColumnMapping,
    pub stored_at: DateTime<Local>,
    pub hits: u64,
}

/// Per-vendor memo of column mappings that validated well enough to trust.
///
/// Vendors rarely change their invoice layout, so a mapping solved once is
/// reused for the vendor's later invoices instead of searching again.
#[derive(Debug, Default)]
pub struct MappingCache {
    entries: DashMap<String, CachedMapping>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, vendor_id: &str) -> Option<ColumnMapping> {
        let mut entry = self.entries.get_mut(vendor_id)?;
        entry.hits += 1;
        tracing::debug!("mapping cache hit for vendor {} ({} hits)", vendor_id, entry.hits);
        Some(entry.mapping.clone())
    }

    pub fn store(&self, vendor_id: &str, mapping: ColumnMapping) {
        let replaced = self.entries.insert(
            vendor_id.to_string(),
            CachedMapping {
                mapping,
                stored_at: Local::now(),
                hits: 0,
            },
        );
        if replaced.is_none() {
            tracing::info!("cached column mapping for vendor {}", vendor_id);
        }
    }

    pub fn remove(&self, vendor_id: &str) -> Option<ColumnMapping> {
        self.entries.remove(vendor_id).map(|(_, cached)| cached.mapping)
    }

    pub fn snapshot(&self) -> Vec<(String, CachedMapping)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
