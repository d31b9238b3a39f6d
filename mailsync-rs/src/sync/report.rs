use serde::Serialize;

use crate::error::SyncWarning;

/// Message count observed in one folder (the `EXISTS` value, not the
/// number fetched).
#[derive(Debug, Clone, Serialize)]
pub struct FolderSummary {
    pub folder: String,
    pub observed: u32,
}

/// Outcome of one sync run: success or partial success. Per-unit failures
/// travel in `warnings` alongside the partial results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Newly inserted message rows.
    pub inserted: usize,
    /// Per-folder message totals observed on the server.
    pub folder_totals: Vec<FolderSummary>,
    /// Folders that completed the Select -> Search -> Fetch cycle.
    pub folders_synced: Vec<String>,
    pub warnings: Vec<SyncWarning>,
}

impl SyncReport {
    pub fn observe(&mut self, folder: &str, total: u32) {
        self.folder_totals.push(FolderSummary {
            folder: folder.to_string(),
            observed: total,
        });
    }
}
