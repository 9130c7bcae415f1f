use tracing::{info, warn};

use crate::db::{CatalogEntry, RecordStore};
use crate::error::StoreError;

/// Outcome counts of one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Inserts rejected because the name appeared concurrently.
    pub conflicts: usize,
}

impl MergeReport {
    pub fn writes(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Merge a batch into the store, in batch order.
///
/// New names are inserted with every field. Known names only get their
/// ratings and average refreshed, and only when something differs.
/// Entries missing from the batch are left untouched.
pub fn reconcile<S: RecordStore + ?Sized>(
    store: &mut S,
    batch: &[CatalogEntry],
) -> Result<MergeReport, StoreError> {
    let mut report = MergeReport::default();

    for incoming in batch {
        match store.find_by_name(&incoming.name)? {
            None => match store.insert(incoming) {
                Ok(()) => {
                    info!(name = %incoming.name, "saved new entry");
                    report.inserted += 1;
                }
                Err(StoreError::Duplicate(name)) => {
                    warn!(name = %name, "entry appeared concurrently, skipping insert");
                    report.conflicts += 1;
                }
                Err(e) => return Err(e),
            },
            Some(existing) => {
                let changed = changed_fields(&existing, incoming);
                if changed.is_empty() {
                    info!(name = %existing.name, "no rating changes, skipping update");
                    report.unchanged += 1;
                    continue;
                }

                let merged = CatalogEntry {
                    ratings: incoming.ratings.clone(),
                    average_rating: incoming.average_rating,
                    ..existing
                };
                store.update(&merged)?;
                info!(name = %merged.name, ?changed, "updated ratings");
                report.updated += 1;
            }
        }
    }

    Ok(report)
}

/// Rating slots (by index) and average that differ. Tags are never compared.
fn changed_fields(existing: &CatalogEntry, incoming: &CatalogEntry) -> Vec<String> {
    let slots = existing.ratings.len().max(incoming.ratings.len());
    let mut changed: Vec<String> = (0..slots)
        .filter(|&i| {
            existing.ratings.get(i).copied().flatten() != incoming.ratings.get(i).copied().flatten()
        })
        .map(|i| format!("rating[{}]", i))
        .collect();
    if existing.average_rating != incoming.average_rating {
        changed.push("average_rating".to_string());
    }
    changed
}
