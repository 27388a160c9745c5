/// The uniform outcome of a write: whether the backend acknowledged it, and how many documents it
/// affected.
///
/// The count depends on the operation: modified documents for updates and replacements, deleted
/// documents for deletes, and modified plus deleted documents for a multi-write batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatabaseResult {
    pub success: bool,
    pub items_affected: u64,
}

impl DatabaseResult {
    pub fn new(success: bool, items_affected: u64) -> Self {
        Self { success, items_affected }
    }

    /// An acknowledged write affecting `items_affected` documents.
    pub fn acknowledged(items_affected: u64) -> Self {
        Self::new(true, items_affected)
    }

    pub fn unacknowledged() -> Self {
        Self::new(false, 0)
    }
}
