use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewReviewItem, ReviewItem, ReviewSource},
    traits::{LedgerError, ReviewQueue},
};

/// Queues a ledger invariant violation for an operator, unless an open item already covers `reference`. Any other
/// error is passed through untouched. The error is handed back so callers can return it.
pub(crate) async fn queue_violation<B: ReviewQueue>(db: &B, reference: &str, err: LedgerError) -> LedgerError {
    if !matches!(err, LedgerError::LedgerInvariantViolation(_)) {
        return err;
    }
    error!("🗂️ {reference}: {err}");
    match db.open_items().await {
        Ok(items) if items.iter().any(|i| i.source == ReviewSource::InvariantViolation && i.reference == reference) => {
            debug!("🗂️ {reference} is already waiting for review");
            return err;
        },
        Ok(_) => {},
        Err(e) => warn!("🗂️ Could not read the review queue. {e}"),
    }
    let item = NewReviewItem::new(ReviewSource::InvariantViolation, reference, &err.to_string());
    if let Err(e) = db.enqueue(item).await {
        error!("🗂️ Could not queue {reference} for review. {e}");
    }
    err
}

/// The operator review queue.
#[derive(Clone)]
pub struct ReviewApi<B> {
    db: B,
}

impl<B> Debug for ReviewApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReviewApi")
    }
}

impl<B> ReviewApi<B>
where B: ReviewQueue
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn enqueue(&self, item: NewReviewItem) -> Result<ReviewItem, LedgerError> {
        self.db.enqueue(item).await
    }

    /// Unresolved items, oldest first.
    pub async fn open_items(&self) -> Result<Vec<ReviewItem>, LedgerError> {
        self.db.open_items().await
    }

    pub async fn resolve(&self, id: i64, resolver: &str, note: &str) -> Result<ReviewItem, LedgerError> {
        let item = self.db.resolve(id, resolver, note).await?;
        info!("🗂️ Review item #{id} resolved by {resolver}");
        Ok(item)
    }
}
