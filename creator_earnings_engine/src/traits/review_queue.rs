use crate::{
    db_types::{NewReviewItem, ReviewItem},
    traits::LedgerError,
};

/// Things that went wrong in a way only a human can fix.
#[allow(async_fn_in_trait)]
pub trait ReviewQueue: Clone {
    async fn enqueue(&self, item: NewReviewItem) -> Result<ReviewItem, LedgerError>;

    /// Unresolved items, oldest first.
    async fn open_items(&self) -> Result<Vec<ReviewItem>, LedgerError>;

    async fn resolve(&self, id: i64, resolver: &str, note: &str) -> Result<ReviewItem, LedgerError>;
}
