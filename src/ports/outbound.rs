//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{
    Actor, Article, ArticleEvent, AttachmentRef, DomainError, Group, NewArticle, Signature,
    TextModule, Ticket, TicketChanges,
};

/// Conversation store. Append-only article log per ticket with a deleted flag per entry.
#[async_trait::async_trait]
pub trait ArticleStore: Send + Sync {
    /// Append at the end of the ticket's insertion order. Returns the new article id.
    async fn append(&self, ticket_id: i64, article: &NewArticle) -> Result<i64, DomainError>;

    /// Fetch one article, deleted or not.
    async fn get_article(&self, article_id: i64) -> Result<Option<Article>, DomainError>;

    /// Set the deleted mark. Returns false when it was already set.
    /// Errors with `NotFound` for unknown ids.
    async fn mark_deleted(&self, article_id: i64) -> Result<bool, DomainError>;

    /// Articles of a ticket in insertion order. Deleted ones only when `include_deleted`.
    async fn list_ordered(
        &self,
        ticket_id: i64,
        include_deleted: bool,
    ) -> Result<Vec<Article>, DomainError>;
}

/// Tickets, groups and users.
#[async_trait::async_trait]
pub trait TicketRepo: Send + Sync {
    async fn get_ticket(&self, ticket_id: i64) -> Result<Option<Ticket>, DomainError>;

    async fn get_group(&self, group_id: i64) -> Result<Option<Group>, DomainError>;

    async fn get_user(&self, user_id: i64) -> Result<Option<Actor>, DomainError>;

    /// Apply `changes` and, if given, append `article` as one atomic unit.
    /// Returns the id of the appended article.
    async fn update_ticket(
        &self,
        ticket_id: i64,
        changes: &TicketChanges,
        article: Option<&NewArticle>,
    ) -> Result<Option<i64>, DomainError>;
}

/// Group signature lookup.
#[async_trait::async_trait]
pub trait SignatureLookup: Send + Sync {
    /// The group's signature when it exists and is active.
    async fn active_signature_for(&self, group_id: i64) -> Result<Option<Signature>, DomainError>;
}

/// Text module (suggestion) lookup.
#[async_trait::async_trait]
pub trait TextModuleLookup: Send + Sync {
    /// Active modules whose name or keywords match `query`, ordered by name.
    async fn search_text_modules(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TextModule>, DomainError>;

    async fn get_text_module(&self, module_id: i64) -> Result<Option<TextModule>, DomainError>;
}

/// Per-ticket change notifications for live viewers. Fire-and-forget.
#[async_trait::async_trait]
pub trait NotificationPort: Send + Sync {
    async fn publish(&self, ticket_id: i64, event: ArticleEvent);
}

/// Opaque blob storage for attachments.
#[async_trait::async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn put(
        &self,
        ticket_id: i64,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<AttachmentRef, DomainError>;

    async fn get(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, DomainError>;
}
