//! Article use cases: create, submit with ticket changes, delete, list.
//!
//! - Loads ticket + active group signature, runs `domain::prepare`
//! - Serializes mutations per ticket (one async mutex per ticket id)
//! - Each mutation is one store call; events are published only after it succeeds

use crate::domain::{
    self, Actor, Article, ArticleEvent, ArticleRequest, AttachmentRef, DomainError, NewArticle,
    Role, Ticket, TicketChanges, ValidationError,
};
use crate::ports::{ArticleStore, AttachmentStore, NotificationPort, SignatureLookup, TicketRepo};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Article service. Coordinates intake, the conversation store and notifications.
pub struct ArticleService {
    tickets: Arc<dyn TicketRepo>,
    articles: Arc<dyn ArticleStore>,
    signatures: Arc<dyn SignatureLookup>,
    notifier: Arc<dyn NotificationPort>,
    attachments: Option<Arc<dyn AttachmentStore>>,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ArticleService {
    pub fn new(
        tickets: Arc<dyn TicketRepo>,
        articles: Arc<dyn ArticleStore>,
        signatures: Arc<dyn SignatureLookup>,
        notifier: Arc<dyn NotificationPort>,
    ) -> Self {
        Self {
            tickets,
            articles,
            signatures,
            notifier,
            attachments: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_attachments(mut self, store: Arc<dyn AttachmentStore>) -> Self {
        self.attachments = Some(store);
        self
    }

    /// Run `f` while holding the ticket's lock. The map entry is dropped once nobody holds it.
    async fn serialized<T, F, Fut>(&self, ticket_id: i64, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(ticket_id).or_default())
        };
        let out = {
            let _guard = lock.lock().await;
            f().await
        };
        drop(lock);
        let mut locks = self.locks.lock().await;
        if locks
            .get(&ticket_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(&ticket_id);
        }
        out
    }

    pub async fn actor(&self, user_id: i64) -> Result<Actor, DomainError> {
        self.tickets
            .get_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", user_id))
    }

    pub async fn ticket(&self, ticket_id: i64) -> Result<Ticket, DomainError> {
        self.tickets
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| DomainError::not_found("ticket", ticket_id))
    }

    /// The ticket, if `actor` may work on it.
    pub async fn open(&self, actor: &Actor, ticket_id: i64) -> Result<Ticket, DomainError> {
        let ticket = self.ticket(ticket_id).await?;
        Self::check_access(actor, &ticket)?;
        Ok(ticket)
    }

    /// Customers only see and write on their own tickets.
    fn check_access(actor: &Actor, ticket: &Ticket) -> Result<(), ValidationError> {
        if actor.role == Role::Customer && ticket.customer_id != actor.id {
            return Err(ValidationError::ForbiddenAction {
                role: actor.role,
                action: "access another customer's ticket",
            });
        }
        Ok(())
    }

    /// Customers never see internal articles.
    fn can_read(actor: &Actor, article: &Article) -> bool {
        actor.role == Role::Agent || !article.visibility.is_internal()
    }

    /// Validate and default `request` without persisting anything.
    pub async fn prepare(
        &self,
        actor: &Actor,
        ticket_id: i64,
        request: &ArticleRequest,
    ) -> Result<NewArticle, DomainError> {
        let ticket = self.ticket(ticket_id).await?;
        self.prepare_for(actor, &ticket, request).await
    }

    async fn prepare_for(
        &self,
        actor: &Actor,
        ticket: &Ticket,
        request: &ArticleRequest,
    ) -> Result<NewArticle, DomainError> {
        Self::check_access(actor, ticket)?;
        let signature = self.signatures.active_signature_for(ticket.group_id).await?;
        domain::prepare(actor, ticket, request, signature.as_ref()).map_err(|e| {
            warn!(
                ticket_id = ticket.id,
                actor_id = actor.id,
                error = %e,
                "article rejected"
            );
            DomainError::from(e)
        })
    }

    /// Create an article on a ticket. Returns the stored article.
    pub async fn create(
        &self,
        actor: &Actor,
        ticket_id: i64,
        request: &ArticleRequest,
    ) -> Result<Article, DomainError> {
        self.serialized(ticket_id, || self.create_locked(actor, ticket_id, request))
            .await
    }

    async fn create_locked(
        &self,
        actor: &Actor,
        ticket_id: i64,
        request: &ArticleRequest,
    ) -> Result<Article, DomainError> {
        let ticket = self.ticket(ticket_id).await?;
        let new = self.prepare_for(actor, &ticket, request).await?;
        let article_id = self.articles.append(ticket_id, &new).await?;
        let article = self.stored(article_id).await?;

        info!(
            ticket_id,
            article_id,
            channel = %article.channel,
            internal = article.visibility.is_internal(),
            "article created"
        );
        self.notifier
            .publish(ticket_id, ArticleEvent::Created { article_id })
            .await;
        Ok(article)
    }

    /// Apply ticket changes and optionally add an article, as one unit.
    /// The article is composed against the ticket as it will be after the changes.
    pub async fn submit(
        &self,
        actor: &Actor,
        ticket_id: i64,
        changes: &TicketChanges,
        request: Option<&ArticleRequest>,
    ) -> Result<Option<Article>, DomainError> {
        if actor.role == Role::Customer && !changes.is_empty() {
            return Err(ValidationError::ForbiddenAction {
                role: actor.role,
                action: "change ticket attributes",
            }
            .into());
        }
        self.serialized(ticket_id, || {
            self.submit_locked(actor, ticket_id, changes, request)
        })
        .await
    }

    async fn submit_locked(
        &self,
        actor: &Actor,
        ticket_id: i64,
        changes: &TicketChanges,
        request: Option<&ArticleRequest>,
    ) -> Result<Option<Article>, DomainError> {
        let mut ticket = self.ticket(ticket_id).await?;
        Self::check_access(actor, &ticket)?;
        changes.apply_to(&mut ticket);
        let new = match request {
            Some(req) => Some(self.prepare_for(actor, &ticket, req).await?),
            None => None,
        };
        if changes.is_empty() && new.is_none() {
            return Ok(None);
        }

        let article_id = self
            .tickets
            .update_ticket(ticket_id, changes, new.as_ref())
            .await?;

        if !changes.is_empty() {
            info!(ticket_id, group_id = ticket.group_id, "ticket updated");
            self.notifier
                .publish(ticket_id, ArticleEvent::TicketUpdated)
                .await;
        }
        match article_id {
            Some(article_id) => {
                let article = self.stored(article_id).await?;
                info!(ticket_id, article_id, channel = %article.channel, "article created with ticket update");
                self.notifier
                    .publish(ticket_id, ArticleEvent::Created { article_id })
                    .await;
                Ok(Some(article))
            }
            None => Ok(None),
        }
    }

    /// Soft-delete an article. Other articles keep their order; deleting twice is a no-op.
    /// Customers may only delete what they wrote.
    pub async fn delete(&self, actor: &Actor, article_id: i64) -> Result<(), DomainError> {
        let article = self.stored(article_id).await?;
        let ticket = self.ticket(article.ticket_id).await?;
        Self::check_access(actor, &ticket)?;
        if actor.role == Role::Customer && article.created_by != actor.id {
            return Err(ValidationError::ForbiddenAction {
                role: actor.role,
                action: "delete articles written by others",
            }
            .into());
        }

        self.serialized(article.ticket_id, || async {
            if self.articles.mark_deleted(article_id).await? {
                info!(ticket_id = article.ticket_id, article_id, "article deleted");
                self.notifier
                    .publish(article.ticket_id, ArticleEvent::Deleted { article_id })
                    .await;
            }
            Ok::<(), DomainError>(())
        })
        .await
    }

    /// Articles of a ticket in insertion order, as `actor` may see them.
    pub async fn list(
        &self,
        actor: &Actor,
        ticket_id: i64,
        include_deleted: bool,
    ) -> Result<Vec<Article>, DomainError> {
        self.open(actor, ticket_id).await?;
        let mut articles = self.articles.list_ordered(ticket_id, include_deleted).await?;
        articles.retain(|a| Self::can_read(actor, a));
        Ok(articles)
    }

    /// Store a blob and return the reference to put into `ArticleRequest::attachments`.
    pub async fn upload_attachment(
        &self,
        ticket_id: i64,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<AttachmentRef, DomainError> {
        let store = self.attachment_store()?;
        self.ticket(ticket_id).await?;
        store.put(ticket_id, filename, mime_type, bytes).await
    }

    /// Content of the `index`th attachment of an article `actor` can see.
    pub async fn attachment_content(
        &self,
        actor: &Actor,
        article_id: i64,
        index: usize,
    ) -> Result<(AttachmentRef, Vec<u8>), DomainError> {
        let store = self.attachment_store()?;
        let article = self.stored(article_id).await?;
        self.open(actor, article.ticket_id).await?;
        if !Self::can_read(actor, &article) {
            return Err(DomainError::not_found("article", article_id));
        }
        let attachment = article.attachments.get(index).cloned().ok_or_else(|| {
            DomainError::Attachment(format!("article {} has no attachment {}", article_id, index))
        })?;
        let bytes = store.get(&attachment).await?;
        debug!(article_id, key = %attachment.store_key, size = bytes.len(), "attachment read");
        Ok((attachment, bytes))
    }

    fn attachment_store(&self) -> Result<&Arc<dyn AttachmentStore>, DomainError> {
        self.attachments
            .as_ref()
            .ok_or_else(|| DomainError::Attachment("no attachment store configured".into()))
    }

    async fn stored(&self, article_id: i64) -> Result<Article, DomainError> {
        self.articles
            .get_article(article_id)
            .await?
            .ok_or_else(|| DomainError::not_found("article", article_id))
    }

    #[cfg(test)]
    async fn held_locks(&self) -> usize {
        self.locks.lock().await.len()
    }
}
