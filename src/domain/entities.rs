//! Domain entities. Pure data structures for the core business.
//!
//! No database/UI types here; adapters map their rows into these.

use super::channel::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who is acting on a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Agent,
    Customer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::Customer => "customer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user acting on a ticket (agent or customer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
    pub firstname: String,
    pub lastname: String,
    pub email: Option<String>,
}

impl Actor {
    /// "First Last", falling back to the email and then `#id`.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.firstname.trim(), self.lastname.trim());
        let full = full.trim();
        if !full.is_empty() {
            return full.to_string();
        }
        match self.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => format!("#{}", self.id),
        }
    }

    /// First letter of firstname + first letter of lastname (e.g. "JD").
    pub fn initials(&self) -> String {
        self.firstname
            .trim()
            .chars()
            .take(1)
            .chain(self.lastname.trim().chars().take(1))
            .collect()
    }
}

/// Agent group owning tickets. May carry a signature for outgoing email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub signature_id: Option<i64>,
}

/// Group signature. `body` is a formatted-text template (`#{user.firstname}` etc.).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub id: i64,
    pub name: String,
    pub body: String,
    pub active: bool,
}

/// The conversation articles are appended to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub title: String,
    pub group_id: i64,
    pub customer_id: i64,
    pub owner_id: Option<i64>,
    /// Channel the customer came in through. Unlocks the matching reply types.
    #[serde(default)]
    pub origin: Option<Channel>,
}

/// Ticket attribute changes submitted together with (or without) an article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketChanges {
    pub title: Option<String>,
    pub group_id: Option<i64>,
    pub owner_id: Option<i64>,
}

impl TicketChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.group_id.is_none() && self.owner_id.is_none()
    }

    /// Apply the changes to a ticket in place.
    pub fn apply_to(&self, ticket: &mut Ticket) {
        if let Some(ref title) = self.title {
            ticket.title = title.clone();
        }
        if let Some(group_id) = self.group_id {
            ticket.group_id = group_id;
        }
        if let Some(owner_id) = self.owner_id {
            ticket.owner_id = Some(owner_id);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Internal,
    Public,
}

impl Visibility {
    pub fn is_internal(self) -> bool {
        self == Visibility::Internal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    Agent,
    Customer,
    System,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Sender::Agent => "Agent",
            Sender::Customer => "Customer",
            Sender::System => "System",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Agent" => Some(Sender::Agent),
            "Customer" => Some(Sender::Customer),
            "System" => Some(Sender::System),
            _ => None,
        }
    }
}

/// Body content format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// Formatted text (`text/html`).
    #[serde(rename = "text/html")]
    Html,
    /// Plain text (`text/plain`).
    #[serde(rename = "text/plain")]
    Plain,
}

impl ContentType {
    pub fn mime(self) -> &'static str {
        match self {
            ContentType::Html => "text/html",
            ContentType::Plain => "text/plain",
        }
    }

    pub fn from_mime(s: &str) -> Option<Self> {
        match s {
            "text/html" => Some(ContentType::Html),
            "text/plain" => Some(ContentType::Plain),
            _ => None,
        }
    }
}

/// Reference to a blob held by the attachment store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Opaque key for the attachment store to resolve.
    pub store_key: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
}

/// Field bag submitted by the reply dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRequest {
    /// `None` = role default (Note for agents, Web for customers).
    pub channel: Option<Channel>,
    pub visibility: Option<Visibility>,
    pub content_type: Option<ContentType>,
    pub body: String,
    pub to: Option<String>,
    pub cc: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl ArticleRequest {
    /// Request with only a body; everything else defaulted.
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn cc(mut self, cc: impl Into<String>) -> Self {
        self.cc = Some(cc.into());
        self
    }

    pub fn attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// A validated, fully composed article that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArticle {
    pub ticket_id: i64,
    pub channel: Channel,
    pub visibility: Visibility,
    pub sender: Sender,
    pub content_type: ContentType,
    pub body: String,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    pub created_by: i64,
}

/// A stored article. Immutable except for the deletion mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub ticket_id: i64,
    /// 1-based insertion sequence within the ticket. Never reused or renumbered.
    pub position: i64,
    pub channel: Channel,
    pub visibility: Visibility,
    pub sender: Sender,
    pub content_type: ContentType,
    pub body: String,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub attachments: Vec<AttachmentRef>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Article {
    pub fn from_new(id: i64, position: i64, new: NewArticle, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            ticket_id: new.ticket_id,
            position,
            channel: new.channel,
            visibility: new.visibility,
            sender: new.sender,
            content_type: new.content_type,
            body: new.body,
            to: new.to,
            cc: new.cc,
            attachments: new.attachments,
            created_by: new.created_by,
            created_at,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Change notification published per ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ArticleEvent {
    Created { article_id: i64 },
    Deleted { article_id: i64 },
    TicketUpdated,
}

/// Reusable text snippet inserted via the `::key` trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextModule {
    pub id: i64,
    pub name: String,
    /// Comma-separated search keywords.
    pub keywords: String,
    pub content: String,
    pub active: bool,
}

impl TextModule {
    /// Case-insensitive match of `query` against name and keywords.
    pub fn matches(&self, query: &str) -> bool {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&q)
            || self
                .keywords
                .split(',')
                .any(|k| k.trim().to_lowercase().starts_with(&q))
    }
}
