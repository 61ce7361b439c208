//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use super::channel::Channel;
use super::entities::Role;
use thiserror::Error;

/// Per-request rejection of an article. Nothing has been mutated when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Article body must not be empty")]
    EmptyBody,

    #[error("Missing required address field: {field}")]
    MissingAddress { field: &'static str },

    #[error("Channel {channel} is not available to {role}s")]
    ForbiddenChannel { role: Role, channel: Channel },

    #[error("Channel {channel} does not accept attachments")]
    AttachmentNotAllowed { channel: Channel },

    #[error("{role}s may not {action}")]
    ForbiddenAction { role: Role, action: &'static str },
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Repository error: {0}")]
    Repo(String),

    #[error("Attachment store error: {0}")]
    Attachment(String),

    #[error("UI error: {0}")]
    Ui(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        DomainError::NotFound { entity, id }
    }

    /// The validation failure, if this error is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            DomainError::Validation(v) => Some(v),
            _ => None,
        }
    }
}
