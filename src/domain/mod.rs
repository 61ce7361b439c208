//! Core domain layer. No external I/O dependencies.
//!
//! Entities and business rules live here. Dependencies flow inward.

pub mod body;
pub mod channel;
pub mod entities;
pub mod errors;
pub mod intake;
pub mod policy;
pub mod signature;
pub mod template;
pub mod text_module;

pub use channel::{Channel, SocialPost};
pub use entities::{
    Actor, Article, ArticleEvent, ArticleRequest, AttachmentRef, ContentType, Group, NewArticle,
    Role, Sender, Signature, TextModule, Ticket, TicketChanges, Visibility,
};
pub use errors::{DomainError, ValidationError};
pub use intake::prepare;
