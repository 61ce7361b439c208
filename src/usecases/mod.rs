//! Application use cases. Orchestrate domain logic via ports.

pub mod article_service;
pub mod suggestion_service;

pub use article_service::ArticleService;
pub use suggestion_service::SuggestionService;
