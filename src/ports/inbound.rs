//! Inbound port. UI (adapter) calls into the application.

use crate::domain::DomainError;

/// Input port: an interactive front end driving the article use cases.
#[async_trait::async_trait]
pub trait InputPort: Send + Sync {
    /// Run the session until the user quits.
    async fn run(&self) -> Result<(), DomainError>;
}
