//! Text suggestions: look up text modules for a `::key` trigger and expand them
//! against the live ticket.

use crate::domain::text_module::{self, TemplateContext, Trigger};
use crate::domain::{Actor, DomainError, TextModule};
use crate::ports::{TextModuleLookup, TicketRepo};
use std::sync::Arc;
use tracing::debug;

/// Max suggestions offered per lookup.
pub const DEFAULT_LIMIT: usize = 10;

pub struct SuggestionService {
    tickets: Arc<dyn TicketRepo>,
    modules: Arc<dyn TextModuleLookup>,
}

impl SuggestionService {
    pub fn new(tickets: Arc<dyn TicketRepo>, modules: Arc<dyn TextModuleLookup>) -> Self {
        Self { tickets, modules }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<TextModule>, DomainError> {
        self.modules.search_text_modules(query, limit).await
    }

    /// Suggestions for the trigger at the end of `body`, if there is one.
    pub async fn suggest(
        &self,
        body: &str,
        limit: usize,
    ) -> Result<Option<(Trigger, Vec<TextModule>)>, DomainError> {
        let Some(trigger) = text_module::find_trigger(body) else {
            return Ok(None);
        };
        let modules = self.search(&trigger.key, limit).await?;
        debug!(key = %trigger.key, found = modules.len(), "text module lookup");
        Ok(Some((trigger, modules)))
    }

    /// Replace the trigger in `body` with module `module_id`, rendered for `user` on `ticket_id`.
    pub async fn expand(
        &self,
        user: &Actor,
        ticket_id: i64,
        body: &str,
        module_id: i64,
    ) -> Result<String, DomainError> {
        let module = self
            .modules
            .get_text_module(module_id)
            .await?
            .ok_or_else(|| DomainError::not_found("text module", module_id))?;
        let ticket = self
            .tickets
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| DomainError::not_found("ticket", ticket_id))?;
        let group = self
            .tickets
            .get_group(ticket.group_id)
            .await?
            .ok_or_else(|| DomainError::not_found("group", ticket.group_id))?;
        let customer = self
            .tickets
            .get_user(ticket.customer_id)
            .await?
            .ok_or_else(|| DomainError::not_found("user", ticket.customer_id))?;

        let ctx = TemplateContext {
            ticket: &ticket,
            group: &group,
            customer: &customer,
            user,
        };
        Ok(text_module::expand(body, &module, &ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::JsonStore;
    use crate::domain::Role;

    #[tokio::test]
    async fn test_suggest_and_expand() {
        let store = Arc::new(JsonStore::in_memory());
        let agent = store
            .create_user(Role::Agent, "Agent", "Smith", None)
            .await
            .unwrap();
        let customer = store
            .create_user(Role::Customer, "Nicole", "Braun", None)
            .await
            .unwrap();
        let group = store.create_group("Users", None).await.unwrap();
        let ticket = store
            .create_ticket("Printer", group.id, customer.id, None)
            .await
            .unwrap();
        let module = store
            .create_text_module(
                "test",
                "",
                "Hello, #{ticket.customer.firstname}! Ticket #{ticket.title} has group #{ticket.group.name}.",
            )
            .await
            .unwrap();
        let service = SuggestionService::new(store.clone(), store.clone());

        let (trigger, found) = service.suggest("::test", DEFAULT_LIMIT).await.unwrap().unwrap();
        assert_eq!(trigger.key, "test");
        assert_eq!(found, vec![module.clone()]);
        assert!(service.suggest("no trigger", DEFAULT_LIMIT).await.unwrap().is_none());

        let body = service
            .expand(&agent, ticket.id, "::test", module.id)
            .await
            .unwrap();
        assert_eq!(body, "Hello, Nicole! Ticket Printer has group Users.");
    }
}
