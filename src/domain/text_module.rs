//! Text suggestions: `::key` triggers expanded into text-module templates.
//!
//! Placeholders are resolved against live ticket data at expansion time; the
//! expanded text is then an ordinary body for `intake::prepare`.

use super::entities::{Actor, Group, TextModule, Ticket};
use super::template;
use regex::Regex;
use std::sync::LazyLock;

/// Prefix that opens a suggestion lookup in the editor.
pub const TRIGGER_PREFIX: &str = "::";

static TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?:^|\s)({}([A-Za-z0-9_\-]*))$",
        regex::escape(TRIGGER_PREFIX)
    );
    Regex::new(&pattern).expect("trigger regex")
});

/// A trigger token found at the end of a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Byte offset of the `::` prefix.
    pub start: usize,
    /// Lookup key typed after the prefix (may be empty).
    pub key: String,
}

/// Find a `::key` token at the end of `body` (where the cursor is).
pub fn find_trigger(body: &str) -> Option<Trigger> {
    let caps = TRIGGER.captures(body)?;
    let token = caps.get(1)?;
    Some(Trigger {
        start: token.start(),
        key: caps[2].to_string(),
    })
}

/// Live values available to text-module placeholders.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub ticket: &'a Ticket,
    pub group: &'a Group,
    pub customer: &'a Actor,
    pub user: &'a Actor,
}

impl TemplateContext<'_> {
    pub fn resolve(&self, path: &str) -> Option<String> {
        let value = match path {
            "ticket.id" => self.ticket.id.to_string(),
            "ticket.title" => self.ticket.title.clone(),
            "ticket.group.name" => self.group.name.clone(),
            "ticket.customer.firstname" => self.customer.firstname.clone(),
            "ticket.customer.lastname" => self.customer.lastname.clone(),
            "ticket.customer.fullname" => self.customer.display_name(),
            "ticket.customer.email" => self.customer.email.clone()?,
            "user.firstname" => self.user.firstname.clone(),
            "user.lastname" => self.user.lastname.clone(),
            "user.fullname" => self.user.display_name(),
            _ => return None,
        };
        Some(value)
    }
}

/// Module content with placeholders substituted.
pub fn render(module: &TextModule, ctx: &TemplateContext<'_>) -> String {
    template::render(&module.content, |path| ctx.resolve(path))
}

/// Replace the trigger token at the end of `body` with the rendered module.
/// Without a trigger the rendered module is appended.
pub fn expand(body: &str, module: &TextModule, ctx: &TemplateContext<'_>) -> String {
    let head = match find_trigger(body) {
        Some(trigger) => &body[..trigger.start],
        None => body,
    };
    format!("{}{}", head, render(module, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Role;

    fn person(id: i64, role: Role, first: &str, last: &str) -> Actor {
        Actor {
            id,
            role,
            firstname: first.into(),
            lastname: last.into(),
            email: None,
        }
    }

    #[test]
    fn test_find_trigger() {
        assert_eq!(
            find_trigger("::test"),
            Some(Trigger {
                start: 0,
                key: "test".into()
            })
        );
        assert_eq!(
            find_trigger("Hello ::gr"),
            Some(Trigger {
                start: 6,
                key: "gr".into()
            })
        );
        assert_eq!(find_trigger("Hello ::").map(|t| t.key), Some(String::new()));
        assert_eq!(find_trigger("a::b"), None);
        assert_eq!(find_trigger("::test done"), None);
    }

    #[test]
    fn test_expand_substitutes_live_fields() {
        let ticket = Ticket {
            id: 5,
            title: "Printer on fire".into(),
            group_id: 1,
            customer_id: 2,
            owner_id: None,
            origin: None,
        };
        let group = Group {
            id: 1,
            name: "Users".into(),
            signature_id: None,
        };
        let customer = person(2, Role::Customer, "Nicole", "Braun");
        let agent = person(3, Role::Agent, "Agent", "Smith");
        let module = TextModule {
            id: 1,
            name: "test".into(),
            keywords: String::new(),
            content: "Hello, #{ticket.customer.firstname}! Ticket #{ticket.title} has group #{ticket.group.name}.".into(),
            active: true,
        };
        let ctx = TemplateContext {
            ticket: &ticket,
            group: &group,
            customer: &customer,
            user: &agent,
        };
        assert_eq!(
            expand("::test", &module, &ctx),
            "Hello, Nicole! Ticket Printer on fire has group Users."
        );
        assert_eq!(
            expand("Hi ::te", &module, &ctx),
            "Hi Hello, Nicole! Ticket Printer on fire has group Users."
        );
    }
}
