//! Implements InputPort. Inquire-based reply dialog for one ticket.
//!
//! Preselects article type and visibility from the policy table, asks the
//! recipients each type needs and offers text-module expansion on `::key`.

use crate::domain::channel::Addressing;
use crate::domain::text_module::TRIGGER_PREFIX;
use crate::domain::policy;
use crate::domain::{
    Actor, Article, ArticleRequest, Channel, DomainError, Role, Ticket, Visibility,
};
use crate::ports::InputPort;
use crate::usecases::suggestion_service::DEFAULT_LIMIT;
use crate::usecases::{ArticleService, SuggestionService};
use async_trait::async_trait;
use inquire::{Confirm, CustomType, Select, Text};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

fn ui_err(e: inquire::InquireError) -> DomainError {
    DomainError::Ui(e.to_string())
}

/// One line per article in the ticket view.
fn article_line(a: &Article) -> String {
    let visibility = if a.visibility.is_internal() {
        "internal"
    } else {
        "public"
    };
    let deleted = if a.is_deleted() { " (deleted)" } else { "" };
    format!(
        "#{} [{}] {} {}{}: {}",
        a.position,
        a.channel.label(),
        visibility,
        a.sender.as_str(),
        deleted,
        a.body.replace('\n', " ")
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    ShowArticles,
    AddReply,
    DeleteArticle,
    ExportAttachment,
    Quit,
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MenuAction::ShowArticles => "Show articles",
            MenuAction::AddReply => "Add reply",
            MenuAction::DeleteArticle => "Delete article",
            MenuAction::ExportAttachment => "Export attachment",
            MenuAction::Quit => "Quit",
        })
    }
}

struct ChannelOption(Channel);

impl fmt::Display for ChannelOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.label())
    }
}

struct ArticleOption(Article);

impl fmt::Display for ArticleOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&article_line(&self.0))
    }
}

/// TUI adapter. Inquire prompts.
pub struct TuiInputPort {
    articles: Arc<ArticleService>,
    suggestions: Arc<SuggestionService>,
    actor_id: Option<i64>,
    ticket_id: Option<i64>,
}

impl TuiInputPort {
    pub fn new(
        articles: Arc<ArticleService>,
        suggestions: Arc<SuggestionService>,
        actor_id: Option<i64>,
        ticket_id: Option<i64>,
    ) -> Self {
        Self {
            articles,
            suggestions,
            actor_id,
            ticket_id,
        }
    }

    fn ask_id(prompt: &str, preset: Option<i64>) -> Result<i64, DomainError> {
        match preset {
            Some(id) => Ok(id),
            None => CustomType::<i64>::new(prompt).prompt().map_err(ui_err),
        }
    }

    async fn show_articles(&self, actor: &Actor, ticket_id: i64) -> Result<(), DomainError> {
        let articles = self.articles.list(actor, ticket_id, false).await?;
        if articles.is_empty() {
            println!("(no articles)");
        }
        for a in &articles {
            println!("{}", article_line(a));
        }
        Ok(())
    }

    /// Body prompt with `::key` expansion until no trigger is left.
    async fn ask_body(&self, actor: &Actor, ticket_id: i64) -> Result<String, DomainError> {
        let mut body = Text::new("Text")
            .with_help_message(&format!("{}key inserts a text module", TRIGGER_PREFIX))
            .prompt()
            .map_err(ui_err)?;
        while let Some((_, modules)) = self.suggestions.suggest(&body, DEFAULT_LIMIT).await? {
            if modules.is_empty() {
                break;
            }
            let names: Vec<String> = modules.iter().map(|m| m.name.clone()).collect();
            let picked = Select::new("Text module", names)
                .prompt_skippable()
                .map_err(ui_err)?;
            let Some(name) = picked else {
                break;
            };
            let Some(module) = modules.iter().find(|m| m.name == name) else {
                break;
            };
            body = self
                .suggestions
                .expand(actor, ticket_id, &body, module.id)
                .await?;
            let more = Text::new("Text (continue)")
                .with_initial_value(&body)
                .prompt()
                .map_err(ui_err)?;
            body = more;
        }
        Ok(body)
    }

    async fn ask_attachments(
        &self,
        ticket_id: i64,
        request: &mut ArticleRequest,
    ) -> Result<(), DomainError> {
        loop {
            let path = Text::new("Attach file (path, empty to skip)")
                .prompt()
                .map_err(ui_err)?;
            let path = path.trim();
            if path.is_empty() {
                return Ok(());
            }
            let bytes = match tokio::fs::read(path).await {
                Ok(b) => b,
                Err(e) => {
                    println!("Cannot read {}: {}", path, e);
                    continue;
                }
            };
            let filename = std::path::Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string());
            let attachment = self
                .articles
                .upload_attachment(ticket_id, &filename, "application/octet-stream", &bytes)
                .await?;
            request.attachments.push(attachment);
        }
    }

    async fn add_reply(&self, actor: &Actor, ticket: &Ticket) -> Result<(), DomainError> {
        let ticket_id = ticket.id;
        let mut request = ArticleRequest::default();

        if actor.role == Role::Agent {
            let channels = policy::allowed_channels(actor.role, ticket.origin);
            let default = policy::default_channel(actor.role);
            let cursor = channels.iter().position(|c| *c == default).unwrap_or(0);
            let options: Vec<ChannelOption> = channels.into_iter().map(ChannelOption).collect();
            let channel = Select::new("Article Type", options)
                .with_starting_cursor(cursor)
                .prompt()
                .map_err(ui_err)?
                .0;
            request.channel = Some(channel);

            if let Some(defaults) = policy::defaults(actor.role, channel) {
                if defaults.visibility_overridable {
                    let cursor = if defaults.visibility.is_internal() { 0 } else { 1 };
                    let picked = Select::new("Visibility", vec!["Internal", "Public"])
                        .with_starting_cursor(cursor)
                        .prompt()
                        .map_err(ui_err)?;
                    request.visibility = Some(if picked == "Internal" {
                        Visibility::Internal
                    } else {
                        Visibility::Public
                    });
                }
            }

            match channel.spec().addressing {
                Addressing::None => {}
                Addressing::To => {
                    request.to = Some(Text::new("To").prompt().map_err(ui_err)?);
                }
                Addressing::ToCc => {
                    request.to = Some(Text::new("To").prompt().map_err(ui_err)?);
                    let cc = Text::new("CC (optional)").prompt().map_err(ui_err)?;
                    request.cc = Some(cc);
                }
            }
        }

        request.body = self.ask_body(actor, ticket_id).await?;

        let channel = request
            .channel
            .unwrap_or_else(|| policy::default_channel(actor.role));
        if channel.spec().attachments_allowed {
            self.ask_attachments(ticket_id, &mut request).await?;
        }

        match self.articles.create(actor, ticket_id, &request).await {
            Ok(article) => println!("Saved: {}", article_line(&article)),
            Err(DomainError::Validation(v)) => println!("Not saved: {}", v),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn delete_article(&self, actor: &Actor, ticket_id: i64) -> Result<(), DomainError> {
        let articles = self.articles.list(actor, ticket_id, false).await?;
        if articles.is_empty() {
            println!("(no articles)");
            return Ok(());
        }
        let options: Vec<ArticleOption> = articles.into_iter().map(ArticleOption).collect();
        let Some(picked) = Select::new("Delete Article", options)
            .prompt_skippable()
            .map_err(ui_err)?
        else {
            return Ok(());
        };
        let confirmed = Confirm::new("Delete this article?")
            .with_default(false)
            .prompt()
            .map_err(ui_err)?;
        if confirmed {
            self.articles.delete(actor, picked.0.id).await?;
        }
        Ok(())
    }

    async fn export_attachment(&self, actor: &Actor, ticket_id: i64) -> Result<(), DomainError> {
        let articles: Vec<ArticleOption> = self
            .articles
            .list(actor, ticket_id, false)
            .await?
            .into_iter()
            .filter(|a| !a.attachments.is_empty())
            .map(ArticleOption)
            .collect();
        if articles.is_empty() {
            println!("(no attachments)");
            return Ok(());
        }
        let Some(picked) = Select::new("Article", articles)
            .prompt_skippable()
            .map_err(ui_err)?
        else {
            return Ok(());
        };
        let names: Vec<String> = picked.0.attachments.iter().map(|a| a.filename.clone()).collect();
        let Some(name) = Select::new("Attachment", names.clone())
            .prompt_skippable()
            .map_err(ui_err)?
        else {
            return Ok(());
        };
        let index = names.iter().position(|n| *n == name).unwrap_or(0);
        let (attachment, bytes) = self
            .articles
            .attachment_content(actor, picked.0.id, index)
            .await?;
        let target = Text::new("Save to")
            .with_initial_value(&attachment.filename)
            .prompt()
            .map_err(ui_err)?;
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| DomainError::Attachment(format!("write {}: {}", target, e)))?;
        println!("Wrote {} bytes to {}", bytes.len(), target);
        Ok(())
    }
}

#[async_trait]
impl InputPort for TuiInputPort {
    async fn run(&self) -> Result<(), DomainError> {
        let actor_id = Self::ask_id("Act as user id:", self.actor_id)?;
        let actor = self.articles.actor(actor_id).await?;
        let ticket_id = Self::ask_id("Ticket id:", self.ticket_id)?;
        let ticket = self.articles.open(&actor, ticket_id).await?;
        println!(
            "{} ({}) on ticket #{} \"{}\"",
            actor.display_name(),
            actor.role,
            ticket.id,
            ticket.title
        );

        loop {
            let actions = vec![
                MenuAction::ShowArticles,
                MenuAction::AddReply,
                MenuAction::DeleteArticle,
                MenuAction::ExportAttachment,
                MenuAction::Quit,
            ];
            let action = Select::new("What next?", actions)
                .prompt()
                .map_err(ui_err)?;
            let result = match action {
                MenuAction::ShowArticles => self.show_articles(&actor, ticket_id).await,
                MenuAction::AddReply => self.add_reply(&actor, &ticket).await,
                MenuAction::DeleteArticle => self.delete_article(&actor, ticket_id).await,
                MenuAction::ExportAttachment => self.export_attachment(&actor, ticket_id).await,
                MenuAction::Quit => return Ok(()),
            };
            if let Err(e) = result {
                warn!(ticket_id, error = %e, "dialog action failed");
                println!("Error: {}", e);
            }
        }
    }
}
