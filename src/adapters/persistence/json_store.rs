//! Implements the store ports over an in-memory cache with an optional JSON snapshot.
//!
//! Each mutation is applied to a copy of the cache, persisted, then swapped in
//! under the write lock, so readers never see a half-applied change.

use crate::domain::{
    Actor, Article, Channel, DomainError, Group, NewArticle, Role, Signature, TextModule, Ticket,
    TicketChanges,
};
use crate::ports::{ArticleStore, SignatureLookup, TextModuleLookup, TicketRepo};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    users: BTreeMap<i64, Actor>,
    groups: BTreeMap<i64, Group>,
    signatures: BTreeMap<i64, Signature>,
    tickets: BTreeMap<i64, Ticket>,
    text_modules: BTreeMap<i64, TextModule>,
    /// Append-only log across all tickets; never shrinks.
    articles: Vec<Article>,
    last_id: i64,
}

impl StoreData {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn push_article(&mut self, ticket_id: i64, article: &NewArticle) -> Result<i64, DomainError> {
        if !self.tickets.contains_key(&ticket_id) {
            return Err(DomainError::not_found("ticket", ticket_id));
        }
        let position = self
            .articles
            .iter()
            .filter(|a| a.ticket_id == ticket_id)
            .map(|a| a.position)
            .max()
            .unwrap_or(0)
            + 1;
        let id = self.next_id();
        let mut new = article.clone();
        new.ticket_id = ticket_id;
        self.articles
            .push(Article::from_new(id, position, new, Utc::now()));
        Ok(id)
    }
}

/// JSON-snapshot store. `in_memory()` never touches disk.
pub struct JsonStore {
    path: Option<PathBuf>,
    cache: RwLock<StoreData>,
}

impl JsonStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            cache: RwLock::new(StoreData::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            cache: RwLock::new(StoreData::default()),
        }
    }

    /// Load the snapshot from disk. A missing file starts empty; a corrupt one is an error.
    pub async fn load(&self) -> Result<(), DomainError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let data = match fs::read_to_string(path).await {
            Ok(s) => serde_json::from_str(&s)
                .map_err(|e| DomainError::Repo(format!("parse {}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(DomainError::Repo(e.to_string())),
        };
        *self.cache.write().await = data;
        info!(path = %path.display(), "JSON store loaded");
        Ok(())
    }

    /// Write-replace: temp file, `sync_all`, atomic rename.
    async fn persist(&self, data: &StoreData) -> Result<(), DomainError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let json =
            serde_json::to_string_pretty(data).map_err(|e| DomainError::Repo(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::Repo(format!("create dir: {}", e)))?;
        }
        let temp_path = path.with_extension("json.tmp");
        let mut f = fs::File::create(&temp_path)
            .await
            .map_err(|e| DomainError::Repo(format!("create temp file: {}", e)))?;
        f.write_all(json.as_bytes())
            .await
            .map_err(|e| DomainError::Repo(format!("write temp file: {}", e)))?;
        f.sync_all()
            .await
            .map_err(|e| DomainError::Repo(format!("sync temp file: {}", e)))?;
        drop(f);
        fs::rename(&temp_path, path)
            .await
            .map_err(|e| DomainError::Repo(format!("atomic rename failed: {}", e)))?;
        Ok(())
    }

    /// Apply `f` to a copy of the data, persist, then publish the copy.
    async fn mutate<T, F>(&self, f: F) -> Result<T, DomainError>
    where
        F: FnOnce(&mut StoreData) -> Result<T, DomainError>,
    {
        let mut cache = self.cache.write().await;
        let mut next = cache.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *cache = next;
        Ok(out)
    }

    pub async fn create_user(
        &self,
        role: Role,
        firstname: &str,
        lastname: &str,
        email: Option<&str>,
    ) -> Result<Actor, DomainError> {
        self.mutate(|d| {
            let user = Actor {
                id: d.next_id(),
                role,
                firstname: firstname.to_string(),
                lastname: lastname.to_string(),
                email: email.map(String::from),
            };
            d.users.insert(user.id, user.clone());
            Ok(user)
        })
        .await
    }

    pub async fn create_signature(
        &self,
        name: &str,
        body: &str,
        active: bool,
    ) -> Result<Signature, DomainError> {
        self.mutate(|d| {
            let sig = Signature {
                id: d.next_id(),
                name: name.to_string(),
                body: body.to_string(),
                active,
            };
            d.signatures.insert(sig.id, sig.clone());
            Ok(sig)
        })
        .await
    }

    pub async fn create_group(
        &self,
        name: &str,
        signature_id: Option<i64>,
    ) -> Result<Group, DomainError> {
        self.mutate(|d| {
            let group = Group {
                id: d.next_id(),
                name: name.to_string(),
                signature_id,
            };
            d.groups.insert(group.id, group.clone());
            Ok(group)
        })
        .await
    }

    pub async fn create_ticket(
        &self,
        title: &str,
        group_id: i64,
        customer_id: i64,
        owner_id: Option<i64>,
    ) -> Result<Ticket, DomainError> {
        self.create_ticket_from(title, group_id, customer_id, owner_id, None)
            .await
    }

    /// Ticket that came in through `origin` (Sms, Telegram, Twitter...).
    pub async fn create_ticket_from(
        &self,
        title: &str,
        group_id: i64,
        customer_id: i64,
        owner_id: Option<i64>,
        origin: Option<Channel>,
    ) -> Result<Ticket, DomainError> {
        self.mutate(|d| {
            if !d.groups.contains_key(&group_id) {
                return Err(DomainError::not_found("group", group_id));
            }
            let ticket = Ticket {
                id: d.next_id(),
                title: title.to_string(),
                group_id,
                customer_id,
                owner_id,
                origin,
            };
            d.tickets.insert(ticket.id, ticket.clone());
            Ok(ticket)
        })
        .await
    }

    pub async fn create_text_module(
        &self,
        name: &str,
        keywords: &str,
        content: &str,
    ) -> Result<TextModule, DomainError> {
        self.mutate(|d| {
            let module = TextModule {
                id: d.next_id(),
                name: name.to_string(),
                keywords: keywords.to_string(),
                content: content.to_string(),
                active: true,
            };
            d.text_modules.insert(module.id, module.clone());
            Ok(module)
        })
        .await
    }
}

#[async_trait::async_trait]
impl ArticleStore for JsonStore {
    async fn append(&self, ticket_id: i64, article: &NewArticle) -> Result<i64, DomainError> {
        let id = self.mutate(|d| d.push_article(ticket_id, article)).await?;
        debug!(ticket_id, article_id = id, "article appended (json)");
        Ok(id)
    }

    async fn get_article(&self, article_id: i64) -> Result<Option<Article>, DomainError> {
        let cache = self.cache.read().await;
        Ok(cache.articles.iter().find(|a| a.id == article_id).cloned())
    }

    async fn mark_deleted(&self, article_id: i64) -> Result<bool, DomainError> {
        self.mutate(|d| {
            let article = d
                .articles
                .iter_mut()
                .find(|a| a.id == article_id)
                .ok_or_else(|| DomainError::not_found("article", article_id))?;
            if article.is_deleted() {
                return Ok(false);
            }
            article.deleted_at = Some(Utc::now());
            Ok(true)
        })
        .await
    }

    async fn list_ordered(
        &self,
        ticket_id: i64,
        include_deleted: bool,
    ) -> Result<Vec<Article>, DomainError> {
        let cache = self.cache.read().await;
        let mut out: Vec<Article> = cache
            .articles
            .iter()
            .filter(|a| a.ticket_id == ticket_id && (include_deleted || !a.is_deleted()))
            .cloned()
            .collect();
        out.sort_by_key(|a| a.position);
        Ok(out)
    }
}

#[async_trait::async_trait]
impl TicketRepo for JsonStore {
    async fn get_ticket(&self, ticket_id: i64) -> Result<Option<Ticket>, DomainError> {
        Ok(self.cache.read().await.tickets.get(&ticket_id).cloned())
    }

    async fn get_group(&self, group_id: i64) -> Result<Option<Group>, DomainError> {
        Ok(self.cache.read().await.groups.get(&group_id).cloned())
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<Actor>, DomainError> {
        Ok(self.cache.read().await.users.get(&user_id).cloned())
    }

    async fn update_ticket(
        &self,
        ticket_id: i64,
        changes: &TicketChanges,
        article: Option<&NewArticle>,
    ) -> Result<Option<i64>, DomainError> {
        self.mutate(|d| {
            if let Some(group_id) = changes.group_id {
                if !d.groups.contains_key(&group_id) {
                    return Err(DomainError::not_found("group", group_id));
                }
            }
            let ticket = d
                .tickets
                .get_mut(&ticket_id)
                .ok_or_else(|| DomainError::not_found("ticket", ticket_id))?;
            changes.apply_to(ticket);
            article.map(|a| d.push_article(ticket_id, a)).transpose()
        })
        .await
    }
}

#[async_trait::async_trait]
impl SignatureLookup for JsonStore {
    async fn active_signature_for(&self, group_id: i64) -> Result<Option<Signature>, DomainError> {
        let cache = self.cache.read().await;
        Ok(cache
            .groups
            .get(&group_id)
            .and_then(|g| g.signature_id)
            .and_then(|id| cache.signatures.get(&id))
            .filter(|s| s.active)
            .cloned())
    }
}

#[async_trait::async_trait]
impl TextModuleLookup for JsonStore {
    async fn search_text_modules(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TextModule>, DomainError> {
        let cache = self.cache.read().await;
        let mut out: Vec<TextModule> = cache
            .text_modules
            .values()
            .filter(|m| m.active && m.matches(query))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out.truncate(limit);
        Ok(out)
    }

    async fn get_text_module(&self, module_id: i64) -> Result<Option<TextModule>, DomainError> {
        Ok(self.cache.read().await.text_modules.get(&module_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentType, Sender, Visibility};

    fn note(ticket_id: i64, body: &str) -> NewArticle {
        NewArticle {
            ticket_id,
            channel: Channel::Note,
            visibility: Visibility::Internal,
            sender: Sender::Agent,
            content_type: ContentType::Html,
            body: body.to_string(),
            to: None,
            cc: None,
            attachments: vec![],
            created_by: 1,
        }
    }

    async fn seeded(store: &JsonStore) -> Ticket {
        let customer = store
            .create_user(Role::Customer, "Nicole", "Braun", None)
            .await
            .unwrap();
        let group = store.create_group("Users", None).await.unwrap();
        store
            .create_ticket("Welcome", group.id, customer.id, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_positions_survive_deletion() {
        let store = JsonStore::in_memory();
        let ticket = seeded(&store).await;
        let a1 = store.append(ticket.id, &note(ticket.id, "1")).await.unwrap();
        let a2 = store.append(ticket.id, &note(ticket.id, "2")).await.unwrap();
        assert!(store.mark_deleted(a2).await.unwrap());
        assert!(!store.mark_deleted(a2).await.unwrap());
        let a3 = store.append(ticket.id, &note(ticket.id, "3")).await.unwrap();

        let visible = store.list_ordered(ticket.id, false).await.unwrap();
        assert_eq!(
            visible.iter().map(|a| (a.id, a.position)).collect::<Vec<_>>(),
            vec![(a1, 1), (a3, 3)]
        );
        let all = store.list_ordered(ticket.id, true).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(store.get_article(a2).await.unwrap().unwrap().is_deleted());
    }

    #[tokio::test]
    async fn test_mark_deleted_unknown() {
        let store = JsonStore::in_memory();
        assert!(matches!(
            store.mark_deleted(99).await,
            Err(DomainError::NotFound { entity: "article", id: 99 })
        ));
    }

    #[tokio::test]
    async fn test_update_ticket_is_atomic() {
        let store = JsonStore::in_memory();
        let ticket = seeded(&store).await;
        let changes = TicketChanges {
            title: Some("New title".into()),
            group_id: Some(12345),
            ..TicketChanges::default()
        };
        let res = store
            .update_ticket(ticket.id, &changes, Some(&note(ticket.id, "x")))
            .await;
        assert!(res.is_err());
        let unchanged = store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(unchanged.title, "Welcome");
        assert!(store.list_ordered(ticket.id, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let ticket_id = {
            let store = JsonStore::new(&path);
            store.load().await.unwrap();
            let ticket = seeded(&store).await;
            store.append(ticket.id, &note(ticket.id, "kept")).await.unwrap();
            ticket.id
        };
        let reopened = JsonStore::new(&path);
        reopened.load().await.unwrap();
        let articles = reopened.list_ordered(ticket_id, false).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].body, "kept");
    }

    #[tokio::test]
    async fn test_inactive_signature_hidden() {
        let store = JsonStore::in_memory();
        let sig = store.create_signature("s", "x", false).await.unwrap();
        let group = store.create_group("g", Some(sig.id)).await.unwrap();
        assert_eq!(store.active_signature_for(group.id).await.unwrap(), None);
    }
}
