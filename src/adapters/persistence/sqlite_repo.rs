//! SQLite-backed store via libsql. Implements the article, ticket, signature and
//! text-module ports.
//!
//! One database file: data/articles.db. Articles are an append-only table with a
//! per-ticket `position` (UNIQUE with ticket_id) and a nullable `deleted_at`.
//! Every mutation runs in a single transaction.

use crate::domain::{
    Actor, Article, AttachmentRef, Channel, ContentType, DomainError, Group, NewArticle, Role,
    Sender, Signature, TextModule, Ticket, TicketChanges, Visibility,
};
use crate::ports::{ArticleStore, SignatureLookup, TextModuleLookup, TicketRepo};
use chrono::{DateTime, TimeZone, Utc};
use libsql::{Connection, Database, Row, params};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    role TEXT NOT NULL,
    firstname TEXT NOT NULL DEFAULT '',
    lastname TEXT NOT NULL DEFAULT '',
    email TEXT
)"#,
    r#"
CREATE TABLE IF NOT EXISTS signatures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    body TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
)"#,
    r#"
CREATE TABLE IF NOT EXISTS agent_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    signature_id INTEGER REFERENCES signatures (id)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS tickets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    group_id INTEGER NOT NULL REFERENCES agent_groups (id),
    customer_id INTEGER NOT NULL,
    owner_id INTEGER,
    origin TEXT
)"#,
    r#"
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticket_id INTEGER NOT NULL REFERENCES tickets (id),
    position INTEGER NOT NULL,
    channel TEXT NOT NULL,
    internal INTEGER NOT NULL,
    sender TEXT NOT NULL,
    content_type TEXT NOT NULL,
    body TEXT NOT NULL,
    to_addr TEXT,
    cc_addr TEXT,
    attachments_json TEXT NOT NULL DEFAULT '[]',
    created_by INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    deleted_at INTEGER,
    UNIQUE (ticket_id, position)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS text_modules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    keywords TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
)"#,
];

const ARTICLE_COLUMNS: &str = "id, ticket_id, position, channel, internal, sender, content_type, \
     body, to_addr, cc_addr, attachments_json, created_by, created_at, deleted_at";

fn repo_err(e: impl std::fmt::Display) -> DomainError {
    DomainError::Repo(e.to_string())
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// SQLite store. One database file (articles.db) in the given base directory.
pub struct SqliteStore {
    db: Database,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Connect to (or create) the database and ensure the schema exists.
    /// Call once at startup; the returned store is safe to share via Arc.
    pub async fn connect(base_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(repo_err)?;
        let db_path = base.join("articles.db");
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(repo_err)?;
        let conn = db.connect().map_err(repo_err)?;

        // PRAGMA returns a row; consume it (execute fails when rows are returned).
        for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL"] {
            let mut rows = conn
                .query(pragma, ())
                .await
                .map_err(|e| DomainError::Repo(format!("{} failed: {}", pragma, e)))?;
            while rows.next().await.map_err(repo_err)?.is_some() {}
        }

        for ddl in SCHEMA {
            conn.execute(ddl, ()).await.map_err(repo_err)?;
        }

        info!(path = %db_path.display(), "SQLite connected with WAL mode");

        Ok(Self { db, db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<Connection, DomainError> {
        self.db.connect().map_err(repo_err)
    }

    /// Insert within an open transaction/connection at the next position of the ticket.
    async fn insert_article(
        conn: &Connection,
        ticket_id: i64,
        article: &NewArticle,
    ) -> Result<i64, DomainError> {
        let mut rows = conn
            .query(
                "SELECT COALESCE(MAX(position), 0) + 1 FROM articles WHERE ticket_id = ?1",
                params![ticket_id],
            )
            .await
            .map_err(repo_err)?;
        let position: i64 = match rows.next().await.map_err(repo_err)? {
            Some(row) => row.get(0).map_err(repo_err)?,
            None => 1,
        };
        let attachments_json =
            serde_json::to_string(&article.attachments).map_err(repo_err)?;
        conn.execute(
            r#"
            INSERT INTO articles (ticket_id, position, channel, internal, sender, content_type,
                                  body, to_addr, cc_addr, attachments_json, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                ticket_id,
                position,
                article.channel.name(),
                article.visibility.is_internal() as i64,
                article.sender.as_str(),
                article.content_type.mime(),
                article.body.as_str(),
                article.to.clone(),
                article.cc.clone(),
                attachments_json,
                article.created_by,
                Utc::now().timestamp_millis()
            ],
        )
        .await
        .map_err(repo_err)?;
        Ok(conn.last_insert_rowid())
    }

    async fn ticket_exists(conn: &Connection, ticket_id: i64) -> Result<bool, DomainError> {
        let mut rows = conn
            .query("SELECT 1 FROM tickets WHERE id = ?1", params![ticket_id])
            .await
            .map_err(repo_err)?;
        Ok(rows.next().await.map_err(repo_err)?.is_some())
    }

    fn row_to_article(row: &Row) -> Result<Article, DomainError> {
        let channel: String = row.get(3).map_err(repo_err)?;
        let sender: String = row.get(5).map_err(repo_err)?;
        let content_type: String = row.get(6).map_err(repo_err)?;
        let internal: i64 = row.get(4).map_err(repo_err)?;
        let attachments_json: String = row.get(10).map_err(repo_err)?;
        let attachments: Vec<AttachmentRef> = serde_json::from_str(&attachments_json)
            .map_err(|e| DomainError::Repo(format!("attachments of article: {}", e)))?;
        let created_at: i64 = row.get(12).map_err(repo_err)?;
        let deleted_at: Option<i64> = row.get(13).ok();
        Ok(Article {
            id: row.get(0).map_err(repo_err)?,
            ticket_id: row.get(1).map_err(repo_err)?,
            position: row.get(2).map_err(repo_err)?,
            channel: channel.parse::<Channel>().map_err(repo_err)?,
            visibility: if internal != 0 {
                Visibility::Internal
            } else {
                Visibility::Public
            },
            sender: Sender::parse(&sender)
                .ok_or_else(|| DomainError::Repo(format!("unknown sender: {}", sender)))?,
            content_type: ContentType::from_mime(&content_type)
                .ok_or_else(|| DomainError::Repo(format!("unknown content type: {}", content_type)))?,
            body: row.get::<String>(7).unwrap_or_default(),
            to: row.get(8).ok(),
            cc: row.get(9).ok(),
            attachments,
            created_by: row.get(11).map_err(repo_err)?,
            created_at: millis_to_utc(created_at),
            deleted_at: deleted_at.map(millis_to_utc),
        })
    }

    fn row_to_text_module(row: &Row) -> Result<TextModule, DomainError> {
        let active: i64 = row.get(4).map_err(repo_err)?;
        Ok(TextModule {
            id: row.get(0).map_err(repo_err)?,
            name: row.get(1).map_err(repo_err)?,
            keywords: row.get::<String>(2).unwrap_or_default(),
            content: row.get(3).map_err(repo_err)?,
            active: active != 0,
        })
    }

    pub async fn create_user(
        &self,
        role: Role,
        firstname: &str,
        lastname: &str,
        email: Option<&str>,
    ) -> Result<Actor, DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (role, firstname, lastname, email) VALUES (?1, ?2, ?3, ?4)",
            params![role.as_str(), firstname, lastname, email.map(String::from)],
        )
        .await
        .map_err(repo_err)?;
        Ok(Actor {
            id: conn.last_insert_rowid(),
            role,
            firstname: firstname.to_string(),
            lastname: lastname.to_string(),
            email: email.map(String::from),
        })
    }

    pub async fn create_signature(
        &self,
        name: &str,
        body: &str,
        active: bool,
    ) -> Result<Signature, DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO signatures (name, body, active) VALUES (?1, ?2, ?3)",
            params![name, body, active as i64],
        )
        .await
        .map_err(repo_err)?;
        Ok(Signature {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            body: body.to_string(),
            active,
        })
    }

    pub async fn create_group(
        &self,
        name: &str,
        signature_id: Option<i64>,
    ) -> Result<Group, DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO agent_groups (name, signature_id) VALUES (?1, ?2)",
            params![name, signature_id],
        )
        .await
        .map_err(repo_err)?;
        Ok(Group {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            signature_id,
        })
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
        if self.get_group(group_id).await?.is_none() {
            return Err(DomainError::not_found("group", group_id));
        }
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tickets (title, group_id, customer_id, owner_id, origin) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                title,
                group_id,
                customer_id,
                owner_id,
                origin.map(|c| c.name().to_string())
            ],
        )
        .await
        .map_err(repo_err)?;
        Ok(Ticket {
            id: conn.last_insert_rowid(),
            title: title.to_string(),
            group_id,
            customer_id,
            owner_id,
            origin,
        })
    }

    pub async fn create_text_module(
        &self,
        name: &str,
        keywords: &str,
        content: &str,
    ) -> Result<TextModule, DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO text_modules (name, keywords, content, active) VALUES (?1, ?2, ?3, 1)",
            params![name, keywords, content],
        )
        .await
        .map_err(repo_err)?;
        Ok(TextModule {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            keywords: keywords.to_string(),
            content: content.to_string(),
            active: true,
        })
    }
}

#[async_trait::async_trait]
impl ArticleStore for SqliteStore {
    async fn append(&self, ticket_id: i64, article: &NewArticle) -> Result<i64, DomainError> {
        let conn = self.conn()?;
        let tx = conn.transaction().await.map_err(repo_err)?;
        if !Self::ticket_exists(&tx, ticket_id).await? {
            return Err(DomainError::not_found("ticket", ticket_id));
        }
        let id = Self::insert_article(&tx, ticket_id, article).await?;
        tx.commit().await.map_err(repo_err)?;
        debug!(ticket_id, article_id = id, "article appended (sqlite)");
        Ok(id)
    }

    async fn get_article(&self, article_id: i64) -> Result<Option<Article>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS),
                params![article_id],
            )
            .await
            .map_err(repo_err)?;
        match rows.next().await.map_err(repo_err)? {
            Some(row) => Ok(Some(Self::row_to_article(&row)?)),
            None => Ok(None),
        }
    }

    async fn mark_deleted(&self, article_id: i64) -> Result<bool, DomainError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE articles SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![Utc::now().timestamp_millis(), article_id],
            )
            .await
            .map_err(repo_err)?;
        if changed > 0 {
            return Ok(true);
        }
        match self.get_article(article_id).await? {
            Some(_) => Ok(false),
            None => Err(DomainError::not_found("article", article_id)),
        }
    }

    async fn list_ordered(
        &self,
        ticket_id: i64,
        include_deleted: bool,
    ) -> Result<Vec<Article>, DomainError> {
        let conn = self.conn()?;
        let filter = if include_deleted {
            ""
        } else {
            " AND deleted_at IS NULL"
        };
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {} FROM articles WHERE ticket_id = ?1{} ORDER BY position ASC",
                    ARTICLE_COLUMNS, filter
                ),
                params![ticket_id],
            )
            .await
            .map_err(repo_err)?;
        let mut articles = Vec::new();
        while let Some(row) = rows.next().await.map_err(repo_err)? {
            articles.push(Self::row_to_article(&row)?);
        }
        Ok(articles)
    }
}

#[async_trait::async_trait]
impl TicketRepo for SqliteStore {
    async fn get_ticket(&self, ticket_id: i64) -> Result<Option<Ticket>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, title, group_id, customer_id, owner_id, origin FROM tickets WHERE id = ?1",
                params![ticket_id],
            )
            .await
            .map_err(repo_err)?;
        let Some(row) = rows.next().await.map_err(repo_err)? else {
            return Ok(None);
        };
        let origin = match row.get::<String>(5).ok() {
            Some(name) => Some(name.parse::<Channel>().map_err(repo_err)?),
            None => None,
        };
        Ok(Some(Ticket {
            id: row.get(0).map_err(repo_err)?,
            title: row.get(1).map_err(repo_err)?,
            group_id: row.get(2).map_err(repo_err)?,
            customer_id: row.get(3).map_err(repo_err)?,
            owner_id: row.get(4).ok(),
            origin,
        }))
    }

    async fn get_group(&self, group_id: i64) -> Result<Option<Group>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, name, signature_id FROM agent_groups WHERE id = ?1",
                params![group_id],
            )
            .await
            .map_err(repo_err)?;
        let Some(row) = rows.next().await.map_err(repo_err)? else {
            return Ok(None);
        };
        Ok(Some(Group {
            id: row.get(0).map_err(repo_err)?,
            name: row.get(1).map_err(repo_err)?,
            signature_id: row.get(2).ok(),
        }))
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<Actor>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, role, firstname, lastname, email FROM users WHERE id = ?1",
                params![user_id],
            )
            .await
            .map_err(repo_err)?;
        let Some(row) = rows.next().await.map_err(repo_err)? else {
            return Ok(None);
        };
        let role: String = row.get(1).map_err(repo_err)?;
        let role = match role.as_str() {
            "agent" => Role::Agent,
            "customer" => Role::Customer,
            other => return Err(DomainError::Repo(format!("unknown role: {}", other))),
        };
        Ok(Some(Actor {
            id: row.get(0).map_err(repo_err)?,
            role,
            firstname: row.get::<String>(2).unwrap_or_default(),
            lastname: row.get::<String>(3).unwrap_or_default(),
            email: row.get(4).ok(),
        }))
    }

    async fn update_ticket(
        &self,
        ticket_id: i64,
        changes: &TicketChanges,
        article: Option<&NewArticle>,
    ) -> Result<Option<i64>, DomainError> {
        let conn = self.conn()?;
        let tx = conn.transaction().await.map_err(repo_err)?;
        if !Self::ticket_exists(&tx, ticket_id).await? {
            return Err(DomainError::not_found("ticket", ticket_id));
        }
        if let Some(group_id) = changes.group_id {
            let mut rows = tx
                .query("SELECT 1 FROM agent_groups WHERE id = ?1", params![group_id])
                .await
                .map_err(repo_err)?;
            if rows.next().await.map_err(repo_err)?.is_none() {
                return Err(DomainError::not_found("group", group_id));
            }
        }
        tx.execute(
            r#"
            UPDATE tickets SET
                title = COALESCE(?1, title),
                group_id = COALESCE(?2, group_id),
                owner_id = COALESCE(?3, owner_id)
            WHERE id = ?4
            "#,
            params![
                changes.title.clone(),
                changes.group_id,
                changes.owner_id,
                ticket_id
            ],
        )
        .await
        .map_err(repo_err)?;
        let article_id = match article {
            Some(a) => Some(Self::insert_article(&tx, ticket_id, a).await?),
            None => None,
        };
        tx.commit().await.map_err(repo_err)?;
        Ok(article_id)
    }
}

#[async_trait::async_trait]
impl SignatureLookup for SqliteStore {
    async fn active_signature_for(&self, group_id: i64) -> Result<Option<Signature>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                r#"
                SELECT s.id, s.name, s.body
                FROM agent_groups g JOIN signatures s ON s.id = g.signature_id
                WHERE g.id = ?1 AND s.active = 1
                "#,
                params![group_id],
            )
            .await
            .map_err(repo_err)?;
        let Some(row) = rows.next().await.map_err(repo_err)? else {
            return Ok(None);
        };
        Ok(Some(Signature {
            id: row.get(0).map_err(repo_err)?,
            name: row.get(1).map_err(repo_err)?,
            body: row.get(2).map_err(repo_err)?,
            active: true,
        }))
    }
}

#[async_trait::async_trait]
impl TextModuleLookup for SqliteStore {
    async fn search_text_modules(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<TextModule>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, name, keywords, content, active FROM text_modules WHERE active = 1 ORDER BY name",
                (),
            )
            .await
            .map_err(repo_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(repo_err)? {
            let module = Self::row_to_text_module(&row)?;
            if module.matches(query) {
                out.push(module);
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    async fn get_text_module(&self, module_id: i64) -> Result<Option<TextModule>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT id, name, keywords, content, active FROM text_modules WHERE id = ?1",
                params![module_id],
            )
            .await
            .map_err(repo_err)?;
        match rows.next().await.map_err(repo_err)? {
            Some(row) => Ok(Some(Self::row_to_text_module(&row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = SqliteStore::connect(dir.path()).await.unwrap();
        assert!(first.path().ends_with("articles.db"));
        drop(first);
        SqliteStore::connect(dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_article_row_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(dir.path()).await.unwrap();
        let customer = store
            .create_user(Role::Customer, "Nicole", "Braun", Some("nb@example.com"))
            .await
            .unwrap();
        let group = store.create_group("Users", None).await.unwrap();
        let ticket = store
            .create_ticket("Welcome", group.id, customer.id, None)
            .await
            .unwrap();
        let new = NewArticle {
            ticket_id: ticket.id,
            channel: Channel::Email,
            visibility: Visibility::Public,
            sender: Sender::Agent,
            content_type: ContentType::Html,
            body: "<p>hi</p>".into(),
            to: Some("a@b.c".into()),
            cc: None,
            attachments: vec![AttachmentRef {
                store_key: "k".into(),
                filename: "f.txt".into(),
                mime_type: "text/plain".into(),
                size: 1,
            }],
            created_by: 1,
        };
        let id = store.append(ticket.id, &new).await.unwrap();
        let got = store.get_article(id).await.unwrap().unwrap();
        assert_eq!(got.position, 1);
        assert_eq!(got.channel, Channel::Email);
        assert_eq!(got.to.as_deref(), Some("a@b.c"));
        assert_eq!(got.cc, None);
        assert_eq!(got.attachments, new.attachments);
        assert!(!got.is_deleted());

        let user = store.get_user(customer.id).await.unwrap().unwrap();
        assert_eq!(user, customer);
    }

    #[tokio::test]
    async fn test_corrupt_attachments_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(dir.path()).await.unwrap();
        let group = store.create_group("Users", None).await.unwrap();
        let ticket = store.create_ticket("t", group.id, 1, None).await.unwrap();
        let conn = store.conn().unwrap();
        conn.execute(
            r#"
            INSERT INTO articles (ticket_id, position, channel, internal, sender, content_type,
                                  body, attachments_json, created_by, created_at)
            VALUES (?1, 1, 'note', 1, 'Agent', 'text/html', '<p>x</p>', 'not json', 1, 0)
            "#,
            params![ticket.id],
        )
        .await
        .unwrap();
        let id = conn.last_insert_rowid();
        assert!(matches!(
            store.get_article(id).await,
            Err(DomainError::Repo(_))
        ));
        assert!(matches!(
            store.list_ordered(ticket.id, true).await,
            Err(DomainError::Repo(_))
        ));
    }

    #[tokio::test]
    async fn test_ticket_origin_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(dir.path()).await.unwrap();
        let group = store.create_group("Users", None).await.unwrap();
        let plain = store.create_ticket("web", group.id, 1, None).await.unwrap();
        let sms = store
            .create_ticket_from("sms", group.id, 1, None, Some(Channel::Sms))
            .await
            .unwrap();
        assert_eq!(store.get_ticket(plain.id).await.unwrap().unwrap().origin, None);
        assert_eq!(store.get_ticket(sms.id).await.unwrap().unwrap(), sms);
    }

    #[tokio::test]
    async fn test_append_unknown_ticket() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(dir.path()).await.unwrap();
        let new = NewArticle {
            ticket_id: 77,
            channel: Channel::Note,
            visibility: Visibility::Internal,
            sender: Sender::Agent,
            content_type: ContentType::Html,
            body: "<p>x</p>".into(),
            to: None,
            cc: None,
            attachments: vec![],
            created_by: 1,
        };
        assert!(matches!(
            store.append(77, &new).await,
            Err(DomainError::NotFound { entity: "ticket", .. })
        ));
    }
}
