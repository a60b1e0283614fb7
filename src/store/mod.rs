//! 文档持久化：课程树与各派生产物按整份文档存取
//!
//! 派生产物通过 owner_id 指回所属课程树；删除课程树时级联删除其产物。
//! 列表按创建时间倒序，可按种类、学科、所属课程树过滤。

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::CurriculumError;

pub type StoreResult<T> = Result<T, CurriculumError>;

/// 文档种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Tree,
    Flow,
    Allocation,
    Criteria,
    Schedule,
}

impl DocumentKind {
    fn as_db(&self) -> &'static str {
        match self {
            DocumentKind::Tree => "tree",
            DocumentKind::Flow => "flow",
            DocumentKind::Allocation => "allocation",
            DocumentKind::Criteria => "criteria",
            DocumentKind::Schedule => "schedule",
        }
    }

    fn from_db(s: &str) -> Option<Self> {
        match s {
            "tree" => Some(DocumentKind::Tree),
            "flow" => Some(DocumentKind::Flow),
            "allocation" => Some(DocumentKind::Allocation),
            "criteria" => Some(DocumentKind::Criteria),
            "schedule" => Some(DocumentKind::Schedule),
            _ => None,
        }
    }
}

/// 存储的一份文档
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDocument {
    pub id: String,
    pub kind: DocumentKind,
    /// 派生产物所属的课程树 id；课程树本身为 None
    pub owner_id: Option<String>,
    pub subject: String,
    pub body: Value,
    pub created_at: String,
}

impl StoredDocument {
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// 新文档
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub kind: DocumentKind,
    pub owner_id: Option<String>,
    pub subject: String,
    pub body: Value,
}

impl NewDocument {
    pub fn new(kind: DocumentKind, subject: impl Into<String>, body: impl Serialize) -> StoreResult<Self> {
        Ok(Self {
            kind,
            owner_id: None,
            subject: subject.into(),
            body: serde_json::to_value(body)?,
        })
    }

    pub fn owned_by(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }
}

/// 列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub kind: Option<DocumentKind>,
    pub subject: Option<String>,
    pub owner_id: Option<String>,
}

/// 文档仓库
pub trait DocumentStore {
    fn create(&self, doc: NewDocument) -> StoreResult<String>;
    fn get(&self, id: &str) -> StoreResult<Option<StoredDocument>>;
    fn update(&self, id: &str, body: &Value) -> StoreResult<()>;
    fn delete(&self, id: &str) -> StoreResult<()>;
    fn list(&self, query: &DocumentQuery) -> StoreResult<Vec<StoredDocument>>;
}

const SELECT_SQL: &str = "SELECT id, kind, owner_id, subject, body, created_at FROM documents";

/// SQLite 实现
pub struct SqliteDocumentStore {
    conn: Connection,
}

impl SqliteDocumentStore {
    /// 打开（必要时创建）数据库文件，父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CurriculumError::Store(e.to_string()))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                owner_id TEXT REFERENCES documents(id) ON DELETE CASCADE,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);
             CREATE INDEX IF NOT EXISTS idx_documents_subject ON documents(subject);",
        )?;
        Ok(Self { conn })
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn create(&self, doc: NewDocument) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        self.conn.execute(
            "INSERT INTO documents (id, kind, owner_id, subject, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                doc.kind.as_db(),
                doc.owner_id,
                doc.subject,
                doc.body.to_string(),
                created_at,
            ],
        )?;
        Ok(id)
    }

    fn get(&self, id: &str) -> StoreResult<Option<StoredDocument>> {
        let mut stmt = self.conn.prepare(&format!("{SELECT_SQL} WHERE id = ?1"))?;
        let raw = stmt.query_row(params![id], raw_row).optional()?;
        raw.map(RawDocument::into_document).transpose()
    }

    fn update(&self, id: &str, body: &Value) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE documents SET body = ?1 WHERE id = ?2",
            params![body.to_string(), id],
        )?;
        if changed == 0 {
            return Err(CurriculumError::Store(format!("document not found: {id}")));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(CurriculumError::Store(format!("document not found: {id}")));
        }
        Ok(())
    }

    fn list(&self, query: &DocumentQuery) -> StoreResult<Vec<StoredDocument>> {
        let mut sql = format!("{SELECT_SQL} WHERE 1 = 1");
        let mut binds: Vec<SqlValue> = Vec::new();

        if let Some(kind) = query.kind {
            binds.push(SqlValue::Text(kind.as_db().to_string()));
            sql.push_str(&format!(" AND kind = ?{}", binds.len()));
        }
        if let Some(subject) = &query.subject {
            binds.push(SqlValue::Text(subject.clone()));
            sql.push_str(&format!(" AND subject = ?{}", binds.len()));
        }
        if let Some(owner_id) = &query.owner_id {
            binds.push(SqlValue::Text(owner_id.clone()));
            sql.push_str(&format!(" AND owner_id = ?{}", binds.len()));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params_from_iter(binds), raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawDocument::into_document).collect()
    }
}

struct RawDocument {
    id: String,
    kind: String,
    owner_id: Option<String>,
    subject: String,
    body: String,
    created_at: String,
}

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawDocument> {
    Ok(RawDocument {
        id: row.get(0)?,
        kind: row.get(1)?,
        owner_id: row.get(2)?,
        subject: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl RawDocument {
    fn into_document(self) -> StoreResult<StoredDocument> {
        let kind = DocumentKind::from_db(&self.kind).ok_or_else(|| {
            CurriculumError::Store(format!("invalid document kind: {}", self.kind))
        })?;
        Ok(StoredDocument {
            id: self.id,
            kind,
            owner_id: self.owner_id,
            subject: self.subject,
            body: serde_json::from_str(&self.body)?,
            created_at: self.created_at,
        })
    }
}
