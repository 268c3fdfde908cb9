//! Redemption codes and the redeem operation.
//!
//! A code flips from unused to used exactly once. The flip, the ledger write
//! and the token issue all happen under one lock, and the book is reloaded
//! from the repository inside that lock so edits made by `codedrop codes`
//! while the server runs are picked up.

pub mod codes;
pub mod repository;

use crate::errors::GatewayError;
use crate::guard::ProtectedFiles;
use crate::tokens::{self, TokenRecord, TokenStore};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

pub use repository::{JsonFileRepository, LedgerRepository, MemoryRepository};

/// When a code was used. Hand-edited values that are not RFC 3339 are kept
/// verbatim rather than failing the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UsedAt {
    At(DateTime<Utc>),
    Raw(Value),
}

impl UsedAt {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            UsedAt::At(at) => Some(*at),
            UsedAt::Raw(_) => None,
        }
    }
}

impl fmt::Display for UsedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsedAt::At(at) => write!(f, "{}", at.to_rfc3339()),
            UsedAt::Raw(Value::String(raw)) => write!(f, "{}", raw),
            UsedAt::Raw(raw) => write!(f, "{}", raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRecord {
    pub code: String,
    #[serde(default)]
    pub used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<UsedAt>,
    // Operator fields ("note", "batch", ...) survive rewrites
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CodeRecord {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            used: false,
            used_at: None,
            extra: Map::new(),
        }
    }

    pub fn mark_used(&mut self) {
        self.used = true;
        self.used_at = Some(UsedAt::At(Utc::now()));
    }
}

/// The persisted document, `{"codes": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeBook {
    #[serde(default)]
    pub codes: Vec<CodeRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CodeBook {
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut book = Self::default();
        for code in codes {
            book.insert(code);
        }
        book
    }

    pub fn find(&self, code: &str) -> Option<&CodeRecord> {
        self.codes.iter().find(|c| c.code == code)
    }

    pub fn find_mut(&mut self, code: &str) -> Option<&mut CodeRecord> {
        self.codes.iter_mut().find(|c| c.code == code)
    }

    /// Add an unused code. Returns false if it was already present.
    pub fn insert(&mut self, code: impl Into<String>) -> bool {
        let code = code.into();
        if self.find(&code).is_some() {
            return false;
        }
        self.codes.push(CodeRecord::new(code));
        true
    }

    pub fn used_count(&self) -> usize {
        self.codes.iter().filter(|c| c.used).count()
    }
}

pub struct Ledger {
    repo: Arc<dyn LedgerRepository>,
    tokens: TokenStore,
    files: ProtectedFiles,
    // Serializes load-modify-save
    write_lock: Mutex<()>,
}

impl Ledger {
    pub fn new(repo: Arc<dyn LedgerRepository>, tokens: TokenStore, files: ProtectedFiles) -> Self {
        Self {
            repo,
            tokens,
            files,
            write_lock: Mutex::new(()),
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn files(&self) -> &ProtectedFiles {
        &self.files
    }

    /// Redeem `code` for a download token on `img`.
    pub async fn redeem(&self, code: &str, img: &str) -> Result<TokenRecord, GatewayError> {
        let file = self.files.resolve(img).await?;

        let _guard = self.write_lock.lock().await;
        let mut book = self.load().await?;

        let record = book.find_mut(code).ok_or(GatewayError::InvalidCode)?;
        if record.used {
            return Err(GatewayError::CodeAlreadyUsed);
        }

        // Issue before flipping the code, a full store must not burn it
        let issued = self.tokens.issue(&file.name)?;
        record.mark_used();

        if let Err(e) = self.save(book).await {
            self.tokens.revoke(&issued.token);
            error!(code, "Ledger write failed, redemption rolled back");
            return Err(e);
        }

        info!(
            code,
            img = %file.name,
            token = tokens::short(&issued.token),
            "Code redeemed"
        );
        Ok(issued)
    }

    /// Current book, seeding storage on first use.
    pub async fn load(&self) -> Result<CodeBook, GatewayError> {
        let repo = self.repo.clone();
        let book = tokio::task::spawn_blocking(move || repo.load())
            .await
            .context("Ledger load task panicked")??;
        Ok(book)
    }

    async fn save(&self, book: CodeBook) -> Result<(), GatewayError> {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || repo.save(&book))
            .await
            .context("Ledger save task panicked")??;
        Ok(())
    }
}
