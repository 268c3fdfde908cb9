use super::CodeBook;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

/// Storage backend for the code ledger.
///
/// `load` and `save` move the whole book at once, matching how small the
/// ledger is. Implementations are called from blocking tasks.
pub trait LedgerRepository: Send + Sync {
    /// Book for serving. Backends may degrade unreadable data to empty.
    fn load(&self) -> Result<CodeBook>;

    /// Book for editing. Fails instead of degrading, so a following `save`
    /// can never replace records it could not read.
    fn load_strict(&self) -> Result<CodeBook> {
        self.load()
    }

    fn save(&self, book: &CodeBook) -> Result<()>;
}

//================
// JSON flat file
//================
pub struct JsonFileRepository {
    path: PathBuf,
    seed: Vec<String>,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>, seed: Vec<String>) -> Self {
        Self {
            path: path.into(),
            seed,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // First run, write the seed set out so operators can see and edit it
    fn seed(&self) -> Result<CodeBook> {
        let book = CodeBook::from_codes(self.seed.iter().cloned());
        self.save(&book)?;
        info!(
            path = %self.path.display(),
            codes = book.codes.len(),
            "Seeded new code ledger"
        );
        Ok(book)
    }

    // None when there is no ledger yet
    fn read_existing(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .context(format!("Failed to read ledger {}", self.path.display()))?;
        Ok(Some(raw))
    }
}

impl LedgerRepository for JsonFileRepository {
    fn load(&self) -> Result<CodeBook> {
        let Some(raw) = self.read_existing()? else {
            return self.seed();
        };

        match serde_json::from_str(&raw) {
            Ok(book) => Ok(book),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ledger is malformed, treating it as empty"
                );
                Ok(CodeBook::default())
            }
        }
    }

    fn load_strict(&self) -> Result<CodeBook> {
        let Some(raw) = self.read_existing()? else {
            return self.seed();
        };

        serde_json::from_str(&raw).context(format!(
            "Ledger {} is malformed, fix it by hand before editing",
            self.path.display()
        ))
    }

    fn save(&self, book: &CodeBook) -> Result<()> {
        let json = serde_json::to_string_pretty(book).context("Failed to serialize ledger")?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .context(format!("Failed to create ledger directory {}", dir.display()))?;

        // Temp file in the same directory so the rename stays on one filesystem
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .context("Failed to create temporary ledger file")?;
        tmp.write_all(json.as_bytes())
            .context("Failed to write temporary ledger file")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to flush temporary ledger file")?;
        tmp.persist(&self.path)
            .context(format!("Failed to replace ledger {}", self.path.display()))?;

        Ok(())
    }
}

//===========
// In memory
//===========
/// Non-durable backend, handy for tests and throwaway deployments.
#[derive(Default)]
pub struct MemoryRepository {
    book: Mutex<CodeBook>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryRepository {
    pub fn new(book: CodeBook) -> Self {
        Self {
            book: Mutex::new(book),
            ..Default::default()
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every following `save` fail, to exercise error paths.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl LedgerRepository for MemoryRepository {
    fn load(&self) -> Result<CodeBook> {
        let book = self
            .book
            .lock()
            .map_err(|_| anyhow::anyhow!("Ledger lock poisoned"))?;
        Ok(book.clone())
    }

    fn save(&self, book: &CodeBook) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("Ledger storage unavailable");
        }

        let mut stored = self
            .book
            .lock()
            .map_err(|_| anyhow::anyhow!("Ledger lock poisoned"))?;
        *stored = book.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
