use std::sync::Arc;

use crate::{guard::ProtectedFiles, ledger::Ledger, tokens::TokenStore};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub tokens: TokenStore,
    pub files: ProtectedFiles,
}

impl AppState {
    pub fn new(ledger: Ledger) -> Self {
        // Store and guard are cheap handles onto the same data the ledger uses
        let tokens = ledger.tokens().clone();
        let files = ledger.files().clone();

        Self {
            ledger: Arc::new(ledger),
            tokens,
            files,
        }
    }
}
