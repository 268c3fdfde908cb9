use super::{CodeBook, LedgerRepository};
use anyhow::Result;
use rand::Rng;

// No 0/O or 1/I, codes get read aloud and typed by hand
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 8;

pub fn random_code<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    let suffix: String = (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();

    if prefix.is_empty() {
        suffix
    } else {
        format!("{}-{}", prefix, suffix)
    }
}

/// Add `count` fresh random codes to `book`, returning the new codes.
pub fn generate_into(book: &mut CodeBook, prefix: &str, count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut added = Vec::with_capacity(count);

    while added.len() < count {
        let code = random_code(prefix, &mut rng);
        // Collisions are unlikely but possible
        if book.insert(code.clone()) {
            added.push(code);
        }
    }

    added
}

#[derive(Debug, Default, PartialEq)]
pub struct AddOutcome {
    pub added: Vec<String>,
    pub skipped: Vec<String>,
}

/// Append specific codes to the stored ledger.
/// Blank entries are ignored and codes already present are skipped.
pub fn add_codes(repo: &dyn LedgerRepository, codes: &[String]) -> Result<AddOutcome> {
    let mut book = repo.load_strict()?;
    let mut outcome = AddOutcome::default();

    for code in codes.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if book.insert(code) {
            outcome.added.push(code.to_string());
        } else {
            outcome.skipped.push(code.to_string());
        }
    }

    if !outcome.added.is_empty() {
        repo.save(&book)?;
    }
    Ok(outcome)
}

/// Append `count` random codes to the stored ledger.
pub fn generate_codes(repo: &dyn LedgerRepository, prefix: &str, count: usize) -> Result<Vec<String>> {
    let mut book = repo.load_strict()?;
    let added = generate_into(&mut book, prefix, count);
    if !added.is_empty() {
        repo.save(&book)?;
    }
    Ok(added)
}
