use codedrop::errors::GatewayError;
use codedrop::guard::ProtectedFiles;
use codedrop::ledger::codes;
use codedrop::ledger::{CodeBook, JsonFileRepository, Ledger, LedgerRepository};
use codedrop::tokens::TokenStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Deployment {
    dir: TempDir,
}

impl Deployment {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img").join("1.jpg"), b"one").unwrap();
        Self { dir }
    }

    fn repo(&self) -> Arc<JsonFileRepository> {
        Arc::new(JsonFileRepository::new(
            self.dir.path().join("codes.json"),
            vec!["CINDY-0001".to_string(), "CINDY-0002".to_string()],
        ))
    }

    // Fresh process: new token store, same files on disk
    fn boot(&self) -> Ledger {
        Ledger::new(
            self.repo(),
            TokenStore::new(Duration::from_secs(300), 64),
            ProtectedFiles::new(self.dir.path().join("img")),
        )
    }
}

#[tokio::test]
async fn test_used_codes_survive_restart() {
    let deployment = Deployment::new();

    let first = deployment.boot();
    let issued = first.redeem("CINDY-0001", "1.jpg").await.unwrap();
    drop(first);

    let second = deployment.boot();
    assert!(matches!(
        second.redeem("CINDY-0001", "1.jpg").await,
        Err(GatewayError::CodeAlreadyUsed)
    ));

    // Tokens do not outlive the process
    assert!(matches!(
        second.tokens().validate(&issued.token, "1.jpg"),
        Err(GatewayError::TokenNotFound)
    ));

    assert!(second.redeem("CINDY-0002", "1.jpg").await.is_ok());
}

#[tokio::test]
async fn test_codes_added_on_disk_while_running() {
    let deployment = Deployment::new();
    let ledger = deployment.boot();

    // Seeds the file
    ledger.load().await.unwrap();

    // What `codedrop codes add` does from another process
    let repo = deployment.repo();
    let mut book = repo.load().unwrap();
    assert!(book.insert("FRESH-0001"));
    repo.save(&book).unwrap();

    assert!(ledger.redeem("FRESH-0001", "1.jpg").await.is_ok());
}

#[tokio::test]
async fn test_malformed_ledger_rejects_every_code() {
    let deployment = Deployment::new();
    std::fs::write(deployment.dir.path().join("codes.json"), "[[[").unwrap();

    let ledger = deployment.boot();
    assert_eq!(ledger.load().await.unwrap(), CodeBook::default());
    assert!(matches!(
        ledger.redeem("CINDY-0001", "1.jpg").await,
        Err(GatewayError::InvalidCode)
    ));
}

#[tokio::test]
async fn test_redeem_keeps_hand_written_fields() {
    let deployment = Deployment::new();
    let path = deployment.dir.path().join("codes.json");
    std::fs::write(
        &path,
        r#"{
  "owner": "cindy",
  "codes": [
    {"code": "A", "used": false, "note": "gift", "batch": 3},
    {"code": "B", "used": true, "usedAt": "yesterday"}
  ]
}"#,
    )
    .unwrap();

    let ledger = deployment.boot();
    ledger.redeem("A", "1.jpg").await.unwrap();
    assert!(matches!(
        ledger.redeem("B", "1.jpg").await,
        Err(GatewayError::CodeAlreadyUsed)
    ));

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["owner"], "cindy");
    assert_eq!(saved["codes"][0]["used"], true);
    assert_eq!(saved["codes"][0]["note"], "gift");
    assert_eq!(saved["codes"][0]["batch"], 3);
    assert!(saved["codes"][0]["usedAt"].is_string());
    assert_eq!(saved["codes"][1]["usedAt"], "yesterday");
}

#[test]
fn test_codes_add_leaves_malformed_ledger_untouched() {
    let deployment = Deployment::new();
    let path = deployment.dir.path().join("codes.json");
    let broken = r#"{"codes":[{"code":"A","used":true},{"code":"B""#;
    std::fs::write(&path, broken).unwrap();

    let repo = deployment.repo();
    assert!(codes::add_codes(repo.as_ref(), &["FRESH-0001".to_string()]).is_err());
    assert!(codes::generate_codes(repo.as_ref(), "CINDY", 2).is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), broken);
}
