#![allow(dead_code)]

use codedrop::config::ServerConfig;
use codedrop::server::GatewayServer;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const IMAGE_BYTES: &[u8] = b"\xFF\xD8\xFF\xE0 not really a jpeg";

pub struct TestServer {
    pub dir: TempDir,
    pub base_url: String,
    pub codes_file: PathBuf,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(tweak: impl FnOnce(&mut ServerConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let protected_dir = dir.path().join("paid").join("img_paid");
        std::fs::create_dir_all(&protected_dir).unwrap();
        std::fs::write(protected_dir.join("1.jpg"), IMAGE_BYTES).unwrap();
        std::fs::write(protected_dir.join("2.jpg"), b"second image").unwrap();
        std::fs::write(dir.path().join("outside.txt"), b"not for download").unwrap();

        let codes_file = dir.path().join("codes.json");
        let mut config = ServerConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            codes_file: codes_file.clone(),
            protected_dir,
            sweep_interval: None,
            ..ServerConfig::default()
        };
        tweak(&mut config);

        let server = GatewayServer::bind(&config).await.unwrap();
        let base_url = format!("http://{}", server.local_addr());

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.serve(shutdown.clone()));

        Self {
            dir,
            base_url,
            codes_file,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn ledger_json(&self) -> serde_json::Value {
        let raw = std::fs::read_to_string(&self.codes_file).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(15), self.handle)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
    }
}
