use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use codedrop::config::{self, ServerConfig};
use codedrop::ledger::codes;
use codedrop::ledger::{JsonFileRepository, LedgerRepository};
use codedrop::server::GatewayServer;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "codedrop")]
#[command(about = "Redeem one-time codes for single-use file downloads")]
struct Cli {
    #[arg(long, env = "CODES_FILE", default_value = config::DEFAULT_CODES_FILE, global = true)]
    codes_file: PathBuf,

    #[arg(
        long,
        env = "SEED_CODES",
        value_delimiter = ',',
        default_values_t = config::DEFAULT_SEED_CODES.map(String::from),
        global = true,
        help = "Codes written to a fresh ledger"
    )]
    seed_codes: Vec<String>,

    #[command(flatten)]
    serve: ServeArgs,

    // No subcommand runs the gateway
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or extend the code ledger
    Codes {
        #[command(subcommand)]
        action: CodesAction,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "PORT", default_value_t = config::DEFAULT_PORT)]
    port: u16,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    bind: IpAddr,

    #[arg(long, env = "PROTECTED_DIR", default_value = config::DEFAULT_PROTECTED_DIR)]
    protected_dir: PathBuf,

    #[arg(long, env = "TOKEN_TTL_SECS", default_value_t = config::DEFAULT_TOKEN_TTL_SECS)]
    token_ttl_secs: u64,

    #[arg(long, env = "MAX_TOKENS", default_value_t = config::DEFAULT_MAX_TOKENS)]
    max_tokens: usize,

    #[arg(
        long,
        env = "SWEEP_INTERVAL_SECS",
        default_value_t = config::DEFAULT_SWEEP_INTERVAL_SECS,
        help = "Seconds between expired token sweeps, 0 disables"
    )]
    sweep_interval_secs: u64,

    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        help = "Allowed origins, any origin when empty"
    )]
    cors_origins: Vec<String>,
}

#[derive(Subcommand)]
enum CodesAction {
    /// Print every code and whether it was used
    List,
    /// Add specific codes
    Add {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Add random codes
    Generate {
        #[arg(long, short = 'n', default_value_t = 10)]
        count: usize,

        #[arg(long, default_value = "CINDY")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let repo = JsonFileRepository::new(&cli.codes_file, cli.seed_codes.clone());

    match cli.command {
        None => serve(&cli.codes_file, cli.seed_codes, cli.serve).await,
        Some(Commands::Codes { action }) => run_codes(&repo, action),
    }
}

async fn serve(codes_file: &Path, seed_codes: Vec<String>, args: ServeArgs) -> Result<()> {
    let config = ServerConfig {
        bind_addr: args.bind,
        port: args.port,
        codes_file: codes_file.to_path_buf(),
        protected_dir: args.protected_dir,
        token_ttl: Duration::from_secs(args.token_ttl_secs),
        max_tokens: args.max_tokens,
        sweep_interval: (args.sweep_interval_secs > 0)
            .then(|| Duration::from_secs(args.sweep_interval_secs)),
        cors_origins: args.cors_origins,
        seed_codes,
    };

    let server = GatewayServer::bind(&config)
        .await
        .context("Failed to start server")?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Ctrl+C received - initiating graceful shutdown");
        signal_token.cancel();
    });

    server.serve(shutdown).await
}

// Write commands read strictly, so a malformed ledger is never overwritten
fn run_codes(repo: &JsonFileRepository, action: CodesAction) -> Result<()> {
    match action {
        CodesAction::List => {
            let book = repo.load_strict()?;
            for record in &book.codes {
                match &record.used_at {
                    Some(at) => println!("{}\tused\t{}", record.code, at),
                    None if record.used => println!("{}\tused", record.code),
                    None => println!("{}\tunused", record.code),
                }
            }
            println!(
                "{} codes, {} used ({})",
                book.codes.len(),
                book.used_count(),
                repo.path().display()
            );
        }
        CodesAction::Add { codes } => {
            let outcome = codes::add_codes(repo, &codes)?;
            for code in &outcome.added {
                println!("{}", code);
            }
            for code in &outcome.skipped {
                eprintln!("skipped {} (already present)", code);
            }
            eprintln!(
                "added {} code(s) to {}",
                outcome.added.len(),
                repo.path().display()
            );
        }
        CodesAction::Generate { count, prefix } => {
            let added = codes::generate_codes(repo, &prefix, count)?;
            for code in &added {
                println!("{}", code);
            }
            eprintln!("generated {} code(s) in {}", added.len(), repo.path().display());
        }
    }

    Ok(())
}
