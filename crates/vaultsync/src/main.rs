use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vaultsync", about = "VaultSync — encrypted backup sync server", version)]
struct Cli {
    /// Server URL (default: http://localhost:5000 or $VAULTSYNC_SERVER)
    #[arg(long, env = "VAULTSYNC_SERVER", default_value = "http://localhost:5000")]
    server: String,

    /// Bearer token for server auth ($VAULTSYNC_API_TOKEN)
    #[arg(long, env = "VAULTSYNC_API_TOKEN")]
    token: Option<String>,

    /// Basic-auth username ($VAULTSYNC_USERNAME)
    #[arg(long, env = "VAULTSYNC_USERNAME")]
    username: Option<String>,

    /// Basic-auth password ($VAULTSYNC_PASSWORD)
    #[arg(long, env = "VAULTSYNC_PASSWORD")]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the VaultSync HTTP server
    Serve {
        /// Port to listen on (default: $VAULTSYNC_PORT or 5000)
        #[arg(long, env = "VAULTSYNC_PORT", default_value = "5000")]
        port: u16,
        /// Host to bind (default: $VAULTSYNC_HOST or 0.0.0.0)
        #[arg(long, env = "VAULTSYNC_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Upload an encrypted blob to a configuration
    Upload {
        /// Configuration name (letters, digits, underscore, hyphen)
        config: String,
        /// Blob to upload: a file path, or `-` to read stdin
        file: String,
        /// Device identifier recorded in the config's device bookkeeping
        #[arg(long)]
        device_id: Option<String>,
        /// Client timestamp passed through to the server
        #[arg(long)]
        timestamp: Option<i64>,
        /// Payload format version
        #[arg(long, default_value = "1.0")]
        version: String,
    },
    /// Download the stored blob for a configuration
    Download {
        /// Configuration name
        config: String,
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<String>,
    },
    /// Show the server status overview
    Status,
    /// Clear one configuration, or all when omitted
    Clear {
        /// Configuration name (omit to clear everything)
        config: Option<String>,
    },
    /// Check server liveness
    Health,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VAULTSYNC_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let auth = AuthArgs {
        token: cli.token,
        username: cli.username,
        password: cli.password,
    };

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port, auth).await,

        Commands::Upload {
            config,
            file,
            device_id,
            timestamp,
            version,
        } => cmd_upload(&cli.server, &auth, &config, &file, device_id, timestamp, &version).await,

        Commands::Download { config, output } => {
            cmd_download(&cli.server, &auth, &config, output.as_deref()).await
        }

        Commands::Status => cmd_status(&cli.server).await,

        Commands::Clear { config } => cmd_clear(&cli.server, &auth, config.as_deref()).await,

        Commands::Health => cmd_health(&cli.server).await,
    }
}

// ── Command implementations ───────────────────────────────────────────────────

struct AuthArgs {
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl AuthArgs {
    /// Attach whichever credentials are present; bearer token wins, matching
    /// the server's precedence.
    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            req.bearer_auth(token)
        } else if let Some(user) = &self.username {
            req.basic_auth(user, self.password.as_deref())
        } else {
            req
        }
    }
}

async fn cmd_serve(host: String, port: u16, auth: AuthArgs) -> Result<()> {
    let cfg = vaultsync_server::ServerConfig {
        host,
        port,
        api_token: auth.token,
        username: auth.username,
        password: auth.password,
        ..Default::default()
    };
    vaultsync_server::run(cfg).await
}

async fn cmd_upload(
    server: &str,
    auth: &AuthArgs,
    config: &str,
    file: &str,
    device_id: Option<String>,
    timestamp: Option<i64>,
    version: &str,
) -> Result<()> {
    let encrypted_data = if file == "-" {
        std::io::read_to_string(std::io::stdin()).context("read stdin")?
    } else {
        std::fs::read_to_string(file).with_context(|| format!("read blob file: {file}"))?
    };

    let body = serde_json::json!({
        "device_id": device_id,
        "timestamp": timestamp,
        "encrypted_data": encrypted_data,
        "version": version,
    });

    let resp = auth
        .apply(Client::new().post(format!("{}/sync/{config}", base(server))))
        .json(&body)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        anyhow::bail!(
            "server returned {status}: {}",
            json["error"].as_str().unwrap_or("unknown error")
        );
    }

    println!(
        "✓ uploaded {config} (stored at {})",
        json["stored_at"].as_str().unwrap_or("?")
    );
    Ok(())
}

async fn cmd_download(
    server: &str,
    auth: &AuthArgs,
    config: &str,
    output: Option<&str>,
) -> Result<()> {
    let resp = auth
        .apply(Client::new().get(format!("{}/sync/{config}", base(server))))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        anyhow::bail!("no backup has been uploaded for {config}");
    }

    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        anyhow::bail!(
            "server returned {status}: {}",
            json["error"].as_str().unwrap_or("unknown error")
        );
    }

    let pretty = serde_json::to_string_pretty(&json)?;
    match output {
        Some(path) => {
            std::fs::write(path, pretty).with_context(|| format!("write {path}"))?;
            println!("✓ wrote {config} backup to {path}");
        }
        None => println!("{pretty}"),
    }
    Ok(())
}

async fn cmd_status(server: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!("{}/status", base(server)))
        .send()
        .await
        .context("HTTP request failed")?;

    let json: Value = resp.json().await.context("parse response")?;
    let configs = json["configs"].as_array().cloned().unwrap_or_default();
    if configs.is_empty() {
        println!("(no configurations stored)");
        return Ok(());
    }

    for c in &configs {
        let name = c["config_name"].as_str().unwrap_or("?");
        let updated = c["last_updated"].as_str().unwrap_or("never");
        let devices = c["devices"]
            .as_array()
            .map(|d| d.len())
            .unwrap_or_default();
        let version = c["backup_info"]["version"].as_str().unwrap_or("-");
        println!("  {name} — updated {updated} — {devices} device(s) — v{version}");
    }
    Ok(())
}

async fn cmd_clear(server: &str, auth: &AuthArgs, config: Option<&str>) -> Result<()> {
    let url = match config {
        Some(name) => format!("{}/clear/{name}", base(server)),
        None => format!("{}/clear", base(server)),
    };

    let resp = auth
        .apply(Client::new().post(url))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!(
            "server returned {status}: {}",
            json["error"].as_str().unwrap_or("")
        );
    }
    println!("{}", json["message"].as_str().unwrap_or("cleared"));
    Ok(())
}

async fn cmd_health(server: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!("{}/health", base(server)))
        .send()
        .await
        .context("HTTP request failed")?;

    if resp.status().is_success() {
        println!("server is up");
        Ok(())
    } else {
        anyhow::bail!("server returned {}", resp.status());
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn base(server: &str) -> &str {
    server.trim_end_matches('/')
}
