use clap::Parser;
use rand::Rng;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "starlog", about = "Gamified challenge tracker API server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser origin allowed to send credentialed requests, e.g. the SPA dev
    /// server. No CORS headers are emitted when unset.
    pub cors_origin: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub access_secret: Option<String>,
    pub refresh_secret: Option<String>,
    pub access_token_minutes: u64,
    pub refresh_token_days: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origin: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: None,
            refresh_secret: None,
            access_token_minutes: 15,
            refresh_token_days: 7,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("starlog.db"));
        }

        // Unset secrets get per-process random values; every token dies with
        // the process, so persistent deployments should configure them.
        if config.auth.access_secret.is_none() {
            tracing::warn!("auth.access_secret not configured, generating a random one");
            config.auth.access_secret = Some(generate_secret());
        }
        if config.auth.refresh_secret.is_none() {
            tracing::warn!("auth.refresh_secret not configured, generating a random one");
            config.auth.refresh_secret = Some(generate_secret());
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .expect("Could not determine home directory")
                .join(".starlog")
        })
    }

    pub fn db_path(&self) -> &PathBuf {
        self.database.path.as_ref().unwrap()
    }

    pub fn access_secret(&self) -> &str {
        self.auth.access_secret.as_deref().unwrap_or_default()
    }

    pub fn refresh_secret(&self) -> &str {
        self.auth.refresh_secret.as_deref().unwrap_or_default()
    }

    pub fn access_token_ttl_secs(&self) -> u64 {
        self.auth.access_token_minutes * 60
    }

    pub fn refresh_token_ttl_secs(&self) -> u64 {
        self.auth.refresh_token_days * 24 * 3600
    }
}

fn generate_secret() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}
