use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_name: Option<String>,
    pub path_prefix: String,
    pub max_body_bytes: usize,
    pub login_base_url: String,
    pub graph_base_url: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub drive_owner: Option<String>,
}

/// Remote drive identity, present only when every setting is configured.
#[derive(Clone)]
pub struct DriveSettings {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub drive_owner: String,
}

/// One-shot operator command parsed from the CLI.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Serve,
    Migrate,
    IssueToken {
        user_id: String,
        max_uploads: i64,
        valid_days: i64,
    },
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Tokenized file-upload relay to OneDrive")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_RELAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_RELAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides UPLOAD_RELAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Root folder on the drive (overrides UPLOAD_RELAY_PATH_PREFIX)
    #[arg(long)]
    pub path_prefix: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Issue an upload token for USER_ID, print it, and exit
    #[arg(long, value_name = "USER_ID")]
    pub issue_token: Option<String>,

    /// Quota for --issue-token
    #[arg(long, default_value_t = 10)]
    pub max_uploads: i64,

    /// Validity in days for --issue-token
    #[arg(long, default_value_t = 7)]
    pub valid_days: i64,
}

impl Args {
    pub fn command(&self) -> Command {
        if self.migrate {
            Command::Migrate
        } else if let Some(user_id) = &self.issue_token {
            Command::IssueToken {
                user_id: user_id.clone(),
                max_uploads: self.max_uploads,
                valid_days: self.valid_days,
            }
        } else {
            Command::Serve
        }
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();
        let command = args.command();
        let cfg = Self::merge(args, |key| env::var(key).ok())?;
        Ok((cfg, command))
    }

    /// Merge CLI args over values from `lookup`, then built-in defaults.
    fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_port = match lookup("UPLOAD_RELAY_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing UPLOAD_RELAY_PORT value `{}`", value))?,
            None => 3000,
        };
        let max_body_bytes = match lookup("UPLOAD_RELAY_MAX_BODY_BYTES") {
            Some(value) => value.parse::<usize>().with_context(|| {
                format!("parsing UPLOAD_RELAY_MAX_BODY_BYTES value `{}`", value)
            })?,
            None => 256 * 1024 * 1024,
        };

        Ok(Self {
            host: args
                .host
                .or_else(|| lookup("UPLOAD_RELAY_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            database_url: args
                .database_url
                .or_else(|| lookup("UPLOAD_RELAY_DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/upload_relay.db".into()),
            database_name: lookup("UPLOAD_RELAY_DATABASE_NAME"),
            path_prefix: args
                .path_prefix
                .or_else(|| lookup("UPLOAD_RELAY_PATH_PREFIX"))
                .unwrap_or_else(|| "ClientUploads".into()),
            max_body_bytes,
            login_base_url: lookup("AZURE_LOGIN_BASE_URL")
                .unwrap_or_else(|| "https://login.microsoftonline.com".into()),
            graph_base_url: lookup("GRAPH_BASE_URL")
                .unwrap_or_else(|| "https://graph.microsoft.com/v1.0".into()),
            tenant_id: lookup("AZURE_TENANT_ID"),
            client_id: lookup("AZURE_CLIENT_ID"),
            client_secret: lookup("AZURE_CLIENT_SECRET"),
            drive_owner: lookup("ONEDRIVE_USER_ID"),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings needed to talk to the drive; errors name the missing variable.
    pub fn drive_settings(&self) -> Result<DriveSettings> {
        fn required(value: &Option<String>, name: &str) -> Result<String> {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{} must be set", name))
        }

        Ok(DriveSettings {
            tenant_id: required(&self.tenant_id, "AZURE_TENANT_ID")?,
            client_id: required(&self.client_id, "AZURE_CLIENT_ID")?,
            client_secret: required(&self.client_secret, "AZURE_CLIENT_SECRET")?,
            drive_owner: required(&self.drive_owner, "ONEDRIVE_USER_ID")?,
        })
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("database_name", &self.database_name)
            .field("path_prefix", &self.path_prefix)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("login_base_url", &self.login_base_url)
            .field("graph_base_url", &self.graph_base_url)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("drive_owner", &self.drive_owner)
            .finish()
    }
}
