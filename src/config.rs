use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

const ENV_PREFIX: &str = "FILE_HUB_";

/// Where file bytes are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// SQLite metadata plus payloads under `storage_dir`.
    Local,
    /// Any S3-compatible endpoint.
    S3,
    /// Process memory; nothing survives a restart.
    Memory,
}

/// Centralized application configuration.
/// Combines `FILE_HUB_*` environment variables and CLI arguments; arguments win.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: StoreBackend,
    pub bucket: String,
    pub storage_dir: String,
    pub database_url: String,
    pub public_url: String,
    pub signing_secret: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub share_expiry: Duration,
    pub upload_limit: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "File hub: grouped uploads over an object store")]
pub struct Args {
    /// Host to bind to (overrides FILE_HUB_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_HUB_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides FILE_HUB_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<StoreBackend>,

    /// Bucket holding every file (overrides FILE_HUB_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Directory for local payloads (overrides FILE_HUB_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// SQLite URL for the local backend (overrides FILE_HUB_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Base URL put into local pre-signed links (overrides FILE_HUB_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// S3 endpoint, e.g. a MinIO URL (overrides FILE_HUB_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// S3 region (overrides FILE_HUB_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Lifetime of shared links in seconds (overrides FILE_HUB_SHARE_EXPIRY_SECS)
    #[arg(long)]
    pub share_expiry_secs: Option<u64>,

    /// Maximum multipart upload body in bytes (overrides FILE_HUB_UPLOAD_LIMIT)
    #[arg(long)]
    pub upload_limit: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge `args` over the variables visible through `lookup`.
    ///
    /// Secrets (signing secret, S3 keys) are only read from the environment.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<(Self, bool)> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let host = args
            .host
            .or_else(|| var("HOST"))
            .unwrap_or_else(|| "0.0.0.0".into());
        let port = match args.port {
            Some(port) => port,
            None => parse_var(&var, "PORT")?.unwrap_or(3000),
        };
        let backend = match args.backend {
            Some(backend) => backend,
            None => match var("BACKEND") {
                Some(value) => StoreBackend::from_str(&value, true)
                    .map_err(|err| anyhow::anyhow!(err))
                    .with_context(|| format!("parsing {ENV_PREFIX}BACKEND value `{value}`"))?,
                None => StoreBackend::Local,
            },
        };
        let share_expiry_secs = match args.share_expiry_secs {
            Some(secs) => secs,
            None => parse_var(&var, "SHARE_EXPIRY_SECS")?.unwrap_or(60),
        };
        if share_expiry_secs == 0 {
            bail!("share expiry must be at least one second");
        }
        let upload_limit = match args.upload_limit {
            Some(limit) => limit,
            None => parse_var(&var, "UPLOAD_LIMIT")?.unwrap_or(1024 * 1024 * 1024),
        };

        let public_url = args
            .public_url
            .or_else(|| var("PUBLIC_URL"))
            .unwrap_or_else(|| format!("http://127.0.0.1:{port}"));

        let cfg = Self {
            host,
            port,
            backend,
            bucket: args
                .bucket
                .or_else(|| var("BUCKET"))
                .unwrap_or_else(|| crate::services::DEFAULT_BUCKET.into()),
            storage_dir: args
                .storage_dir
                .or_else(|| var("STORAGE_DIR"))
                .unwrap_or_else(|| "./data/objects".into()),
            database_url: args
                .database_url
                .or_else(|| var("DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/file_hub.db".into()),
            public_url,
            signing_secret: var("SIGNING_SECRET"),
            s3_endpoint: args.s3_endpoint.or_else(|| var("S3_ENDPOINT")),
            s3_region: args
                .s3_region
                .or_else(|| var("S3_REGION"))
                .unwrap_or_else(|| "us-east-1".into()),
            s3_access_key: var("S3_ACCESS_KEY"),
            s3_secret_key: var("S3_SECRET_KEY"),
            share_expiry: Duration::from_secs(share_expiry_secs),
            upload_limit,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("parsing {ENV_PREFIX}{name} value `{value}`"))
        })
        .transpose()
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("backend", &self.backend)
            .field("bucket", &self.bucket)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("public_url", &self.public_url)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_region", &self.s3_region)
            .field("share_expiry", &self.share_expiry)
            .field("upload_limit", &self.upload_limit)
            .finish_non_exhaustive()
    }
}
