use crate::services::{
    resize_service::{CacheSettings, ResizeSettings},
    transform::DEFAULT_MAX_DIMENSION,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::env;

/// Object-store backend serving both originals and cached variants.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreKind {
    /// Local disk payloads with SQLite metadata.
    #[default]
    Fs,
    /// Amazon S3 or an S3-compatible endpoint.
    S3,
    /// Process memory; contents are lost on exit.
    Memory,
}

/// Where the source bucket name comes from.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BucketSource {
    /// `/{bucket}/{options}/{object...}`
    #[default]
    Path,
    /// `/{options}/{object...}` with the bucket taken from the Host header.
    Host,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreKind,
    pub storage_dir: String,
    pub database_url: String,
    pub s3_endpoint: Option<String>,
    pub s3_region: Option<String>,
    pub bucket_source: BucketSource,
    pub cache_bucket: Option<String>,
    pub cache_prefix: String,
    pub cache_control: Option<String>,
    pub max_dimension: u32,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "On-demand image resizing proxy backed by an object store")]
pub struct Args {
    /// Host to bind to (overrides RESIZER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides RESIZER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object-store backend (overrides RESIZER_STORE)
    #[arg(long, value_enum)]
    pub store: Option<StoreKind>,

    /// Directory for object payloads with the fs backend (overrides RESIZER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata database URL for the fs backend (overrides RESIZER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Custom S3 endpoint, e.g. a MinIO server (overrides RESIZER_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// S3 region (overrides RESIZER_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Take the bucket from the path or the Host header (overrides RESIZER_BUCKET_SOURCE)
    #[arg(long, value_enum)]
    pub bucket_source: Option<BucketSource>,

    /// Dedicated bucket for cached variants (overrides RESIZER_CACHE_BUCKET)
    #[arg(long)]
    pub cache_bucket: Option<String>,

    /// Key prefix for cached variants (overrides RESIZER_CACHE_PREFIX)
    #[arg(long)]
    pub cache_prefix: Option<String>,

    /// Cache-Control header for image responses, empty to omit (overrides RESIZER_CACHE_CONTROL)
    #[arg(long)]
    pub cache_control: Option<String>,

    /// Largest output width or height in pixels (overrides RESIZER_MAX_DIMENSION)
    #[arg(long)]
    pub max_dimension: Option<u32>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000";

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args, |name| env::var(name))?, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    fn merge(
        args: Args,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<Self> {
        let var = |name: &str| -> Result<Option<String>> {
            match lookup(name) {
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", name)),
            }
        };

        let env_port = match var("RESIZER_PORT")? {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing RESIZER_PORT value `{}`", value))?,
            None => 8080,
        };
        let env_store = match var("RESIZER_STORE")? {
            Some(value) => parse_enum::<StoreKind>("RESIZER_STORE", &value)?,
            None => StoreKind::default(),
        };
        let env_bucket_source = match var("RESIZER_BUCKET_SOURCE")? {
            Some(value) => parse_enum::<BucketSource>("RESIZER_BUCKET_SOURCE", &value)?,
            None => BucketSource::default(),
        };

        let env_max_dimension = match var("RESIZER_MAX_DIMENSION")? {
            Some(value) => value
                .parse::<u32>()
                .with_context(|| format!("parsing RESIZER_MAX_DIMENSION value `{}`", value))?,
            None => DEFAULT_MAX_DIMENSION,
        };
        let max_dimension = args.max_dimension.unwrap_or(env_max_dimension);
        if max_dimension == 0 {
            return Err(anyhow!("max dimension must be at least 1 pixel"));
        }

        let cache_control = args
            .cache_control
            .or(var("RESIZER_CACHE_CONTROL")?)
            .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.into());

        Ok(Self {
            host: args
                .host
                .or(var("RESIZER_HOST")?)
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            store: args.store.unwrap_or(env_store),
            storage_dir: args
                .storage_dir
                .or(var("RESIZER_STORAGE_DIR")?)
                .unwrap_or_else(|| "./data/objects".into()),
            database_url: args
                .database_url
                .or(var("RESIZER_DATABASE_URL")?)
                .unwrap_or_else(|| "sqlite://./data/meta/resizer.db".into()),
            s3_endpoint: args.s3_endpoint.or(var("RESIZER_S3_ENDPOINT")?),
            s3_region: args.s3_region.or(var("RESIZER_S3_REGION")?),
            bucket_source: args.bucket_source.unwrap_or(env_bucket_source),
            cache_bucket: args
                .cache_bucket
                .or(var("RESIZER_CACHE_BUCKET")?)
                .filter(|b| !b.is_empty()),
            cache_prefix: args
                .cache_prefix
                .or(var("RESIZER_CACHE_PREFIX")?)
                .unwrap_or_else(|| CacheSettings::default().prefix),
            cache_control: Some(cache_control).filter(|v| !v.is_empty()),
            max_dimension,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn resize_settings(&self) -> ResizeSettings {
        ResizeSettings {
            bucket_source: self.bucket_source,
            cache: CacheSettings {
                bucket: self.cache_bucket.clone(),
                prefix: self.cache_prefix.clone(),
            },
            cache_control: self.cache_control.clone(),
        }
    }
}

fn parse_enum<T: ValueEnum>(name: &str, value: &str) -> Result<T> {
    T::from_str(value, true).map_err(|err| anyhow!("parsing {} value `{}`: {}", name, value, err))
}
