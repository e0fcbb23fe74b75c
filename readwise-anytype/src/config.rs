use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use readwise_common::readwise::DEFAULT_API_ENDPOINT;
use reqwest::Url;

use crate::anytype::{DEFAULT_API_VERSION, DEFAULT_BASE_URL};
use crate::sync::SyncSettings;

#[derive(Debug, Parser)]
#[command(
    name = "readwise-anytype",
    about = "Sync Readwise books and highlights into an Anytype space"
)]
pub struct Cli {
    /// Readwise API token
    #[arg(long, env = "READWISE_TOKEN", hide_env_values = true)]
    readwise_token: Option<String>,

    /// Base URL of the Readwise v2 API
    #[arg(long, env = "READWISE_API_BASE_URL", default_value = DEFAULT_API_ENDPOINT)]
    readwise_base_url: String,

    /// Anytype API key
    #[arg(long, env = "ANYTYPE_API_KEY", hide_env_values = true)]
    anytype_api_key: Option<String>,

    /// Base URL of the local Anytype API
    #[arg(long, env = "ANYTYPE_API_BASE_URL", default_value = DEFAULT_BASE_URL)]
    anytype_base_url: String,

    /// Value sent in the Anytype-Version header
    #[arg(long, env = "ANYTYPE_VERSION", default_value = DEFAULT_API_VERSION)]
    anytype_version: String,

    /// Path to the markdown (Tera) template used to render each book
    #[arg(long, default_value = "book_template.md")]
    template: PathBuf,

    /// Anytype template ID. When given, the built-in layout is used instead of --template.
    #[arg(long)]
    anytype_template: Option<String>,

    /// Anytype object type to create
    #[arg(long = "type", default_value = "bookmark")]
    object_type: String,

    /// Anytype space ID. Defaults to the first space the API lists.
    #[arg(long, env = "ANYTYPE_SPACE_ID")]
    space: Option<String>,

    /// Only sync the given Readwise book IDs. Allows multiple.
    #[arg(long = "book")]
    book_ids: Vec<i64>,

    /// Only sync books updated after this RFC 3339 timestamp
    #[arg(long)]
    since: Option<DateTime<Utc>>,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingCredential(&'static str),

    #[error("either a markdown template path or an Anytype template ID must be provided")]
    NoTemplate,

    #[error("template file not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("invalid {name} {value:?}: {reason}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Where document bodies come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    File(PathBuf),
    Anytype(String),
}

#[derive(Debug)]
pub struct SyncConfig {
    pub readwise_token: String,
    pub readwise_endpoint: Url,
    pub anytype_api_key: String,
    pub anytype_base_url: Url,
    pub anytype_version: String,
    pub template: TemplateSource,
    pub object_type: String,
    pub space_id: Option<String>,
    pub book_ids: Vec<i64>,
    pub updated_after: Option<DateTime<Utc>>,
    pub timeout: Duration,
}

impl Cli {
    pub fn into_config(self) -> Result<SyncConfig, ConfigError> {
        let readwise_token = required(self.readwise_token, "READWISE_TOKEN")?;
        let anytype_api_key = required(self.anytype_api_key, "ANYTYPE_API_KEY")?;

        let template = match non_empty(self.anytype_template) {
            Some(template_id) => TemplateSource::Anytype(template_id),
            None if self.template.as_os_str().is_empty() => return Err(ConfigError::NoTemplate),
            None if !self.template.exists() => {
                return Err(ConfigError::TemplateNotFound(self.template))
            }
            None => TemplateSource::File(self.template),
        };

        Ok(SyncConfig {
            readwise_token,
            readwise_endpoint: parse_url("READWISE_API_BASE_URL", &self.readwise_base_url)?,
            anytype_api_key,
            anytype_base_url: parse_url("ANYTYPE_API_BASE_URL", &self.anytype_base_url)?,
            anytype_version: self.anytype_version,
            template,
            object_type: self.object_type,
            space_id: non_empty(self.space),
            book_ids: self.book_ids,
            updated_after: self.since,
            timeout: Duration::from_secs(self.timeout),
        })
    }
}

impl SyncConfig {
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            object_type: self.object_type.clone(),
            space_id: self.space_id.clone(),
            book_ids: self.book_ids.clone(),
            updated_after: self.updated_after,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    non_empty(value).ok_or(ConfigError::MissingCredential(name))
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    value.parse::<Url>().map_err(|e| ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
