use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::job::JobKind;
use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reelforge.db")
}

/// Local cache storage
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory of the media cache. Category directories live below it.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    /// URL prefix the cache root is served under (path or absolute URL).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Whole-request timeout for artifact downloads.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            base_url: default_base_url(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("data/static")
}

fn default_base_url() -> String {
    "/static".to_string()
}

fn default_download_timeout() -> u64 {
    300
}

/// Provider selection and vendor credentials
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    /// Provider (and model) used for each kind when a request names none.
    #[serde(default)]
    pub defaults: BTreeMap<JobKind, ProviderDefault>,
    /// Voice used for speech synthesis requests that name none.
    #[serde(default)]
    pub default_voice: Option<String>,
    #[serde(default)]
    pub volcengine_tts: Option<VolcengineTtsConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderDefault {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Volcengine v3 asynchronous speech synthesis
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VolcengineTtsConfig {
    pub app_id: String,
    pub access_key: String,
    #[serde(default = "default_tts_resource_id")]
    pub resource_id: String,
    #[serde(default = "default_tts_submit_url")]
    pub submit_url: String,
    #[serde(default = "default_tts_query_url")]
    pub query_url: String,
    #[serde(default = "default_tts_namespace")]
    pub namespace: String,
    /// `user.uid` sent with each request.
    #[serde(default = "default_tts_uid")]
    pub uid: String,
    #[serde(default = "default_tts_format")]
    pub format: String,
    #[serde(default = "default_tts_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_tts_resource_id() -> String {
    "volc.service_type.10029".to_string()
}

fn default_tts_submit_url() -> String {
    "https://openspeech.bytedance.com/api/v3/tts/submit".to_string()
}

fn default_tts_query_url() -> String {
    "https://openspeech.bytedance.com/api/v3/tts/query".to_string()
}

fn default_tts_namespace() -> String {
    "BidirectionalTTS".to_string()
}

fn default_tts_uid() -> String {
    "reelforge".to_string()
}

fn default_tts_format() -> String {
    "mp3".to_string()
}

fn default_tts_sample_rate() -> u32 {
    24000
}

fn default_timeout() -> u32 {
    30
}

/// Media probing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

/// Log output
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub orchestrator: OrchestratorConfig,
    pub providers: SanitizedProvidersConfig,
    pub probe: ProbeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProvidersConfig {
    pub defaults: BTreeMap<JobKind, ProviderDefault>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volcengine_tts: Option<SanitizedVolcengineTtsConfig>,
}

/// Volcengine config with credentials hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedVolcengineTtsConfig {
    pub submit_url: String,
    pub query_url: String,
    pub resource_id: String,
    pub app_id_configured: bool,
    pub access_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            storage: config.storage.clone(),
            orchestrator: config.orchestrator.clone(),
            providers: SanitizedProvidersConfig {
                defaults: config.providers.defaults.clone(),
                default_voice: config.providers.default_voice.clone(),
                volcengine_tts: config.providers.volcengine_tts.as_ref().map(|v| {
                    SanitizedVolcengineTtsConfig {
                        submit_url: v.submit_url.clone(),
                        query_url: v.query_url.clone(),
                        resource_id: v.resource_id.clone(),
                        app_id_configured: !v.app_id.is_empty(),
                        access_key_configured: !v.access_key.is_empty(),
                    }
                }),
            },
            probe: config.probe.clone(),
            logging: config.logging.clone(),
        }
    }
}
