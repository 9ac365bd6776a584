//! Volcengine v3 asynchronous speech synthesis client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::VolcengineTtsConfig;
use crate::job::{JobKind, JobPayload};

use super::{ProviderClient, ProviderError, TaskSnapshot};

/// `code` value of a successful v3 response.
const SUCCESS_CODE: i64 = 20_000_000;

/// Separator between resource id and vendor task id in a task handle that
/// was submitted under a non-default resource.
const HANDLE_SEPARATOR: &str = "::";

pub struct VolcengineTtsClient {
    client: Client,
    config: VolcengineTtsConfig,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    user: SubmitUser<'a>,
    namespace: &'a str,
    req_params: ReqParams<'a>,
}

#[derive(Debug, Serialize)]
struct SubmitUser<'a> {
    uid: &'a str,
}

#[derive(Debug, Serialize)]
struct ReqParams<'a> {
    text: &'a str,
    speaker: &'a str,
    audio_params: AudioParams<'a>,
}

#[derive(Debug, Serialize)]
struct AudioParams<'a> {
    format: &'a str,
    sample_rate: u32,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    task_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: SubmitData,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitData {
    #[serde(default)]
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: QueryData,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(default)]
    task_status: i64,
    #[serde(default)]
    audio_url: String,
    #[serde(default)]
    failure_reason: String,
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}

/// Map a decoded query response to a snapshot.
///
/// Any non-empty `audio_url` means done. A `task_status` below 0 or at/above 4
/// is a vendor-side failure.
fn snapshot_from_query(resp: QueryResponse) -> TaskSnapshot {
    if resp.code != SUCCESS_CODE {
        let message = if resp.message.trim().is_empty() {
            "unknown tts query error"
        } else {
            resp.message.trim()
        };
        return TaskSnapshot::failed(format!("tts query failed (code={}): {}", resp.code, message));
    }

    let audio_url = resp.data.audio_url.trim();
    if !audio_url.is_empty() {
        return TaskSnapshot::done(audio_url);
    }

    let status = resp.data.task_status;
    if !(0..4).contains(&status) {
        let reason = [resp.data.failure_reason.trim(), resp.message.trim()]
            .into_iter()
            .find(|r| !r.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("task_status={}", status));
        return TaskSnapshot::failed(reason);
    }

    TaskSnapshot::pending()
}

impl VolcengineTtsClient {
    pub fn new(config: VolcengineTtsConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("http client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn split_handle<'a>(&'a self, handle: &'a str) -> (&'a str, &'a str) {
        match handle.split_once(HANDLE_SEPARATOR) {
            Some((resource, task_id)) => (resource, task_id),
            None => (self.config.resource_id.as_str(), handle),
        }
    }

    async fn post_json<B, T>(
        &self,
        url: &str,
        resource_id: &str,
        body: &B,
        what: &str,
    ) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .header("X-Api-App-Id", &self.config.app_id)
            .header("X-Api-Access-Key", &self.config.access_key)
            .header("X-Api-Resource-Id", resource_id)
            .header("X-Api-Request-Id", uuid::Uuid::new_v4().to_string())
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("send {} request: {}", what, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(format!("read {} response: {}", what, e)))?;

        if !status.is_success() {
            return Err(ProviderError::Transport(format!(
                "{} http status {}: {}",
                what,
                status.as_u16(),
                truncate(&text, 240)
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("parse {} response: {}", what, e)))
    }
}

#[async_trait]
impl ProviderClient for VolcengineTtsClient {
    fn name(&self) -> &str {
        "volcengine"
    }

    fn supports(&self, kind: JobKind) -> bool {
        kind == JobKind::TtsSynthesis
    }

    async fn submit(
        &self,
        kind: JobKind,
        model: Option<&str>,
        payload: &JobPayload,
    ) -> Result<String, ProviderError> {
        let JobPayload::TtsSynthesis(params) = payload else {
            return Err(ProviderError::UnsupportedKind {
                provider: self.name().to_string(),
                kind,
            });
        };

        let resource_id = params
            .resource_id
            .as_deref()
            .or(model)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.config.resource_id);

        let request = SubmitRequest {
            user: SubmitUser {
                uid: &self.config.uid,
            },
            namespace: &self.config.namespace,
            req_params: ReqParams {
                text: &params.text,
                speaker: &params.voice,
                audio_params: AudioParams {
                    format: &self.config.format,
                    sample_rate: self.config.sample_rate,
                },
            },
        };

        let resp: SubmitResponse = self
            .post_json(&self.config.submit_url, resource_id, &request, "tts submit")
            .await?;

        if resp.code != SUCCESS_CODE {
            let message = if resp.message.is_empty() {
                "unknown tts submit error".to_string()
            } else {
                resp.message
            };
            return Err(ProviderError::Rejected(format!(
                "tts submit failed (code={}): {}",
                resp.code, message
            )));
        }

        let task_id = resp.data.task_id.trim();
        if task_id.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "tts submit task_id is empty".to_string(),
            ));
        }

        debug!(task_id = %task_id, resource_id = %resource_id, "TTS task submitted");
        if resource_id == self.config.resource_id {
            Ok(task_id.to_string())
        } else {
            Ok(format!("{}{}{}", resource_id, HANDLE_SEPARATOR, task_id))
        }
    }

    async fn query(&self, _kind: JobKind, task_id: &str) -> Result<TaskSnapshot, ProviderError> {
        let (resource_id, task_id) = self.split_handle(task_id);
        let resp: QueryResponse = self
            .post_json(
                &self.config.query_url,
                resource_id,
                &QueryRequest { task_id },
                "tts query",
            )
            .await?;

        Ok(snapshot_from_query(resp))
    }
}
