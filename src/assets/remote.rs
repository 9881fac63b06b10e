//! generateContent-style HTTP client shared by image generation and the report.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::config::ServiceConfig;
use crate::logging::Domain;
use crate::retry::{
    is_retryable_network_error, permanent, retry_async, HttpStatusError, RetryConfig,
};
use crate::stimulus::StimulusAttributes;

#[derive(Debug, Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

/// Decoded image bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl GeneratedImage {
    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime_type)
    }
}

pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Timeouts and connection failures are retried; builder, redirect and decode
/// errors are not.
fn transport_error(err: reqwest::Error, what: &'static str) -> anyhow::Error {
    if is_retryable_network_error(&err) {
        anyhow!(err).context("network error")
    } else {
        permanent(err, what)
    }
}

pub struct GenAiClient {
    client: Client,
    base: Url,
    api_key: String,
    retry: RetryConfig,
}

impl GenAiClient {
    /// `None` without an API key.
    pub fn from_config(cfg: &ServiceConfig) -> Result<Option<Self>> {
        let Some(api_key) = cfg.api_key.clone() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;
        Ok(Some(Self {
            client,
            base: cfg.api_base.clone(),
            api_key,
            retry: cfg.retry.clone(),
        }))
    }

    fn endpoint(&self, model: &str) -> Result<Url> {
        self.base
            .join(&format!("models/{}:generateContent", model))
            .with_context(|| format!("bad endpoint for model {}", model))
    }

    async fn generate_once(&self, url: &Url, prompt: &str) -> Result<GenerateResponse> {
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let resp = self
            .client
            .post(url.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, "request failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HttpStatusError {
                service: "generateContent",
                status: status.as_u16(),
                body,
            }
            .into());
        }
        resp.json::<GenerateResponse>()
            .await
            .map_err(|e| transport_error(e, "undecodable response"))
    }

    async fn generate(&self, model: &str, domain: Domain, prompt: &str) -> Result<GenerateResponse> {
        let url = self.endpoint(model)?;
        retry_async(&self.retry, domain, model, || self.generate_once(&url, prompt)).await
    }

    pub async fn generate_image(&self, model: &str, prompt: &str) -> Result<GeneratedImage> {
        let resp = self.generate(model, Domain::Asset, prompt).await?;
        first_inline_image(&resp)
    }

    pub async fn generate_text(&self, model: &str, prompt: &str) -> Result<Option<String>> {
        let resp = self.generate(model, Domain::Report, prompt).await?;
        Ok(joined_text(&resp))
    }
}

fn first_inline_image(resp: &GenerateResponse) -> Result<GeneratedImage> {
    let inline = resp
        .candidates
        .first()
        .and_then(|c| c.content.parts.iter().find_map(|p| p.inline_data.as_ref()))
        .ok_or_else(|| anyhow!("response carried no inline image"))?;
    let bytes = STANDARD.decode(inline.data.trim()).context("inline image is not base64")?;
    Ok(GeneratedImage {
        mime_type: inline.mime_type.clone().unwrap_or_else(|| "image/png".to_string()),
        bytes,
    })
}

fn joined_text(resp: &GenerateResponse) -> Option<String> {
    let text: String = resp
        .candidates
        .first()?
        .content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn image_prompt(attrs: &StimulusAttributes) -> String {
    let object = attrs.held_object().label();
    format!(
        "A realistic medium-shot photo of a single {race} {gender} person standing in a sunny outdoor park. \
         Background: A blurred green grass field with soft sunlight. Natural outdoor lighting. \
         The person is wearing {attire}. \
         They are holding a {object} clearly in their hand, raised slightly near chest level. \
         The person is facing forward looking at the camera. \
         High quality, photorealistic, cinematic. \
         Ensure the {object} is clearly visible and distinguishable.",
        race = attrs.race().label(),
        gender = attrs.gender().label(),
        attire = attrs.attire().label(),
        object = object,
    )
}
