//! Answer synthesis through a generative language model.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_LLM_MODEL: &str = "gpt-4o";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

/// Turns a prompt into answer text.
pub trait Generator: Send + Sync {
    /// Model identifier used in logs and `status` output.
    fn model(&self) -> &str;

    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the prompt sent to the model.
///
/// # Examples
///
/// ```
/// use medrag::generation::build_prompt;
///
/// let prompt = build_prompt("What is HbA1c?", &["HbA1c measures glucose."]);
/// assert_eq!(
///     prompt,
///     "Context: HbA1c measures glucose.\nQuestion: What is HbA1c?\nAnswer:"
/// );
/// ```
pub fn build_prompt<S: AsRef<str>>(question: &str, context: &[S]) -> String {
    let context = context
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");
    format!("Context: {context}\nQuestion: {question}\nAnswer:")
}

/// A [`Generator`] using the OpenAI Responses API.
///
/// Works with any server exposing a compatible `POST /responses` endpoint.
pub struct OpenAiGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiGenerator {
    /// Create a generator. The key is only required when
    /// [`generate`](Generator::generate) is called.
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    fn responses_url(&self) -> String {
        format!("{}/responses", self.base_url)
    }
}

impl Generator for OpenAiGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            Error::Generation(format!("{API_KEY_ENV_VAR} is not set"))
        })?;

        let request = ResponsesRequest {
            model: &self.model,
            input: prompt,
        };

        tracing::debug!(model = %self.model, "requesting completion");
        let response = self
            .client
            .post(self.responses_url())
            .bearer_auth(api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let detail = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(Error::Generation(format!(
                "model API returned {status}: {detail}"
            )));
        }

        let parsed: ResponsesResponse = response.json()?;
        extract_output_text(parsed)
    }
}

impl std::fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

/// Concatenate every `output_text` part of the response.
fn extract_output_text(response: ResponsesResponse) -> Result<String> {
    let text: String = response
        .output
        .into_iter()
        .flat_map(|item| item.content)
        .filter(|part| part.kind == "output_text")
        .filter_map(|part| part.text)
        .collect();

    if text.is_empty() {
        return Err(Error::Generation(
            "model response contained no output text".to_string(),
        ));
    }
    Ok(text)
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorMessage,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}
