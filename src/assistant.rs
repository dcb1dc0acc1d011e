//! Conversational assistant grounded in the tagging plan.
//!
//! Every request carries a fixed system instruction followed by a context block
//! holding the current tagging plan and data referential as JSON. The model
//! behind it is reached through [`CompletionClient`] so the HTTP layer never
//! depends on a particular provider.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::model::Row;
use crate::parser;
use crate::sheet::SheetKind;
use crate::store::DataDir;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_OUTPUT_TOKENS: u32 = 8192;
const TEMPERATURE: f32 = 0.7;

pub const SYSTEM_INSTRUCTION: &str = r#"
You are a **Senior Digital Analytics Consultant** specializing in GTM (Google Tag Manager), GA4 (Google Analytics 4), and Firebase.

You help the user optimize their tracking strategy, understand their tagging plan, and build a robust data dictionary. You are conversational, pedagogical, and solution-oriented.

**CORE PRINCIPLES:**
1.  **Context-Driven**: You have access to the user's "Tagging Plan" and "Data Referential". Use this context to give grounded, specific answers.
2.  **Standards**: Cross-reference requests with GA4/Google recommendations. If a standard parameter is missing (e.g., 'currency' for 'purchase'), suggest adding it and explain the benefit.
3.  **Pedagogy**: Structure answers clearly and break complex concepts into digestible parts.
4.  **Anti-Hallucination**: Do not invent proprietary data. If something is not in the context, say so and offer standard industry guidance.
5.  **Zero Data Retention**: Do not store or learn from this data. It is strictly for this session.

**FORMATTING REQUIREMENTS:**
- Use Markdown to structure all responses
- Use tables for comparisons, parameter lists, or structured data
- Use code blocks (with language tags) for JSON, JavaScript, HTML, or GTM examples
- Use headings for long responses and bullet points for key takeaways

**CONTEXT DATA SOURCES:**
- **Tagging Plan**: Events, triggers, and variables defined in the project
- **Data Referential**: Dictionary of parameters and their definitions
"#;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Google API Key not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {0}: {1}")]
    Http(u16, String),

    #[error("Model returned no text")]
    EmptyResponse,
}

/// One text fragment of a chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// A previous message, in the provider's `{ role, parts }` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub parts: Vec<Part>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        ChatTurn {
            role: "user".into(),
            parts: vec![Part { text: text.into() }],
        }
    }
}

/// Everything sent to the model for one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub history: Vec<ChatTurn>,
    pub message: String,
}

/// Rows handed to the model, already truncated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextData {
    pub tagging_plan: Vec<BTreeMap<String, String>>,
    pub data_ref: Vec<BTreeMap<String, String>>,
}

/// How many rows of each sheet go into the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub tagging_rows: usize,
    pub reference_rows: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        ContextLimits {
            tagging_rows: 500,
            reference_rows: 200,
        }
    }
}

/// Read the context straight from the workbooks on disk.
///
/// The categorized plan is preferred; the legacy plan is used only when the
/// categorized workbook does not exist. Missing files give empty lists.
pub fn load_context(data_dir: &DataDir, limits: ContextLimits) -> ContextData {
    let tagging = if data_dir.workbook_path(SheetKind::Tagging).exists() {
        SheetKind::Tagging
    } else {
        SheetKind::Legacy
    };
    let plan = parser::parse_sheet(data_dir.root(), tagging);
    let reference = parser::parse_sheet(data_dir.root(), SheetKind::Reference);

    ContextData {
        tagging_plan: records(plan.rows(), limits.tagging_rows),
        data_ref: records(reference.rows(), limits.reference_rows),
    }
}

fn records<'a>(rows: impl Iterator<Item = &'a Row>, limit: usize) -> Vec<BTreeMap<String, String>> {
    rows.take(limit).map(|row| row.fields.clone()).collect()
}

/// System instruction followed by the delimited context block.
pub fn system_prompt(context: &ContextData) -> String {
    let plan = serde_json::to_string_pretty(&context.tagging_plan).unwrap_or_else(|_| "[]".into());
    let reference = serde_json::to_string_pretty(&context.data_ref).unwrap_or_else(|_| "[]".into());
    format!(
        "{}\n\n--- CONTEXT START ---\n\n**TAGGING PLAN DATA:**\n{}\n\n**DATA REFERENTIAL DATA:**\n{}\n\n--- CONTEXT END ---\n",
        SYSTEM_INSTRUCTION, plan, reference
    )
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that can turn a [`Prompt`] into an answer.
pub trait CompletionClient: Send + Sync {
    fn complete<'a>(&'a self, prompt: &'a Prompt) -> BoxFuture<'a, Result<String, AssistantError>>;
}

/// Model metadata as returned by the model listing endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// Gemini `generateContent` over REST.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        GeminiClient {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// GET /models
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, AssistantError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Http(status.as_u16(), body));
        }
        Ok(response.json::<ModelList>().await?.models)
    }

    /// POST /models/{model}:generateContent
    async fn generate(&self, prompt: &Prompt) -> Result<String, AssistantError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = request_body(prompt);
        debug!("Sending {} history turns to {}", prompt.history.len(), self.model);

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini returned {}", status);
            return Err(AssistantError::Http(status.as_u16(), body));
        }

        let json: Value = response.json().await?;
        response_text(&json).ok_or(AssistantError::EmptyResponse)
    }
}

impl CompletionClient for GeminiClient {
    fn complete<'a>(&'a self, prompt: &'a Prompt) -> BoxFuture<'a, Result<String, AssistantError>> {
        Box::pin(self.generate(prompt))
    }
}

fn request_body(prompt: &Prompt) -> Value {
    let mut contents: Vec<Value> = prompt
        .history
        .iter()
        .map(|turn| json!({ "role": turn.role, "parts": turn.parts }))
        .collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": prompt.message }] }));

    json!({
        "systemInstruction": { "parts": [{ "text": prompt.system }] },
        "contents": contents,
        "generationConfig": {
            "maxOutputTokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE,
        },
    })
}

// Concatenated text parts of the first candidate.
fn response_text(json: &Value) -> Option<String> {
    let parts = json["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|part| part["text"].as_str()).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
