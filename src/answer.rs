//! Question answering over retrieved context.
//!
//! The language model is a black box behind [`LanguageModel`]: it takes a
//! prompt and returns text. [`Answerer`] retrieves context from a
//! [`KnowledgeSource`], declines when nothing was found, and otherwise asks
//! the model to answer from the numbered context documents only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{AnswerBackend, AnswerConfig, Config};
use crate::embedding::{gemini_model_path, GEMINI_BASE_URL};
use crate::error::{Error, Result};
use crate::models::RetrievedDocument;
use crate::retrieval::KnowledgeSource;

/// Returned verbatim when retrieval finds nothing.
pub const DECLINE_MESSAGE: &str =
    "I could not find relevant information in the medical knowledge base to answer this question.";

const INSTRUCTIONS: &str = "You are a medical information assistant. Answer the question using \
only the context documents below. If the context does not contain the answer, say so. \
Do not give a diagnosis; recommend consulting a healthcare professional where appropriate.";

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Gemini `generateContent`. Requires `GOOGLE_API_KEY`.
pub struct GeminiModel {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(config: &AnswerConfig) -> Result<Self> {
        let api_key = match std::env::var("GOOGLE_API_KEY") {
            Ok(k) if !k.trim().is_empty() => k,
            _ => return Err(Error::MissingCredential("GOOGLE_API_KEY".to_string())),
        };
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| GEMINI_BASE_URL.to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: gemini_model_path(&config.model),
            url: url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Concatenated text parts of the first candidate.
fn parse_generate_response(body: serde_json::Value) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_value(body)?;
    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
        .ok_or_else(|| Error::backend("gemini", "response contained no candidates"))
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });
        let response = self
            .client
            .post(format!("{}/{}:generateContent", self.url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::backend("gemini", format!("HTTP {}: {}", status, text)));
        }
        parse_generate_response(response.json().await?)
    }
}

pub fn create_model(config: &AnswerConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider {
        AnswerBackend::Gemini => Ok(Arc::new(GeminiModel::new(config)?)),
        AnswerBackend::Disabled => Err(Error::Config(
            "answer provider is disabled; set [answer] provider in config".to_string(),
        )),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<RetrievedDocument>,
}

pub struct Answerer {
    source: Arc<dyn KnowledgeSource>,
    model: Arc<dyn LanguageModel>,
}

impl Answerer {
    pub fn new(source: Arc<dyn KnowledgeSource>, model: Arc<dyn LanguageModel>) -> Self {
        Self { source, model }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub async fn answer(&self, question: &str, top_k: i64) -> Result<Answer> {
        let sources = self.source.search(question, top_k).await?;
        if sources.is_empty() {
            return Ok(Answer {
                answer: DECLINE_MESSAGE.to_string(),
                sources,
            });
        }
        let prompt = build_prompt(question, &sources);
        let answer = self.model.generate(&prompt).await?;
        Ok(Answer { answer, sources })
    }
}

pub fn build_prompt(question: &str, context: &[RetrievedDocument]) -> String {
    let mut prompt = String::new();
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\nContext:\n");
    for (i, doc) in context.iter().enumerate() {
        prompt.push_str(&format!("\n[{}]\n{}\n", i + 1, doc.content));
    }
    prompt.push_str(&format!("\nQuestion: {}\nAnswer:", question));
    prompt
}

/// CLI entry point for `medrag ask`.
pub async fn run_ask(config: &Config, question: &str, top_k: Option<i64>) -> Result<()> {
    let provider = crate::embedding::create_provider(&config.embedding)?;
    let source = crate::retrieval::build_knowledge_source(config, provider).await?;
    let answerer = Answerer::new(source, create_model(&config.answer)?);
    let top_k = top_k.unwrap_or(config.retrieval.default_max_results as i64);
    let answer = answerer.answer(question, top_k).await?;

    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("sources:");
        for (i, doc) in answer.sources.iter().enumerate() {
            let disease = doc
                .metadata
                .get("disease")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("(unknown)");
            println!("  [{}] {}", i + 1, disease);
        }
    }
    Ok(())
}
