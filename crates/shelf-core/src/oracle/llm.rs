//! Model-backed oracle.
//!
//! Every capability sends a single user message to a messages-style HTTP
//! endpoint and reads back JSON from the reply text. Transport failures are
//! errors; a reply that cannot be understood is not. An unparseable
//! partition leaves every document in its own group, an unparseable merge
//! falls back to [`ConcatSynthesizer`], and an unparseable analysis keeps
//! the start of the reply as the summary.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::{
    Analyzer, ConcatSynthesizer, MergedContent, MergedDocument, OracleError, Partitioner,
    Synthesizer, excerpt_metadata,
};
use crate::document::{Document, Metadata};

/// Connection settings for the model endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            api_key: None,
            timeout: Duration::from_secs(120),
            max_tokens: 8192,
        }
    }
}

/// Sends one prompt and returns the concatenated reply text.
pub trait MessageClient {
    /// # Errors
    ///
    /// [`OracleError::Transport`] or [`OracleError::Status`] when the call
    /// fails, [`OracleError::InvalidResponse`] when the reply envelope is
    /// not the expected shape.
    fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

/// [`MessageClient`] over blocking HTTP.
pub struct HttpMessageClient {
    config: LlmConfig,
    agent: ureq::Agent,
}

impl HttpMessageClient {
    #[must_use]
    pub fn new(config: LlmConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }
}

#[derive(Debug, Deserialize)]
struct MessageReply {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

impl MessageClient for HttpMessageClient {
    fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut request = self
            .agent
            .post(&self.config.endpoint)
            .set("content-type", "application/json")
            .set("anthropic-version", "2023-06-01");
        if let Some(key) = &self.config.api_key {
            request = request.set("x-api-key", key);
        }

        let response = request.send_json(body).map_err(|err| match err {
            ureq::Error::Status(status, response) => OracleError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => OracleError::Transport(transport.to_string()),
        })?;

        let reply: MessageReply = response
            .into_json()
            .map_err(|err| OracleError::InvalidResponse(format!("reply envelope: {err}")))?;

        Ok(reply
            .content
            .into_iter()
            .filter(|block| block.kind.is_empty() || block.kind == "text")
            .map(|block| block.text)
            .collect())
    }
}

/// Partitioner, synthesizer, and analyzer backed by a language model.
pub struct LlmOracle<C = HttpMessageClient> {
    client: C,
}

impl LlmOracle<HttpMessageClient> {
    #[must_use]
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: HttpMessageClient::new(config),
        }
    }
}

impl<C: MessageClient> LlmOracle<C> {
    /// Use a custom client (tests, alternative transports).
    pub const fn with_client(client: C) -> Self {
        Self { client }
    }
}

/// Pull the JSON payload out of a model reply.
///
/// Prefers a ```` ```json ```` fenced block, then any fenced block, then the
/// whole reply; the result is trimmed.
#[must_use]
pub fn extract_json(reply: &str) -> &str {
    let fenced = reply
        .split_once("```json")
        .or_else(|| reply.split_once("```"))
        .map(|(_, rest)| rest.split_once("```").map_or(rest, |(inner, _)| inner));
    fenced.unwrap_or(reply).trim()
}

fn document_listing(documents: &[Document], separator: &str) -> String {
    let mut out = String::new();
    for (i, doc) in documents.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        let _ = write!(out, "=== Document {}: {} ===\n{}", i + 1, doc.key, doc.text());
    }
    out
}

fn partition_prompt(documents: &[Document]) -> String {
    format!(
        "Group the following documents, putting together ONLY documents that are \
genuinely duplicated or cover the same content.\n\n\
Merge only when all of these hold:\n\
- they cover the same specific subject (sharing a general domain is not enough)\n\
- they are the same kind of document (guide with guide, report with report)\n\
- their content actually overlaps or only makes sense as one document\n\n\
When unsure, do not merge. Most documents should stay in a group of their own.\n\n\
Documents:\n{}\n\n\
Reply with JSON only, no other text:\n\
[[\"key1\", \"key2\"], [\"key3\"], ...]\n\n\
Every document key must appear in exactly one group.",
        document_listing(documents, "\n\n")
    )
}

fn merge_prompt(documents: &[Document]) -> String {
    format!(
        "Turn the following documents into one concise consolidated document.\n\n\
- extract and summarize the key content rather than concatenating\n\
- include duplicated information only once\n\
- restructure logically with headings and sections\n\
- write Markdown\n\n\
Source documents:\n{}\n\n\
Reply with JSON only, no other text:\n\
{{\n  \"directory\": \"topic-domain\",\n  \"filename\": \"specific-content.md\",\n  \
\"content\": \"consolidated document (markdown)\",\n  \"metadata\": {{\n    \
\"summary\": \"2-3 sentence summary\",\n    \"categories\": [\"category\"],\n    \
\"tags\": [\"tag1\", \"tag2\"]\n  }}\n}}\n\n\
directory and filename must be lower-case English kebab-case. directory names \
the subject in 2-4 words; filename describes the content and ends in .md. \
Never use generic names such as \"uncategorized\".",
        document_listing(documents, "\n\n---\n\n")
    )
}

fn analyze_prompt(filename: &str, text: &str) -> String {
    format!(
        "Analyze the following file and describe it as JSON.\n\n\
File name: {filename}\n\n\
File content:\n{text}\n\n\
Reply with JSON only, no other text:\n\
{{\n  \"summary\": \"2-3 sentence summary\",\n  \
\"categories\": [\"category1\", \"category2\"],\n  \
\"tags\": [\"tag1\", \"tag2\", \"tag3\"]\n}}"
    )
}

#[derive(Debug, Deserialize)]
struct MergeReply {
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    content: String,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl<C: MessageClient> Partitioner for LlmOracle<C> {
    fn partition(&self, documents: &[Document]) -> Result<Vec<Vec<String>>, OracleError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let reply = self.client.complete(&partition_prompt(documents))?;

        match serde_json::from_str::<Vec<Vec<String>>>(extract_json(&reply)) {
            Ok(groups) => {
                debug!(groups = groups.len(), "model partition parsed");
                Ok(groups)
            }
            Err(err) => {
                warn!("model partition unparseable ({err}); leaving every document alone");
                Ok(documents.iter().map(|d| vec![d.key.clone()]).collect())
            }
        }
    }
}

impl<C: MessageClient> Synthesizer for LlmOracle<C> {
    fn synthesize(&self, documents: &[Document]) -> Result<MergedDocument, OracleError> {
        if documents.is_empty() {
            return Err(OracleError::EmptyGroup);
        }
        let reply = self.client.complete(&merge_prompt(documents))?;

        match serde_json::from_str::<MergeReply>(extract_json(&reply)) {
            Ok(merged) => Ok(MergedDocument {
                directory: merged.directory.unwrap_or_default(),
                filename: merged.filename.unwrap_or_default(),
                content: MergedContent::Text(merged.content),
                metadata: Metadata::from_json_object(&merged.metadata),
            }),
            Err(err) => {
                warn!("model merge unparseable ({err}); concatenating instead");
                ConcatSynthesizer.synthesize(documents)
            }
        }
    }
}

impl<C: MessageClient> Analyzer for LlmOracle<C> {
    fn analyze(&self, filename: &str, text: &str) -> Result<Metadata, OracleError> {
        let reply = self.client.complete(&analyze_prompt(filename, text))?;

        match serde_json::from_str::<Map<String, Value>>(extract_json(&reply)) {
            Ok(object) => {
                debug!(filename, "model analysis parsed");
                Ok(Metadata::from_json_object(&object))
            }
            Err(err) => {
                warn!("model analysis of {filename} unparseable ({err}); keeping reply as summary");
                Ok(excerpt_metadata(&reply))
            }
        }
    }
}
