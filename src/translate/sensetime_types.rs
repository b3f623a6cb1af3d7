//! Type definitions for the SenseNova wire protocol.
//!
//! Chat responses wrap everything in `{"status": {...}, "data": {...}}`; a non-empty
//! `status.msg` means the vendor rejected the call even when the HTTP status is 200.
//! Streaming events reuse the response shape with `delta` in place of `message`.

use serde::{Deserialize, Serialize};

use super::null_to_default;
use super::openai_types::Usage;

// ---------------------------------------------------------------------------
// Request types (what we send TO the vendor)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub know_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_config: Option<KnowledgeConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Plugin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plugin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search: Option<WebSearch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub associated_knowledge: Option<AssociatedKnowledge>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSearch {
    pub search_enable: bool,
    pub result_enable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssociatedKnowledge {
    pub content: String,
    pub mode: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    pub control_level: String,
    pub knowledge_base_result: bool,
    pub knowledge_base_configs: Vec<KnowledgeBaseConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    pub know_id: String,
    pub faq_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    pub model: String,
    pub instructions: String,
}

/// Exactly one vendor body per canonical request.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum VendorRequest {
    Chat(ChatRequest),
    Embedding(EmbeddingRequest),
    Image(ImageRequest),
}

// ---------------------------------------------------------------------------
// Response types (what we receive FROM the vendor)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, deserialize_with = "null_to_default")]
    pub status: ResponseStatus,
    #[serde(default, deserialize_with = "null_to_default")]
    pub data: ResponseData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseStatus {
    #[serde(default, deserialize_with = "null_to_default")]
    pub code: i64,
    #[serde(default, deserialize_with = "null_to_default")]
    pub msg: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(default, deserialize_with = "null_to_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub choices: Vec<Choice>,
    #[serde(
        default,
        deserialize_with = "null_to_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub knowledge_base_results: Vec<KnowledgeBaseResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<PluginResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default, deserialize_with = "null_to_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub finish_reason: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub index: usize,
    #[serde(default, deserialize_with = "null_to_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub delta: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBaseResult {
    #[serde(default, deserialize_with = "null_to_default")]
    pub know_id: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub results: Vec<KnowledgeHit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeHit {
    #[serde(default, deserialize_with = "null_to_default")]
    pub score: f64,
    #[serde(default, deserialize_with = "null_to_default")]
    pub result: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub extra_info: KnowledgeExtraInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeExtraInfo {
    #[serde(default, deserialize_with = "null_to_default")]
    pub file_id: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub page: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginResult {
    #[serde(default, deserialize_with = "null_to_default")]
    pub web_search: Option<WebSearchResult>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub associated_knowledge: Option<AssociatedKnowledge>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSearchResult {
    #[serde(default, deserialize_with = "null_to_default")]
    pub online_search_count: u32,
    #[serde(default, deserialize_with = "null_to_default")]
    pub results: Vec<WebSearchHit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSearchHit {
    #[serde(default, deserialize_with = "null_to_default")]
    pub index: u32,
    #[serde(default, deserialize_with = "null_to_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub url_source: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub icon: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(default, deserialize_with = "null_to_default")]
    pub embeddings: Vec<EmbeddingData>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingData {
    #[serde(default, deserialize_with = "null_to_default")]
    pub index: usize,
    #[serde(default, deserialize_with = "null_to_default")]
    pub status_code: i64,
    #[serde(default, deserialize_with = "null_to_default")]
    pub status_message: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub embedding: Vec<f64>,
}
