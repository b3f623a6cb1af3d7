use super::openai_types::{
    EmbeddingItem, EmbeddingResponse, ResponseMessage, TextChoice, TextResponse, Usage,
};
use super::sensetime_types::{EmbeddingResponse as VendorEmbeddingResponse, Response};
use crate::error::AdaptorError;

/// Translate a complete SenseNova chat response into a canonical completion.
/// Pure function: `model` is the model the caller asked for.
///
/// The vendor marks the end of a reply positionally: only the last choice is
/// finished, every earlier one gets an empty finish reason.
pub fn sensetime_to_openai(resp: &Response, model: &str) -> TextResponse {
    let last = resp.data.choices.len().saturating_sub(1);

    let choices = resp
        .data
        .choices
        .iter()
        .enumerate()
        .map(|(i, choice)| TextChoice {
            index: i,
            message: ResponseMessage {
                role: choice.role.clone(),
                content: choice.message.trim_matches('"').to_string(),
            },
            finish_reason: if i == last {
                "stop".to_string()
            } else {
                String::new()
            },
        })
        .collect();

    TextResponse {
        id: resp.data.id.clone(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices,
        usage: resp.data.usage.clone().unwrap_or_default(),
    }
}

/// A populated `status.msg` means the vendor failed the call, whatever the HTTP status.
pub fn vendor_error(resp: &Response, http_status: u16) -> Option<AdaptorError> {
    if resp.status.msg.is_empty() {
        return None;
    }

    Some(AdaptorError::Vendor {
        code: resp.status.code,
        message: resp.status.msg.clone(),
        status: http_status,
    })
}

pub fn embedding_to_openai(resp: &VendorEmbeddingResponse, model: &str) -> EmbeddingResponse {
    let data = resp
        .embeddings
        .iter()
        .map(|item| EmbeddingItem {
            object: "embedding".to_string(),
            index: item.index,
            embedding: item.embedding.clone(),
        })
        .collect();

    EmbeddingResponse {
        object: "list".to_string(),
        data,
        model: model.to_string(),
        usage: Usage {
            prompt_tokens: resp.usage.prompt_tokens,
            completion_tokens: resp.usage.completion_tokens,
            total_tokens: resp.usage.total_tokens,
        },
    }
}
