//! Translate canonical requests into SenseNova request bodies.
//!
//! The vendor rejects sampling parameters on the 0.0 / 1.0 boundaries, so temperature
//! and top-p are always clamped into `[0.01, 0.99]`, including when the caller left
//! them unset. Embeddings accept exactly one input per call.

use super::openai_types::{GeneralRequest, ImageRequest};
use super::sensetime_types::{
    ChatRequest, EmbeddingRequest, ImageRequest as VendorImageRequest, Message, VendorRequest,
};
use crate::error::{AdaptorError, Result};
use crate::vendor::RelayMode;

pub const MIN_SAMPLING: f64 = 0.01;
pub const MAX_SAMPLING: f64 = 0.99;

/// Clamp a temperature / top-p value into the range the vendor accepts.
/// Unset and NaN values land on the lower bound.
#[must_use]
pub fn clamp_sampling(value: Option<f64>) -> f64 {
    let v = value.unwrap_or(0.0);
    if v.is_nan() {
        return MIN_SAMPLING;
    }
    v.clamp(MIN_SAMPLING, MAX_SAMPLING)
}

/// Translate a chat or embeddings request for the given relay mode.
///
/// # Errors
/// `AdaptorError::Validation` when the request is absent or, for embeddings, does not
/// carry exactly one input. No network call is made in either case.
pub fn convert_request(mode: RelayMode, request: Option<&GeneralRequest>) -> Result<VendorRequest> {
    let request = request.ok_or_else(|| AdaptorError::validation("request is nil"))?;

    match mode {
        RelayMode::Embeddings => convert_embedding_request(request).map(VendorRequest::Embedding),
        _ => Ok(VendorRequest::Chat(openai_to_sensetime(request))),
    }
}

/// Pure chat translation: messages verbatim, sampling clamped, vendor extensions unset.
pub fn openai_to_sensetime(req: &GeneralRequest) -> ChatRequest {
    let messages = req
        .messages
        .iter()
        .map(|m| Message {
            role: m.role.clone(),
            content: m.string_content(),
        })
        .collect();

    ChatRequest {
        model: req.model.clone(),
        n: None,
        know_ids: None,
        max_new_tokens: req.max_tokens,
        messages,
        repetition_penalty: req.presence_penalty,
        stream: req.is_stream(),
        temperature: clamp_sampling(req.temperature),
        top_p: clamp_sampling(req.top_p),
        user: None,
        knowledge_config: None,
        plugins: None,
    }
}

pub fn convert_embedding_request(req: &GeneralRequest) -> Result<EmbeddingRequest> {
    let inputs = req.parse_input();
    if inputs.len() != 1 {
        return Err(AdaptorError::validation(format!(
            "invalid input length {}, sensetime only supports one input",
            inputs.len()
        )));
    }

    Ok(EmbeddingRequest {
        model: req.model.clone(),
        input: inputs,
    })
}

/// Image requests keep only model and prompt; size, count, quality and style have no
/// vendor equivalent and are dropped.
pub fn convert_image_request(request: Option<&ImageRequest>) -> Result<VendorRequest> {
    let request = request.ok_or_else(|| AdaptorError::validation("request is nil"))?;

    Ok(VendorRequest::Image(VendorImageRequest {
        model: request.model.clone(),
        instructions: request.prompt.clone(),
    }))
}
