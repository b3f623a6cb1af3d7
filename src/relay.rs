//! One vendor call per canonical request.
//!
//! [`Adaptor`] translates the request, signs the call, sends it, and hands the
//! response to the matching handler. Streaming responses are split between a
//! producer task that frames the raw bytes and a consumer that translates frames
//! into canonical chunks, joined by a frame channel and a completion signal.

use crate::auth::CredentialIssuer;
use crate::config::AdaptorConfig;
use crate::error::{AdaptorError, Result};
use crate::translate::openai_types::{GeneralRequest, ImageRequest, Usage};
use crate::translate::request::{convert_image_request, convert_request};
use crate::translate::response::{embedding_to_openai, sensetime_to_openai, vendor_error};
use crate::translate::sensetime_types::{
    EmbeddingResponse as VendorEmbeddingResponse, Response, VendorRequest,
};
use crate::translate::streaming::{classify_frame, Frame, StreamEvent, StreamFramer, StreamTranslator};
use crate::vendor::{is_known_model, RelayMode};

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use reqwest::header::AUTHORIZATION;
use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Frames buffered between the producer and the consumer.
const FRAME_BUFFER: usize = 16;

pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// A translated, serialized response body and the status to write it with.
#[derive(Debug, Clone)]
pub struct JsonReply {
    pub status: u16,
    pub body: Bytes,
    pub usage: Option<Usage>,
}

pub enum RelayOutcome {
    Json(JsonReply),
    Stream(ChunkStream),
    /// Nothing to translate; only the vendor status is known.
    Empty { status: u16 },
}

impl fmt::Debug for RelayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(reply) => f.debug_tuple("Json").field(reply).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Empty { status } => f.debug_struct("Empty").field("status", status).finish(),
        }
    }
}

/// What was handed to the client by an [`sse_body`].
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    pub chunks: usize,
    pub usage: Option<Usage>,
    pub done: bool,
}

#[derive(Clone)]
pub struct Adaptor {
    base_url: String,
    credentials: CredentialIssuer,
    client: reqwest::Client,
}

impl Adaptor {
    pub fn new(
        base_url: impl Into<String>,
        credentials: CredentialIssuer,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            client,
        }
    }

    /// Resolve keys and build an HTTP client with the configured timeout.
    pub fn from_config(config: &AdaptorConfig) -> Result<Self> {
        let credentials = config.resolve_credentials()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.vendor.timeout_secs))
            .build()?;
        Ok(Self::new(config.vendor.base_url.clone(), credentials, client))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_url(&self, mode: RelayMode) -> String {
        mode.request_url(&self.base_url)
    }

    async fn send(&self, mode: RelayMode, body: &VendorRequest) -> Result<reqwest::Response> {
        let url = self.request_url(mode);
        let authorization = self.credentials.bearer()?;

        debug!(%url, ?mode, "Sending vendor request");

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, authorization)
            .json(body)
            .send()
            .await?;

        debug!(status = response.status().as_u16(), "Vendor responded");
        Ok(response)
    }

    /// Relay a chat completion, streaming or not depending on the request.
    pub async fn chat(&self, request: Option<&GeneralRequest>) -> Result<RelayOutcome> {
        let vendor_req = convert_request(RelayMode::ChatCompletions, request)?;
        let (model, stream) = request
            .map(|r| (r.model.clone(), r.is_stream()))
            .unwrap_or_default();

        info!(%model, stream, "Relaying chat completion");
        warn_unknown_model(&model);

        let response = self.send(RelayMode::ChatCompletions, &vendor_req).await?;
        let status = response.status().as_u16();

        if stream {
            if response.status().is_success() {
                return Ok(RelayOutcome::Stream(stream_handler(response, &model)));
            }
            let body = response.bytes().await.map_err(AdaptorError::read_body)?;
            return Err(stream_error_handler(status, &body));
        }

        let body = response.bytes().await.map_err(AdaptorError::read_body)?;
        text_handler(status, &body, &model).map(RelayOutcome::Json)
    }

    pub async fn embeddings(&self, request: Option<&GeneralRequest>) -> Result<RelayOutcome> {
        let vendor_req = convert_request(RelayMode::Embeddings, request)?;
        let model = request.map(|r| r.model.clone()).unwrap_or_default();

        info!(%model, "Relaying embeddings");
        warn_unknown_model(&model);

        let response = self.send(RelayMode::Embeddings, &vendor_req).await?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(AdaptorError::read_body)?;
        embeddings_handler(status, &body, &model).map(RelayOutcome::Json)
    }

    pub async fn image(&self, request: Option<&ImageRequest>) -> Result<RelayOutcome> {
        let vendor_req = convert_image_request(request)?;
        let model = request.map(|r| r.model.as_str()).unwrap_or_default();

        info!(%model, "Relaying image generation");

        let response = self.send(RelayMode::ImagesGenerations, &vendor_req).await?;
        Ok(image_handler(response.status().as_u16()))
    }
}

/// Unlisted models are still forwarded.
fn warn_unknown_model(model: &str) {
    if !is_known_model(model) {
        warn!(%model, "Model is not in the SenseNova catalogue");
    }
}

/// Translate a complete chat response body.
///
/// # Errors
/// `Decode` when the body is not vendor JSON or the translation cannot be
/// serialized, `Vendor` when the vendor reported a failure in `status.msg`.
pub fn text_handler(status: u16, body: &[u8], model: &str) -> Result<JsonReply> {
    let resp: Response = serde_json::from_slice(body).map_err(AdaptorError::unmarshal)?;

    if let Some(err) = vendor_error(&resp, status) {
        warn!(status, error = %err, "Vendor rejected chat completion");
        return Err(err);
    }

    let translated = sensetime_to_openai(&resp, model);
    let body = serde_json::to_vec(&translated).map_err(AdaptorError::marshal)?;

    info!(
        status,
        choices = translated.choices.len(),
        prompt_tokens = translated.usage.prompt_tokens,
        completion_tokens = translated.usage.completion_tokens,
        "Chat completion translated"
    );

    Ok(JsonReply {
        status,
        body: Bytes::from(body),
        usage: Some(translated.usage),
    })
}

pub fn embeddings_handler(status: u16, body: &[u8], model: &str) -> Result<JsonReply> {
    let resp: VendorEmbeddingResponse =
        serde_json::from_slice(body).map_err(AdaptorError::unmarshal)?;

    let translated = embedding_to_openai(&resp, model);
    let body = serde_json::to_vec(&translated).map_err(AdaptorError::marshal)?;

    info!(status, items = translated.data.len(), "Embeddings translated");

    Ok(JsonReply {
        status,
        body: Bytes::from(body),
        usage: Some(translated.usage),
    })
}

// TODO: translate the /v1/assistants response once the vendor documents its shape.
pub fn image_handler(status: u16) -> RelayOutcome {
    warn!(status, "Image responses are not translated; returning no body");
    RelayOutcome::Empty { status }
}

/// A streaming call the vendor refused before any event was sent.
fn stream_error_handler(status: u16, body: &[u8]) -> AdaptorError {
    match serde_json::from_slice::<Response>(body) {
        Ok(resp) => vendor_error(&resp, status).unwrap_or_else(|| AdaptorError::Vendor {
            code: i64::from(status),
            message: format!("vendor returned status {status}"),
            status,
        }),
        Err(e) => {
            warn!(status, error = %e, "Undecodable vendor error body");
            AdaptorError::Vendor {
                code: i64::from(status),
                message: format!(
                    "vendor returned status {status}: {}",
                    truncate(&String::from_utf8_lossy(body), 300)
                ),
                status,
            }
        }
    }
}

/// Frame and translate a live vendor response.
pub fn stream_handler(response: reqwest::Response, model: &str) -> ChunkStream {
    let (frames, done) = spawn_frame_producer(response.bytes_stream());
    Box::pin(chunk_stream(frames, done, model.to_string()))
}

/// Start the producer: scan `byte_stream` into frames and send their payloads in
/// order, then signal completion. A read error or an oversized frame ends the
/// scan like end of input, except that an oversized remainder is discarded.
/// The producer stops as soon as the frame receiver is dropped.
pub fn spawn_frame_producer<S, E>(byte_stream: S) -> (mpsc::Receiver<String>, oneshot::Receiver<()>)
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let (frame_tx, frame_rx) = mpsc::channel(FRAME_BUFFER);
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut framer = StreamFramer::new();
        let mut exhausted = false;
        tokio::pin!(byte_stream);

        while !exhausted {
            let frames = match byte_stream.next().await {
                Some(Ok(bytes)) => {
                    let frames = framer.push(&bytes);
                    if framer.is_overflowing() {
                        warn!(
                            buffered = framer.buffered_len(),
                            "Vendor frame too long, closing stream"
                        );
                        exhausted = true;
                    }
                    frames
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Vendor stream read failed, closing stream");
                    exhausted = true;
                    framer.finish().into_iter().collect()
                }
                None => {
                    exhausted = true;
                    framer.finish().into_iter().collect()
                }
            };

            for frame in frames {
                match classify_frame(&frame) {
                    Frame::Skip => {}
                    Frame::Terminate => {
                        exhausted = true;
                        break;
                    }
                    Frame::Payload(payload) => {
                        if frame_tx.send(payload).await.is_err() {
                            debug!("Stream consumer went away, stopping scan");
                            return;
                        }
                    }
                }
            }
        }

        let _ = done_tx.send(());
    });

    (frame_rx, done_rx)
}

/// The consumer: one chunk per translatable frame, in arrival order, then exactly
/// one [`StreamEvent::Done`].
pub fn chunk_stream(
    mut frames: mpsc::Receiver<String>,
    mut done: oneshot::Receiver<()>,
    model: String,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    async_stream::stream! {
        let mut translator = StreamTranslator::new(&model);

        loop {
            // Frames win over the completion signal so nothing queued is lost.
            let next = tokio::select! {
                biased;
                Some(payload) = frames.recv() => Some(payload),
                _ = &mut done => None,
            };
            let Some(payload) = next else { break };

            if let Some(chunk) = translator.process_payload(&payload) {
                yield StreamEvent::Chunk(chunk);
            }
        }

        info!(
            chunks = translator.chunk_count(),
            usage = ?translator.usage(),
            "Stream completed"
        );
        yield StreamEvent::Done;
    }
}

/// Encode events as `data: ...` SSE blocks for a response body.
///
/// The receiver resolves when the body is finished or dropped. It carries a
/// summary once the terminal event has been taken by the writer, or a
/// `write_stream_failed` transport error if the writer went away first. Dropping
/// the body drops `events`, which stops the producer.
pub fn sse_body<S>(
    events: S,
) -> (
    impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static,
    oneshot::Receiver<Result<StreamSummary>>,
)
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let (report_tx, report_rx) = oneshot::channel();

    let body = async_stream::stream! {
        let mut delivery = Delivery::new(report_tx);
        let mut events = Box::pin(events);

        while let Some(event) = events.next().await {
            let sse = match event.to_sse() {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "Dropping stream event that failed to serialize");
                    continue;
                }
            };

            yield Ok::<_, Infallible>(Bytes::from(sse));
            // Resumed only after the writer asked for more.
            delivery.record(event);
        }
    };

    (body, report_rx)
}

/// Reports the outcome of one SSE body when it is dropped.
struct Delivery {
    summary: StreamSummary,
    report: Option<oneshot::Sender<Result<StreamSummary>>>,
}

impl Delivery {
    fn new(report: oneshot::Sender<Result<StreamSummary>>) -> Self {
        Self {
            summary: StreamSummary::default(),
            report: Some(report),
        }
    }

    fn record(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Chunk(chunk) => {
                self.summary.chunks += 1;
                if chunk.usage.is_some() {
                    self.summary.usage = chunk.usage;
                }
            }
            StreamEvent::Done => self.summary.done = true,
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        let Some(report) = self.report.take() else {
            return;
        };
        let summary = std::mem::take(&mut self.summary);
        let outcome = if summary.done {
            Ok(summary)
        } else {
            Err(AdaptorError::write_stream(format!(
                "client stopped reading after {} chunks",
                summary.chunks
            )))
        };
        let _ = report.send(outcome);
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
