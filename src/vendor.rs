//! Static facts about the SenseNova API: endpoints per relay mode and the model catalogue.

pub const CHANNEL_NAME: &str = "sensetime";

pub const DEFAULT_BASE_URL: &str = "https://api.sensenova.cn";

/// Models the vendor serves through this adaptor.
pub const MODEL_LIST: &[&str] = &[
    "SenseChat-5",
    "SenseChat-5-Cantonese",
    "SenseChat",
    "SenseChat-32K",
    "SenseChat-128K",
    "SenseChat-Turbo",
    "SenseChat-Character",
    "SenseChat-Character-Pro",
    "SenseChat-Vision",
    "nova-embedding-stable",
];

/// The kind of canonical operation being relayed, as declared by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    #[default]
    ChatCompletions,
    Embeddings,
    ImagesGenerations,
}

impl RelayMode {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::ChatCompletions => "/v1/llm/chat-completions",
            Self::Embeddings => "/v1/llm/embeddings",
            Self::ImagesGenerations => "/v1/assistants",
        }
    }

    #[must_use]
    pub fn request_url(self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path())
    }
}

#[must_use]
pub fn is_known_model(name: &str) -> bool {
    MODEL_LIST.iter().any(|m| m.eq_ignore_ascii_case(name))
}
