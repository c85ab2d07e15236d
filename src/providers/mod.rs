//! Provider endpoints and the HTTP transport behind them.
//!
//! Every endpoint kind owns a payload builder and a response normalizer;
//! [`EndpointKind`] selects between them by pattern match.

/// Anthropic messages payloads.
pub(crate) mod anthropic;
/// Google generate-content payloads.
pub(crate) mod google;
/// HTTP dispatcher used outside of tests.
pub mod http;
/// Local inference server payloads.
pub(crate) mod local;
/// OpenAI chat-completions payloads.
pub(crate) mod openai;
/// Kinds, targets, credentials and the dispatch seam.
pub mod provider;

pub use http::HttpDispatcher;
pub use provider::{
    Credentials, Dispatcher, EndpointKind, Endpoints, PreparedRequest, ProviderError,
    ProviderTarget,
};
