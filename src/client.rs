//! Streaming transport for the two supported generation endpoints.
//!
//! Both adapters implement [`FragmentSource`]: they open one HTTP request
//! for a prompt and hand back a lazy stream of [`TextFragment`]s in arrival
//! order.  A non-success status is reported before any fragment is produced.
//! Cancelling the token ends the stream and drops the response body, which
//! terminates the request.

use std::env;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::time::{Duration, Instant};

use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, header};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result};
use crate::ndjson::process_ndjson;
use crate::observability::{
    STREAM_FRAGMENTS, TRANSPORT_REQUEST_ERRORS, TRANSPORT_REQUESTS, TRANSPORT_TTFB,
};
use crate::sse::process_sse;
use crate::types::{ChatCompletionRequest, ChatMessage, GenerateRequest, TextFragment};

/// Default endpoint of a local generate server.
pub const DEFAULT_GENERATE_URL: &str = "http://localhost:11434/api/generate";
/// Default model for the generate endpoint.
pub const DEFAULT_GENERATE_MODEL: &str = "deepseek-r1:8b";
/// Default base URL of the hosted chat-completions API.
pub const DEFAULT_CHAT_COMPLETIONS_URL: &str = "https://api.deepseek.com";
/// Default model for the chat-completions endpoint.
pub const DEFAULT_CHAT_COMPLETIONS_MODEL: &str = "deepseek-chat";
/// Environment variable holding the chat-completions API key.
pub const API_KEY_ENV: &str = "BANTER_API_KEY";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A lazy, single-pass stream of fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<TextFragment>> + Send>>;

/// Anything that can turn a prompt into a stream of text fragments.
#[async_trait::async_trait]
pub trait FragmentSource: Send + Sync {
    /// Open a streaming request for `prompt`.
    ///
    /// Fails with a transport error if the request does not succeed, and with
    /// [`Error::Abort`] if `cancel` fires before the response arrives.  Once
    /// `cancel` fires the returned stream yields nothing further.
    async fn start_stream(&self, prompt: &str, cancel: &CancellationToken)
    -> Result<FragmentStream>;

    /// Short description of the backend and model, for display.
    fn describe(&self) -> String;
}

/// The upstream API shape to talk to.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Backend {
    /// A local server exposing a newline-delimited JSON generate endpoint.
    #[default]
    Generate,

    /// A hosted chat-completions API streaming server-sent events.
    ChatCompletions,
}

impl Backend {
    /// Build the fragment source for this backend.
    pub fn connect(
        self,
        base_url: Option<String>,
        model: Option<String>,
        api_key: Option<String>,
    ) -> Result<Box<dyn FragmentSource>> {
        match self {
            Backend::Generate => Ok(Box::new(GenerateClient::with_options(
                base_url, model, None,
            )?)),
            Backend::ChatCompletions => Ok(Box::new(ChatCompletionsClient::with_options(
                api_key, base_url, model, None,
            )?)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Generate => write!(f, "generate"),
            Backend::ChatCompletions => write!(f, "chat-completions"),
        }
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "generate" | "ollama" | "local" => Ok(Backend::Generate),
            "chat-completions" | "chat" | "openai" | "deepseek" => Ok(Backend::ChatCompletions),
            _ => Err(Error::validation(
                format!("unknown backend {s:?}; expected generate or chat-completions"),
                Some("backend".to_string()),
            )),
        }
    }
}

/// Client for a newline-delimited JSON generate endpoint.
#[derive(Debug, Clone)]
pub struct GenerateClient {
    client: ReqwestClient,
    endpoint: Url,
    model: String,
    connect_timeout: Duration,
}

impl GenerateClient {
    /// Create a client for the default local endpoint.
    pub fn new(model: Option<String>) -> Result<Self> {
        Self::with_options(None, model, None)
    }

    /// Create a client with custom settings.
    pub fn with_options(
        endpoint: Option<String>,
        model: Option<String>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint.as_deref().unwrap_or(DEFAULT_GENERATE_URL))?;
        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        Ok(Self {
            client: build_http_client(connect_timeout)?,
            endpoint,
            model: model.unwrap_or_else(|| DEFAULT_GENERATE_MODEL.to_string()),
            connect_timeout,
        })
    }

    /// The endpoint requests are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl FragmentSource for GenerateClient {
    async fn start_stream(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<FragmentStream> {
        let body = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: true,
        };
        let request = self
            .client
            .post(self.endpoint.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/x-ndjson")
            .json(&body);
        let response = send_streaming(request, cancel, self.connect_timeout).await?;
        Ok(cancellable(process_ndjson(response.bytes_stream()), cancel))
    }

    fn describe(&self) -> String {
        format!("{} via {}", self.model, self.endpoint)
    }
}

/// Client for a chat-completions style streaming API.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    model: String,
    connect_timeout: Duration,
}

impl ChatCompletionsClient {
    /// Create a new client.
    ///
    /// The API key can be provided directly or read from the BANTER_API_KEY
    /// environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(API_KEY_ENV).map_err(|_| {
                Error::authentication(format!(
                    "API key not provided and {API_KEY_ENV} environment variable not set"
                ))
            })?,
        };
        let mut base_url = Url::parse(base_url.as_deref().unwrap_or(DEFAULT_CHAT_COMPLETIONS_URL))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        Ok(Self {
            api_key,
            client: build_http_client(connect_timeout)?,
            base_url,
            model: model.unwrap_or_else(|| DEFAULT_CHAT_COMPLETIONS_MODEL.to_string()),
            connect_timeout,
        })
    }

    /// The URL requests are posted to.
    pub fn endpoint(&self) -> Result<Url> {
        Ok(self.base_url.join("chat/completions")?)
    }

    /// The model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::authentication("API key is not a valid header value"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl FragmentSource for ChatCompletionsClient {
    async fn start_stream(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<FragmentStream> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: true,
        };
        let request = self
            .client
            .post(self.endpoint()?)
            .headers(self.default_headers()?)
            .json(&body);
        let response = send_streaming(request, cancel, self.connect_timeout).await?;
        Ok(cancellable(process_sse(response.bytes_stream()), cancel))
    }

    fn describe(&self) -> String {
        format!("{} via {}", self.model, self.base_url)
    }
}

fn build_http_client(connect_timeout: Duration) -> Result<ReqwestClient> {
    ReqwestClient::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })
}

/// Send `request`, racing it against `cancel`, and check the status.
async fn send_streaming(
    request: RequestBuilder,
    cancel: &CancellationToken,
    connect_timeout: Duration,
) -> Result<Response> {
    TRANSPORT_REQUESTS.click();
    let started = Instant::now();
    let sent = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(Error::abort("request cancelled before the response arrived"));
        }
        sent = request.send() => sent,
    };
    let response = sent.map_err(|e| {
        TRANSPORT_REQUEST_ERRORS.click();
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(connect_timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    })?;

    if !response.status().is_success() {
        TRANSPORT_REQUEST_ERRORS.click();
        return Err(process_error_response(response).await);
    }
    if response.content_length() == Some(0) {
        TRANSPORT_REQUEST_ERRORS.click();
        return Err(Error::api(
            response.status().as_u16(),
            "response has no body to stream",
        ));
    }
    TRANSPORT_TTFB.add(started.elapsed().as_secs_f64());
    Ok(response)
}

/// End `stream` as soon as `cancel` fires.
fn cancellable<S>(stream: S, cancel: &CancellationToken) -> FragmentStream
where
    S: Stream<Item = Result<TextFragment>> + Send + 'static,
{
    let cancelled = cancel.clone().cancelled_owned();
    Box::pin(
        stream
            .inspect(|fragment| {
                if fragment.is_ok() {
                    STREAM_FRAGMENTS.click();
                }
            })
            .take_until(cancelled),
    )
}

/// Process API response errors and convert to our Error type.
async fn process_error_response(response: Response) -> Error {
    let status_code = response.status().as_u16();

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<u64>().ok());

    // Hosted APIs nest the message in an object; local servers send a string.
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ErrorDetail {
        Message(String),
        Object { message: Option<String> },
    }

    let error_body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Error::http_client(
                format!("Failed to read error response: {e}"),
                Some(Box::new(e)),
            );
        }
    };

    let message = match serde_json::from_str::<ErrorResponse>(&error_body) {
        Ok(ErrorResponse {
            error: ErrorDetail::Message(message),
        })
        | Ok(ErrorResponse {
            error:
                ErrorDetail::Object {
                    message: Some(message),
                },
        }) => message,
        _ if error_body.trim().is_empty() => format!("request failed with status {status_code}"),
        _ => error_body,
    };

    match status_code {
        401 => Error::authentication(message),
        408 => Error::timeout(message, None),
        429 => Error::rate_limit(message, retry_after),
        502..=504 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, message),
    }
}
