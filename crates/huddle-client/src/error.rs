//! Errors raised inside the transport runtime.
//!
//! None of these reach the owner of a [`TransportHandle`](crate::TransportHandle);
//! the driver turns them into the `connection_error` string.

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
