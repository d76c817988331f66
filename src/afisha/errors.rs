//! Error types for the Afisha API and site clients.

#[derive(Debug, thiserror::Error)]
pub enum AfishaApiError {
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("failed to parse response from {url}")]
    ParseFailed {
        status: u16,
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("captcha served instead of page: {url}")]
    Captcha { url: String },
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
}
