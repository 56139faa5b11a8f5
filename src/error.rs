use derive_more::{Display, From};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, From)]
pub enum Error {
    #[display("I/O error: {_0}")]
    #[from]
    Io(std::io::Error),

    #[display("HTTP request failed: {_0}")]
    #[from]
    Http(reqwest::Error),

    #[display("JSON error: {_0}")]
    #[from]
    Json(serde_json::Error),

    #[display("Config parse error: {_0}")]
    #[from]
    Toml(toml::de::Error),

    #[display("OpenAI error: {_0}")]
    #[from]
    OpenAI(async_openai::error::OpenAIError),

    #[display("{service} API error ({status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[display("YouTube API quota exhausted: {_0}")]
    QuotaExceeded(String),

    #[display("Invalid cursor: {_0}")]
    InvalidCursor(String),

    #[display("Configuration error: {_0}")]
    Config(String),

    #[display("Search cancelled")]
    Cancelled,

    #[display("{_0}")]
    Custom(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Toml(e) => Some(e),
            Error::OpenAI(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn invalid_cursor(message: impl Into<String>) -> Self {
        Error::InvalidCursor(message.into())
    }
}
