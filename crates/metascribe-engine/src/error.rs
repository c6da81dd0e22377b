use std::fmt;

/// Failure of a single generation request.
#[derive(Debug)]
pub enum GenerationError {
    /// Non-success HTTP status, network fault or unreadable response body.
    Transport {
        operation: String,
        status: Option<u16>,
        message: String,
    },
    /// The image endpoint answered without any inline binary payload.
    MissingPayload { excerpt: String },
    /// Inline payload present but not valid base64.
    Decode { message: String },
}

impl GenerationError {
    pub fn transport(operation: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.to_string(),
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Terse notice for the user; full context lives in the diagnostics log.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport {
                status: Some(code), ..
            } => format!("Gemini request failed ({code}). See the diagnostics log."),
            Self::Transport { status: None, .. } => {
                "Could not reach Gemini. See the diagnostics log.".to_string()
            }
            Self::MissingPayload { .. } => "Gemini returned no image.".to_string(),
            Self::Decode { .. } => "Gemini returned an unreadable image.".to_string(),
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport {
                operation,
                status: Some(code),
                message,
            } => write!(f, "{operation} failed ({code}): {message}"),
            Self::Transport {
                operation,
                status: None,
                message,
            } => write!(f, "{operation} failed: {message}"),
            Self::MissingPayload { excerpt } if excerpt.is_empty() => {
                write!(f, "image response contained no inline data")
            }
            Self::MissingPayload { excerpt } => {
                write!(f, "image response contained no inline data: {excerpt}")
            }
            Self::Decode { message } => write!(f, "image payload decode failed: {message}"),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Outcome of a processing run that did not complete.
#[derive(Debug)]
pub enum ProcessError {
    /// No secret configured; the caller should collect one.
    MissingApiKey,
    Generation(GenerationError),
    Io(anyhow::Error),
}

impl ProcessError {
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingApiKey => {
                "Gemini API key is not set. Configure it before processing.".to_string()
            }
            Self::Generation(err) => err.user_message(),
            Self::Io(err) => format!("Could not access the document: {err}"),
        }
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "Gemini API key is not configured"),
            Self::Generation(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Generation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GenerationError> for ProcessError {
    fn from(err: GenerationError) -> Self {
        Self::Generation(err)
    }
}

impl From<anyhow::Error> for ProcessError {
    fn from(err: anyhow::Error) -> Self {
        Self::Io(err)
    }
}
