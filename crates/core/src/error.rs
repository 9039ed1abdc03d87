use thiserror::Error;

/// Failure of the text-generation collaborator. The only error class that
/// crosses the routing boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation service is not configured: {0}")]
    NotConfigured(String),
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("generation service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation response was malformed: {0}")]
    MalformedResponse(String),
    #[error("generation response contained no text")]
    EmptyResponse,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("intent classification failed: {0}")]
    Classification(#[source] GenerationError),
    #[error("knowledge answer failed: {0}")]
    Knowledge(#[source] GenerationError),
}

impl RouterError {
    pub fn generation_error(&self) -> &GenerationError {
        match self {
            Self::Classification(err) | Self::Knowledge(err) => err,
        }
    }
}
