#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreErrorCode {
    Io,
    Parse,
    /// The pass was started without a record store or resolver.
    MissingStore,
    Cancelled,
    InvalidConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct CoreError {
    pub code: CoreErrorCode,
    pub message: String,
}

impl CoreError {
    pub fn new(code: CoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn cancelled(stage: &str) -> Self {
        Self::new(CoreErrorCode::Cancelled, format!("cancelled during {stage}"))
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == CoreErrorCode::Cancelled
    }
}
