/// Programmer errors, surfaced as panics at construction sites.
///
/// Bad names and miswired clients are bugs in the calling code, not runtime
/// conditions, so construction fails loudly instead of returning `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MisuseError {
    #[error("bad method name")]
    BadMethodName,
    #[error("bad service name")]
    BadSvcName,
    #[error("alt client should not be the inproc client")]
    AltIsInprocClient,
}

/// Call errors, surfaced as `Result` from `invoke` and the layers below it.
///
/// `App` carries an application error decoded from a response frame; all the
/// other variants are produced by the framework itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    #[error("method not found or not implemented")]
    MethodNotFound,
    #[error("service not found")]
    SvcNotFound,
    #[error("service name conflict (duplicated)")]
    SvcNameConflict,
    #[error("closed")]
    Closed,
    #[error("deadline exceeded")]
    Timeout,
    #[error("transport: {0}")]
    Transport(String),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("encode: {0}")]
    Encode(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error(transparent)]
    App(AppError),
}

impl From<AppError> for CallError {
    #[inline]
    fn from(e: AppError) -> Self {
        Self::App(e)
    }
}

/// An application-level error carried inside a response frame.
///
/// `data` holds whatever extra payload the responder attached, already parsed
/// into a codec-neutral value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct AppError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(MisuseError::BadSvcName.to_string(), "bad service name");
        let e = CallError::App(AppError {
            code: -32601,
            message: "Method not found".to_string(),
            data: None,
        });
        assert_eq!(e.to_string(), "Method not found (code -32601)");
        assert_eq!(
            CallError::Transport("no responders".into()).to_string(),
            "transport: no responders"
        );
    }

    #[test]
    fn test_eq() {
        assert_eq!(CallError::MethodNotFound, CallError::MethodNotFound);
        assert_ne!(CallError::MethodNotFound, CallError::SvcNotFound);
    }
}
