use thiserror::Error;

/// Why an external query produced no value.
///
/// Every probe, resolver and control call returns this instead of a silent
/// default; callers decide what "unavailable" means for them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("{program} is unavailable: {reason}")]
    ToolUnavailable { program: String, reason: String },

    #[error("{program} returned output that could not be parsed")]
    MalformedOutput { program: String },

    #[error("{program} did not answer in time")]
    TimedOut { program: String },

    #[error("session bus unreachable: {0}")]
    IpcUnreachable(String),

    #[error("no media players found")]
    NoPlayers,
}

impl ProbeError {
    pub fn unavailable(program: &str, reason: impl ToString) -> Self {
        ProbeError::ToolUnavailable {
            program: program.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(program: &str) -> Self {
        ProbeError::MalformedOutput {
            program: program.to_string(),
        }
    }
}

impl From<zbus::Error> for ProbeError {
    fn from(err: zbus::Error) -> Self {
        ProbeError::IpcUnreachable(err.to_string())
    }
}

impl From<zbus::fdo::Error> for ProbeError {
    fn from(err: zbus::fdo::Error) -> Self {
        ProbeError::IpcUnreachable(err.to_string())
    }
}
