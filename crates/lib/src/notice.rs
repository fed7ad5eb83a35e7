//! Transient user-facing notices (snackbar-style), as opposed to transcript messages.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Cloud drive listing returned nothing.
    NoFilesFound,
    /// Picking failed; carries the error detail.
    PickFailed(String),
    /// Provider that is offered but not built.
    NotImplemented(String),
    /// A reply is still pending; the new submission was not sent.
    ReplyPending,
    /// File type the endpoint does not accept.
    UnsupportedFile(String),
    SignInFailed(String),
    SignInCancelled,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NoFilesFound => write!(f, "No files found"),
            Notice::PickFailed(detail) => write!(f, "Failed to pick file: {}", detail),
            Notice::NotImplemented(provider) => write!(f, "{} is not implemented yet", provider),
            Notice::ReplyPending => write!(f, "Please wait for the current reply"),
            Notice::UnsupportedFile(name) => write!(f, "File type not supported: {}", name),
            Notice::SignInFailed(detail) => write!(f, "Sign-in failed: {}", detail),
            Notice::SignInCancelled => write!(f, "Sign-in cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_detail() {
        assert_eq!(
            Notice::PickFailed("401 Unauthorized".into()).to_string(),
            "Failed to pick file: 401 Unauthorized"
        );
        assert_eq!(
            Notice::NotImplemented("OneDrive".into()).to_string(),
            "OneDrive is not implemented yet"
        );
        assert_eq!(Notice::NoFilesFound.to_string(), "No files found");
    }
}
