//! Process exit codes
//!
//! Scripts rely on these values, so they never change meaning.

use s3backup_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    /// Upload failures or anything unclassified
    GeneralError = 1,
    /// Bad arguments or settings
    UsageError = 2,
    NetworkError = 3,
    AuthError = 4,
    NotFound = 5,
}

impl ExitCode {
    /// Exit code for a terminal backup error
    pub fn for_error(error: &Error) -> Self {
        match error {
            Error::Config(_) | Error::InvalidBucket(_) => ExitCode::UsageError,
            Error::AccessDenied(_) => ExitCode::AuthError,
            Error::NotFound(_) => ExitCode::NotFound,
            Error::Network(_) | Error::Conflict(_) => ExitCode::NetworkError,
            _ => ExitCode::GeneralError,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}
