//! Application-level error.
//!
//! Every failure that reaches `main` carries a process exit code:
//!
//! - `2`: configuration, file, or workbook destination problems
//! - `3`: the run produced no usable data
//! - `4`: a provider request or its payload failed

use crate::data::SourceError;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_NO_DATA: u8 = 3;
pub const EXIT_SOURCE: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        Self::new(EXIT_NO_DATA, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<SourceError> for AppError {
    fn from(err: SourceError) -> Self {
        Self::new(EXIT_SOURCE, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_errors_map_to_provider_exit_code() {
        let err: AppError = SourceError::NoData("KS11".to_string()).into();
        assert_eq!(err.exit_code(), EXIT_SOURCE);
        assert!(err.to_string().contains("KS11"));
    }
}
