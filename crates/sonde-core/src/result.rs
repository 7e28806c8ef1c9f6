//! Result alias for the engine

use crate::error::SondeError;

pub type Result<T> = std::result::Result<T, SondeError>;

pub trait ResultExt<T> {
    /// Downgrade a recoverable error to `Ok(None)` after logging it
    ///
    /// Non-recoverable errors (config, IO, catalog, internal) are returned
    /// unchanged.
    fn recoverable(self) -> Result<Option<T>>;
}

impl<T> ResultExt<T> for Result<T> {
    fn recoverable(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_recoverable() => {
                tracing::warn!(kind = ?err.kind(), "Continuing without result: {err}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_responses_are_recoverable() {
        let result: Result<u32> =
            Err(SondeError::invalid_response("CapabilityStatement has no rest entry"));
        assert!(matches!(result.recoverable(), Ok(None)));
    }

    #[test]
    fn values_pass_through() {
        let result: Result<u32> = Ok(7);
        assert_eq!(result.recoverable().unwrap(), Some(7));
    }

    #[test]
    fn config_errors_are_not_recoverable() {
        let result: Result<u32> = Err(SondeError::config_error("bad"));
        assert!(result.recoverable().is_err());
    }
}
