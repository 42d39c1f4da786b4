//! Logging adapters for `Result` and `Option`.
//!
//! Handlers and the run directory use these to record a failure with
//! its call site while still propagating it with `?`.

use std::fmt::Display;
use std::panic::Location;

/// Log an `Err` with context and the caller's location, then pass it on.
pub trait ResultExt<T, E> {
    /// Log at error level.
    ///
    /// ```ignore
    /// use autopilot_control_plane::result_ext::ResultExt;
    ///
    /// directory.decide(&run_id, "propose-fix", decision).await.log("recording approval")?;
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;

    /// Log at warn level, for failures the caller tolerates.
    fn log_warn<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller = Location::caller();
            tracing::error!(
                target: "autopilot_control_plane",
                error = %e,
                file = %format!("{}:{}", caller.file(), caller.line()),
                context = %context.to_string(),
                "Operation failed"
            );
        }
        self
    }

    #[track_caller]
    fn log_warn<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller = Location::caller();
            tracing::warn!(
                target: "autopilot_control_plane",
                error = %e,
                file = %format!("{}:{}", caller.file(), caller.line()),
                context = %context.to_string(),
                "Operation failed"
            );
        }
        self
    }
}

/// Log a `None` with context and the caller's location, then pass it on.
pub trait OptionResultExt<T> {
    fn log_none<S: ToString>(self, context: S) -> Option<T>;
}

impl<T> OptionResultExt<T> for Option<T> {
    #[track_caller]
    fn log_none<S: ToString>(self, context: S) -> Option<T> {
        if self.is_none() {
            let caller = Location::caller();
            tracing::warn!(
                target: "autopilot_control_plane",
                file = %format!("{}:{}", caller.file(), caller.line()),
                context = %context.to_string(),
                "Expected value was None"
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_result_ext_ok() {
        let result: Result<u64, AppError> = Ok(42);
        assert_eq!(result.log("recording approval").unwrap(), 42);
    }

    #[test]
    fn test_result_ext_err_passes_through() {
        let result: Result<u64, AppError> = Err(AppError::UnknownRun("missing".to_string()));
        let logged = result.log_warn("recording approval");
        assert!(matches!(logged, Err(AppError::UnknownRun(ref id)) if id == "missing"));
    }

    #[test]
    fn test_option_ext() {
        assert_eq!(Some("run-1").log_none("looking up run"), Some("run-1"));
        assert!(None::<&str>.log_none("looking up run").is_none());
    }
}
