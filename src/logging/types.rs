//! The [`Log`] trait steps and the runner log through.

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) forwards to `tracing`; tests substitute
/// an in-memory recorder to assert on what a run reported.
pub trait Log: Send + Sync + std::fmt::Debug {
    /// Log a stage header (one per module).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a change a dry run would have made.
    fn dry_run(&self, msg: &str);
}
