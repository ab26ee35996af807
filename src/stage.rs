//! Per-stage pipeline outcomes.

/// How a best-effort pipeline stage ended.
///
/// Stages that can substitute a partial result (a sentinel backtrace, a
/// missing download URL) never return errors; they degrade. The
/// orchestrator branches on this explicitly, so "keep going with what we
/// have" is a visible, testable decision rather than a side effect of
/// swallowed errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage<T> {
    /// The stage produced its full result.
    Complete(T),
    /// The stage failed and substituted whatever it could.
    Degraded(T),
}

impl<T> Stage<T> {
    /// The carried value, complete or not.
    pub fn into_inner(self) -> T {
        match self {
            Stage::Complete(value) | Stage::Degraded(value) => value,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Stage::Degraded(_))
    }
}
