//! Result of a governor check that is allowed to fail open.

/// Outcome of a check backed by the key-value store.
///
/// When the store is unavailable the governor does not block the caller.
/// Instead of silently returning a default, it reports
/// [`Checked::FailedOpen`] so the caller can tell "allowed" apart from
/// "allowed because the check could not run".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checked<T> {
    /// The store answered; `T` is authoritative.
    Verified(T),
    /// The store failed; `fallback` is the permissive default.
    FailedOpen { fallback: T, reason: String },
}

impl<T> Checked<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Verified(v) | Self::FailedOpen { fallback: v, .. } => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Verified(v) | Self::FailedOpen { fallback: v, .. } => v,
        }
    }

    /// Returns `true` if the value is a fallback rather than a real answer.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::FailedOpen { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Checked<U> {
        match self {
            Self::Verified(v) => Checked::Verified(f(v)),
            Self::FailedOpen { fallback, reason } => Checked::FailedOpen {
                fallback: f(fallback),
                reason,
            },
        }
    }
}
