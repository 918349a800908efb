#![feature(error_generic_member_access)]
#![deny(missing_docs)]

//! This crate defines error & result types for Pario.
//! It also contains a variety of useful macros for error handling.
//!
//! Every fallible operation in the workspace returns a [`PioResult`]. Callers that need to branch
//! on the failure use [`PioError::kind`], which folds the variants into the four categories the
//! registries and planner report: invalid input, missing handle, resource in use, and internal
//! invariant violation.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    fn from(msg: T) -> Self {
        Self(msg.into())
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The top-level error type for Pario.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum PioError {
    /// A caller supplied a malformed handle, a non-positive dimension or an inconsistent length.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, Backtrace),
    /// A handle to a resource that has already been freed.
    #[error("{0}\nBacktrace:\n{1}")]
    NotFound(ErrString, Backtrace),
    /// A delete was refused because other resources still depend on the target.
    #[error("{0}\nBacktrace:\n{1}")]
    InUse(ErrString, Backtrace),
    /// An index is out of bounds.
    #[error("index {0} out of bounds from {1} to {2}\nBacktrace:\n{3}")]
    OutOfBounds(usize, usize, usize, Backtrace),
    /// The planner produced a result that violates its own invariants.
    #[error("{0}\nBacktrace:\n{1}")]
    Internal(ErrString, Backtrace),
    /// A wrapper for other errors, carrying additional context.
    #[error("{0}: {1}")]
    Context(ErrString, #[source] Box<PioError>),
}

/// The category of a [`PioError`], stable across context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, reported to the caller and never retried.
    InvalidArgument,
    /// The handle does not exist or was already freed.
    NotFound,
    /// The resource still has live dependents; nothing was changed.
    InUse,
    /// A logic defect inside the library.
    Internal,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NotFound => write!(f, "not found"),
            Self::InUse => write!(f, "in use"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

impl PioError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        PioError::Context(msg.into(), Box::new(self))
    }

    /// The category this error belongs to, looking through any context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(..) | Self::OutOfBounds(..) => ErrorKind::InvalidArgument,
            Self::NotFound(..) => ErrorKind::NotFound,
            Self::InUse(..) => ErrorKind::InUse,
            Self::Internal(..) => ErrorKind::Internal,
            Self::Context(_, inner) => inner.kind(),
        }
    }

    /// The error message without the captured backtrace.
    pub fn message(&self) -> String {
        match self {
            Self::InvalidArgument(msg, _)
            | Self::NotFound(msg, _)
            | Self::InUse(msg, _)
            | Self::Internal(msg, _) => msg.to_string(),
            Self::OutOfBounds(idx, start, stop, _) => {
                format!("index {idx} out of bounds from {start} to {stop}")
            }
            Self::Context(msg, inner) => format!("{msg}: {}", inner.message()),
        }
    }
}

impl Debug for PioError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// A type alias for Results that return PioErrors as their error type.
pub type PioResult<T> = Result<T, PioError>;

/// A convenient macro for creating a PioError.
#[macro_export]
macro_rules! pio_err {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::PioError::OutOfBounds($idx, $start, $stop, Backtrace::capture())
        )
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::PioError::$variant(format!($fmt, $($arg),*).into(), Backtrace::capture())
        )
    }};
    ($variant:ident: $err:expr $(,)?) => {
        $crate::__private::must_use(
            $crate::PioError::$variant($err)
        )
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::pio_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenient macro for returning a PioError.
#[macro_export]
macro_rules! pio_bail {
    ($($tt:tt)+) => {
        return Err($crate::pio_err!($($tt)+))
    };
}

#[doc(hidden)]
pub mod __private {
    #[doc(hidden)]
    #[inline]
    #[must_use]
    pub const fn must_use(s: crate::PioError) -> crate::PioError {
        s
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(pio_err!("bad dim {}", 0), ErrorKind::InvalidArgument)]
    #[case(pio_err!(NotFound: "file {} not found", 3), ErrorKind::NotFound)]
    #[case(pio_err!(InUse: "decomposition {} has pending writes", 1), ErrorKind::InUse)]
    #[case(pio_err!(Internal: "box exceeds dimension"), ErrorKind::Internal)]
    #[case(pio_err!(OutOfBounds: 5, 0, 4), ErrorKind::InvalidArgument)]
    fn kind_of_each_variant(#[case] err: PioError, #[case] kind: ErrorKind) {
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn context_preserves_kind() {
        let err = pio_err!(NotFound: "iosystem 0x10001 not found").with_context("deleting file");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            err.message(),
            "deleting file: iosystem 0x10001 not found"
        );
    }

    #[test]
    fn bail_returns_error() {
        fn check(dim: usize) -> PioResult<usize> {
            if dim == 0 {
                pio_bail!("dimension must be positive");
            }
            Ok(dim)
        }

        assert_eq!(check(4).ok(), Some(4));
        assert_eq!(
            check(0).map_err(|e| e.kind()).err(),
            Some(ErrorKind::InvalidArgument)
        );
    }
}
