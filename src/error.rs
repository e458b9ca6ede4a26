//! Runtime error taxonomy.
//!
//! Most failure modes in the class runtime are silent by design: redefining a
//! name with `overwrite=false`, re-running a constructor hook, or defining an
//! override whose ancestor implementation does not exist are all no-ops. Only
//! call-time failures and user errors surface through [`RtError`].

use strum::Display;

#[derive(Debug, Display)]
pub enum RtErrorKind {
    /// A value had the wrong shape for the operation; the payload names the
    /// expected shape.
    TypeError(&'static str),
    ArityError {
        expected: usize,
        got: usize,
    },
    /// Dispatch found no slot for the requested name.
    MissingMethod,
    /// A body invoked its super capability but no ancestor implementation
    /// exists. Detected at call time, never at definition time.
    MissingSuper,
    /// Dispatch found a plain-value slot in call position.
    NotCallable,
    /// An error raised by a user-supplied method body.
    User,
}

#[derive(Debug)]
pub struct RtError {
    pub kind: RtErrorKind,
    pub message: String,
}

pub type RtResult<T> = Result<T, RtError>;

/// RtError construction helper.
pub fn err(kind: RtErrorKind, message: String) -> RtError {
    RtError { kind, message }
}

impl RtError {
    /// Shorthand for errors thrown from user method bodies.
    pub fn user(message: impl Into<String>) -> Self {
        err(RtErrorKind::User, message.into())
    }
}

impl std::fmt::Display for RtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RtError {}
