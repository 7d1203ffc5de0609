//! Structured runtime errors with accumulated stack frames.

use std::fmt;

use lyra_syntax::SourceLocation;

/// Recoverable failure categories surfaced by the execution core.
///
/// Allocation exhaustion aborts the process and collector invariant
/// violations panic; neither appears here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Read/write/unset through an uninitialized, void, or unresolved
    /// tail-call reference.
    UnboundReference,
    /// Write through an immutable variable, or through a value that is
    /// not an lvalue.
    ImmutableTarget,
    /// An array-index modifier addressed a position outside the array.
    IndexOutOfRange,
    /// An object-key modifier addressed an absent entry.
    KeyNotFound,
    /// A modifier was applied to a value of the wrong type.
    TypeMismatch,
    /// A queue node parameter exceeded the per-node size ceiling.
    NodeTooLarge,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnboundReference => "unbound reference",
            ErrorKind::ImmutableTarget => "immutable target",
            ErrorKind::IndexOutOfRange => "index out of range",
            ErrorKind::KeyNotFound => "key not found",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::NodeTooLarge => "queue node too large",
        }
    }
}

/// One annotation pushed onto an error as it unwinds through a queue or
/// the tail-call trampoline. The frame list is innermost-first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub sloc: SourceLocation,
    pub name: String,
}

#[derive(Clone, Debug)]
pub struct RuntimeError {
    kind: ErrorKind,
    message: String,
    frames: Vec<Frame>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Appends a stack frame. Frames are pushed as the error propagates
    /// outward, so index 0 stays the innermost location.
    pub fn push_frame(&mut self, sloc: SourceLocation, name: impl Into<String>) {
        self.frames.push(Frame {
            sloc,
            name: name.into(),
        });
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)?;
        for frame in &self.frames {
            if frame.name.is_empty() {
                write!(f, "\n  at {}", frame.sloc)?;
            } else {
                write!(f, "\n  at {} ({})", frame.name, frame.sloc)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}
