//! Error type for the engine.
//!
//! Every fallible call returns [`Result`]. On failure the callee has already
//! attached its own code location; callers append theirs while unwinding via
//! `.map_err(|e| e.at(here!()))?`, so the error carries an annotated frame
//! stack by the time it reaches the host. There is no local recovery inside
//! the engine — any failure aborts the current `execute`, and the job remains
//! destroyable.

use smallvec::SmallVec;
use std::fmt;

/// Frames recorded past this point are dropped rather than reallocated.
const MAX_STACK_FRAMES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    OutOfMemory,
    IoError,
    NotImplemented,
    InvalidArgument,
    NullArgument,
    InvalidNodeParams,
    GraphInvalid,
    MaximumGraphPassesExceeded,
}

impl ErrorKind {
    /// Stable numeric code reported to hosts.
    pub fn error_code(self) -> i32 {
        match self {
            ErrorKind::OutOfMemory => 10,
            ErrorKind::IoError => 20,
            ErrorKind::NotImplemented => 40,
            ErrorKind::InvalidArgument => 50,
            ErrorKind::NullArgument => 51,
            ErrorKind::InvalidNodeParams => 56,
            ErrorKind::GraphInvalid => 54,
            ErrorKind::MaximumGraphPassesExceeded => 60,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.error_code())
    }
}

/// A single annotated frame: where an error was raised or propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLocation {
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: SmallVec<[CodeLocation; 4]>,
}

impl FlowError {
    pub fn new(kind: ErrorKind, message: String) -> FlowError {
        FlowError {
            kind,
            message,
            at: SmallVec::new(),
        }
    }

    /// Appends a propagation frame. Usually invoked through
    /// `.map_err(|e| e.at(here!()))`.
    pub fn at(mut self, location: CodeLocation) -> FlowError {
        if self.at.len() < MAX_STACK_FRAMES {
            self.at.push(location);
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn error_code(&self) -> i32 {
        self.kind.error_code()
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)?;
        } else {
            write!(f, "{}: {}", self.kind, self.message)?;
        }
        for location in &self.at {
            write!(f, "\n  at {}", location)?;
        }
        Ok(())
    }
}

impl std::error::Error for FlowError {}

pub type Result<T> = std::result::Result<T, FlowError>;

/// The current code location, for error frame annotation.
#[macro_export]
macro_rules! here {
    () => {
        $crate::errors::CodeLocation {
            file: file!(),
            line: line!(),
        }
    };
}

/// Creates a new [`FlowError`](crate::errors::FlowError) annotated with the
/// current code location.
#[macro_export]
macro_rules! nerror {
    ($kind:expr) => {
        $crate::errors::FlowError::new($kind, String::new()).at($crate::here!())
    };
    ($kind:expr, $($arg:tt)*) => {
        $crate::errors::FlowError::new($kind, format!($($arg)*)).at($crate::here!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails() -> Result<()> {
        Err(nerror!(ErrorKind::GraphInvalid, "node #{} is dangling", 3))
    }

    fn propagates() -> Result<()> {
        fails().map_err(|e| e.at(here!()))?;
        Ok(())
    }

    #[test]
    fn frames_accumulate_while_unwinding() {
        let e = propagates().expect_err("must fail");
        assert_eq!(e.kind(), ErrorKind::GraphInvalid);
        assert_eq!(e.at.len(), 2);
        assert!(e.at.iter().all(|l| l.file.ends_with("errors.rs")));
    }

    #[test]
    fn display_includes_kind_code_message_and_stack() {
        let e = propagates().expect_err("must fail");
        let text = e.to_string();
        assert!(text.contains("GraphInvalid (54)"));
        assert!(text.contains("node #3 is dangling"));
        assert!(text.matches("\n  at ").count() == 2);
    }

    #[test]
    fn frame_stack_is_bounded() {
        let mut e = nerror!(ErrorKind::IoError);
        for _ in 0..40 {
            e = e.at(here!());
        }
        assert_eq!(e.at.len(), MAX_STACK_FRAMES);
    }
}
