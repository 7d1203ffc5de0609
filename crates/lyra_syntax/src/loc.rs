use std::fmt;
use std::rc::Rc;

/// A position in a source file, as carried by compiled code for stack
/// traces. The file name is reference-counted so instruction queues can
/// stamp thousands of nodes with the same file cheaply.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    file: Rc<str>,
    line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<Rc<str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Placeholder for code with no recorded origin.
    pub fn unknown() -> Self {
        Self::new("<unknown>", 0)
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
