//! Shared syntax-level types for the Lyra toolchain.

mod loc;

pub use loc::SourceLocation;
