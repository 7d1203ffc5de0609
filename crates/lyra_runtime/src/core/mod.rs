//! Core execution infrastructure.
//!
//! The fundamental types and systems of the runtime:
//! - `Value` - the runtime value representation
//! - `Collector` - the variable arena and generational cycle collector
//! - `Reference` - roots plus subscript modifiers
//! - `PtcArguments` - deferred proper tail calls and the trampoline
//! - `InstrQueue` - compiled code as a flat node sequence
//! - `ExecContext` - named reference slots for executors

pub mod collector;
pub mod context;
pub mod ptc;
pub mod queue;
pub mod reference;
pub mod value;
