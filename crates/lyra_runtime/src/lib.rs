//! Lyra language execution core.
//!
//! The pieces an embedding combines to run compiled Lyra code: the value
//! model, the generational cycle-aware collector, references with
//! subscript modifiers, proper tail calls, instruction queues, and the
//! execution context. Compilation front-ends live elsewhere; this crate
//! starts where compiled instruction queues exist.

#![allow(clippy::collapsible_if)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::manual_range_contains)]
#![allow(clippy::len_zero)]

pub mod core;
pub mod errors;

// Re-exports from core/
pub use crate::core::collector::{Collector, GENERATION_COUNT, RootSet, VarId, Variable};
pub use crate::core::context::ExecContext;
pub use crate::core::ptc::{PtcArguments, PtcAware};
pub use crate::core::queue::{Enumerator, Executor, InstrQueue, Node, Status, Uparam};
pub use crate::core::reference::{Modifier, RefRoot, Reference};
pub use crate::core::value::{Array, Callable, Compare, Object, Opaque, Value};
pub use crate::core::value::{FastHashMap, FastHashSet, fast_hasher, fast_map_new, fast_set_new};

// Re-exports from errors
pub use errors::{ErrorKind, Frame, RuntimeError};

// Source locations come from the syntax crate.
pub use lyra_syntax::SourceLocation;
