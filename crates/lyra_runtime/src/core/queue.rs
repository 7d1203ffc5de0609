//! The instruction queue: compiled code as a flat sequence of nodes.
//!
//! Each node pairs an executor function pointer with a small inline
//! parameter and, when needed, a type-erased payload. Nodes are plain
//! owned values, so queue growth is ordinary vector reallocation and
//! payload teardown is ordinary `Drop`.

use std::any::Any;
use std::rc::Rc;

use lyra_syntax::SourceLocation;

use crate::core::collector::{Collector, VarId};
use crate::core::context::ExecContext;
use crate::errors::{ErrorKind, RuntimeError};

/// Outcome of one node, driving the statement-level control flow of the
/// enclosing function body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Next,
    Return,
    Break,
    Continue,
}

/// Small inline parameter available to every executor without touching
/// the payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Uparam {
    pub flags: u16,
    pub index: u32,
}

/// Executes one node against the context and the variable heap.
pub type Executor = fn(&mut ExecContext, &mut Collector, &Node) -> Result<Status, RuntimeError>;

/// Reports the variable handles captured by a node's payload, for root
/// discovery during collection.
pub type Enumerator = fn(&dyn Any, &mut dyn FnMut(VarId));

/// Payloads above this size indicate a compiler bug; the ceiling matches
/// the widest node any front-end legitimately emits.
const SPARAM_SIZE_MAX: usize = 255 * 8;

pub struct Node {
    uparam: Uparam,
    exec: Executor,
    sparam: Option<Box<dyn Any>>,
    enumerate: Option<Enumerator>,
    syms: Option<Rc<SourceLocation>>,
}

impl Node {
    pub fn uparam(&self) -> Uparam {
        self.uparam
    }

    /// Downcasts the payload. `None` when there is no payload or the
    /// type does not match.
    pub fn sparam<T: 'static>(&self) -> Option<&T> {
        self.sparam.as_deref()?.downcast_ref::<T>()
    }

    pub fn syms(&self) -> Option<&SourceLocation> {
        self.syms.as_deref()
    }
}

/// An append-only instruction sequence. `execute` runs nodes strictly in
/// append order.
#[derive(Default)]
pub struct InstrQueue {
    nodes: Vec<Node>,
}

impl InstrQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Appends a node that needs nothing beyond its inline parameter.
    pub fn append_trivial(&mut self, uparam: Uparam, exec: Executor) {
        self.nodes.push(Node {
            uparam,
            exec,
            sparam: None,
            enumerate: None,
            syms: None,
        });
    }

    /// Appends a node with a plain-data payload that cannot capture
    /// variables and needs no symbols.
    pub fn append_trivial_with<T: Copy + 'static>(
        &mut self,
        uparam: Uparam,
        exec: Executor,
        sparam: T,
    ) {
        self.nodes.push(Node {
            uparam,
            exec,
            sparam: Some(Box::new(sparam)),
            enumerate: None,
            syms: None,
        });
    }

    /// Appends a node with an arbitrary payload, an optional root
    /// enumerator for it, and optional symbols for stack traces. The
    /// payload is fully constructed by the caller first, so a failed
    /// construction never leaves a half-built node behind; an oversized
    /// payload is rejected and the queue is left untouched.
    pub fn append_complex<T: 'static>(
        &mut self,
        uparam: Uparam,
        exec: Executor,
        sparam: T,
        enumerate: Option<Enumerator>,
        syms: Option<Rc<SourceLocation>>,
    ) -> Result<(), RuntimeError> {
        if std::mem::size_of::<T>() > SPARAM_SIZE_MAX {
            return Err(RuntimeError::new(
                ErrorKind::NodeTooLarge,
                format!(
                    "node parameter of {} bytes exceeds the {} byte ceiling",
                    std::mem::size_of::<T>(),
                    SPARAM_SIZE_MAX,
                ),
            ));
        }
        self.nodes.push(Node {
            uparam,
            exec,
            sparam: Some(Box::new(sparam)),
            enumerate,
            syms,
        });
        Ok(())
    }

    /// Runs the queue. The first status other than `Next` stops
    /// execution and is returned; an exhausted queue yields `Next`. A
    /// failing node that carries symbols annotates the error with its
    /// location before propagation.
    pub fn execute(
        &self,
        ctx: &mut ExecContext,
        heap: &mut Collector,
    ) -> Result<Status, RuntimeError> {
        for node in &self.nodes {
            match (node.exec)(ctx, heap, node) {
                Ok(Status::Next) => {}
                Ok(status) => return Ok(status),
                Err(mut err) => {
                    if let Some(sloc) = node.syms() {
                        err.push_frame(sloc.clone(), "");
                    }
                    return Err(err);
                }
            }
        }
        Ok(Status::Next)
    }

    /// Visits the variable handles captured by node payloads.
    pub fn enumerate_variables(&self, visit: &mut dyn FnMut(VarId)) {
        for node in &self.nodes {
            if let (Some(enumerate), Some(sparam)) = (node.enumerate, node.sparam.as_deref()) {
                enumerate(sparam, visit);
            }
        }
    }
}
