//! Proper tail calls.
//!
//! A callee that ends in a tail call returns a reference rooted in a
//! `PtcArguments` record instead of recursing. `Reference::finish_call`
//! is the trampoline that unfolds such chains with an explicit loop, so
//! native stack usage stays constant regardless of chain length.

use std::cell::RefCell;
use std::rc::Rc;

use lyra_syntax::SourceLocation;

use crate::core::collector::{Collector, VarId};
use crate::core::context::ExecContext;
use crate::core::queue::InstrQueue;
use crate::core::reference::Reference;
use crate::core::value::Callable;
use crate::errors::RuntimeError;

/// How the resolved result of a tail-call chain is coerced, decided by
/// the syntactic position of the outermost call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PtcAware {
    /// Pass the callee's reference through unchanged.
    ByRef,
    /// Collapse the result to an owned temporary.
    ByVal,
    /// Discard the result.
    Void,
}

/// Everything needed to perform one deferred call: the call site, the
/// target, the receiver-prepended argument references, and the deferred
/// queues of the frame being vacated.
pub struct PtcArguments {
    sloc: SourceLocation,
    ptc_aware: PtcAware,
    target: Rc<dyn Callable>,
    args_self: RefCell<Vec<Reference>>,
    defer: RefCell<Vec<(SourceLocation, InstrQueue)>>,
    enclosing: RefCell<Option<(SourceLocation, String)>>,
}

impl PtcArguments {
    pub fn new(
        sloc: SourceLocation,
        ptc_aware: PtcAware,
        target: Rc<dyn Callable>,
        args_self: Vec<Reference>,
    ) -> Self {
        Self {
            sloc,
            ptc_aware,
            target,
            args_self: RefCell::new(args_self),
            defer: RefCell::new(Vec::new()),
            enclosing: RefCell::new(None),
        }
    }

    pub fn sloc(&self) -> &SourceLocation {
        &self.sloc
    }

    pub fn ptc_aware(&self) -> PtcAware {
        self.ptc_aware
    }

    pub fn target(&self) -> &Rc<dyn Callable> {
        &self.target
    }

    /// Takes the argument references out, leaving the record empty. The
    /// trampoline calls this exactly once per record.
    pub fn take_args(&self) -> Vec<Reference> {
        self.args_self.take()
    }

    /// Transfers a deferred queue from the vacating frame. Queues run
    /// after the chain resolves, in the order pushed within one record.
    pub fn push_defer(&self, sloc: SourceLocation, queue: InstrQueue) {
        self.defer.borrow_mut().push((sloc, queue));
    }

    /// Records the enclosing function for stack traces on unwinding.
    pub fn set_enclosing(&self, sloc: SourceLocation, name: impl Into<String>) {
        *self.enclosing.borrow_mut() = Some((sloc, name.into()));
    }

    pub fn enumerate_variables(&self, visit: &mut dyn FnMut(VarId)) {
        self.target.enumerate_variables(visit);
        for reference in self.args_self.borrow().iter() {
            reference.enumerate_variables(visit);
        }
        for (_, queue) in self.defer.borrow().iter() {
            queue.enumerate_variables(visit);
        }
    }

    /// Runs this record's deferred queues in push order, each in a fresh
    /// context. All queues run even if one fails; the first failure is
    /// returned, annotated with a "defer" frame.
    fn run_defers(&self, heap: &mut Collector) -> Result<(), RuntimeError> {
        let mut first_error = None;
        for (sloc, queue) in self.defer.take() {
            let mut ctx = ExecContext::new();
            if let Err(mut err) = queue.execute(&mut ctx, heap) {
                err.push_frame(sloc, "defer");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// The stack frame this record contributes while an error unwinds
    /// through it.
    fn unwind_frame(&self) -> (SourceLocation, String) {
        match &*self.enclosing.borrow() {
            Some((sloc, name)) => (sloc.clone(), name.clone()),
            None => (self.sloc.clone(), String::new()),
        }
    }
}

impl Reference {
    /// Resolves a pending tail-call chain. A no-op for any other root.
    ///
    /// The chain is unfolded iteratively: each invocation that yields
    /// another tail-call record extends it instead of recursing. Once a
    /// concrete result (or an error) comes back, deferred queues run
    /// deepest record first, and the outermost record's awareness mode
    /// decides how the result lands in `self`.
    pub fn finish_call(&mut self, heap: &mut Collector) -> Result<(), RuntimeError> {
        let Some(args) = self.take_ptc_args() else {
            return Ok(());
        };

        let mut chain: Vec<Rc<PtcArguments>> = vec![args];
        let outcome = loop {
            let record = chain.last().expect("tail-call chain is never empty").clone();
            let call_args = record.take_args();
            match record.target().invoke(heap, call_args) {
                Ok(mut result) => match result.take_ptc_args() {
                    Some(next) => chain.push(next),
                    None => break Ok(result),
                },
                Err(err) => break Err(err),
            }
        };

        match outcome {
            Ok(mut result) => {
                let mut first_error = None;
                for record in chain.iter().rev() {
                    if let Err(err) = record.run_defers(heap) {
                        first_error.get_or_insert(err);
                    }
                }
                if let Some(err) = first_error {
                    return Err(err);
                }
                match chain[0].ptc_aware() {
                    PtcAware::ByRef => {}
                    PtcAware::ByVal => {
                        if !result.is_void() && !result.is_uninit() {
                            result.mutate_into_temporary(heap)?;
                        }
                    }
                    PtcAware::Void => result = Reference::void(),
                }
                *self = result;
                Ok(())
            }
            Err(mut err) => {
                // Unwind deepest record first; each still runs its
                // defers, but a secondary failure never displaces the
                // original error.
                for record in chain.iter().rev() {
                    let _ = record.run_defers(heap);
                    let (sloc, name) = record.unwind_frame();
                    err.push_frame(sloc, name);
                }
                Err(err)
            }
        }
    }
}
