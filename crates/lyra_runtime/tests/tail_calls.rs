use std::cell::RefCell;
use std::rc::Rc;

use lyra_runtime::{
    Callable, Collector, ErrorKind, ExecContext, InstrQueue, Node, PtcArguments, PtcAware,
    Reference, RuntimeError, SourceLocation, Status, Uparam, Value, VarId,
};

fn int_of(value: &Value) -> i64 {
    match value {
        Value::Int(n) => *n,
        other => panic!("expected an integer, got {other:?}"),
    }
}

fn arg_int(heap: &Collector, args: &[Reference]) -> i64 {
    int_of(args[0].dereference_readonly(heap).expect("readable argument"))
}

fn sloc(line: u32) -> SourceLocation {
    SourceLocation::new("tc.lyra", line)
}

/// Tail-recursive countdown: each level returns a pending call to the
/// next rather than recursing natively.
struct Countdown;

impl Callable for Countdown {
    fn describe(&self) -> String {
        "countdown".to_string()
    }

    fn invoke(
        &self,
        heap: &mut Collector,
        args: Vec<Reference>,
    ) -> Result<Reference, RuntimeError> {
        let n = arg_int(heap, &args);
        if n == 0 {
            return Ok(Reference::temporary(Value::Int(0)));
        }
        let record = PtcArguments::new(
            sloc(1),
            PtcAware::ByVal,
            Rc::new(Countdown),
            vec![Reference::temporary(Value::Int(n - 1))],
        );
        Ok(Reference::ptc(Rc::new(record)))
    }
}

#[test]
fn deep_tail_recursion_uses_constant_native_stack() {
    let mut heap = Collector::new();
    let record = PtcArguments::new(
        sloc(1),
        PtcAware::ByVal,
        Rc::new(Countdown),
        vec![Reference::temporary(Value::Int(100_000))],
    );
    let mut result = Reference::ptc(Rc::new(record));
    result.finish_call(&mut heap).unwrap();
    assert!(result.is_temporary());
    assert_eq!(int_of(result.dereference_readonly(&heap).unwrap()), 0);
}

#[test]
fn finish_call_is_a_no_op_for_other_roots() {
    let mut heap = Collector::new();
    let mut reference = Reference::temporary(Value::Int(3));
    reference.finish_call(&mut heap).unwrap();
    assert!(reference.is_temporary());
    assert_eq!(int_of(reference.dereference_readonly(&heap).unwrap()), 3);
}

struct DeferLog {
    log: Rc<RefCell<Vec<i64>>>,
    tag: i64,
}

fn log_exec(
    _ctx: &mut ExecContext,
    _heap: &mut Collector,
    node: &Node,
) -> Result<Status, RuntimeError> {
    let payload = node.sparam::<DeferLog>().expect("defer payload");
    payload.log.borrow_mut().push(payload.tag);
    Ok(Status::Next)
}

fn log_queue(log: &Rc<RefCell<Vec<i64>>>, tag: i64) -> InstrQueue {
    let mut queue = InstrQueue::new();
    queue
        .append_complex(
            Uparam::default(),
            log_exec,
            DeferLog {
                log: log.clone(),
                tag,
            },
            None,
            None,
        )
        .unwrap();
    queue
}

/// Countdown that registers one deferred queue per vacated frame.
struct DeferChain {
    log: Rc<RefCell<Vec<i64>>>,
}

impl Callable for DeferChain {
    fn describe(&self) -> String {
        "defer chain".to_string()
    }

    fn invoke(
        &self,
        heap: &mut Collector,
        args: Vec<Reference>,
    ) -> Result<Reference, RuntimeError> {
        let n = arg_int(heap, &args);
        if n == 0 {
            return Ok(Reference::temporary(Value::Int(42)));
        }
        let record = PtcArguments::new(
            sloc(n as u32),
            PtcAware::ByVal,
            Rc::new(DeferChain {
                log: self.log.clone(),
            }),
            vec![Reference::temporary(Value::Int(n - 1))],
        );
        record.push_defer(sloc(n as u32), log_queue(&self.log, n));
        Ok(Reference::ptc(Rc::new(record)))
    }
}

#[test]
fn defers_run_deepest_record_first_fifo_within_a_record() {
    let mut heap = Collector::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let record = PtcArguments::new(
        sloc(0),
        PtcAware::ByVal,
        Rc::new(DeferChain { log: log.clone() }),
        vec![Reference::temporary(Value::Int(3))],
    );
    record.push_defer(sloc(0), log_queue(&log, 99));
    record.push_defer(sloc(0), log_queue(&log, 98));

    let mut result = Reference::ptc(Rc::new(record));
    result.finish_call(&mut heap).unwrap();
    assert_eq!(int_of(result.dereference_readonly(&heap).unwrap()), 42);

    // Deepest frame's defer first; the outermost record keeps its own
    // push order.
    assert_eq!(*log.borrow(), vec![1, 2, 3, 99, 98]);
}

struct ReturnVariable {
    id: VarId,
}

impl Callable for ReturnVariable {
    fn describe(&self) -> String {
        "return variable".to_string()
    }

    fn invoke(
        &self,
        _heap: &mut Collector,
        _args: Vec<Reference>,
    ) -> Result<Reference, RuntimeError> {
        Ok(Reference::variable(self.id))
    }

    fn enumerate_variables(&self, visit: &mut dyn FnMut(VarId)) {
        visit(self.id);
    }
}

fn resolve_with(heap: &mut Collector, aware: PtcAware, id: VarId) -> Reference {
    let record = PtcArguments::new(sloc(5), aware, Rc::new(ReturnVariable { id }), Vec::new());
    let mut result = Reference::ptc(Rc::new(record));
    result.finish_call(heap).unwrap();
    result
}

#[test]
fn awareness_modes_coerce_the_result() {
    let mut heap = Collector::new();
    let id = heap.create_variable();
    heap.get_mut(id).reset(Value::Int(11), false);

    let by_ref = resolve_with(&mut heap, PtcAware::ByRef, id);
    assert!(by_ref.is_variable());
    *by_ref.dereference_mutable(&mut heap).unwrap() = Value::Int(12);
    assert_eq!(int_of(heap.get(id).value()), 12);

    let by_val = resolve_with(&mut heap, PtcAware::ByVal, id);
    assert!(by_val.is_temporary());
    assert_eq!(int_of(by_val.dereference_readonly(&heap).unwrap()), 12);

    let void = resolve_with(&mut heap, PtcAware::Void, id);
    assert!(void.is_void());
}

struct Failing;

impl Callable for Failing {
    fn describe(&self) -> String {
        "failing".to_string()
    }

    fn invoke(
        &self,
        _heap: &mut Collector,
        _args: Vec<Reference>,
    ) -> Result<Reference, RuntimeError> {
        Err(RuntimeError::new(ErrorKind::TypeMismatch, "boom"))
    }
}

#[test]
fn unwinding_annotates_frames_and_still_runs_defers() {
    let mut heap = Collector::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let record = PtcArguments::new(sloc(9), PtcAware::ByVal, Rc::new(Failing), Vec::new());
    record.set_enclosing(sloc(1), "outer_fn");
    record.push_defer(sloc(9), log_queue(&log, 7));

    let mut result = Reference::ptc(Rc::new(record));
    let err = result.finish_call(&mut heap).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(err.message(), "boom");
    assert_eq!(err.frames().len(), 1);
    assert_eq!(err.frames()[0].name, "outer_fn");
    assert_eq!(err.frames()[0].sloc, sloc(1));

    // Scope-exit semantics: the defer ran during unwinding.
    assert_eq!(*log.borrow(), vec![7]);
}

fn fail_exec(
    _ctx: &mut ExecContext,
    _heap: &mut Collector,
    _node: &Node,
) -> Result<Status, RuntimeError> {
    Err(RuntimeError::new(ErrorKind::KeyNotFound, "defer failure"))
}

#[test]
fn failing_defer_surfaces_with_a_defer_frame() {
    let mut heap = Collector::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let mut failing = InstrQueue::new();
    failing.append_trivial(Uparam::default(), fail_exec);

    let record = PtcArguments::new(
        sloc(2),
        PtcAware::Void,
        Rc::new(ReturnVariable {
            id: {
                let id = heap.create_variable();
                heap.get_mut(id).reset(Value::Int(1), false);
                id
            },
        }),
        Vec::new(),
    );
    record.push_defer(sloc(3), failing);
    // The record's remaining defers still run after the failing one.
    record.push_defer(sloc(4), log_queue(&log, 1));

    let mut result = Reference::ptc(Rc::new(record));
    let err = result.finish_call(&mut heap).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyNotFound);
    assert_eq!(err.frames().last().unwrap().name, "defer");
    assert_eq!(err.frames().last().unwrap().sloc, sloc(3));
    assert_eq!(*log.borrow(), vec![1]);
}
