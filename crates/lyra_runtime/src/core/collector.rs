//! Variable arena and generational, cycle-aware garbage collection.
//!
//! Variables live in a slot map; handles are stable indices. Each
//! collection pass runs trial deletion over one generation: count every
//! inbound reference, subtract the edges internal to the generation, and
//! whatever keeps a positive adjusted count (plus everything reachable
//! from it) survives. Pure cycles end up at zero and are reclaimed.

use std::rc::Rc;

use crate::core::reference::Reference;
use crate::core::value::{FastHashSet, Value, fast_set_new};
use crate::errors::RuntimeError;

/// Handle to a collector-managed variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VarId(pub usize);

pub const GENERATION_COUNT: usize = 3;

/// Seed for the fractional accumulator; absorbs float dust so a chain of
/// exact partial weights still sums past whole units.
const GCREF_SEED: f64 = 1e-9;

/// Anything above this much leftover fraction counts as an external
/// share (the smallest legitimate share is 1/strong_count).
const GCREF_FRAC_EPSILON: f64 = 1e-6;

/// One collector-managed heap cell wrapping a single value.
pub struct Variable {
    value: Value,
    immutable: bool,
    // Meaningful only during a collection pass.
    gc_int: i64,
    gc_frac: f64,
    generation: u8,
    passes: u8,
}

impl Variable {
    fn new() -> Self {
        Self {
            value: Value::Null,
            immutable: false,
            gc_int: 0,
            gc_frac: 0.0,
            generation: 0,
            passes: 0,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Opens the value for writing. Fails when the variable has been
    /// frozen.
    pub fn open_value(&mut self) -> Result<&mut Value, RuntimeError> {
        if self.immutable {
            return Err(RuntimeError::new(
                crate::errors::ErrorKind::ImmutableTarget,
                "attempt to modify an immutable variable",
            ));
        }
        Ok(&mut self.value)
    }

    /// Replaces the value and the immutability flag together, bypassing
    /// the immutability check. This is the initialization path.
    pub fn reset(&mut self, value: Value, immutable: bool) {
        self.value = value;
        self.immutable = immutable;
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub fn init_gcref(&mut self, intg: i64) {
        self.gc_int = intg;
        self.gc_frac = GCREF_SEED;
    }

    pub fn add_gcref(&mut self, dintg: i64) {
        self.gc_int += dintg;
    }

    /// Accumulates a fractional share, borrowing or carrying whole units
    /// so `gc_frac` stays within `[0, 1)`.
    pub fn add_gcref_frac(&mut self, dfrac: f64) {
        self.gc_frac += dfrac;
        let carry = self.gc_frac.floor();
        self.gc_int += carry as i64;
        self.gc_frac -= carry;
    }

    pub fn gcref(&self) -> i64 {
        self.gc_int
    }

    fn has_external_refs(&self) -> bool {
        self.gc_int > 0 || self.gc_frac > GCREF_FRAC_EPSILON
    }
}

/// A source of root variable handles for a collection pass: execution
/// contexts and live references implement this.
pub trait RootSet {
    fn enumerate_roots(&self, visit: &mut dyn FnMut(VarId));
}

/// No roots at all; useful when tearing an engine down.
impl RootSet for () {
    fn enumerate_roots(&self, _visit: &mut dyn FnMut(VarId)) {}
}

impl RootSet for [Reference] {
    fn enumerate_roots(&self, visit: &mut dyn FnMut(VarId)) {
        for reference in self {
            reference.enumerate_variables(visit);
        }
    }
}

struct Generation {
    tracked: FastHashSet<usize>,
    collect_count: usize,
}

impl Generation {
    fn new() -> Self {
        Self {
            tracked: fast_set_new(),
            collect_count: 0,
        }
    }
}

pub struct Collector {
    slots: Vec<Option<Variable>>,
    free: Vec<usize>,
    gens: [Generation; GENERATION_COUNT],
    alloc_count: usize,
    alloc_threshold: usize,
    promotion_passes: u8,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(256),
            free: Vec::new(),
            gens: [Generation::new(), Generation::new(), Generation::new()],
            alloc_count: 0,
            alloc_threshold: 4096,
            promotion_passes: 2,
        }
    }

    /// Overrides how many passes a variable must survive in one
    /// generation before it is promoted to the next older one.
    pub fn with_promotion_passes(passes: u8) -> Self {
        let mut this = Self::new();
        this.promotion_passes = passes.max(1);
        this
    }

    /// Allocates a fresh mutable variable holding `null` in the youngest
    /// generation.
    pub fn create_variable(&mut self) -> VarId {
        self.alloc_count += 1;
        let id = if let Some(id) = self.free.pop() {
            self.slots[id] = Some(Variable::new());
            id
        } else {
            let id = self.slots.len();
            self.slots.push(Some(Variable::new()));
            id
        };
        self.gens[0].tracked.insert(id);
        VarId(id)
    }

    /// Whether enough young allocations have accumulated for the
    /// embedding to schedule a pass.
    pub fn should_collect(&self) -> bool {
        self.alloc_count >= self.alloc_threshold
    }

    pub fn is_live(&self, id: VarId) -> bool {
        self.slots.get(id.0).is_some_and(|slot| slot.is_some())
    }

    pub fn generation_of(&self, id: VarId) -> Option<usize> {
        self.slots
            .get(id.0)?
            .as_ref()
            .map(|var| var.generation as usize)
    }

    pub fn get(&self, id: VarId) -> &Variable {
        self.slots[id.0]
            .as_ref()
            .expect("variable was garbage collected")
    }

    pub fn get_mut(&mut self, id: VarId) -> &mut Variable {
        self.slots[id.0]
            .as_mut()
            .expect("variable was garbage collected")
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Runs trial-deletion collection over generations `generation_limit`
    /// down to 0, oldest first so that storage released by an old
    /// generation is observed by the younger passes of the same call.
    /// Returns how many variables were reclaimed.
    pub fn collect_variables(&mut self, generation_limit: usize, roots: &dyn RootSet) -> usize {
        let limit = generation_limit.min(GENERATION_COUNT - 1);
        let mut reclaimed = 0;
        for generation in (0..=limit).rev() {
            reclaimed += self.collect_generation(generation, roots);
        }
        self.alloc_count = 0;
        reclaimed
    }

    fn collect_generation(&mut self, generation: usize, roots: &dyn RootSet) -> usize {
        // Ids reclaimed by an older generation's pass may linger here.
        let slots = &self.slots;
        self.gens[generation]
            .tracked
            .retain(|&id| slots.get(id).is_some_and(|slot| slot.is_some()));

        let tracked: Vec<usize> = self.gens[generation].tracked.iter().copied().collect();
        let mut in_set = fast_set_new();
        in_set.extend(tracked.iter().copied());

        for &id in &tracked {
            self.slots[id].as_mut().unwrap().init_gcref(0);
        }

        // Count every inbound reference: roots first, then edges from
        // every live variable's value, wherever it is tracked.
        roots.enumerate_roots(&mut |id| {
            if in_set.contains(&id.0) {
                if let Some(var) = self.slots[id.0].as_mut() {
                    var.add_gcref(1);
                }
            }
        });

        let mut edges: Vec<(usize, f64)> = Vec::new();
        for source in 0..self.slots.len() {
            edges.clear();
            {
                let Some(var) = self.slots[source].as_ref() else {
                    continue;
                };
                weighted_edges(var.value(), 1.0, &mut |id, weight| {
                    if in_set.contains(&id.0) {
                        edges.push((id.0, weight));
                    }
                });
            }
            for &(target, weight) in &edges {
                self.slots[target].as_mut().unwrap().add_gcref_frac(weight);
            }
        }

        // Trial deletion: subtract the edges internal to this generation.
        // What remains is the external share.
        for &source in &tracked {
            edges.clear();
            {
                let var = self.slots[source].as_ref().unwrap();
                weighted_edges(var.value(), 1.0, &mut |id, weight| {
                    if in_set.contains(&id.0) {
                        edges.push((id.0, weight));
                    }
                });
            }
            for &(target, weight) in &edges {
                self.slots[target].as_mut().unwrap().add_gcref_frac(-weight);
            }
        }

        // Revive everything reachable from an externally referenced seed.
        let mut marked = fast_set_new();
        let mut stack: Vec<usize> = Vec::new();
        for &id in &tracked {
            let var = self.slots[id].as_ref().unwrap();
            assert!(
                var.gcref() >= 0,
                "collector invariant violated: negative adjusted count for variable {id}",
            );
            if var.has_external_refs() {
                marked.insert(id);
                stack.push(id);
            }
        }
        let mut reach: Vec<usize> = Vec::new();
        while let Some(source) = stack.pop() {
            reach.clear();
            {
                let var = self.slots[source].as_ref().unwrap();
                weighted_edges(var.value(), 1.0, &mut |id, _| {
                    if in_set.contains(&id.0) {
                        reach.push(id.0);
                    }
                });
            }
            for &target in &reach {
                if marked.insert(target) {
                    stack.push(target);
                }
            }
        }

        // Reclaim the rest; dropping the cell drops its value.
        let mut reclaimed = 0;
        for &id in &tracked {
            if !marked.contains(&id) {
                self.slots[id] = None;
                self.free.push(id);
                self.gens[generation].tracked.remove(&id);
                reclaimed += 1;
            }
        }

        // Age survivors and promote the persistent ones.
        if generation + 1 < GENERATION_COUNT {
            let mut promote: Vec<usize> = Vec::new();
            for &id in &tracked {
                if let Some(var) = self.slots[id].as_mut() {
                    var.passes = var.passes.saturating_add(1);
                    if var.passes >= self.promotion_passes {
                        var.passes = 0;
                        var.generation = (generation + 1) as u8;
                        promote.push(id);
                    }
                }
            }
            for id in promote {
                self.gens[generation].tracked.remove(&id);
                self.gens[generation + 1].tracked.insert(id);
            }
        }

        self.gens[generation].collect_count += 1;
        reclaimed
    }

    pub fn stats(&self) -> String {
        format!(
            "Collector: {} live, {} free slots, tracked per gen [{}, {}, {}], passes [{}, {}, {}]",
            self.live_count(),
            self.free.len(),
            self.gens[0].tracked.len(),
            self.gens[1].tracked.len(),
            self.gens[2].tracked.len(),
            self.gens[0].collect_count,
            self.gens[1].collect_count,
            self.gens[2].collect_count,
        )
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}


/// Walks the variable handles reachable from `value`. Edges through an
/// `Rc`-shared handle are weighted by `1 / strong_count` so the owners of
/// one shared handle jointly contribute a single unit per captured
/// variable.
fn weighted_edges(value: &Value, scale: f64, visit: &mut dyn FnMut(VarId, f64)) {
    match value {
        Value::Array(items) => {
            for item in items {
                weighted_edges(item, scale, visit);
            }
        }
        Value::Object(items) => {
            for item in items.values() {
                weighted_edges(item, scale, visit);
            }
        }
        Value::Opaque(handle) => {
            let share = scale / Rc::strong_count(handle) as f64;
            handle.enumerate_variables(&mut |id| visit(id, share));
        }
        Value::Function(handle) => {
            let share = scale / Rc::strong_count(handle) as f64;
            handle.enumerate_variables(&mut |id| visit(id, share));
        }
        _ => {}
    }
}
