//! SSA intermediate representation, as consumed by the backend.
//!
//! The IR proper is produced upstream; the backend only walks it. Nodes
//! live in arenas indexed by 32-bit handles, and all edges are handles,
//! never owning pointers — phi nodes may reference later definitions,
//! so the graphs are cyclic. A "daisy chain" overlay links nodes whose
//! relative order carries side-effect meaning.

use crate::fixed::{Fixed, FixedUint};
use crate::locator::Locator;
use bitflags::bitflags;

/// Handle to an SSA node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsaId(pub u32);

/// Handle to a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CfgId(pub u32);

/// An SSA input: another node, an immediate, or a symbolic operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsaValue {
    Id(SsaId),
    Num(Fixed),
    Loc(Locator),
}

impl SsaValue {
    pub const fn id(self) -> Option<SsaId> {
        match self {
            SsaValue::Id(h) => Some(h),
            _ => None,
        }
    }

    pub const fn is_const(self) -> bool {
        matches!(self, SsaValue::Num(_) | SsaValue::Loc(_))
    }

    pub const fn num(self) -> Option<Fixed> {
        match self {
            SsaValue::Num(n) => Some(n),
            _ => None,
        }
    }

    pub const fn locator(self) -> Option<Locator> {
        match self {
            SsaValue::Loc(l) => Some(l),
            _ => None,
        }
    }
}

/// SSA opcodes the backend distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum SsaOp {
    Phi,
    Uninitialized,
    Cast,
    Copy,
    /// Inputs: carry, lhs, rhs.
    Add,
    And,
    Or,
    Xor,
    Eq,
    NotEq,
    Lt,
    Lte,
    /// Inputs: link, locator.
    ReadGlobal,
    /// Inputs: value/locator pairs, value at even indices.
    WriteGlobals,
    FnCall,
    InitArray,
    /// Block terminator; condition input.
    If,
    Return,
    /// Node removed from the graph.
    Pruned,
}

bitflags! {
    /// Static per-opcode properties.
    pub struct SsaFlags: u8 {
        /// Lowering is expected to trash the carry flag.
        const CLOBBERS_CARRY = 1 << 0;
        /// Writes through locators; participates in daisy ordering.
        const WRITE_GLOBALS = 1 << 1;
    }
}

/// Classification of one input operand position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClass {
    Value,
    Carry,
    /// Must be scheduled immediately after its producer.
    Link,
    Loc,
}

impl SsaOp {
    pub const fn flags(self) -> SsaFlags {
        match self {
            SsaOp::Add | SsaOp::Eq | SsaOp::NotEq | SsaOp::Lt | SsaOp::Lte => {
                SsaFlags::CLOBBERS_CARRY
            }
            SsaOp::FnCall => SsaFlags::from_bits_truncate(
                SsaFlags::CLOBBERS_CARRY.bits() | SsaFlags::WRITE_GLOBALS.bits(),
            ),
            SsaOp::WriteGlobals => SsaFlags::WRITE_GLOBALS,
            _ => SsaFlags::empty(),
        }
    }

    /// Class of input position `index`.
    pub const fn input_class(self, index: usize) -> InputClass {
        match self {
            SsaOp::Add if index == 0 => InputClass::Carry,
            SsaOp::ReadGlobal if index == 0 => InputClass::Link,
            SsaOp::ReadGlobal => InputClass::Loc,
            SsaOp::WriteGlobals if index % 2 == 1 => InputClass::Loc,
            _ => InputClass::Value,
        }
    }

    pub const fn input0_class(self) -> InputClass {
        self.input_class(0)
    }
}

/// A use of a node's result: which node consumes it and at which input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEdge {
    pub user: SsaId,
    pub index: u16,
}

#[derive(Debug, Clone)]
pub struct SsaNode {
    pub op: SsaOp,
    /// Live-bit mask of the result type.
    pub mask: FixedUint,
    pub cfg: CfgId,
    inputs: Vec<SsaValue>,
    outputs: Vec<OutputEdge>,
    pub daisy_prev: Option<SsaId>,
    pub daisy_next: Option<SsaId>,
}

#[derive(Debug, Clone, Default)]
pub struct CfgNode {
    ssa: Vec<SsaId>,
    daisy_tail: Option<SsaId>,
}

/// The IR arena pair.
#[derive(Debug, Default)]
pub struct Ir {
    ssa: Vec<SsaNode>,
    cfg: Vec<CfgNode>,
}

impl Ir {
    pub fn new() -> Self {
        Ir::default()
    }

    pub fn push_cfg(&mut self) -> CfgId {
        self.cfg.push(CfgNode::default());
        CfgId(self.cfg.len() as u32 - 1)
    }

    /// Create a node and wire its use edges.
    pub fn emplace(
        &mut self,
        cfg: CfgId,
        op: SsaOp,
        mask: FixedUint,
        inputs: Vec<SsaValue>,
    ) -> SsaId {
        let id = SsaId(self.ssa.len() as u32);
        for (i, input) in inputs.iter().enumerate() {
            if let SsaValue::Id(h) = input {
                self.ssa[h.0 as usize].outputs.push(OutputEdge { user: id, index: i as u16 });
            }
        }
        self.ssa.push(SsaNode {
            op,
            mask,
            cfg,
            inputs,
            outputs: Vec::new(),
            daisy_prev: None,
            daisy_next: None,
        });
        self.cfg[cfg.0 as usize].ssa.push(id);
        id
    }

    /// Rewire one input after the fact. Phi inputs reference later
    /// definitions, so phis are created empty and wired here.
    pub fn set_input(&mut self, id: SsaId, index: usize, value: SsaValue) {
        let old = {
            let node = &mut self.ssa[id.0 as usize];
            if node.inputs.len() <= index {
                node.inputs.resize(index + 1, SsaValue::Num(Fixed(0)));
            }
            core::mem::replace(&mut node.inputs[index], value)
        };
        if let SsaValue::Id(h) = old {
            self.ssa[h.0 as usize]
                .outputs
                .retain(|oe| !(oe.user == id && oe.index == index as u16));
        }
        if let SsaValue::Id(h) = value {
            self.ssa[h.0 as usize].outputs.push(OutputEdge { user: id, index: index as u16 });
        }
    }

    /// Append a node to its block's daisy chain.
    pub fn append_daisy(&mut self, id: SsaId) {
        let cfg = self.node(id).cfg;
        let tail = self.cfg[cfg.0 as usize].daisy_tail;
        if let Some(tail) = tail {
            self.ssa[tail.0 as usize].daisy_next = Some(id);
        }
        self.ssa[id.0 as usize].daisy_prev = tail;
        self.cfg[cfg.0 as usize].daisy_tail = Some(id);
    }

    pub fn node(&self, id: SsaId) -> &SsaNode {
        &self.ssa[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: SsaId) -> &mut SsaNode {
        &mut self.ssa[id.0 as usize]
    }

    pub fn cfg_node(&self, id: CfgId) -> &CfgNode {
        &self.cfg[id.0 as usize]
    }

    pub fn cfg_ids(&self) -> impl Iterator<Item = CfgId> {
        (0..self.cfg.len() as u32).map(CfgId)
    }

    /// Redirect every use of `id` to `value`, then prune `id`.
    pub fn replace_with(&mut self, id: SsaId, value: SsaValue) {
        let outputs = core::mem::take(&mut self.ssa[id.0 as usize].outputs);
        for oe in &outputs {
            self.ssa[oe.user.0 as usize].inputs[oe.index as usize] = value;
            if let SsaValue::Id(h) = value {
                self.ssa[h.0 as usize].outputs.push(*oe);
            }
        }
        self.prune(id);
    }

    /// Detach a node from the graph. The arena slot stays allocated.
    pub fn prune(&mut self, id: SsaId) {
        let inputs = core::mem::take(&mut self.ssa[id.0 as usize].inputs);
        for input in inputs {
            if let SsaValue::Id(h) = input {
                self.ssa[h.0 as usize].outputs.retain(|oe| oe.user != id);
            }
        }
        let (prev, next) = {
            let n = &self.ssa[id.0 as usize];
            (n.daisy_prev, n.daisy_next)
        };
        if let Some(p) = prev {
            self.ssa[p.0 as usize].daisy_next = next;
        }
        if let Some(n) = next {
            self.ssa[n.0 as usize].daisy_prev = prev;
        }
        let cfg = self.ssa[id.0 as usize].cfg;
        let cfg_node = &mut self.cfg[cfg.0 as usize];
        if cfg_node.daisy_tail == Some(id) {
            cfg_node.daisy_tail = prev;
        }
        cfg_node.ssa.retain(|&h| h != id);
        self.ssa[id.0 as usize].op = SsaOp::Pruned;
    }
}

impl SsaNode {
    pub fn inputs(&self) -> &[SsaValue] {
        &self.inputs
    }

    pub fn input(&self, i: usize) -> SsaValue {
        self.inputs[i]
    }

    pub fn outputs(&self) -> &[OutputEdge] {
        &self.outputs
    }

    pub fn output_edges(&self) -> impl Iterator<Item = OutputEdge> + '_ {
        self.outputs.iter().copied()
    }

    /// Does this node read `loc` through any input operand?
    pub fn reads_locator(&self, loc: Locator) -> bool {
        self.inputs.iter().enumerate().any(|(i, v)| {
            self.op.input_class(i) == InputClass::Loc
                && v.locator().map_or(false, |l| l.mem_head() == loc.mem_head())
        })
    }

    /// Does this node write `loc`?
    pub fn writes_locator(&self, loc: Locator) -> bool {
        self.op == SsaOp::WriteGlobals
            && self.inputs.iter().skip(1).step_by(2).any(|v| {
                v.locator().map_or(false, |l| l.mem_head() == loc.mem_head())
            })
    }
}

impl CfgNode {
    pub fn ssa(&self) -> &[SsaId] {
        &self.ssa
    }

    pub fn ssa_len(&self) -> usize {
        self.ssa.len()
    }

    pub fn last_daisy(&self) -> Option<SsaId> {
        self.daisy_tail
    }
}

/// Order a block's nodes so that every in-block input of a non-phi node
/// precedes it. Phi inputs are ignored; they may form cycles. The sort
/// is stable with respect to insertion order.
pub fn toposort_cfg_node(ir: &Ir, cfg: CfgId) -> Vec<SsaId> {
    let nodes = ir.cfg_node(cfg).ssa();
    let mut placed: Vec<SsaId> = Vec::with_capacity(nodes.len());
    let mut done: std::collections::HashSet<SsaId> = std::collections::HashSet::new();

    while placed.len() < nodes.len() {
        let mut advanced = false;
        for &id in nodes {
            if done.contains(&id) {
                continue;
            }
            let node = ir.node(id);
            let ready = node.op == SsaOp::Phi
                || node
                    .inputs
                    .iter()
                    .filter_map(|v| v.id())
                    .chain(node.daisy_prev)
                    .all(|h| ir.node(h).cfg != cfg || done.contains(&h));
            if ready {
                done.insert(id);
                placed.push(id);
                advanced = true;
            }
        }
        assert!(advanced, "cycle in non-phi SSA dependencies");
    }

    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Scalar;

    #[test]
    fn outputs_track_uses() {
        let mut ir = Ir::new();
        let cfg = ir.push_cfg();
        let mask = Scalar::U8.mask();
        let a = ir.emplace(cfg, SsaOp::Uninitialized, mask, vec![]);
        let b = ir.emplace(cfg, SsaOp::Cast, mask, vec![SsaValue::Id(a)]);
        assert_eq!(ir.node(a).outputs(), &[OutputEdge { user: b, index: 0 }]);
    }

    #[test]
    fn toposort_respects_inputs() {
        let mut ir = Ir::new();
        let cfg = ir.push_cfg();
        let mask = Scalar::U8.mask();
        let a = ir.emplace(cfg, SsaOp::Uninitialized, mask, vec![]);
        let b = ir.emplace(cfg, SsaOp::Cast, mask, vec![SsaValue::Id(a)]);
        let c = ir.emplace(cfg, SsaOp::Xor, mask, vec![SsaValue::Id(a), SsaValue::Id(b)]);
        let order = toposort_cfg_node(&ir, cfg);
        let pos = |x: SsaId| order.iter().position(|&y| y == x).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(b) < pos(c));
    }

    #[test]
    fn phi_inputs_may_reference_later_nodes() {
        let mut ir = Ir::new();
        let cfg = ir.push_cfg();
        let mask = Scalar::U8.mask();
        let phi = ir.emplace(cfg, SsaOp::Phi, mask, vec![]);
        let next = ir.emplace(cfg, SsaOp::Cast, mask, vec![SsaValue::Id(phi)]);
        ir.set_input(phi, 0, SsaValue::Id(next));
        assert_eq!(ir.node(phi).input(0), SsaValue::Id(next));
        assert_eq!(ir.node(next).outputs(), &[OutputEdge { user: phi, index: 0 }]);

        // The cycle doesn't break ordering; phi inputs carry no deps.
        let order = &crate::schedule::schedule_ir(&ir)[0];
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn replace_with_rewires() {
        let mut ir = Ir::new();
        let cfg = ir.push_cfg();
        let mask = Scalar::U8.mask();
        let a = ir.emplace(cfg, SsaOp::Uninitialized, mask, vec![]);
        let b = ir.emplace(cfg, SsaOp::Cast, mask, vec![SsaValue::Id(a)]);
        ir.replace_with(a, SsaValue::Num(Fixed::whole(3)));
        assert_eq!(ir.node(b).input(0), SsaValue::Num(Fixed::whole(3)));
        assert_eq!(ir.node(a).op, SsaOp::Pruned);
        assert_eq!(ir.cfg_node(cfg).ssa(), &[b]);
    }
}
