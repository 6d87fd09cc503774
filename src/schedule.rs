//! Per-block instruction scheduling.
//!
//! Linearises each basic block's SSA nodes with a greedy list scheduler
//! tuned for a register-poor, carry-bearing target: a live carry must
//! not be clobbered between its producer and its single consumer, nodes
//! feeding a named memory location follow earlier accesses of that
//! location, and the block terminator goes last. Priorities favour
//! successors of the node just scheduled, then the longest path through
//! the remaining ready DAG.

use itertools::Itertools;

use crate::ssa::{toposort_cfg_node, CfgId, InputClass, Ir, SsaFlags, SsaId, SsaOp};
use tracing::trace;

/// Dense bitset sized for one scheduler run.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    fn new(bits: usize) -> Self {
        BitSet { words: vec![0; (bits + 63) / 64] }
    }

    fn set(&mut self, i: usize) {
        self.words[i / 64] |= 1 << (i % 64);
    }

    fn test(&self, i: usize) -> bool {
        self.words[i / 64] & (1 << (i % 64)) != 0
    }

    fn or_with(&mut self, other: &BitSet) {
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w |= o;
        }
    }

    /// Is `self & !other` empty?
    fn subset_of(&self, other: &BitSet) -> bool {
        self.words.iter().zip(&other.words).all(|(w, o)| w & !o == 0)
    }
}

/// Schedule every block of `ir`, indexed by block id.
pub fn schedule_ir(ir: &Ir) -> Vec<Vec<SsaId>> {
    ir.cfg_ids().map(|cfg| Scheduler::new(ir, cfg).run()).collect()
}

struct NodeData {
    carry_user: Option<SsaId>,
    deps: BitSet,
}

struct Scheduler<'a> {
    ir: &'a Ir,
    cfg: CfgId,
    toposorted: Vec<SsaId>,
    /// Node data indexed by topological index.
    data: Vec<NodeData>,
    scheduled: BitSet,
    carry_clobberers: BitSet,
    carry_input_waiting: Option<SsaId>,
    schedule: Vec<SsaId>,
}

impl<'a> Scheduler<'a> {
    fn new(ir: &'a Ir, cfg: CfgId) -> Self {
        let toposorted = toposort_cfg_node(ir, cfg);
        let n = toposorted.len();

        let mut this = Scheduler {
            ir,
            cfg,
            data: toposorted
                .iter()
                .map(|_| NodeData { carry_user: None, deps: BitSet::new(n) })
                .collect(),
            toposorted,
            scheduled: BitSet::new(n),
            carry_clobberers: BitSet::new(n),
            carry_input_waiting: None,
            schedule: Vec::with_capacity(n),
        };

        this.build_deps();
        this.augment_carry_deps();
        this.augment_locator_deps();
        this
    }

    fn index_of(&self, id: SsaId) -> usize {
        self.toposorted.iter().position(|&h| h == id).expect("node not in block")
    }

    fn build_deps(&mut self) {
        // The block's conditional exit is scheduled last.
        if let Some(exit) = self.ir.cfg_node(self.cfg).last_daisy() {
            if self.ir.node(exit).op == SsaOp::If {
                debug_assert!(self.ir.node(exit).outputs().is_empty());
                let exit_i = self.index_of(exit);
                for i in 0..self.toposorted.len() {
                    if i != exit_i {
                        self.data[exit_i].deps.set(i);
                    }
                }
            }
        }

        for i in 0..self.toposorted.len() {
            let id = self.toposorted[i];
            let node = self.ir.node(id);

            // Phi inputs can introduce cycles; they carry no deps.
            if node.op == SsaOp::Phi {
                continue;
            }

            let mut dep_indices: Vec<usize> = Vec::new();
            for input in node.inputs().iter().filter_map(|v| v.id()) {
                if self.ir.node(input).cfg != self.cfg {
                    continue;
                }
                dep_indices.push(self.index_of(input));
            }
            if let Some(prev) = node.daisy_prev {
                dep_indices.push(self.index_of(prev));
            }

            for dep in dep_indices {
                debug_assert!(i > dep);
                self.data[i].deps.set(dep);
                let (head, tail) = self.data.split_at_mut(i);
                tail[0].deps.or_with(&head[dep].deps);
            }
        }

        for (i, &id) in self.toposorted.iter().enumerate() {
            if self.ir.node(id).op.flags().contains(SsaFlags::CLOBBERS_CARRY) {
                self.carry_clobberers.set(i);
            }
        }
    }

    fn propagate_deps_change(&mut self, changed: usize) {
        let changed_deps = self.data[changed].deps.clone();
        for i in 0..self.data.len() {
            if i != changed && self.data[i].deps.test(changed) {
                self.data[i].deps.or_with(&changed_deps);
            }
        }
    }

    /// In chains of carry operations, pull the carry consumer's other
    /// dependencies ahead of the producer so the carry never needs to
    /// be spilled between them.
    fn augment_carry_deps(&mut self) {
        for i in (0..self.toposorted.len()).rev() {
            let id = self.toposorted[i];

            // A node qualifies when its carry is used by exactly one
            // in-block consumer.
            let carry_user = self
                .ir
                .node(id)
                .output_edges()
                .filter(|oe| {
                    self.ir.node(oe.user).op.input_class(oe.index as usize)
                        == InputClass::Carry
                })
                .map(|oe| oe.user)
                .exactly_one()
                .ok();
            let Some(user) = carry_user else { continue };
            if self.ir.node(user).cfg != self.cfg {
                continue;
            }

            let user_i = self.index_of(user);
            self.data[i].carry_user = Some(user);

            // Candidate deps: carry clobberers the consumer depends on
            // that the producer doesn't yet.
            let mut wanted: Vec<usize> = Vec::new();
            for j in 0..self.toposorted.len() {
                if j != i
                    && self.data[user_i].deps.test(j)
                    && !self.data[i].deps.test(j)
                    && self.carry_clobberers.test(j)
                {
                    wanted.push(j);
                }
            }
            if wanted.is_empty() {
                continue;
            }

            // Adding a dep must not create a cycle.
            if wanted.iter().any(|&j| self.data[j].deps.test(i)) {
                continue;
            }

            for &j in &wanted {
                self.data[i].deps.set(j);
                let deps = self.data[j].deps.clone();
                self.data[i].deps.or_with(&deps);
            }
            self.propagate_deps_change(i);
        }
    }

    /// A node whose result lands in a named locator follows the most
    /// recent prior daisy access of the same location.
    fn augment_locator_deps(&mut self) {
        for i in 0..self.toposorted.len() {
            let id = self.toposorted[i];

            for oe in self.ir.node(id).output_edges() {
                let user = self.ir.node(oe.user);
                if user.op != SsaOp::WriteGlobals || oe.index % 2 != 0 {
                    continue;
                }
                let Some(loc) = user.input(oe.index as usize + 1).locator() else {
                    continue;
                };

                debug_assert!(user.daisy_prev.is_some() || user.daisy_next.is_some());

                // Find the previous daisy reader or writer of `loc`.
                let mut daisy = user.daisy_prev;
                while let Some(d) = daisy {
                    let dn = self.ir.node(d);
                    if dn.op.flags().contains(SsaFlags::WRITE_GLOBALS)
                        && (dn.reads_locator(loc) || dn.writes_locator(loc))
                    {
                        debug_assert_eq!(dn.cfg, self.cfg);
                        let daisy_i = self.index_of(d);

                        // Skip when a dep would close a cycle.
                        if self.data[daisy_i].deps.test(i) {
                            break;
                        }

                        self.data[i].deps.set(daisy_i);
                        let deps = self.data[daisy_i].deps.clone();
                        self.data[i].deps.or_with(&deps);
                        self.propagate_deps_change(i);
                        break;
                    }
                    daisy = dn.daisy_prev;
                }
            }
        }
    }

    fn run(mut self) -> Vec<SsaId> {
        let total = self.toposorted.len();

        let mut candidate: Option<SsaId> = None;
        while self.schedule.len() < total {
            // First priority: a ready successor of the last node.
            if let Some(last) = candidate {
                candidate = self.successor_search(last);
            }

            // Second priority: any ready node.
            if candidate.is_none() {
                candidate = self.full_search::<false>();
            }

            // Third priority: relax the carry rule.
            if candidate.is_none() {
                candidate = self.full_search::<true>();
            }

            let Some(chosen) = candidate else {
                panic!("scheduler found no ready node");
            };
            trace!(node = chosen.0, "scheduling");

            self.append_schedule(chosen);

            // Track the carry's consumer, if any.
            if self.ir.node(chosen).op.input0_class() == InputClass::Carry {
                self.carry_input_waiting = None;
            }
            let chosen_i = self.index_of(chosen);
            if let Some(user) = self.data[chosen_i].carry_user {
                self.carry_input_waiting = Some(user);
            }
        }

        debug_assert!({
            let mut sorted = self.schedule.clone();
            sorted.sort();
            sorted.dedup();
            sorted.len() == total
        });

        self.schedule
    }

    fn append_schedule(&mut self, id: SsaId) {
        let i = self.index_of(id);
        self.scheduled.set(i);
        self.schedule.push(id);

        // Linked outputs ride along immediately.
        let links: Vec<SsaId> = self
            .ir
            .node(id)
            .output_edges()
            .filter(|oe| {
                self.ir.node(oe.user).cfg == self.cfg
                    && self.ir.node(oe.user).op.input_class(oe.index as usize)
                        == InputClass::Link
            })
            .map(|oe| oe.user)
            .collect();
        for link in links {
            debug_assert!(self.ready::<true>(link, &self.scheduled));
            self.append_schedule(link);
        }
    }

    fn ready<const RELAX: bool>(&self, id: SsaId, scheduled: &BitSet) -> bool {
        debug_assert_eq!(self.ir.node(id).cfg, self.cfg);
        let i = self.index_of(id);

        if scheduled.test(i) {
            return false;
        }

        // Ready means every dependency is placed.
        if !self.data[i].deps.subset_of(scheduled) {
            return false;
        }

        if RELAX {
            return true;
        }

        // While a carry is live, only its consumer may clobber it.
        if let Some(waiting) = self.carry_input_waiting {
            if id != waiting && self.carry_clobberers.test(i) {
                return false;
            }
        }

        true
    }

    fn path_length<const RELAX: bool>(&self, id: SsaId, scheduled: &BitSet) -> i32 {
        let mut with_node = scheduled.clone();
        with_node.set(self.index_of(id));

        let mut max_len = 0;
        let mut outputs_in_block = 0;
        for oe in self.ir.node(id).output_edges() {
            let output = oe.user;
            if self.ir.node(output).cfg != self.cfg {
                continue;
            }
            if !self.ready::<RELAX>(output, &with_node) {
                continue;
            }
            outputs_in_block += 1;
            max_len = max_len.max(self.path_length::<RELAX>(output, &with_node));
        }

        max_len + 0.max(outputs_in_block - 1)
    }

    fn successor_search(&self, last: SsaId) -> Option<SsaId> {
        let mut best_path_length = -1;
        let mut best: Option<SsaId> = None;

        for oe in self.ir.node(last).output_edges() {
            let succ = oe.user;
            if self.ir.node(succ).cfg != self.cfg {
                continue;
            }
            if self.ready::<false>(succ, &self.scheduled) {
                let l = self.path_length::<false>(succ, &self.scheduled);
                if l > best_path_length {
                    best_path_length = l;
                    best = Some(succ);
                }
            }
        }

        best
    }

    fn full_search<const RELAX: bool>(&self) -> Option<SsaId> {
        let mut best_path_length = -1;
        let mut best: Option<SsaId> = None;

        for &id in &self.toposorted {
            if !self.ready::<RELAX>(id, &self.scheduled) {
                continue;
            }
            let l = self.path_length::<RELAX>(id, &self.scheduled);
            if l > best_path_length {
                best_path_length = l;
                best = Some(id);
            }
        }

        best
    }
}
