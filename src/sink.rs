//! Instruction sink: the single place that tracks operand stack depth and
//! label positions for one method body.

use log::{debug, trace};
use thiserror::Error;

use crate::code::{Code, Instr, Label};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("label {0} defined twice")]
    LabelRedefined(Label),
    #[error("label {0} is referenced but never defined")]
    UnresolvedLabel(Label),
    #[error("operand stack underflow at instruction {at}")]
    Underflow { at: usize },
    #[error("operand stack depth at {label} is {found}, expected {expected}")]
    DepthMismatch { label: Label, expected: u16, found: u16 },
}

#[derive(Debug, Default, Clone)]
struct LabelSlot {
    position: Option<usize>,
    depth: Option<u16>,
}

#[derive(Debug, Default)]
pub struct Sink {
    code: Vec<Instr>,
    depth: u16,
    max_depth: u16,
    reachable: bool,
    labels: Vec<LabelSlot>,
    fault: Option<SinkError>,
}

impl Sink {
    pub fn new() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }

    pub fn new_label(&mut self) -> Label {
        let id = self.labels.len() as u32;
        self.labels.push(LabelSlot::default());
        Label(id)
    }

    pub fn depth(&self) -> u16 {
        self.depth
    }

    pub fn push(&mut self, n: u16) {
        self.depth += n;
        self.max_depth = self.max_depth.max(self.depth);
    }

    pub fn pop(&mut self, n: u16) {
        if self.depth < n {
            self.fail(SinkError::Underflow { at: self.code.len() });
            self.depth = 0;
        } else {
            self.depth -= n;
        }
    }

    pub fn emit(&mut self, instr: Instr) {
        if let Instr::Label(l) = instr {
            self.emit_label(l);
            return;
        }
        let effect = instr.effect();
        self.pop(effect.pops);
        self.max_depth = self.max_depth.max(self.depth + effect.pushes + effect.scratch);
        self.push(effect.pushes);
        for target in instr.targets() {
            self.note_target(target);
        }
        if instr.ends_flow() {
            self.reachable = false;
        }
        self.code.push(instr);
    }

    /// Binds `l` to the current position. A label is defined exactly once.
    pub fn emit_label(&mut self, l: Label) {
        let Some(slot) = self.labels.get(l.0 as usize).cloned() else {
            self.fail(SinkError::UnresolvedLabel(l));
            return;
        };
        if slot.position.is_some() {
            self.fail(SinkError::LabelRedefined(l));
            return;
        }
        match (self.reachable, slot.depth) {
            (true, Some(expected)) if expected != self.depth => {
                self.fail(SinkError::DepthMismatch {
                    label: l,
                    expected,
                    found: self.depth,
                });
            }
            (false, Some(expected)) => self.depth = expected,
            _ => {}
        }
        trace!("bind {l} at {} (depth {})", self.code.len(), self.depth);
        self.labels[l.0 as usize] = LabelSlot {
            position: Some(self.code.len()),
            depth: Some(self.depth),
        };
        self.reachable = true;
        self.code.push(Instr::Label(l));
    }

    fn note_target(&mut self, l: Label) {
        let depth = self.depth;
        let Some(slot) = self.labels.get_mut(l.0 as usize) else {
            self.fail(SinkError::UnresolvedLabel(l));
            return;
        };
        match slot.depth {
            Some(expected) if expected != depth => self.fail(SinkError::DepthMismatch {
                label: l,
                expected,
                found: depth,
            }),
            Some(_) => {}
            None => slot.depth = Some(depth),
        }
    }

    fn fail(&mut self, e: SinkError) {
        if self.fault.is_none() {
            self.fault = Some(e);
        }
    }

    pub fn finish(self) -> Result<Code, SinkError> {
        if let Some(e) = self.fault {
            return Err(e);
        }
        let mut defined: Vec<(usize, usize)> = vec![];
        for (id, slot) in self.labels.iter().enumerate() {
            match slot.position {
                Some(pos) => defined.push((pos, id)),
                None if slot.depth.is_some() => return Err(SinkError::UnresolvedLabel(Label(id as u32))),
                None => {}
            }
        }
        defined.sort();
        let mut label_names = vec![String::new(); self.labels.len()];
        for (n, (_, id)) in defined.iter().enumerate() {
            label_names[*id] = format!("L{n:03}");
        }
        debug!(
            "method finished: {} instructions, max stack {}",
            self.code.len(),
            self.max_depth
        );
        Ok(Code {
            instrs: self.code,
            max_stack: self.max_depth,
            label_names,
        })
    }
}

/// Instruction indices reachable from the entry, following branches.
#[cfg(test)]
pub(crate) fn reachable(code: &Code) -> Vec<bool> {
    let at = |l: Label| {
        code.instrs
            .iter()
            .position(|x| matches!(x, Instr::Label(y) if *y == l))
    };
    let mut seen = vec![false; code.instrs.len()];
    let mut work = vec![0usize];
    while let Some(i) = work.pop() {
        if i >= code.instrs.len() || seen[i] {
            continue;
        }
        seen[i] = true;
        let ins = &code.instrs[i];
        work.extend(ins.targets().into_iter().filter_map(at));
        if !ins.ends_flow() {
            work.push(i + 1);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{Kind, Relation};

    #[test]
    fn label_defined_twice_is_a_fault() {
        let mut s = Sink::new();
        let l = s.new_label();
        s.emit_label(l);
        s.emit_label(l);
        assert_eq!(s.finish().unwrap_err(), SinkError::LabelRedefined(l));
    }

    #[test]
    fn referenced_label_must_be_defined() {
        let mut s = Sink::new();
        let l = s.new_label();
        s.emit(Instr::Goto(l));
        assert_eq!(s.finish().unwrap_err(), SinkError::UnresolvedLabel(l));
    }

    #[test]
    fn unused_label_is_not_an_error() {
        let mut s = Sink::new();
        let _ = s.new_label();
        s.emit(Instr::Return(None));
        assert!(s.finish().is_ok());
    }

    #[test]
    fn underflow_is_reported() {
        let mut s = Sink::new();
        s.emit(Instr::Pop);
        assert_eq!(s.finish().unwrap_err(), SinkError::Underflow { at: 0 });
    }

    #[test]
    fn join_point_depth_must_agree() {
        let mut s = Sink::new();
        let end = s.new_label();
        s.emit(Instr::PushInt(1));
        s.emit(Instr::IfZero(Relation::Ne, end));
        s.emit(Instr::PushInt(2));
        s.emit_label(end);
        assert_eq!(
            s.finish().unwrap_err(),
            SinkError::DepthMismatch {
                label: end,
                expected: 0,
                found: 1
            }
        );
    }

    #[test]
    fn unreachable_label_adopts_branch_depth() {
        let mut s = Sink::new();
        let t = s.new_label();
        let end = s.new_label();
        s.emit(Instr::PushInt(1));
        s.emit(Instr::PushInt(2));
        s.emit(Instr::IfIcmp(Relation::Lt, t));
        s.emit(Instr::PushInt(0));
        s.emit(Instr::Goto(end));
        s.emit_label(t);
        assert_eq!(s.depth(), 0);
        s.emit(Instr::PushInt(1));
        s.emit_label(end);
        assert_eq!(s.depth(), 1);
        s.emit(Instr::Pop);
        let code = s.finish().unwrap();
        assert_eq!(code.max_stack, 2);
    }

    #[test]
    fn labels_are_named_by_position() {
        let mut s = Sink::new();
        let late = s.new_label();
        let early = s.new_label();
        s.emit_label(early);
        s.emit(Instr::Goto(late));
        s.emit_label(late);
        let code = s.finish().unwrap();
        assert_eq!(code.label_name(early), "L000");
        assert_eq!(code.label_name(late), "L001");
    }

    #[test]
    fn scratch_counts_toward_max_stack() {
        let mut s = Sink::new();
        s.emit(Instr::NewRecord("Point".into()));
        s.emit(Instr::Store(Kind::Ref, 1));
        let code = s.finish().unwrap();
        assert_eq!(code.max_stack, 2);
    }

    #[test]
    fn both_if_branches_reachable_and_rejoin() {
        // cond; ifne then; else-part; goto end; then: then-part; end:
        let mut s = Sink::new();
        let then_l = s.new_label();
        let end = s.new_label();
        s.emit(Instr::PushInt(1));
        s.emit(Instr::IfZero(Relation::Ne, then_l));
        s.emit(Instr::PushInt(7));
        s.emit(Instr::Store(Kind::Int, 1));
        s.emit(Instr::Goto(end));
        s.emit_label(then_l);
        s.emit(Instr::PushInt(8));
        s.emit(Instr::Store(Kind::Int, 1));
        s.emit_label(end);
        s.emit(Instr::Return(None));
        let code = s.finish().unwrap();
        assert!(reachable(&code).iter().all(|r| *r));
    }

    #[test]
    fn while_loop_body_is_reachable_only_through_the_test() {
        // top: cond; ifeq exit; body; goto top; exit:
        let mut s = Sink::new();
        let top = s.new_label();
        let exit = s.new_label();
        s.emit_label(top);
        s.emit(Instr::PushInt(0));
        s.emit(Instr::IfZero(Relation::Eq, exit));
        s.emit(Instr::PushInt(1));
        s.emit(Instr::Pop);
        s.emit(Instr::Goto(top));
        s.emit_label(exit);
        s.emit(Instr::Return(None));
        let code = s.finish().unwrap();
        let r = reachable(&code);
        assert!(r.iter().all(|x| *x));
        let back_edges = code
            .instrs
            .iter()
            .filter(|i| matches!(i, Instr::Goto(l) if *l == top))
            .count();
        assert_eq!(back_edges, 1);
    }

    #[test]
    fn code_after_goto_is_unreachable_until_next_label() {
        let mut s = Sink::new();
        let l = s.new_label();
        s.emit(Instr::Goto(l));
        s.emit(Instr::PushInt(3));
        s.emit(Instr::Pop);
        s.emit_label(l);
        s.emit(Instr::Return(None));
        let code = s.finish().unwrap();
        assert_eq!(reachable(&code), vec![true, false, false, true, true]);
    }
}
