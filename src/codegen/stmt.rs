use std::collections::BTreeMap;

use log::trace;

use super::{CodegenError, Generator, Result};
use crate::code::{ArithOp, Instr, Kind, Label, Relation};
use crate::config::DuplicatePolicy;
use crate::hir::{CaseBranch, Expr, Stmt, VarRef};

impl Generator<'_> {
    pub fn emit_stmt(&mut self, s: &Stmt) -> Result<()> {
        trace!("stmt {} at depth {}", s.kind_name(), self.sink.depth());
        match s {
            Stmt::Empty => Ok(()),
            Stmt::Compound(v) => {
                for st in v {
                    self.emit_stmt(st)?;
                }
                Ok(())
            }
            Stmt::Assignment { target, value } => self.emit_assignment(target, value),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.emit_if(cond, then_branch, else_branch.as_deref()),
            Stmt::Case {
                selector,
                branches,
                otherwise,
            } => self.emit_case(selector, branches, otherwise.as_deref()),
            Stmt::Repeat { body, cond } => self.emit_repeat(body, cond),
            Stmt::While { cond, body } => self.emit_while(cond, body),
            Stmt::For {
                var,
                init,
                limit,
                downto,
                body,
            } => self.emit_for(var, init, limit, *downto, body),
            Stmt::ProcedureCall(call) => self.emit_call(call),
            Stmt::FunctionCall(call) => {
                self.emit_call(call)?;
                self.emit(Instr::Pop);
                Ok(())
            }
            Stmt::Write(args) => self.emit_write(args, false),
            Stmt::Writeln(args) => self.emit_write(args, true),
            Stmt::Read(targets) => self.emit_read(targets, false),
            Stmt::Readln(targets) => self.emit_read(targets, true),
        }
    }

    fn emit_assignment(&mut self, target: &VarRef, value: &Expr) -> Result<()> {
        self.emit_address_prefix(target)?;
        self.emit_expr(value)?;
        self.emit_coercion(&target.ty, &value.ty);
        self.emit_store(target)
    }

    fn emit_if(&mut self, cond: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) -> Result<()> {
        let then_l = self.sink.new_label();
        let end = self.sink.new_label();
        self.emit_expr(cond)?;
        self.emit(Instr::IfZero(Relation::Ne, then_l));
        if let Some(e) = else_branch {
            self.emit_stmt(e)?;
        }
        self.emit(Instr::Goto(end));
        self.emit(Instr::Label(then_l));
        self.emit_stmt(then_branch)?;
        self.emit(Instr::Label(end));
        Ok(())
    }

    fn emit_case(&mut self, selector: &Expr, branches: &[CaseBranch], otherwise: Option<&Stmt>) -> Result<()> {
        let end = self.sink.new_label();
        let mut table: BTreeMap<i32, Label> = BTreeMap::new();
        let mut labels = Vec::with_capacity(branches.len());
        for b in branches {
            if b.constants.is_empty() {
                return Err(CodegenError::Internal("case branch without constants".into()));
            }
            let l = self.sink.new_label();
            for &c in &b.constants {
                if table.insert(c, l).is_some() && self.cfg.case_duplicates == DuplicatePolicy::Reject {
                    return Err(CodegenError::DuplicateCaseConstant(c));
                }
            }
            labels.push(l);
        }
        let default = match otherwise {
            Some(_) => self.sink.new_label(),
            None => end,
        };

        self.emit_expr(selector)?;
        self.emit(Instr::Lookupswitch {
            pairs: table.into_iter().collect(),
            default,
        });
        for (b, l) in branches.iter().zip(labels) {
            self.emit(Instr::Label(l));
            self.emit_stmt(&b.body)?;
            self.emit(Instr::Goto(end));
        }
        if let Some(o) = otherwise {
            self.emit(Instr::Label(default));
            self.emit_stmt(o)?;
        }
        self.emit(Instr::Label(end));
        Ok(())
    }

    fn emit_repeat(&mut self, body: &[Stmt], cond: &Expr) -> Result<()> {
        let top = self.sink.new_label();
        let exit = self.sink.new_label();
        self.emit(Instr::Label(top));
        for st in body {
            self.emit_stmt(st)?;
        }
        self.emit_expr(cond)?;
        self.emit(Instr::IfZero(Relation::Ne, exit));
        self.emit(Instr::Goto(top));
        self.emit(Instr::Label(exit));
        Ok(())
    }

    fn emit_while(&mut self, cond: &Expr, body: &Stmt) -> Result<()> {
        let top = self.sink.new_label();
        let exit = self.sink.new_label();
        self.emit(Instr::Label(top));
        self.emit_expr(cond)?;
        self.emit(Instr::IfZero(Relation::Eq, exit));
        self.emit_stmt(body)?;
        self.emit(Instr::Goto(top));
        self.emit(Instr::Label(exit));
        Ok(())
    }

    /// The bound is evaluated on every pass; the loop runs while
    /// `var <= bound` (`to`) or `var >= bound` (`downto`).
    fn emit_for(&mut self, var: &VarRef, init: &Expr, limit: &Expr, downto: bool, body: &Stmt) -> Result<()> {
        let top = self.sink.new_label();
        let exit = self.sink.new_label();
        self.emit_assignment(var, init)?;
        self.emit(Instr::Label(top));
        self.emit_expr(limit)?;
        self.emit_load_var(var)?;
        let exit_when = if downto { Relation::Gt } else { Relation::Lt };
        self.emit(Instr::IfIcmp(exit_when, exit));
        self.emit_stmt(body)?;
        self.emit_address_prefix(var)?;
        self.emit_load_var(var)?;
        self.emit(Instr::PushInt(1));
        let step = if downto { ArithOp::Sub } else { ArithOp::Add };
        self.emit(Instr::Arith(step, Kind::Int));
        self.emit_store(var)?;
        self.emit(Instr::Goto(top));
        self.emit(Instr::Label(exit));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BasicType, BinOp};
    use crate::code::Code;
    use crate::config::CodegenConfig;
    use crate::hir::{Binding, ExprKind, Symbol};
    use crate::sema::TypeInfo;
    use crate::sink::reachable;

    fn int_ty() -> TypeInfo {
        TypeInfo::Basic(BasicType::Integer)
    }

    fn local(slot: u16) -> VarRef {
        VarRef::plain(Symbol {
            name: format!("v{slot}"),
            binding: Binding::Local(slot),
            ty: int_ty(),
        })
    }

    fn int(i: i32) -> Expr {
        Expr {
            kind: ExprKind::Int(i),
            ty: int_ty(),
        }
    }

    fn below(slot: u16, bound: i32) -> Expr {
        Expr {
            kind: ExprKind::Binary(
                Box::new(Expr {
                    kind: ExprKind::Var(local(slot)),
                    ty: int_ty(),
                }),
                BinOp::Lt,
                Box::new(int(bound)),
            ),
            ty: TypeInfo::Basic(BasicType::Boolean),
        }
    }

    fn set(slot: u16, value: i32) -> Stmt {
        Stmt::Assignment {
            target: local(slot),
            value: int(value),
        }
    }

    fn compile(s: &Stmt) -> Code {
        let cfg = CodegenConfig::default();
        let mut g = Generator::new(&cfg, 3);
        g.emit_stmt(s).unwrap();
        g.emit(Instr::Return(None));
        g.finish().unwrap().0
    }

    fn label_at(code: &Code, l: Label) -> usize {
        code.instrs
            .iter()
            .position(|x| matches!(x, Instr::Label(y) if *y == l))
            .unwrap()
    }

    fn stores_to(code: &Code, slot: u16) -> Vec<usize> {
        code.instrs
            .iter()
            .enumerate()
            .filter(|(_, x)| matches!(x, Instr::Store(Kind::Int, s) if *s == slot))
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn both_if_branches_are_reachable() {
        let code = compile(&Stmt::If {
            cond: below(1, 10),
            then_branch: Box::new(set(2, 7)),
            else_branch: Some(Box::new(set(2, 8))),
        });
        let r = reachable(&code);
        assert!(r.iter().all(|x| *x));
        assert_eq!(stores_to(&code, 2).len(), 2);
        assert_eq!(code.max_stack, 2);
    }

    #[test]
    fn while_body_is_entered_only_through_the_test() {
        let code = compile(&Stmt::While {
            cond: below(1, 10),
            body: Box::new(set(1, 5)),
        });
        assert!(reachable(&code).iter().all(|x| *x));
        let Instr::Label(top) = code.instrs[0] else {
            panic!("loop must open with its label: {:?}", code.instrs);
        };
        let exit = code
            .instrs
            .iter()
            .find_map(|x| match x {
                Instr::IfZero(Relation::Eq, l) => Some(*l),
                _ => None,
            })
            .unwrap();
        let body = stores_to(&code, 1);
        assert_eq!(body.len(), 1);
        assert!(label_at(&code, top) < body[0] && body[0] < label_at(&code, exit));
        let back_edges = code
            .instrs
            .iter()
            .filter(|x| matches!(x, Instr::Goto(l) if *l == top))
            .count();
        assert_eq!(back_edges, 1);
    }

    #[test]
    fn repeat_body_runs_before_the_test() {
        let code = compile(&Stmt::Repeat {
            body: vec![set(1, 5)],
            cond: below(1, 10),
        });
        assert!(reachable(&code).iter().all(|x| *x));
        let test = code
            .instrs
            .iter()
            .position(|x| matches!(x, Instr::IfZero(Relation::Ne, _)))
            .unwrap();
        assert!(stores_to(&code, 1)[0] < test);
        assert!(matches!(code.instrs[test + 1], Instr::Goto(_)));
    }

    #[test]
    fn every_case_branch_is_reachable_from_the_switch() {
        let code = compile(&Stmt::Case {
            selector: Expr {
                kind: ExprKind::Var(local(1)),
                ty: int_ty(),
            },
            branches: vec![
                CaseBranch {
                    constants: vec![3, 1],
                    body: set(2, 1),
                },
                CaseBranch {
                    constants: vec![2],
                    body: set(2, 2),
                },
            ],
            otherwise: Some(Box::new(set(2, 0))),
        });
        assert!(reachable(&code).iter().all(|x| *x));
        assert_eq!(stores_to(&code, 2).len(), 3);
    }
}
