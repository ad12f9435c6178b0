use super::{Generator, Result};
use crate::ast::{BasicType, BinOp, UnOp};
use crate::code::{ArithOp, Instr, Kind, Primitive, Relation};
use crate::hir::{Expr, ExprKind};
use crate::sema::TypeInfo;

impl Generator<'_> {
    /// Leaves exactly one value of `e.ty` on the stack.
    pub fn emit_expr(&mut self, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::Int(i) => self.emit(Instr::PushInt(*i)),
            ExprKind::Real(r) => self.emit(Instr::PushFloat(*r)),
            ExprKind::Str(s) => self.emit(Instr::PushString(s.clone())),
            ExprKind::Var(v) => self.emit_load_var(v)?,
            ExprKind::Call(call) => self.emit_call(call)?,
            ExprKind::Unary(UnOp::Neg, x) => {
                self.emit_expr(x)?;
                self.emit(Instr::Arith(ArithOp::Neg, numeric_kind(&x.ty)));
            }
            ExprKind::Unary(UnOp::Not, x) => {
                self.emit_expr(x)?;
                self.emit(Instr::PushInt(1));
                self.emit(Instr::Arith(ArithOp::Xor, Kind::Int));
            }
            ExprKind::Binary(a, op, b) if op.is_relational() => self.emit_relation(a, *op, b)?,
            ExprKind::Binary(a, op, b) => {
                let kind = match op {
                    BinOp::Div => Kind::Float,
                    BinOp::IntDiv | BinOp::Mod | BinOp::And | BinOp::Or => Kind::Int,
                    _ => numeric_kind(&e.ty),
                };
                self.emit_operand(a, kind)?;
                self.emit_operand(b, kind)?;
                let op = match op {
                    BinOp::Add => ArithOp::Add,
                    BinOp::Sub => ArithOp::Sub,
                    BinOp::Mul => ArithOp::Mul,
                    BinOp::Div | BinOp::IntDiv => ArithOp::Div,
                    BinOp::Mod => ArithOp::Rem,
                    BinOp::And => ArithOp::And,
                    _ => ArithOp::Or,
                };
                self.emit(Instr::Arith(op, kind));
            }
        }
        Ok(())
    }

    /// Emits `x`, widened with `i2f` when a float operand is wanted.
    fn emit_operand(&mut self, x: &Expr, kind: Kind) -> Result<()> {
        self.emit_expr(x)?;
        if kind == Kind::Float && x.ty.is(BasicType::Integer) {
            self.emit(Instr::I2f);
        }
        Ok(())
    }

    /// Materialises a comparison as 0 or 1.
    fn emit_relation(&mut self, a: &Expr, op: BinOp, b: &Expr) -> Result<()> {
        let rel = match op {
            BinOp::Eq => Relation::Eq,
            BinOp::Ne => Relation::Ne,
            BinOp::Lt => Relation::Lt,
            BinOp::Le => Relation::Le,
            BinOp::Gt => Relation::Gt,
            _ => Relation::Ge,
        };
        let is_true = self.sink.new_label();
        let end = self.sink.new_label();
        if a.ty.is(BasicType::Real) || b.ty.is(BasicType::Real) {
            self.emit_operand(a, Kind::Float)?;
            self.emit_operand(b, Kind::Float)?;
            self.emit(Instr::Fcmpg);
            self.emit(Instr::IfZero(rel, is_true));
        } else if a.ty.is_string() {
            self.emit_expr(a)?;
            self.emit_expr(b)?;
            self.emit(Instr::Invoke(Primitive::CompareStrings));
            self.emit(Instr::IfZero(rel, is_true));
        } else {
            self.emit_expr(a)?;
            self.emit_expr(b)?;
            self.emit(Instr::IfIcmp(rel, is_true));
        }
        self.emit(Instr::PushInt(0));
        self.emit(Instr::Goto(end));
        self.emit(Instr::Label(is_true));
        self.emit(Instr::PushInt(1));
        self.emit(Instr::Label(end));
        Ok(())
    }
}

fn numeric_kind(ty: &TypeInfo) -> Kind {
    if ty.is(BasicType::Real) {
        Kind::Float
    } else {
        Kind::Int
    }
}
