//! JVM code generation over the decorated tree.
//!
//! One `Generator` owns the `Sink` for one method body. Statement,
//! expression and I/O compilation are split across submodules but share the
//! addressing helpers defined here.

use thiserror::Error;

use crate::ast::BasicType;
use crate::code::{ArithOp, Code, FieldRef, Instr, Kind, MethodRef, Owner, ParamDesc};
use crate::config::CodegenConfig;
use crate::hir::{AddressingMode, Arg, Binding, Call, Expr, Modifier, Routine, VarRef};
use crate::sema::TypeInfo;
use crate::sink::{Sink, SinkError};

mod expr;
mod io;
mod program;
mod stmt;

pub use program::{generate, ClassKind, ClassUnit, MethodKind, MethodUnit};

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("duplicate case constant {0}")]
    DuplicateCaseConstant(i32),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("internal error: {0}")]
    Sink(#[from] SinkError),
}

pub type Result<T> = std::result::Result<T, CodegenError>;

pub struct Generator<'a> {
    sink: Sink,
    cfg: &'a CodegenConfig,
    next_local: u16,
    max_locals: u16,
}

impl<'a> Generator<'a> {
    /// `first_free` is the first local slot not taken by parameters or
    /// declared variables.
    pub fn new(cfg: &'a CodegenConfig, first_free: u16) -> Self {
        Self {
            sink: Sink::new(),
            cfg,
            next_local: first_free,
            max_locals: first_free,
        }
    }

    fn emit(&mut self, instr: Instr) {
        self.sink.emit(instr);
    }

    pub fn finish(self) -> Result<(Code, u16)> {
        let max_locals = self.max_locals;
        Ok((self.sink.finish()?, max_locals))
    }

    fn alloc_temp(&mut self) -> u16 {
        let slot = self.next_local;
        self.next_local += 1;
        self.max_locals = self.max_locals.max(self.next_local);
        slot
    }

    /// Loads the value of `v`.
    fn emit_load_var(&mut self, v: &VarRef) -> Result<()> {
        if v.modifiers.is_empty() {
            match &v.symbol.binding {
                Binding::Global(name) => self.emit(Instr::GetStatic(global_field(name, &v.ty))),
                Binding::Local(slot) => self.emit(Instr::Load(Kind::of(&v.ty), *slot)),
                Binding::Cell(slot) => {
                    self.emit(Instr::Load(Kind::Ref, *slot));
                    self.emit(Instr::PushInt(0));
                    self.emit(Instr::ArrayLoad(Kind::of(&v.ty)));
                }
            }
            return Ok(());
        }
        self.emit_base(v)?;
        for m in &v.modifiers {
            self.emit_modifier_load(m)?;
        }
        Ok(())
    }

    /// Leaves on the stack everything the final store of `v` consumes
    /// besides the value itself.
    fn emit_address_prefix(&mut self, v: &VarRef) -> Result<()> {
        let Some((last, inner)) = v.modifiers.split_last() else {
            if let Binding::Cell(slot) = v.symbol.binding {
                self.emit(Instr::Load(Kind::Ref, slot));
                self.emit(Instr::PushInt(0));
            }
            return Ok(());
        };
        self.emit_base(v)?;
        for m in inner {
            self.emit_modifier_load(m)?;
        }
        match (v.addressing_mode(), last) {
            (AddressingMode::Element, Modifier::Index { index, low, .. }) => self.emit_index(index, *low)?,
            (AddressingMode::Field, Modifier::Field { .. }) => {}
            (mode, _) => {
                return Err(CodegenError::Internal(format!(
                    "{mode:?} store through mismatched selector on {}",
                    v.symbol.name
                )))
            }
        }
        Ok(())
    }

    /// Stores the top of stack into `v`; the address prefix is already below it.
    fn emit_store(&mut self, v: &VarRef) -> Result<()> {
        match v.modifiers.last() {
            None => match &v.symbol.binding {
                Binding::Global(name) => self.emit(Instr::PutStatic(global_field(name, &v.ty))),
                Binding::Local(slot) => self.emit(Instr::Store(Kind::of(&v.ty), *slot)),
                Binding::Cell(_) => self.emit(Instr::ArrayStore(Kind::of(&v.ty))),
            },
            Some(Modifier::Field { record, name, ty }) => self.emit(Instr::PutField(FieldRef {
                owner: Owner::Record(record.clone()),
                name: name.clone(),
                ty: ty.clone(),
            })),
            Some(Modifier::Index { elem, .. }) => self.emit(Instr::ArrayStore(Kind::of(elem))),
        }
        Ok(())
    }

    fn emit_base(&mut self, v: &VarRef) -> Result<()> {
        match &v.symbol.binding {
            Binding::Global(name) => self.emit(Instr::GetStatic(global_field(name, &v.symbol.ty))),
            Binding::Local(slot) => self.emit(Instr::Load(Kind::Ref, *slot)),
            Binding::Cell(_) => {
                return Err(CodegenError::Internal(format!(
                    "selector applied to scalar var parameter {}",
                    v.symbol.name
                )))
            }
        }
        Ok(())
    }

    fn emit_modifier_load(&mut self, m: &Modifier) -> Result<()> {
        match m {
            Modifier::Field { record, name, ty } => self.emit(Instr::GetField(FieldRef {
                owner: Owner::Record(record.clone()),
                name: name.clone(),
                ty: ty.clone(),
            })),
            Modifier::Index { index, low, elem } => {
                self.emit_index(index, *low)?;
                self.emit(Instr::ArrayLoad(Kind::of(elem)));
            }
        }
        Ok(())
    }

    /// JVM arrays start at zero; the declared lower bound is subtracted.
    fn emit_index(&mut self, index: &Expr, low: i32) -> Result<()> {
        self.emit_expr(index)?;
        if low != 0 {
            self.emit(Instr::PushInt(low));
            self.emit(Instr::Arith(ArithOp::Sub, Kind::Int));
        }
        Ok(())
    }

    /// The only implicit conversion: integer into a real target.
    fn emit_coercion(&mut self, target: &TypeInfo, value: &TypeInfo) {
        if target.is(BasicType::Real) && value.is(BasicType::Integer) {
            self.emit(Instr::I2f);
        }
    }

    /// Pushes the arguments in declaration order and invokes the routine.
    /// A function result is left on the stack.
    fn emit_call(&mut self, call: &Call) -> Result<()> {
        if call.args.len() != call.routine.params.len() {
            return Err(CodegenError::Internal(format!(
                "call to {} with {} arguments, expected {}",
                call.routine.name,
                call.args.len(),
                call.routine.params.len()
            )));
        }
        let saved_next = self.next_local;
        let mut copy_back: Vec<(u16, &VarRef)> = vec![];
        for (param, arg) in call.routine.params.iter().zip(&call.args) {
            match arg {
                Arg::Value(e) => {
                    self.emit_expr(e)?;
                    self.emit_coercion(&param.ty, &e.ty);
                }
                Arg::Ref(v) if param.ty.is_aggregate() => self.emit_load_var(v)?,
                Arg::Ref(v) => match (&v.symbol.binding, v.modifiers.is_empty()) {
                    (Binding::Cell(slot), true) => self.emit(Instr::Load(Kind::Ref, *slot)),
                    _ => {
                        let cell = self.alloc_temp();
                        self.emit(Instr::PushInt(1));
                        self.emit(Instr::NewArray(param.ty.clone()));
                        self.emit(Instr::Store(Kind::Ref, cell));
                        self.emit(Instr::Load(Kind::Ref, cell));
                        self.emit(Instr::PushInt(0));
                        self.emit_load_var(v)?;
                        self.emit(Instr::ArrayStore(Kind::of(&param.ty)));
                        self.emit(Instr::Load(Kind::Ref, cell));
                        copy_back.push((cell, v));
                    }
                },
            }
        }
        self.emit(Instr::InvokeStatic(method_ref(&call.routine)));
        for (cell, v) in copy_back {
            self.emit_address_prefix(v)?;
            self.emit(Instr::Load(Kind::Ref, cell));
            self.emit(Instr::PushInt(0));
            self.emit(Instr::ArrayLoad(Kind::of(&v.ty)));
            self.emit_store(v)?;
        }
        self.next_local = saved_next;
        Ok(())
    }
}

fn global_field(name: &str, ty: &TypeInfo) -> FieldRef {
    FieldRef {
        owner: Owner::Program,
        name: name.to_string(),
        ty: ty.clone(),
    }
}

pub fn method_ref(r: &Routine) -> MethodRef {
    MethodRef {
        name: r.name.clone(),
        params: r
            .params
            .iter()
            .map(|p| {
                if p.by_ref && !p.ty.is_aggregate() {
                    ParamDesc::Cell(p.ty.clone())
                } else {
                    ParamDesc::Value(p.ty.clone())
                }
            })
            .collect(),
        ret: r.ret.clone(),
    }
}
