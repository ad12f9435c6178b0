//! Class and method structure around the statement code: the program class
//! with its static fields, one method per routine, `main`, and one class per
//! record type.

use log::debug;

use super::{method_ref, Generator, Result};
use crate::ast::BasicType;
use crate::code::{ArithOp, Code, FieldRef, Instr, Kind, MethodRef, Owner, Primitive, Relation};
use crate::config::CodegenConfig;
use crate::hir::{Local, Program, RoutineBody};
use crate::sema::{RecordInfo, TypeInfo};

#[derive(Debug, Clone, PartialEq)]
pub enum ClassKind {
    Program,
    Record(String),
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeInfo,
}

#[derive(Debug, Clone)]
pub enum MethodKind {
    Constructor,
    Main,
    Routine(MethodRef),
}

#[derive(Debug, Clone)]
pub struct MethodUnit {
    pub kind: MethodKind,
    pub code: Code,
    pub max_locals: u16,
}

#[derive(Debug, Clone)]
pub struct ClassUnit {
    pub kind: ClassKind,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodUnit>,
}

pub fn generate(program: &Program, cfg: &CodegenConfig) -> Result<Vec<ClassUnit>> {
    let mut methods = vec![constructor(cfg, None)?];
    for r in &program.routines {
        methods.push(routine(cfg, r)?);
    }
    methods.push(main(cfg, program)?);

    let mut units = vec![ClassUnit {
        kind: ClassKind::Program,
        fields: program
            .globals
            .iter()
            .map(|g| FieldDecl {
                name: g.name.clone(),
                ty: g.ty.clone(),
            })
            .collect(),
        methods,
    }];
    for rec in &program.records {
        units.push(ClassUnit {
            kind: ClassKind::Record(rec.name.clone()),
            fields: rec
                .fields
                .iter()
                .map(|(name, ty)| FieldDecl {
                    name: name.clone(),
                    ty: ty.clone(),
                })
                .collect(),
            methods: vec![constructor(cfg, Some(rec))?],
        });
    }
    Ok(units)
}

/// `this` is slot 0; string and aggregate fields get fresh values.
fn constructor(cfg: &CodegenConfig, rec: Option<&RecordInfo>) -> Result<MethodUnit> {
    let mut g = Generator::new(cfg, 1);
    g.emit(Instr::Load(Kind::Ref, 0));
    g.emit(Instr::Invoke(Primitive::ObjectInit));
    if let Some(rec) = rec {
        for (name, ty) in &rec.fields {
            if Kind::of(ty) != Kind::Ref {
                continue;
            }
            g.emit(Instr::Load(Kind::Ref, 0));
            g.emit_default_value(ty)?;
            g.emit(Instr::PutField(FieldRef {
                owner: Owner::Record(rec.name.clone()),
                name: name.clone(),
                ty: ty.clone(),
            }));
        }
    }
    g.emit(Instr::Return(None));
    let (code, max_locals) = g.finish()?;
    Ok(MethodUnit {
        kind: MethodKind::Constructor,
        code,
        max_locals,
    })
}

/// Slot 0 holds the command line arguments.
fn main(cfg: &CodegenConfig, program: &Program) -> Result<MethodUnit> {
    let mut g = Generator::new(cfg, 1);
    g.emit(Instr::Invoke(Primitive::OpenInput));
    for global in &program.globals {
        g.emit_default_value(&global.ty)?;
        g.emit(Instr::PutStatic(FieldRef {
            owner: Owner::Program,
            name: global.name.clone(),
            ty: global.ty.clone(),
        }));
    }
    g.emit_stmt(&program.body)?;
    g.emit(Instr::Return(None));
    let (code, max_locals) = g.finish()?;
    debug!("main: {} instructions", code.instrs.len());
    Ok(MethodUnit {
        kind: MethodKind::Main,
        code,
        max_locals,
    })
}

fn routine(cfg: &CodegenConfig, r: &RoutineBody) -> Result<MethodUnit> {
    debug!(
        "{}: params {:?}, locals {:?}",
        r.routine.name,
        r.params.iter().map(|p| (&p.name, p.slot)).collect::<Vec<_>>(),
        r.locals.iter().map(|l| (&l.name, l.slot)).collect::<Vec<_>>()
    );
    let mut g = Generator::new(cfg, r.next_slot);
    for local in r.locals.iter().chain(&r.result) {
        g.emit_init_local(local)?;
    }
    g.emit_stmt(&r.body)?;
    match &r.result {
        Some(res) => {
            let kind = Kind::of(&res.ty);
            g.emit(Instr::Load(kind, res.slot));
            g.emit(Instr::Return(Some(kind)));
        }
        None => g.emit(Instr::Return(None)),
    }
    let (code, max_locals) = g.finish()?;
    debug!("{}: {} instructions", r.routine.name, code.instrs.len());
    Ok(MethodUnit {
        kind: MethodKind::Routine(method_ref(&r.routine)),
        code,
        max_locals,
    })
}

impl Generator<'_> {
    fn emit_init_local(&mut self, local: &Local) -> Result<()> {
        self.emit_default_value(&local.ty)?;
        self.emit(Instr::Store(Kind::of(&local.ty), local.slot));
        Ok(())
    }

    /// Pushes the initial value of a variable of type `ty`.
    fn emit_default_value(&mut self, ty: &TypeInfo) -> Result<()> {
        match ty {
            TypeInfo::Basic(BasicType::Real) => self.emit(Instr::PushFloat(0.0)),
            TypeInfo::Basic(BasicType::String) => self.emit(Instr::PushString(String::new())),
            TypeInfo::Basic(_) | TypeInfo::Enum(_) => self.emit(Instr::PushInt(0)),
            TypeInfo::Record(r) => self.emit(Instr::NewRecord(r.name.clone())),
            TypeInfo::Array(a) => {
                self.emit(Instr::PushInt(a.len as i32));
                self.emit(Instr::NewArray((*a.elem_ty).clone()));
                if Kind::of(&a.elem_ty) == Kind::Ref {
                    self.emit_fill_elements(&a.elem_ty, a.len)?;
                }
            }
        }
        Ok(())
    }

    /// The array is on top of the stack and stays there.
    fn emit_fill_elements(&mut self, elem: &TypeInfo, len: u32) -> Result<()> {
        let saved_next = self.next_local;
        let arr = self.alloc_temp();
        let i = self.alloc_temp();
        let top = self.sink.new_label();
        let exit = self.sink.new_label();
        self.emit(Instr::Store(Kind::Ref, arr));
        self.emit(Instr::PushInt(0));
        self.emit(Instr::Store(Kind::Int, i));
        self.emit(Instr::Label(top));
        self.emit(Instr::Load(Kind::Int, i));
        self.emit(Instr::PushInt(len as i32));
        self.emit(Instr::IfIcmp(Relation::Ge, exit));
        self.emit(Instr::Load(Kind::Ref, arr));
        self.emit(Instr::Load(Kind::Int, i));
        self.emit_default_value(elem)?;
        self.emit(Instr::ArrayStore(Kind::Ref));
        self.emit(Instr::Load(Kind::Int, i));
        self.emit(Instr::PushInt(1));
        self.emit(Instr::Arith(ArithOp::Add, Kind::Int));
        self.emit(Instr::Store(Kind::Int, i));
        self.emit(Instr::Goto(top));
        self.emit(Instr::Label(exit));
        self.emit(Instr::Load(Kind::Ref, arr));
        self.next_local = saved_next;
        Ok(())
    }
}
