use std::collections::{BTreeMap, HashMap, HashSet};

use indexmap::IndexMap;
use log::debug;

use crate::ast::*;
use crate::hir;

#[derive(Debug, Clone, PartialEq)]
pub enum TypeInfo {
    Basic(BasicType),
    Enum(EnumInfo),
    Record(RecordInfo),
    Array(ArrayInfo),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumInfo {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordInfo {
    pub name: String,
    pub fields: IndexMap<String, TypeInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayInfo {
    pub low: i32,
    pub len: u32,
    pub elem_ty: Box<TypeInfo>,
}

/// Coarse classification used by the generator when picking boxing and
/// format flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Scalar,
    Enumeration,
    Array,
    Record,
}

impl TypeInfo {
    pub fn form(&self) -> Form {
        match self {
            TypeInfo::Basic(_) => Form::Scalar,
            TypeInfo::Enum(_) => Form::Enumeration,
            TypeInfo::Array(_) => Form::Array,
            TypeInfo::Record(_) => Form::Record,
        }
    }

    pub fn is(&self, b: BasicType) -> bool {
        matches!(self, TypeInfo::Basic(x) if *x == b)
    }

    pub fn is_string(&self) -> bool {
        self.is(BasicType::String)
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, TypeInfo::Record(_) | TypeInfo::Array(_))
    }

    pub fn is_numeric(&self) -> bool {
        self.is(BasicType::Integer) || self.is(BasicType::Real)
    }

    pub fn is_ordinal(&self) -> bool {
        matches!(
            self,
            TypeInfo::Basic(BasicType::Integer)
                | TypeInfo::Basic(BasicType::Char)
                | TypeInfo::Basic(BasicType::Boolean)
                | TypeInfo::Enum(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ParamSig {
    pub ty: TypeInfo,
    pub by_ref: bool,
}

#[derive(Debug, Clone)]
pub struct RoutineSig {
    pub method: String,
    pub params: Vec<ParamSig>,
    pub ret: Option<TypeInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct Env {
    pub consts: HashMap<String, ConstVal>,
    pub types: HashMap<String, TypeInfo>,
    /// Program-level variables, in declaration order.
    pub vars: IndexMap<String, TypeInfo>,
    // Key is scoped name, e.g. "program::Outer::Inner"
    pub routines: HashMap<String, RoutineSig>,
}

#[derive(Debug, Clone)]
pub enum ConstVal {
    I32(i32),
    Real(f32),
    Char(u32),
    Bool(bool),
    Str(String),
    Enum(i32, EnumInfo),
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tyref_to_info(env: &Env, tr: &TypeRef) -> Result<TypeInfo, String> {
    match tr {
        TypeRef::Basic(b) => Ok(TypeInfo::Basic(*b)),
        TypeRef::Named(n) => env
            .types
            .get(n)
            .cloned()
            .ok_or_else(|| format!("unknown type: {n}")),
    }
}

/// `program::A::B` becomes the method name `A$B`.
fn method_name(scoped: &str) -> String {
    scoped
        .strip_prefix("program::")
        .unwrap_or(scoped)
        .replace("::", "$")
}

pub fn build_env(prog: &Program) -> Result<Env, String> {
    let mut env = Env::new();
    collect_block_decls(&mut env, &prog.block, true, "program")?;
    Ok(env)
}

fn collect_block_decls(
    env: &mut Env,
    block: &Block,
    collect_vars: bool,
    scope: &str,
) -> Result<(), String> {
    for cd in &block.consts {
        if env.consts.contains_key(&cd.name) {
            return Err(format!("const redefined in {scope}: {}", cd.name));
        }
        let v = eval_const(env, &cd.expr)?;
        env.consts.insert(cd.name.clone(), v);
    }

    for td in &block.types {
        if env.types.contains_key(&td.name) {
            return Err(format!("type redefined in {scope}: {}", td.name));
        }
        let info = match &td.spec {
            TypeSpec::Basic(b) => TypeInfo::Basic(*b),
            TypeSpec::Alias(r) => tyref_to_info(env, r)?,
            TypeSpec::Enum(values) => {
                let info = EnumInfo {
                    name: td.name.clone(),
                };
                for (i, v) in values.iter().enumerate() {
                    if env.consts.contains_key(v) {
                        return Err(format!("const redefined in {scope}: {v}"));
                    }
                    env.consts.insert(v.clone(), ConstVal::Enum(i as i32, info.clone()));
                }
                TypeInfo::Enum(info)
            }
            TypeSpec::Record(fields) => {
                let mut ftab = IndexMap::new();
                for f in fields {
                    let fty = tyref_to_info(env, &f.ty)?;
                    if ftab.insert(f.name.clone(), fty).is_some() {
                        return Err(format!("duplicate field name in {scope}: {}", f.name));
                    }
                }
                TypeInfo::Record(RecordInfo {
                    name: td.name.clone(),
                    fields: ftab,
                })
            }
            TypeSpec::Array { dims, elem } => {
                let mut bounds = vec![];
                for d in dims {
                    bounds.push(index_bounds(env, d, scope)?);
                }
                let mut t = tyref_to_info(env, elem)?;
                for &(low, len) in bounds.iter().rev() {
                    t = TypeInfo::Array(ArrayInfo {
                        low,
                        len,
                        elem_ty: Box::new(t),
                    });
                }
                t
            }
        };
        env.types.insert(td.name.clone(), info);
    }

    if collect_vars {
        for vd in &block.vars {
            if env.vars.contains_key(&vd.name) {
                return Err(format!("var redefined in {scope}: {}", vd.name));
            }
            let t = tyref_to_info(env, &vd.ty)?;
            env.vars.insert(vd.name.clone(), t);
        }
    }

    let mut local_routine_names = HashSet::new();
    for r in &block.routines {
        let name = r.name();
        if !local_routine_names.insert(name.to_string()) {
            return Err(format!("routine redefined in {scope}: {name}"));
        }
        let scoped = format!("{scope}::{name}");
        let mut ptab = vec![];
        for p in r.params() {
            let ty = tyref_to_info(env, &p.ty)?;
            if ty.is_aggregate() && !p.by_ref {
                return Err(format!(
                    "parameter '{}' of {name} has an aggregate type and must be a var parameter",
                    p.name
                ));
            }
            ptab.push(ParamSig { ty, by_ref: p.by_ref });
        }
        let ret = match r {
            RoutineDecl::Procedure(_) => None,
            RoutineDecl::Function(f) => {
                let t = tyref_to_info(env, &f.ret_ty)?;
                if t.is_aggregate() {
                    return Err(format!("function {name} must return a scalar type"));
                }
                Some(t)
            }
        };
        env.routines.insert(
            scoped.clone(),
            RoutineSig {
                method: method_name(&scoped),
                params: ptab,
                ret,
            },
        );
    }

    for r in &block.routines {
        let child = format!("{scope}::{}", r.name());
        collect_block_decls(env, r.block(), false, &child)?;
    }

    Ok(())
}

fn index_bounds(env: &Env, d: &IndexRange, scope: &str) -> Result<(i32, u32), String> {
    let high = ordinal_of(&eval_const(env, &d.high)?)
        .ok_or_else(|| format!("array bound in {scope} must be an ordinal constant"))?;
    let (low, len) = match &d.low {
        None => (0, high),
        Some(lo) => {
            let low = ordinal_of(&eval_const(env, lo)?)
                .ok_or_else(|| format!("array bound in {scope} must be an ordinal constant"))?;
            let len = high
                .checked_sub(low)
                .and_then(|d| d.checked_add(1))
                .ok_or_else(|| format!("array length in {scope} is too large"))?;
            (low, len)
        }
    };
    if len <= 0 {
        return Err(format!("array length in {scope} must be positive"));
    }
    Ok((low, len as u32))
}

pub fn eval_const(env: &Env, e: &ConstExpr) -> Result<ConstVal, String> {
    match e {
        ConstExpr::Int(i) => Ok(ConstVal::I32(*i)),
        ConstExpr::Real(r) => Ok(ConstVal::Real(*r)),
        ConstExpr::Bool(b) => Ok(ConstVal::Bool(*b)),
        ConstExpr::Char(u) => Ok(ConstVal::Char(*u)),
        ConstExpr::Str(s) => Ok(ConstVal::Str(s.clone())),
        ConstExpr::Const(n) => env
            .consts
            .get(n)
            .cloned()
            .ok_or_else(|| format!("unknown const: {n}")),
        ConstExpr::Call(name, args) => {
            let u = name.to_ascii_lowercase();
            if args.len() != 1 {
                return Err(format!("{name} requires 1 argument in const expr"));
            }
            let v = eval_const(env, &args[0])?;
            match u.as_str() {
                "ord" => ordinal_of(&v)
                    .map(ConstVal::I32)
                    .ok_or_else(|| "Ord argument must be ordinal".to_string()),
                "chr" => match v {
                    ConstVal::I32(i) if (0..=0xFFFF).contains(&i) => Ok(ConstVal::Char(i as u32)),
                    _ => Err("Chr const argument must be an integer in 0..65535".into()),
                },
                _ => Err(format!("unsupported const function: {name}")),
            }
        }
        ConstExpr::Unary(UnOp::Neg, inner) => match eval_const(env, inner)? {
            ConstVal::I32(i) => i
                .checked_neg()
                .map(ConstVal::I32)
                .ok_or_else(|| "integer overflow or division by zero in const expr".to_string()),
            ConstVal::Real(r) => Ok(ConstVal::Real(-r)),
            _ => Err("NEG on non-numeric const".into()),
        },
        ConstExpr::Unary(UnOp::Not, inner) => match eval_const(env, inner)? {
            ConstVal::Bool(b) => Ok(ConstVal::Bool(!b)),
            _ => Err("NOT on non-boolean const".into()),
        },
        ConstExpr::Binary(a, op, b) => {
            let av = eval_const(env, a)?;
            let bv = eval_const(env, b)?;
            use BinOp::*;
            match (op, &av, &bv) {
                (Add | Sub | Mul | IntDiv | Mod, ConstVal::I32(x), ConstVal::I32(y)) => {
                    let (x, y) = (*x, *y);
                    let r = match op {
                        Add => x.checked_add(y),
                        Sub => x.checked_sub(y),
                        Mul => x.checked_mul(y),
                        IntDiv => x.checked_div(y),
                        _ => x.checked_rem(y),
                    };
                    r.map(ConstVal::I32)
                        .ok_or_else(|| "integer overflow or division by zero in const expr".to_string())
                }
                (Add | Sub | Mul | Div, _, _) => {
                    let x = real_of(&av).ok_or("arithmetic on non-numeric const")?;
                    let y = real_of(&bv).ok_or("arithmetic on non-numeric const")?;
                    Ok(ConstVal::Real(match op {
                        Add => x + y,
                        Sub => x - y,
                        Mul => x * y,
                        _ => x / y,
                    }))
                }
                (And, ConstVal::Bool(x), ConstVal::Bool(y)) => Ok(ConstVal::Bool(*x && *y)),
                (Or, ConstVal::Bool(x), ConstVal::Bool(y)) => Ok(ConstVal::Bool(*x || *y)),
                (Eq | Ne | Lt | Le | Gt | Ge, _, _) => {
                    let ai = ordinal_of(&av).ok_or("comparison of non-ordinal consts")?;
                    let bi = ordinal_of(&bv).ok_or("comparison of non-ordinal consts")?;
                    Ok(ConstVal::Bool(match op {
                        Eq => ai == bi,
                        Ne => ai != bi,
                        Lt => ai < bi,
                        Le => ai <= bi,
                        Gt => ai > bi,
                        _ => ai >= bi,
                    }))
                }
                _ => Err("unsupported operator in const expr".into()),
            }
        }
    }
}

fn ordinal_of(v: &ConstVal) -> Option<i32> {
    match v {
        ConstVal::I32(i) => Some(*i),
        ConstVal::Char(u) => i32::try_from(*u).ok(),
        ConstVal::Bool(b) => Some(i32::from(*b)),
        ConstVal::Enum(i, _) => Some(*i),
        ConstVal::Real(_) | ConstVal::Str(_) => None,
    }
}

fn real_of(v: &ConstVal) -> Option<f32> {
    match v {
        ConstVal::I32(i) => Some(*i as f32),
        ConstVal::Real(r) => Some(*r),
        _ => None,
    }
}

fn const_type(v: &ConstVal) -> TypeInfo {
    match v {
        ConstVal::I32(_) => TypeInfo::Basic(BasicType::Integer),
        ConstVal::Real(_) => TypeInfo::Basic(BasicType::Real),
        ConstVal::Char(_) => TypeInfo::Basic(BasicType::Char),
        ConstVal::Bool(_) => TypeInfo::Basic(BasicType::Boolean),
        ConstVal::Str(_) => TypeInfo::Basic(BasicType::String),
        ConstVal::Enum(_, info) => TypeInfo::Enum(info.clone()),
    }
}

fn const_expr(v: &ConstVal) -> hir::Expr {
    let kind = match v {
        ConstVal::Real(r) => hir::ExprKind::Real(*r),
        ConstVal::Str(s) => hir::ExprKind::Str(s.clone()),
        other => hir::ExprKind::Int(ordinal_of(other).unwrap_or_default()),
    };
    hir::Expr {
        kind,
        ty: const_type(v),
    }
}

pub fn expr_to_lvalue(e: &Expr) -> Option<LValue> {
    match e {
        Expr::Var(n) => Some(LValue {
            base: n.clone(),
            sels: vec![],
        }),
        Expr::Field(_, _) | Expr::Index(_, _) => {
            let mut sels = vec![];
            let mut cur = e;
            loop {
                match cur {
                    Expr::Field(inner, f) => {
                        sels.push(Selector::Field(f.clone()));
                        cur = inner;
                    }
                    Expr::Index(inner, ix) => {
                        sels.push(Selector::Index(vec![(**ix).clone()]));
                        cur = inner;
                    }
                    _ => break,
                }
            }
            if let Expr::Var(base) = cur {
                sels.reverse();
                Some(LValue {
                    base: base.clone(),
                    sels,
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Checks the program and produces the decorated tree for code generation.
pub fn lower_program(env: &Env, prog: &Program) -> Result<hir::Program, String> {
    let visible = visible_routines(&HashMap::new(), &prog.block, "program");
    let mut routines = vec![];
    lower_routines(env, &prog.block, "program", &visible, &mut routines)?;

    let main = Scope {
        env,
        scope: "program".to_string(),
        locals: HashMap::new(),
        routines: visible,
    };
    let body = main.lower_stmt(&prog.block.body)?;

    let mut records = BTreeMap::new();
    for t in env.types.values() {
        collect_records(t, &mut records);
    }

    Ok(hir::Program {
        name: prog.name.clone(),
        globals: env
            .vars
            .iter()
            .map(|(name, ty)| hir::Global {
                name: name.clone(),
                ty: ty.clone(),
            })
            .collect(),
        records: records.into_values().collect(),
        routines,
        body,
    })
}

fn collect_records(t: &TypeInfo, out: &mut BTreeMap<String, RecordInfo>) {
    match t {
        TypeInfo::Record(r) => {
            if !out.contains_key(&r.name) {
                out.insert(r.name.clone(), r.clone());
                for f in r.fields.values() {
                    collect_records(f, out);
                }
            }
        }
        TypeInfo::Array(a) => collect_records(&a.elem_ty, out),
        _ => {}
    }
}

fn visible_routines(
    outer: &HashMap<String, String>,
    block: &Block,
    scope: &str,
) -> HashMap<String, String> {
    let mut visible = outer.clone();
    for r in &block.routines {
        visible.insert(r.name().to_string(), format!("{scope}::{}", r.name()));
    }
    visible
}

fn lower_routines(
    env: &Env,
    block: &Block,
    scope: &str,
    visible: &HashMap<String, String>,
    out: &mut Vec<hir::RoutineBody>,
) -> Result<(), String> {
    for r in &block.routines {
        let name = r.name();
        let key = format!("{scope}::{name}");
        let sig = env
            .routines
            .get(&key)
            .ok_or_else(|| format!("internal: missing routine signature for {key}"))?;
        let inner_visible = visible_routines(visible, r.block(), &key);

        let mut symbols: HashMap<String, hir::Symbol> = HashMap::new();
        let declare = |symbols: &mut HashMap<String, hir::Symbol>,
                           n: &str,
                           binding: hir::Binding,
                           ty: &TypeInfo|
         -> Result<(), String> {
            if symbols.contains_key(n) || env.vars.contains_key(n) {
                return Err(format!(
                    "name conflict in {name}: '{n}' duplicates or shadows an existing name (shadowing is not allowed)"
                ));
            }
            symbols.insert(
                n.to_string(),
                hir::Symbol {
                    name: n.to_string(),
                    binding,
                    ty: ty.clone(),
                },
            );
            Ok(())
        };

        let mut slot: u16 = 0;
        let mut params = vec![];
        for (p, ps) in r.params().iter().zip(&sig.params) {
            let binding = if ps.by_ref && !ps.ty.is_aggregate() {
                hir::Binding::Cell(slot)
            } else {
                hir::Binding::Local(slot)
            };
            declare(&mut symbols, &p.name, binding, &ps.ty)?;
            params.push(hir::Local {
                name: p.name.clone(),
                slot,
                ty: ps.ty.clone(),
            });
            slot += 1;
        }
        let mut locals = vec![];
        for v in &r.block().vars {
            let ty = tyref_to_info(env, &v.ty)?;
            declare(&mut symbols, &v.name, hir::Binding::Local(slot), &ty)?;
            locals.push(hir::Local {
                name: v.name.clone(),
                slot,
                ty,
            });
            slot += 1;
        }
        let result = match &sig.ret {
            Some(ty) => {
                declare(&mut symbols, name, hir::Binding::Local(slot), ty)?;
                let l = hir::Local {
                    name: name.to_string(),
                    slot,
                    ty: ty.clone(),
                };
                slot += 1;
                Some(l)
            }
            None => None,
        };

        let scope_ctx = Scope {
            env,
            scope: key.clone(),
            locals: symbols,
            routines: inner_visible.clone(),
        };
        let body = scope_ctx.lower_stmt(&r.block().body)?;
        debug!("checked routine {} ({} slots)", sig.method, slot);
        out.push(hir::RoutineBody {
            routine: routine_of(sig),
            params,
            locals,
            result,
            next_slot: slot,
            body,
        });

        lower_routines(env, r.block(), &key, &inner_visible, out)?;
    }
    Ok(())
}

fn routine_of(sig: &RoutineSig) -> hir::Routine {
    hir::Routine {
        name: sig.method.clone(),
        params: sig
            .params
            .iter()
            .map(|p| hir::Param {
                ty: p.ty.clone(),
                by_ref: p.by_ref,
            })
            .collect(),
        ret: sig.ret.clone(),
    }
}

/// Names visible while checking one body: program globals plus the
/// routine's own parameters, locals and result variable.
struct Scope<'e> {
    env: &'e Env,
    scope: String,
    locals: HashMap<String, hir::Symbol>,
    routines: HashMap<String, String>,
}

impl Scope<'_> {
    fn lookup_var(&self, name: &str) -> Option<hir::Symbol> {
        if let Some(s) = self.locals.get(name) {
            return Some(s.clone());
        }
        self.env.vars.get(name).map(|ty| hir::Symbol {
            name: name.to_string(),
            binding: hir::Binding::Global(name.to_string()),
            ty: ty.clone(),
        })
    }

    fn routine(&self, name: &str) -> Result<&RoutineSig, String> {
        let key = self
            .routines
            .get(name)
            .ok_or_else(|| format!("unknown routine in scope: {name}"))?;
        self.env
            .routines
            .get(key)
            .ok_or_else(|| format!("internal: missing routine signature for {key}"))
    }

    fn lower_stmt(&self, s: &Stmt) -> Result<hir::Stmt, String> {
        match s {
            Stmt::Empty => Ok(hir::Stmt::Empty),
            Stmt::Compound(v) => Ok(hir::Stmt::Compound(
                v.iter().map(|st| self.lower_stmt(st)).collect::<Result<_, _>>()?,
            )),
            Stmt::Assign(lv, rhs) => {
                let target = self.lower_lvalue(lv)?;
                if target.ty.is_aggregate() {
                    return Err(format!(
                        "assignment to {} of type {} is not supported",
                        lv.base,
                        type_desc(&target.ty)
                    ));
                }
                let value = self.lower_expr_as(rhs, Some(&target.ty))?;
                if !assignable(&target.ty, &value.ty) {
                    return Err(format!(
                        "type mismatch in assignment to {}: expected {}, got {}",
                        lv.base,
                        type_desc(&target.ty),
                        type_desc(&value.ty)
                    ));
                }
                Ok(hir::Stmt::Assignment { target, value })
            }
            Stmt::Read(lvs) => Ok(hir::Stmt::Read(self.lower_read_targets(lvs)?)),
            Stmt::ReadLn(lvs) => Ok(hir::Stmt::Readln(self.lower_read_targets(lvs)?)),
            Stmt::For {
                var,
                init,
                limit,
                downto,
                body,
            } => {
                let sym = self
                    .lookup_var(var)
                    .ok_or_else(|| format!("unknown var: {var}"))?;
                if !sym.ty.is_ordinal() {
                    return Err("type error in for variable".into());
                }
                let init = self.lower_expr_as(init, Some(&sym.ty))?;
                expect_same(&sym.ty, &init.ty, "for init")?;
                let limit = self.lower_expr_as(limit, Some(&sym.ty))?;
                expect_same(&sym.ty, &limit.ty, "for limit")?;
                Ok(hir::Stmt::For {
                    var: hir::VarRef::plain(sym),
                    init,
                    limit,
                    downto: *downto,
                    body: Box::new(self.lower_stmt(body)?),
                })
            }
            Stmt::Case {
                expr,
                arms,
                else_stmt,
            } => {
                let selector = self.lower_expr(expr)?;
                if !selector.ty.is_ordinal() {
                    return Err("case selector must be an ordinal value".into());
                }
                let mut branches = vec![];
                for arm in arms {
                    let mut constants = vec![];
                    for ce in &arm.consts {
                        let cv = eval_const(self.env, ce)?;
                        if !same_type(&selector.ty, &const_type(&cv)) {
                            return Err("case arm constant type mismatch".into());
                        }
                        constants.push(ordinal_of(&cv).ok_or("case arm constant must be ordinal")?);
                    }
                    branches.push(hir::CaseBranch {
                        constants,
                        body: self.lower_stmt(&arm.body)?,
                    });
                }
                let otherwise = match else_stmt {
                    Some(es) => Some(Box::new(self.lower_stmt(es)?)),
                    None => None,
                };
                Ok(hir::Stmt::Case {
                    selector,
                    branches,
                    otherwise,
                })
            }
            Stmt::ProcCall(name, args) => {
                let sig = self.routine(name)?;
                let call = self.lower_call(name, sig, args)?;
                Ok(if sig.ret.is_some() {
                    hir::Stmt::FunctionCall(call)
                } else {
                    hir::Stmt::ProcedureCall(call)
                })
            }
            Stmt::If(cond, then_s, else_s) => {
                let cond = self.lower_expr(cond)?;
                expect_basic(&cond.ty, BasicType::Boolean, "if condition")?;
                let else_branch = match else_s {
                    Some(es) => Some(Box::new(self.lower_stmt(es)?)),
                    None => None,
                };
                Ok(hir::Stmt::If {
                    cond,
                    then_branch: Box::new(self.lower_stmt(then_s)?),
                    else_branch,
                })
            }
            Stmt::While(cond, body) => {
                let cond = self.lower_expr(cond)?;
                expect_basic(&cond.ty, BasicType::Boolean, "while condition")?;
                Ok(hir::Stmt::While {
                    cond,
                    body: Box::new(self.lower_stmt(body)?),
                })
            }
            Stmt::Repeat(stmts, cond) => {
                let body = stmts
                    .iter()
                    .map(|st| self.lower_stmt(st))
                    .collect::<Result<_, _>>()?;
                let cond = self.lower_expr(cond)?;
                expect_basic(&cond.ty, BasicType::Boolean, "repeat condition")?;
                Ok(hir::Stmt::Repeat { body, cond })
            }
            Stmt::Write(args) => Ok(hir::Stmt::Write(self.lower_write_args(args)?)),
            Stmt::WriteLn(args) => Ok(hir::Stmt::Writeln(self.lower_write_args(args)?)),
        }
    }

    fn lower_write_args(&self, args: &[WriteArg]) -> Result<Vec<hir::WriteArg>, String> {
        let mut out = vec![];
        for a in args {
            if let (Expr::Str(s), None) = (&a.expr, a.width) {
                out.push(hir::WriteArg::Literal(s.clone()));
                continue;
            }
            let expr = self.lower_expr(&a.expr)?;
            if !matches!(expr.ty.form(), Form::Scalar | Form::Enumeration) {
                return Err("Write/WriteLn supports only scalar values".into());
            }
            if let Some(w) = a.width {
                if w.width == 0 {
                    return Err("field width must be at least 1".into());
                }
                if w.decimals.is_some() && !expr.ty.is(BasicType::Real) {
                    return Err("decimal places are only allowed for real values".into());
                }
            }
            out.push(hir::WriteArg::Value { expr, width: a.width });
        }
        Ok(out)
    }

    fn lower_read_targets(&self, lvs: &[LValue]) -> Result<Vec<hir::VarRef>, String> {
        let mut out = vec![];
        for lv in lvs {
            let v = self.lower_lvalue(lv)?;
            if !matches!(v.ty, TypeInfo::Basic(_)) {
                return Err(format!(
                    "Read on {} of type {} is not supported",
                    lv.base,
                    type_desc(&v.ty)
                ));
            }
            out.push(v);
        }
        Ok(out)
    }

    fn lower_lvalue(&self, lv: &LValue) -> Result<hir::VarRef, String> {
        let symbol = self
            .lookup_var(&lv.base)
            .ok_or_else(|| format!("unknown var: {}", lv.base))?;
        let mut ty = symbol.ty.clone();
        let mut modifiers = vec![];
        for sel in &lv.sels {
            match sel {
                Selector::Field(f) => {
                    let next = match &ty {
                        TypeInfo::Record(r) => {
                            let fty = r
                                .fields
                                .get(f)
                                .cloned()
                                .ok_or_else(|| format!("unknown field: {f}"))?;
                            modifiers.push(hir::Modifier::Field {
                                record: r.name.clone(),
                                name: f.clone(),
                                ty: fty.clone(),
                            });
                            fty
                        }
                        _ => return Err("field on non-record lvalue".into()),
                    };
                    ty = next;
                }
                Selector::Index(idxs) => {
                    for ix in idxs {
                        let next = match &ty {
                            TypeInfo::Array(a) => {
                                let index = self.lower_expr(ix)?;
                                if !index.ty.is_ordinal() {
                                    return Err("type error in array index".into());
                                }
                                modifiers.push(hir::Modifier::Index {
                                    index,
                                    low: a.low,
                                    elem: (*a.elem_ty).clone(),
                                });
                                (*a.elem_ty).clone()
                            }
                            _ => return Err("index on non-array lvalue".into()),
                        };
                        ty = next;
                    }
                }
            }
        }
        Ok(hir::VarRef {
            symbol,
            modifiers,
            ty,
        })
    }

    fn lower_expr(&self, e: &Expr) -> Result<hir::Expr, String> {
        self.lower_expr_as(e, None)
    }

    /// A one-character literal is a `char` unless a `string` is expected.
    fn lower_expr_as(&self, e: &Expr, expected: Option<&TypeInfo>) -> Result<hir::Expr, String> {
        let typed = |kind, b| hir::Expr {
            kind,
            ty: TypeInfo::Basic(b),
        };
        match e {
            Expr::Int(i) => Ok(typed(hir::ExprKind::Int(*i), BasicType::Integer)),
            Expr::Real(r) => Ok(typed(hir::ExprKind::Real(*r), BasicType::Real)),
            Expr::Bool(b) => Ok(typed(hir::ExprKind::Int(i32::from(*b)), BasicType::Boolean)),
            Expr::Char(c) => Ok(typed(hir::ExprKind::Int(*c as i32), BasicType::Char)),
            Expr::Str(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !expected.is_some_and(TypeInfo::is_string) => {
                        Ok(typed(hir::ExprKind::Int(c as i32), BasicType::Char))
                    }
                    _ => Ok(typed(hir::ExprKind::Str(s.clone()), BasicType::String)),
                }
            }
            Expr::Var(n) => {
                if let Some(sym) = self.lookup_var(n) {
                    let v = hir::VarRef::plain(sym);
                    let ty = v.ty.clone();
                    return Ok(hir::Expr {
                        kind: hir::ExprKind::Var(v),
                        ty,
                    });
                }
                if let Some(c) = self.env.consts.get(n) {
                    return Ok(const_expr(c));
                }
                if self.routines.contains_key(n) {
                    return self.lower_function_call(n, &[]);
                }
                Err(format!("unknown identifier: {n}"))
            }
            Expr::Call(name, args) => {
                if let Some(e) = self.lower_builtin(name, args)? {
                    return Ok(e);
                }
                self.lower_function_call(name, args)
            }
            Expr::Field(_, _) | Expr::Index(_, _) => {
                let lv = expr_to_lvalue(e).ok_or("selector on a non-variable is not supported")?;
                let v = self.lower_lvalue(&lv)?;
                let ty = v.ty.clone();
                Ok(hir::Expr {
                    kind: hir::ExprKind::Var(v),
                    ty,
                })
            }
            Expr::Unary(op, inner) => {
                let x = self.lower_expr(inner)?;
                match op {
                    UnOp::Neg if !x.ty.is_numeric() => return Err("type error in NEG".into()),
                    UnOp::Not => expect_basic(&x.ty, BasicType::Boolean, "NOT")?,
                    _ => {}
                }
                let ty = x.ty.clone();
                Ok(hir::Expr {
                    kind: hir::ExprKind::Unary(*op, Box::new(x)),
                    ty,
                })
            }
            Expr::Binary(a, op, b) => self.lower_binary(a, *op, b),
        }
    }

    fn lower_binary(&self, a: &Expr, op: BinOp, b: &Expr) -> Result<hir::Expr, String> {
        let (ra, rb) = if op.is_relational() && matches!(a, Expr::Str(_)) {
            let rb = self.lower_expr(b)?;
            (self.lower_expr_as(a, Some(&rb.ty))?, rb)
        } else {
            let ra = self.lower_expr(a)?;
            let rb = self.lower_expr_as(b, Some(&ra.ty))?;
            (ra, rb)
        };
        let (ta, tb) = (&ra.ty, &rb.ty);
        let ty = match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul => {
                if !ta.is_numeric() || !tb.is_numeric() {
                    return Err("type error in arithmetic".into());
                }
                if ta.is(BasicType::Real) || tb.is(BasicType::Real) {
                    BasicType::Real
                } else {
                    BasicType::Integer
                }
            }
            BinOp::Div => {
                if !ta.is_numeric() || !tb.is_numeric() {
                    return Err("type error in division".into());
                }
                BasicType::Real
            }
            BinOp::IntDiv | BinOp::Mod => {
                expect_basic(ta, BasicType::Integer, "div/mod lhs")?;
                expect_basic(tb, BasicType::Integer, "div/mod rhs")?;
                BasicType::Integer
            }
            BinOp::And | BinOp::Or => {
                expect_basic(ta, BasicType::Boolean, "boolean lhs")?;
                expect_basic(tb, BasicType::Boolean, "boolean rhs")?;
                BasicType::Boolean
            }
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let numeric = ta.is_numeric() && tb.is_numeric();
                let comparable = same_type(ta, tb) && (ta.is_ordinal() || ta.is_string());
                if !numeric && !comparable {
                    return Err(format!(
                        "type mismatch in comparison: {} and {}",
                        type_desc(ta),
                        type_desc(tb)
                    ));
                }
                BasicType::Boolean
            }
        };
        Ok(hir::Expr {
            kind: hir::ExprKind::Binary(Box::new(ra), op, Box::new(rb)),
            ty: TypeInfo::Basic(ty),
        })
    }

    /// `ord` and `chr` only retype their argument.
    fn lower_builtin(&self, name: &str, args: &[Expr]) -> Result<Option<hir::Expr>, String> {
        let n = name.to_ascii_lowercase();
        let result_ty = match n.as_str() {
            "ord" => BasicType::Integer,
            "chr" => BasicType::Char,
            _ => return Ok(None),
        };
        if self.routines.contains_key(name) {
            return Ok(None);
        }
        if args.len() != 1 {
            return Err(format!("{name} requires 1 argument"));
        }
        let mut x = self.lower_expr(&args[0])?;
        match n.as_str() {
            "ord" if !x.ty.is_ordinal() => return Err("Ord argument must be ordinal".into()),
            "chr" => expect_basic(&x.ty, BasicType::Integer, "Chr argument")?,
            _ => {}
        }
        x.ty = TypeInfo::Basic(result_ty);
        Ok(Some(x))
    }

    fn lower_function_call(&self, name: &str, args: &[Expr]) -> Result<hir::Expr, String> {
        let sig = self.routine(name)?;
        let ret = sig
            .ret
            .clone()
            .ok_or_else(|| format!("procedure used as expression: {name}"))?;
        let call = self.lower_call(name, sig, args)?;
        Ok(hir::Expr {
            kind: hir::ExprKind::Call(call),
            ty: ret,
        })
    }

    fn lower_call(&self, name: &str, sig: &RoutineSig, args: &[Expr]) -> Result<hir::Call, String> {
        if sig.params.len() != args.len() {
            return Err(format!(
                "argument count mismatch for {name}: expected {}, got {}",
                sig.params.len(),
                args.len()
            ));
        }
        let mut out = vec![];
        for (idx, (p, a)) in sig.params.iter().zip(args).enumerate() {
            let arg_no = idx + 1;
            let (arg, at) = if p.by_ref {
                let lv = expr_to_lvalue(a).ok_or_else(|| {
                    format!("argument #{arg_no} in call to {name} must be lvalue for var parameter")
                })?;
                let v = self.lower_lvalue(&lv)?;
                let ty = v.ty.clone();
                if !same_type(&p.ty, &ty) {
                    return Err(arg_mismatch(name, arg_no, &p.ty, &ty));
                }
                (hir::Arg::Ref(v), ty)
            } else {
                let e = self.lower_expr_as(a, Some(&p.ty))?;
                let ty = e.ty.clone();
                if !assignable(&p.ty, &ty) {
                    return Err(arg_mismatch(name, arg_no, &p.ty, &ty));
                }
                (hir::Arg::Value(e), ty)
            };
            debug!("{}: arg #{arg_no} {}", self.scope, type_desc(&at));
            out.push(arg);
        }
        Ok(hir::Call {
            routine: routine_of(sig),
            args: out,
        })
    }
}

fn arg_mismatch(name: &str, arg_no: usize, want: &TypeInfo, got: &TypeInfo) -> String {
    format!(
        "argument #{arg_no} type mismatch in call to {name}: expected {}, got {}",
        type_desc(want),
        type_desc(got)
    )
}

/// Identical types, or an integer value widened into a real target.
fn assignable(target: &TypeInfo, value: &TypeInfo) -> bool {
    same_type(target, value) || (target.is(BasicType::Real) && value.is(BasicType::Integer))
}

fn expect_basic(t: &TypeInfo, want: BasicType, what: &str) -> Result<(), String> {
    if t.is(want) {
        Ok(())
    } else {
        Err(format!("type error in {what}"))
    }
}

fn expect_same(want: &TypeInfo, got: &TypeInfo, what: &str) -> Result<(), String> {
    if same_type(want, got) {
        Ok(())
    } else {
        Err(format!("type error in {what}"))
    }
}

pub fn same_type(a: &TypeInfo, b: &TypeInfo) -> bool {
    match (a, b) {
        (TypeInfo::Basic(x), TypeInfo::Basic(y)) => x == y,
        (TypeInfo::Enum(x), TypeInfo::Enum(y)) => x.name == y.name,
        (TypeInfo::Record(x), TypeInfo::Record(y)) => x.name == y.name,
        (TypeInfo::Array(ax), TypeInfo::Array(ay)) => {
            ax.low == ay.low && ax.len == ay.len && same_type(&ax.elem_ty, &ay.elem_ty)
        }
        _ => false,
    }
}

pub fn type_desc(t: &TypeInfo) -> String {
    match t {
        TypeInfo::Basic(BasicType::Integer) => "integer".into(),
        TypeInfo::Basic(BasicType::Real) => "real".into(),
        TypeInfo::Basic(BasicType::Boolean) => "boolean".into(),
        TypeInfo::Basic(BasicType::Char) => "char".into(),
        TypeInfo::Basic(BasicType::String) => "string".into(),
        TypeInfo::Enum(e) => e.name.clone(),
        TypeInfo::Record(r) => r.name.clone(),
        TypeInfo::Array(a) => format!(
            "array[{}..{}] of {}",
            a.low,
            a.low + a.len as i32 - 1,
            type_desc(&a.elem_ty)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i32) -> Box<ConstExpr> {
        Box::new(ConstExpr::Int(i))
    }

    #[test]
    fn const_arithmetic_widens_to_real() {
        let env = Env::new();
        let e = ConstExpr::Binary(int(7), BinOp::Div, int(2));
        assert!(matches!(eval_const(&env, &e), Ok(ConstVal::Real(r)) if r == 3.5));
        let e = ConstExpr::Binary(int(7), BinOp::Mod, int(0));
        assert!(eval_const(&env, &e).is_err());
    }

    #[test]
    fn single_bound_arrays_start_at_zero() {
        let env = Env::new();
        let d = IndexRange {
            low: None,
            high: ConstExpr::Int(4),
        };
        assert_eq!(index_bounds(&env, &d, "program"), Ok((0, 4)));
        let d = IndexRange {
            low: Some(ConstExpr::Char('a' as u32)),
            high: ConstExpr::Char('z' as u32),
        };
        assert_eq!(index_bounds(&env, &d, "program"), Ok((97, 26)));
        let d = IndexRange {
            low: Some(ConstExpr::Int(3)),
            high: ConstExpr::Int(2),
        };
        assert!(index_bounds(&env, &d, "program").is_err());
        let d = IndexRange {
            low: Some(ConstExpr::Int(i32::MIN)),
            high: ConstExpr::Int(i32::MAX),
        };
        assert_eq!(
            index_bounds(&env, &d, "program"),
            Err("array length in program is too large".to_string())
        );
        let d = IndexRange {
            low: Some(ConstExpr::Int(0)),
            high: ConstExpr::Int(i32::MAX - 1),
        };
        assert_eq!(index_bounds(&env, &d, "program"), Ok((0, i32::MAX as u32)));
    }

    #[test]
    fn negation_overflow_is_reported() {
        let env = Env::new();
        let e = ConstExpr::Unary(UnOp::Neg, int(i32::MIN));
        assert!(eval_const(&env, &e).is_err());
        let e = ConstExpr::Unary(UnOp::Neg, int(i32::MAX));
        assert!(matches!(eval_const(&env, &e), Ok(ConstVal::I32(i)) if i == -i32::MAX));
    }

    #[test]
    fn nested_routines_get_path_names() {
        assert_eq!(method_name("program::outer::inner"), "outer$inner");
        assert_eq!(method_name("program::show"), "show");
    }

    #[test]
    fn integers_widen_into_reals_only() {
        let int = TypeInfo::Basic(BasicType::Integer);
        let real = TypeInfo::Basic(BasicType::Real);
        assert!(assignable(&real, &int));
        assert!(!assignable(&int, &real));
    }
}
