use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "pascal.pest"]
struct PascalParser;

pub fn parse_program(src: &str) -> Result<Program, String> {
    let mut pairs = PascalParser::parse(Rule::program, src).map_err(|e| {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        format!("parse error at line {line}, column {col}: {e}")
    })?;
    let p = pairs.next().ok_or("no program")?;
    build_program(p)
}

fn is_keyword(r: Rule) -> bool {
    matches!(
        r,
        Rule::kw_and
            | Rule::kw_array
            | Rule::kw_begin
            | Rule::kw_case
            | Rule::kw_const
            | Rule::kw_div
            | Rule::kw_do
            | Rule::kw_downto
            | Rule::kw_else
            | Rule::kw_end
            | Rule::kw_for
            | Rule::kw_function
            | Rule::kw_if
            | Rule::kw_mod
            | Rule::kw_not
            | Rule::kw_of
            | Rule::kw_or
            | Rule::kw_otherwise
            | Rule::kw_procedure
            | Rule::kw_program
            | Rule::kw_record
            | Rule::kw_repeat
            | Rule::kw_then
            | Rule::kw_to
            | Rule::kw_type
            | Rule::kw_until
            | Rule::kw_var
            | Rule::kw_while
            | Rule::kw_read
            | Rule::kw_readln
            | Rule::kw_write
            | Rule::kw_writeln
            | Rule::EOI
    )
}

// Keyword tokens carry no information once the enclosing rule has matched.
fn inner<'i>(p: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    p.into_inner().filter(|x| !is_keyword(x.as_rule()))
}

fn take<'i>(it: &mut impl Iterator<Item = Pair<'i, Rule>>, what: &str) -> Result<Pair<'i, Rule>, String> {
    it.next().ok_or_else(|| format!("malformed syntax tree: missing {what}"))
}

fn build_program(p: Pair<Rule>) -> Result<Program, String> {
    let mut it = inner(p);
    let name = take(&mut it, "program name")?.as_str().to_string();
    let mut block = None;
    for x in it {
        if x.as_rule() == Rule::block {
            block = Some(build_block(x)?);
        }
    }
    Ok(Program {
        name,
        block: block.ok_or("missing block")?,
    })
}

fn build_block(p: Pair<Rule>) -> Result<Block, String> {
    let mut b = Block::default();
    for item in inner(p) {
        match item.as_rule() {
            Rule::const_section => b.consts.extend(build_consts(item)?),
            Rule::type_section => b.types.extend(build_types(item)?),
            Rule::var_section => b.vars.extend(build_vars(item)?),
            Rule::procedure_decl | Rule::function_decl => b.routines.push(build_routine_decl(item)?),
            Rule::compound_stmt => b.body = build_compound(item)?,
            _ => {}
        }
    }
    Ok(b)
}

fn build_routine_decl(p: Pair<Rule>) -> Result<RoutineDecl, String> {
    let rule = p.as_rule();
    let mut it = inner(p);
    let name = take(&mut it, "routine name")?.as_str().to_string();
    let mut params = vec![];
    let mut ret_ty: Option<TypeRef> = None;
    let mut block: Option<Block> = None;
    for x in it {
        match x.as_rule() {
            Rule::formal_params => params = build_formal_params(x)?,
            Rule::type_ref_or_basic => ret_ty = Some(build_typeref(x)?),
            Rule::block => block = Some(build_block(x)?),
            _ => {}
        }
    }
    let block = block.ok_or_else(|| format!("missing block for routine {name}"))?;
    match rule {
        Rule::procedure_decl => Ok(RoutineDecl::Procedure(ProcedureDecl { name, params, block })),
        Rule::function_decl => Ok(RoutineDecl::Function(FunctionDecl {
            ret_ty: ret_ty.ok_or_else(|| format!("missing return type for function {name}"))?,
            name,
            params,
            block,
        })),
        other => Err(format!("unexpected routine decl: {other:?}")),
    }
}

fn build_formal_params(p: Pair<Rule>) -> Result<Vec<ParamDecl>, String> {
    let mut params = vec![];
    for g in inner(p) {
        if g.as_rule() != Rule::formal_param_group {
            continue;
        }
        let mut names = vec![];
        let mut by_ref = false;
        let mut ty: Option<TypeRef> = None;
        for x in inner(g) {
            match x.as_rule() {
                Rule::by_ref => by_ref = true,
                Rule::ident_list => names = build_ident_list(x),
                Rule::type_ref_or_basic => ty = Some(build_typeref(x)?),
                _ => {}
            }
        }
        let ty = ty.ok_or("missing parameter type")?;
        for n in names {
            params.push(ParamDecl {
                name: n,
                ty: ty.clone(),
                by_ref,
            });
        }
    }
    Ok(params)
}

fn build_ident_list(p: Pair<Rule>) -> Vec<String> {
    inner(p).map(|x| x.as_str().to_string()).collect()
}

fn build_consts(p: Pair<Rule>) -> Result<Vec<ConstDecl>, String> {
    let mut v = vec![];
    for cd in inner(p) {
        if cd.as_rule() != Rule::const_decl {
            continue;
        }
        let mut it = inner(cd);
        let name = take(&mut it, "const name")?.as_str().to_string();
        let expr = build_const_expr(take(&mut it, "const value")?)?;
        v.push(ConstDecl { name, expr });
    }
    Ok(v)
}

fn build_types(p: Pair<Rule>) -> Result<Vec<TypeDecl>, String> {
    let mut v = vec![];
    for td in inner(p) {
        if td.as_rule() != Rule::type_decl {
            continue;
        }
        let mut it = inner(td);
        let name = take(&mut it, "type name")?.as_str().to_string();
        let spec = build_type_spec(take(&mut it, "type spec")?)?;
        v.push(TypeDecl { name, spec });
    }
    Ok(v)
}

fn build_vars(p: Pair<Rule>) -> Result<Vec<VarDecl>, String> {
    let mut v = vec![];
    for vd in inner(p) {
        if vd.as_rule() != Rule::var_decl {
            continue;
        }
        let mut it = inner(vd);
        let names = build_ident_list(take(&mut it, "variable names")?);
        let ty = build_typeref(take(&mut it, "variable type")?)?;
        for name in names {
            v.push(VarDecl { name, ty: ty.clone() });
        }
    }
    Ok(v)
}

fn build_type_spec(p: Pair<Rule>) -> Result<TypeSpec, String> {
    match p.as_rule() {
        Rule::type_spec => build_type_spec(take(&mut inner(p), "type spec")?),
        Rule::basic_type => Ok(TypeSpec::Basic(parse_basic(p.as_str())?)),
        Rule::type_ref => Ok(TypeSpec::Alias(TypeRef::Named(p.as_str().to_string()))),
        Rule::enum_type => Ok(TypeSpec::Enum(inner(p).map(|x| x.as_str().to_string()).collect())),
        Rule::record_type => {
            let mut fields = vec![];
            for fd in inner(p) {
                if fd.as_rule() != Rule::field_decl {
                    continue;
                }
                let mut it = inner(fd);
                let names = build_ident_list(take(&mut it, "field names")?);
                let ty = build_typeref(take(&mut it, "field type")?)?;
                for name in names {
                    fields.push(FieldDecl { name, ty: ty.clone() });
                }
            }
            Ok(TypeSpec::Record(fields))
        }
        Rule::array_type => {
            let mut dims = vec![];
            let mut elem: Option<TypeRef> = None;
            for x in inner(p) {
                match x.as_rule() {
                    Rule::type_ref_or_basic => elem = Some(build_typeref(x)?),
                    Rule::index_range => {
                        let mut jt = inner(x);
                        let first = build_const_expr(take(&mut jt, "array bound")?)?;
                        dims.push(match jt.next() {
                            Some(hi) => IndexRange {
                                low: Some(first),
                                high: build_const_expr(hi)?,
                            },
                            None => IndexRange { low: None, high: first },
                        });
                    }
                    _ => {}
                }
            }
            if dims.is_empty() || dims.len() > 3 {
                return Err("array dimensions must be 1..3".into());
            }
            Ok(TypeSpec::Array {
                dims,
                elem: elem.ok_or("array elem type missing")?,
            })
        }
        _ => Err(format!("unexpected type spec: {:?}", p.as_rule())),
    }
}

fn build_typeref(p: Pair<Rule>) -> Result<TypeRef, String> {
    match p.as_rule() {
        Rule::type_ref_or_basic => build_typeref(take(&mut inner(p), "type")?),
        Rule::basic_type => Ok(TypeRef::Basic(parse_basic(p.as_str())?)),
        Rule::type_ref => Ok(TypeRef::Named(p.as_str().to_string())),
        _ => Err(format!("unexpected typeref: {:?}", p.as_rule())),
    }
}

fn parse_basic(s: &str) -> Result<BasicType, String> {
    match s.to_ascii_lowercase().as_str() {
        "integer" => Ok(BasicType::Integer),
        "real" => Ok(BasicType::Real),
        "boolean" => Ok(BasicType::Boolean),
        "char" => Ok(BasicType::Char),
        "string" => Ok(BasicType::String),
        _ => Err(format!("unknown basic type: {s}")),
    }
}

fn build_compound(p: Pair<Rule>) -> Result<Stmt, String> {
    let mut stmts = vec![];
    for it in inner(p) {
        if it.as_rule() == Rule::stmt_list {
            stmts = build_stmt_list(it)?;
        }
    }
    Ok(Stmt::Compound(stmts))
}

fn build_stmt_list(p: Pair<Rule>) -> Result<Vec<Stmt>, String> {
    inner(p).map(build_stmt).collect()
}

fn build_stmt(p: Pair<Rule>) -> Result<Stmt, String> {
    match p.as_rule() {
        Rule::compound_stmt => build_compound(p),
        Rule::assign_stmt => {
            let mut it = inner(p);
            let lv = build_lvalue(take(&mut it, "assignment target")?)?;
            let rhs = build_expr(take(&mut it, "assignment value")?)?;
            Ok(Stmt::Assign(lv, rhs))
        }
        Rule::read_stmt => {
            let lvs = build_lvalue_list(take(&mut inner(p), "read targets")?)?;
            Ok(Stmt::Read(lvs))
        }
        Rule::readln_stmt => {
            let lvs = match inner(p).next() {
                Some(list) => build_lvalue_list(list)?,
                None => vec![],
            };
            Ok(Stmt::ReadLn(lvs))
        }
        Rule::for_stmt => {
            let mut it = inner(p);
            let var = take(&mut it, "for variable")?.as_str().to_string();
            let init = build_expr(take(&mut it, "for initial value")?)?;
            let dir = take(&mut it, "for direction")?.as_str().to_ascii_lowercase();
            let limit = build_expr(take(&mut it, "for limit")?)?;
            let body = build_stmt(take(&mut it, "for body")?)?;
            Ok(Stmt::For {
                var,
                init,
                limit,
                downto: dir == "downto",
                body: Box::new(body),
            })
        }
        Rule::case_stmt => {
            let mut it = inner(p);
            let expr = build_expr(take(&mut it, "case selector")?)?;
            let mut arms = vec![];
            let mut else_stmt = None;
            for x in it {
                match x.as_rule() {
                    Rule::case_arm => {
                        let mut jt = inner(x);
                        let consts = inner(take(&mut jt, "case constants")?)
                            .map(build_const_expr)
                            .collect::<Result<Vec<_>, _>>()?;
                        let body = build_stmt(take(&mut jt, "case branch")?)?;
                        arms.push(CaseArm { consts, body });
                    }
                    Rule::case_default => {
                        let list = take(&mut inner(x), "case default")?;
                        else_stmt = Some(Box::new(Stmt::Compound(build_stmt_list(list)?)));
                    }
                    _ => {}
                }
            }
            Ok(Stmt::Case {
                expr,
                arms,
                else_stmt,
            })
        }
        Rule::proc_call_stmt => {
            let mut it = inner(p);
            let name = take(&mut it, "routine name")?.as_str().to_string();
            let args = match it.next() {
                Some(list) => build_expr_list(list)?,
                None => vec![],
            };
            Ok(Stmt::ProcCall(name, args))
        }
        Rule::if_stmt => {
            let mut it = inner(p);
            let cond = build_expr(take(&mut it, "if condition")?)?;
            let then_s = build_stmt(take(&mut it, "then branch")?)?;
            let else_s = match it.next() {
                Some(e) => Some(Box::new(build_stmt(e)?)),
                None => None,
            };
            Ok(Stmt::If(cond, Box::new(then_s), else_s))
        }
        Rule::while_stmt => {
            let mut it = inner(p);
            let cond = build_expr(take(&mut it, "while condition")?)?;
            let body = build_stmt(take(&mut it, "while body")?)?;
            Ok(Stmt::While(cond, Box::new(body)))
        }
        Rule::repeat_stmt => {
            let mut stmts = vec![];
            let mut cond: Option<Expr> = None;
            for x in inner(p) {
                if x.as_rule() == Rule::stmt_list {
                    stmts = build_stmt_list(x)?;
                } else {
                    cond = Some(build_expr(x)?);
                }
            }
            Ok(Stmt::Repeat(stmts, cond.ok_or("repeat missing cond")?))
        }
        Rule::write_stmt | Rule::writeln_stmt => {
            let line = p.as_rule() == Rule::writeln_stmt;
            let args = match inner(p).next() {
                Some(list) => inner(list).map(build_write_arg).collect::<Result<Vec<_>, _>>()?,
                None => vec![],
            };
            Ok(if line { Stmt::WriteLn(args) } else { Stmt::Write(args) })
        }
        _ => Err(format!("unexpected stmt: {:?}", p.as_rule())),
    }
}

fn build_write_arg(p: Pair<Rule>) -> Result<WriteArg, String> {
    let mut it = inner(p);
    let expr = build_expr(take(&mut it, "write argument")?)?;
    let width = match it.next() {
        Some(fw) => {
            let mut left = false;
            let mut nums = vec![];
            for x in inner(fw) {
                match x.as_rule() {
                    Rule::width_sign => left = x.as_str() == "-",
                    Rule::int_lit => nums.push(x.as_str().parse::<u32>().map_err(|e| e.to_string())?),
                    _ => {}
                }
            }
            Some(FieldWidth {
                left,
                width: nums.first().copied().ok_or("missing field width")?,
                decimals: nums.get(1).copied(),
            })
        }
        None => None,
    };
    Ok(WriteArg { expr, width })
}

fn build_lvalue_list(p: Pair<Rule>) -> Result<Vec<LValue>, String> {
    inner(p).map(build_lvalue).collect()
}

fn build_expr_list(p: Pair<Rule>) -> Result<Vec<Expr>, String> {
    inner(p).map(build_expr).collect()
}

fn build_lvalue(p: Pair<Rule>) -> Result<LValue, String> {
    let mut it = inner(p);
    let base = take(&mut it, "variable name")?.as_str().to_string();
    let mut sels = vec![];
    for s in it {
        match s.as_rule() {
            Rule::field_access => {
                let name = take(&mut inner(s), "field name")?.as_str().to_string();
                sels.push(Selector::Field(name));
            }
            Rule::index_access => {
                let idxs = inner(s).map(build_expr).collect::<Result<Vec<_>, _>>()?;
                if idxs.is_empty() || idxs.len() > 3 {
                    return Err("index dimensions must be 1..3".into());
                }
                sels.push(Selector::Index(idxs));
            }
            _ => return Err(format!("unexpected selector: {:?}", s.as_rule())),
        }
    }
    Ok(LValue { base, sels })
}

fn build_expr(p: Pair<Rule>) -> Result<Expr, String> {
    match p.as_rule() {
        Rule::expr | Rule::primary => build_expr(take(&mut inner(p), "expression")?),
        Rule::rel => {
            let mut it = inner(p);
            let left = build_expr(take(&mut it, "operand")?)?;
            if let Some(op) = it.next() {
                let right = build_expr(take(&mut it, "operand")?)?;
                Ok(Expr::Binary(Box::new(left), parse_relop(op.as_str())?, Box::new(right)))
            } else {
                Ok(left)
            }
        }
        Rule::add | Rule::mul => {
            let mut it = inner(p);
            let mut e = build_expr(take(&mut it, "operand")?)?;
            while let Some(op) = it.next() {
                let rhs = build_expr(take(&mut it, "operand")?)?;
                e = Expr::Binary(Box::new(e), parse_arith_op(op.as_str())?, Box::new(rhs));
            }
            Ok(e)
        }
        Rule::unary => {
            let mut it = inner(p);
            let first = take(&mut it, "operand")?;
            if first.as_rule() == Rule::unary_op {
                let inner_expr = build_expr(take(&mut it, "operand")?)?;
                match first.as_str().to_ascii_lowercase().as_str() {
                    "-" => Ok(Expr::Unary(UnOp::Neg, Box::new(inner_expr))),
                    "+" => Ok(inner_expr),
                    "not" => Ok(Expr::Unary(UnOp::Not, Box::new(inner_expr))),
                    other => Err(format!("unknown unary op: {other}")),
                }
            } else {
                build_expr(first)
            }
        }
        Rule::bool_lit => Ok(Expr::Bool(p.as_str().eq_ignore_ascii_case("true"))),
        Rule::real_lit => Ok(Expr::Real(p.as_str().parse::<f32>().map_err(|e| e.to_string())?)),
        Rule::number => Ok(Expr::Int(parse_int_literal(p.as_str())?)),
        Rule::string_lit => Ok(Expr::Str(decode_pascal_string(p.as_str())?)),
        Rule::char_code => Ok(Expr::Char(parse_char_code(p)?)),
        Rule::func_call => {
            let mut it = inner(p);
            let name = take(&mut it, "function name")?.as_str().to_string();
            let args = match it.next() {
                Some(list) => build_expr_list(list)?,
                None => vec![],
            };
            Ok(Expr::Call(name, args))
        }
        Rule::ident => Ok(Expr::Var(p.as_str().to_string())),
        Rule::lvalue => {
            // rvalue use of a selector chain
            let lv = build_lvalue(p)?;
            let mut e = Expr::Var(lv.base);
            for sel in lv.sels {
                e = match sel {
                    Selector::Field(f) => Expr::Field(Box::new(e), f),
                    Selector::Index(ixs) => ixs
                        .into_iter()
                        .fold(e, |acc, ix| Expr::Index(Box::new(acc), Box::new(ix))),
                };
            }
            Ok(e)
        }
        _ => Err(format!("unexpected expr node: {:?}", p.as_rule())),
    }
}

fn parse_relop(s: &str) -> Result<BinOp, String> {
    match s {
        "=" => Ok(BinOp::Eq),
        "<>" => Ok(BinOp::Ne),
        "<" => Ok(BinOp::Lt),
        "<=" => Ok(BinOp::Le),
        ">" => Ok(BinOp::Gt),
        ">=" => Ok(BinOp::Ge),
        _ => Err(format!("unknown relop: {s}")),
    }
}

fn parse_arith_op(s: &str) -> Result<BinOp, String> {
    match s.to_ascii_lowercase().as_str() {
        "+" => Ok(BinOp::Add),
        "-" => Ok(BinOp::Sub),
        "or" => Ok(BinOp::Or),
        "*" => Ok(BinOp::Mul),
        "/" => Ok(BinOp::Div),
        "div" => Ok(BinOp::IntDiv),
        "mod" => Ok(BinOp::Mod),
        "and" => Ok(BinOp::And),
        other => Err(format!("unknown operator: {other}")),
    }
}

fn build_const_expr(p: Pair<Rule>) -> Result<ConstExpr, String> {
    match p.as_rule() {
        Rule::const_expr | Rule::const_primary => build_const_expr(take(&mut inner(p), "constant")?),
        Rule::const_add | Rule::const_mul => {
            let mut it = inner(p);
            let mut e = build_const_expr(take(&mut it, "constant")?)?;
            while let Some(op) = it.next() {
                let rhs = build_const_expr(take(&mut it, "constant")?)?;
                e = ConstExpr::Binary(Box::new(e), parse_arith_op(op.as_str())?, Box::new(rhs));
            }
            Ok(e)
        }
        Rule::const_unary => {
            let mut it = inner(p);
            let first = take(&mut it, "constant")?;
            if first.as_rule() == Rule::unary_op {
                let inner_expr = build_const_expr(take(&mut it, "constant")?)?;
                match first.as_str().to_ascii_lowercase().as_str() {
                    "-" => Ok(ConstExpr::Unary(UnOp::Neg, Box::new(inner_expr))),
                    "+" => Ok(inner_expr),
                    "not" => Ok(ConstExpr::Unary(UnOp::Not, Box::new(inner_expr))),
                    other => Err(format!("unknown const unary op: {other}")),
                }
            } else {
                build_const_expr(first)
            }
        }
        Rule::bool_lit => Ok(ConstExpr::Bool(p.as_str().eq_ignore_ascii_case("true"))),
        Rule::real_lit => Ok(ConstExpr::Real(p.as_str().parse::<f32>().map_err(|e| e.to_string())?)),
        Rule::number => Ok(ConstExpr::Int(parse_int_literal(p.as_str())?)),
        Rule::string_lit => {
            let s = decode_pascal_string(p.as_str())?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(ConstExpr::Char(c as u32)),
                _ => Ok(ConstExpr::Str(s)),
            }
        }
        Rule::char_code => Ok(ConstExpr::Char(parse_char_code(p)?)),
        Rule::const_func_call => {
            let mut it = inner(p);
            let name = take(&mut it, "function name")?.as_str().to_string();
            let args = match it.next() {
                Some(list) => inner(list).map(build_const_expr).collect::<Result<Vec<_>, _>>()?,
                None => vec![],
            };
            Ok(ConstExpr::Call(name, args))
        }
        Rule::ident => Ok(ConstExpr::Const(p.as_str().to_string())),
        _ => Err(format!("unexpected const expr node: {:?}", p.as_rule())),
    }
}

fn parse_char_code(p: Pair<Rule>) -> Result<u32, String> {
    let digits = take(&mut inner(p), "char code")?;
    let n = digits.as_str().parse::<u32>().map_err(|e| e.to_string())?;
    if n > 0xFFFF {
        return Err("char code > 0xFFFF".into());
    }
    Ok(n)
}

fn decode_pascal_string(src: &str) -> Result<String, String> {
    if !src.starts_with('\'') || !src.ends_with('\'') || src.len() < 2 {
        return Err("invalid string literal".into());
    }
    let inner = &src[1..src.len() - 1];
    let mut out = String::new();
    let mut it = inner.chars().peekable();
    while let Some(ch) = it.next() {
        if ch == '\'' {
            if it.peek() == Some(&'\'') {
                it.next();
                out.push('\'');
            } else {
                return Err("invalid quote in string literal".into());
            }
        } else {
            out.push(ch);
        }
    }
    Ok(out)
}

fn parse_int_literal(s: &str) -> Result<i32, String> {
    if let Some(rest) = s.strip_prefix('$') {
        let u = i64::from_str_radix(rest, 16).map_err(|e| e.to_string())?;
        return i32::try_from(u).map_err(|_| "hex literal out of i32 range".to_string());
    }
    s.parse::<i32>().map_err(|e| e.to_string())
}
