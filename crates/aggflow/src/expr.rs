//! Expression trees and their compilation from pipeline documents.
//!
//! Expressions use the `$`-prefixed document syntax of aggregation
//! pipelines:
//! - `"$field.path"` field reference
//! - `"$$ROOT"`, `"$$CURRENT"`, `"$$name.path"` variables
//! - `{"$op": [args...]}` or `{"$op": arg}` operators
//! - `{"$switch": {...}}`, `{"$cond": ...}`, `{"$let": {...}}`, `{"$literal": v}`
//! - any other object or array is a constructor of its evaluated members
//!
//! Every node records the document path it was compiled from so runtime
//! errors can point at it.

use serde_json::Value as JsonValue;

use crate::error::ErrorCode;
use crate::path::FieldPath;
use crate::validator::{ValidationCtx, is_valid_variable_name};
use crate::value::{Record, Value};

pub const ROOT_VARIABLE: &str = "ROOT";
pub const CURRENT_VARIABLE: &str = "CURRENT";

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Value),
    Field(FieldPath),
    Variable {
        name: String,
        path: Option<FieldPath>,
    },
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Op {
        op: Operator,
        args: Vec<Expr>,
    },
    Switch {
        branches: Vec<SwitchBranch>,
        default: Box<Expr>,
    },
    Let {
        bindings: Vec<(String, Expr)>,
        body: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchBranch {
    pub case: Expr,
    pub then: Expr,
}

impl Expr {
    pub fn new(kind: ExprKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn literal(value: Value, path: impl Into<String>) -> Self {
        Self::new(ExprKind::Literal(value), path)
    }

    pub fn field(path: FieldPath, expr_path: impl Into<String>) -> Self {
        Self::new(ExprKind::Field(path), expr_path)
    }

    pub fn op(op: Operator, args: Vec<Expr>, path: impl Into<String>) -> Self {
        Self::new(ExprKind::Op { op, args }, path)
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Literal(value) => Some(value),
            _ => None,
        }
    }
}

// =============================================================================
// Operators
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Round,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    And,
    Or,
    Not,
    ArrayElemAt,
    Substr,
    ToInt,
    IfNull,
    Concat,
    ToString,
    Size,
}

impl Operator {
    /// Resolves an operator name without its `$` prefix.
    pub fn from_name(name: &str) -> Option<Operator> {
        let op = match name {
            "add" => Operator::Add,
            "subtract" => Operator::Subtract,
            "multiply" => Operator::Multiply,
            "divide" => Operator::Divide,
            "round" => Operator::Round,
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "in" => Operator::In,
            "and" => Operator::And,
            "or" => Operator::Or,
            "not" => Operator::Not,
            "arrayElemAt" => Operator::ArrayElemAt,
            "substr" | "substrCP" => Operator::Substr,
            "toInt" => Operator::ToInt,
            "ifNull" => Operator::IfNull,
            "concat" => Operator::Concat,
            "toString" => Operator::ToString,
            "size" => Operator::Size,
            _ => return None,
        };
        Some(op)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Add => "$add",
            Operator::Subtract => "$subtract",
            Operator::Multiply => "$multiply",
            Operator::Divide => "$divide",
            Operator::Round => "$round",
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
            Operator::And => "$and",
            Operator::Or => "$or",
            Operator::Not => "$not",
            Operator::ArrayElemAt => "$arrayElemAt",
            Operator::Substr => "$substr",
            Operator::ToInt => "$toInt",
            Operator::IfNull => "$ifNull",
            Operator::Concat => "$concat",
            Operator::ToString => "$toString",
            Operator::Size => "$size",
        }
    }

    /// Accepted argument count as `(min, max)`; `None` means unbounded.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Operator::Add | Operator::Multiply => (1, None),
            Operator::And | Operator::Or | Operator::Concat => (0, None),
            Operator::IfNull => (2, None),
            Operator::Round => (1, Some(2)),
            Operator::Substr => (3, Some(3)),
            Operator::Not | Operator::ToInt | Operator::ToString | Operator::Size => (1, Some(1)),
            Operator::Subtract
            | Operator::Divide
            | Operator::Eq
            | Operator::Ne
            | Operator::Gt
            | Operator::Gte
            | Operator::Lt
            | Operator::Lte
            | Operator::In
            | Operator::ArrayElemAt => (2, Some(2)),
        }
    }
}

// =============================================================================
// Compilation
// =============================================================================

/// Lexically visible `$let` variable names.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    names: Vec<String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_names<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut scope = self.clone();
        scope.names.extend(names.into_iter().map(str::to_string));
        scope
    }

    fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// Compiles an expression document. Problems are reported to `ctx`; the
/// returned tree is only meaningful when `ctx` has no errors.
pub fn compile_expr(value: &JsonValue, path: &str, scope: &Scope, ctx: &mut ValidationCtx) -> Expr {
    match value {
        JsonValue::String(s) => compile_string(s, path, scope, ctx),
        JsonValue::Array(items) => {
            let items: Vec<Expr> = items
                .iter()
                .enumerate()
                .map(|(i, item)| compile_expr(item, &format!("{}[{}]", path, i), scope, ctx))
                .collect();
            fold_array(items, path)
        }
        JsonValue::Object(obj) => {
            if obj.len() == 1 {
                if let Some((name, arg)) = obj.iter().next() {
                    if let Some(op_name) = name.strip_prefix('$') {
                        return compile_operator(op_name, arg, &format!("{}.{}", path, name), scope, ctx);
                    }
                }
            }
            if obj.keys().any(|key| key.starts_with('$')) {
                ctx.push(
                    ErrorCode::InvalidArgs,
                    "an operator object must contain exactly one $-prefixed key",
                    path,
                );
                return Expr::literal(Value::Null, path);
            }
            let fields: Vec<(String, Expr)> = obj
                .iter()
                .map(|(name, value)| {
                    let field_path = format!("{}.{}", path, name);
                    (name.clone(), compile_expr(value, &field_path, scope, ctx))
                })
                .collect();
            fold_object(fields, path)
        }
        scalar => Expr::literal(Value::from(scalar), path),
    }
}

fn compile_string(s: &str, path: &str, scope: &Scope, ctx: &mut ValidationCtx) -> Expr {
    if let Some(rest) = s.strip_prefix("$$") {
        let (name, sub_path) = match rest.split_once('.') {
            Some((name, sub_path)) => (name, Some(sub_path)),
            None => (rest, None),
        };
        let is_system = name == ROOT_VARIABLE || name == CURRENT_VARIABLE;
        if !is_system && !scope.contains(name) {
            ctx.push(
                ErrorCode::UndefinedVariable,
                format!("undefined variable: $${}", name),
                path,
            );
        }
        let field_path = match sub_path.map(FieldPath::parse).transpose() {
            Ok(field_path) => field_path,
            Err(err) => {
                ctx.push(ErrorCode::InvalidPath, format!("{}: {}", s, err), path);
                None
            }
        };
        return Expr::new(
            ExprKind::Variable {
                name: name.to_string(),
                path: field_path,
            },
            path,
        );
    }
    if let Some(field) = s.strip_prefix('$') {
        return match FieldPath::parse(field) {
            Ok(field_path) => Expr::field(field_path, path),
            Err(err) => {
                ctx.push(ErrorCode::InvalidPath, format!("{}: {}", s, err), path);
                Expr::literal(Value::Null, path)
            }
        };
    }
    Expr::literal(Value::from(s), path)
}

fn compile_operator(
    name: &str,
    arg: &JsonValue,
    path: &str,
    scope: &Scope,
    ctx: &mut ValidationCtx,
) -> Expr {
    match name {
        "literal" => return Expr::literal(Value::from(arg), path),
        "switch" => return compile_switch(arg, path, scope, ctx),
        "cond" => return compile_cond(arg, path, scope, ctx),
        "let" => return compile_let(arg, path, scope, ctx),
        _ => {}
    }

    let Some(op) = Operator::from_name(name) else {
        ctx.push(
            ErrorCode::UnknownOperator,
            format!("unknown operator: ${}", name),
            path,
        );
        return Expr::literal(Value::Null, path);
    };

    let args: Vec<Expr> = match arg {
        JsonValue::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| compile_expr(item, &format!("{}[{}]", path, i), scope, ctx))
            .collect(),
        single => vec![compile_expr(single, &format!("{}[0]", path), scope, ctx)],
    };

    let (min, max) = op.arity();
    let too_many = max.is_some_and(|max| args.len() > max);
    if args.len() < min || too_many {
        let expected = match max {
            Some(max) if max == min => format!("{}", min),
            Some(max) => format!("{} to {}", min, max),
            None => format!("at least {}", min),
        };
        ctx.push(
            ErrorCode::InvalidArgs,
            format!("{} expects {} arguments, got {}", op.name(), expected, args.len()),
            path,
        );
    }

    Expr::op(op, args, path)
}

fn compile_switch(arg: &JsonValue, path: &str, scope: &Scope, ctx: &mut ValidationCtx) -> Expr {
    let Some(obj) = arg.as_object() else {
        ctx.push(ErrorCode::InvalidArgs, "$switch requires an object", path);
        return Expr::literal(Value::Null, path);
    };
    for key in obj.keys() {
        if key != "branches" && key != "default" {
            ctx.push(
                ErrorCode::InvalidArgs,
                format!("$switch found an unknown argument: {}", key),
                path,
            );
        }
    }

    let mut branches = Vec::new();
    match obj.get("branches").and_then(JsonValue::as_array) {
        Some(items) if !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                let branch_path = format!("{}.branches[{}]", path, i);
                let (Some(case), Some(then)) = (item.get("case"), item.get("then")) else {
                    ctx.push(
                        ErrorCode::InvalidArgs,
                        "$switch branch requires 'case' and 'then'",
                        &branch_path,
                    );
                    continue;
                };
                if item.as_object().is_some_and(|b| b.len() != 2) {
                    ctx.push(
                        ErrorCode::InvalidArgs,
                        "$switch branch accepts only 'case' and 'then'",
                        &branch_path,
                    );
                }
                branches.push(SwitchBranch {
                    case: compile_expr(case, &format!("{}.case", branch_path), scope, ctx),
                    then: compile_expr(then, &format!("{}.then", branch_path), scope, ctx),
                });
            }
        }
        _ => ctx.push(
            ErrorCode::InvalidArgs,
            "$switch requires a non-empty 'branches' array",
            path,
        ),
    }

    let default = match obj.get("default") {
        Some(default) => compile_expr(default, &format!("{}.default", path), scope, ctx),
        None => {
            ctx.push(ErrorCode::InvalidArgs, "$switch requires a 'default'", path);
            Expr::literal(Value::Null, path)
        }
    };

    Expr::new(
        ExprKind::Switch {
            branches,
            default: Box::new(default),
        },
        path,
    )
}

fn compile_cond(arg: &JsonValue, path: &str, scope: &Scope, ctx: &mut ValidationCtx) -> Expr {
    let parts = match arg {
        JsonValue::Array(items) if items.len() == 3 => Some((
            (&items[0], format!("{}[0]", path)),
            (&items[1], format!("{}[1]", path)),
            (&items[2], format!("{}[2]", path)),
        )),
        JsonValue::Object(obj) if obj.len() == 3 => match (obj.get("if"), obj.get("then"), obj.get("else")) {
            (Some(cond), Some(then), Some(otherwise)) => Some((
                (cond, format!("{}.if", path)),
                (then, format!("{}.then", path)),
                (otherwise, format!("{}.else", path)),
            )),
            _ => None,
        },
        _ => None,
    };
    let Some(((cond, cond_path), (then, then_path), (otherwise, else_path))) = parts else {
        ctx.push(
            ErrorCode::InvalidArgs,
            "$cond requires [if, then, else] or {if, then, else}",
            path,
        );
        return Expr::literal(Value::Null, path);
    };

    let branch = SwitchBranch {
        case: compile_expr(cond, &cond_path, scope, ctx),
        then: compile_expr(then, &then_path, scope, ctx),
    };
    let default = compile_expr(otherwise, &else_path, scope, ctx);
    Expr::new(
        ExprKind::Switch {
            branches: vec![branch],
            default: Box::new(default),
        },
        path,
    )
}

fn compile_let(arg: &JsonValue, path: &str, scope: &Scope, ctx: &mut ValidationCtx) -> Expr {
    let Some(obj) = arg.as_object() else {
        ctx.push(ErrorCode::InvalidArgs, "$let requires an object", path);
        return Expr::literal(Value::Null, path);
    };
    let (Some(vars), Some(body)) = (obj.get("vars").and_then(JsonValue::as_object), obj.get("in")) else {
        ctx.push(
            ErrorCode::InvalidArgs,
            "$let requires a 'vars' object and an 'in' expression",
            path,
        );
        return Expr::literal(Value::Null, path);
    };
    if obj.len() != 2 {
        ctx.push(ErrorCode::InvalidArgs, "$let accepts only 'vars' and 'in'", path);
    }

    // vars are evaluated in the enclosing scope
    let mut bindings = Vec::with_capacity(vars.len());
    for (name, value) in vars {
        let var_path = format!("{}.vars.{}", path, name);
        if !is_valid_variable_name(name) {
            ctx.push(
                ErrorCode::InvalidArgs,
                format!("invalid variable name: {}", name),
                &var_path,
            );
        }
        bindings.push((name.clone(), compile_expr(value, &var_path, scope, ctx)));
    }

    let inner = scope.with_names(bindings.iter().map(|(name, _)| name.as_str()));
    let body = compile_expr(body, &format!("{}.in", path), &inner, ctx);
    Expr::new(
        ExprKind::Let {
            bindings,
            body: Box::new(body),
        },
        path,
    )
}

fn fold_array(items: Vec<Expr>, path: &str) -> Expr {
    if items.iter().all(|item| item.as_literal().is_some()) {
        let values = items
            .into_iter()
            .filter_map(|item| match item.kind {
                ExprKind::Literal(value) => Some(value),
                _ => None,
            })
            .collect();
        return Expr::literal(Value::Array(values), path);
    }
    Expr::new(ExprKind::Array(items), path)
}

fn fold_object(fields: Vec<(String, Expr)>, path: &str) -> Expr {
    if fields.iter().all(|(_, expr)| expr.as_literal().is_some()) {
        let record: Record = fields
            .into_iter()
            .filter_map(|(name, expr)| match expr.kind {
                ExprKind::Literal(value) => Some((name, value)),
                _ => None,
            })
            .collect();
        return Expr::literal(Value::Record(record), path);
    }
    Expr::new(ExprKind::Object(fields), path)
}
