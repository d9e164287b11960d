//! Expression evaluation against a record context.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ExecError, ExecErrorKind};
use crate::expr::{CURRENT_VARIABLE, Expr, ExprKind, Operator, ROOT_VARIABLE, SwitchBranch};
use crate::path;
use crate::value::{Number, Record, Value};

// =============================================================================
// EvalContext
// =============================================================================

/// Evaluation context: the current record plus visible `$let` bindings.
#[derive(Clone)]
pub struct EvalContext<'a> {
    root: &'a Record,
    bindings: HashMap<String, Value>,
}

impl<'a> EvalContext<'a> {
    pub fn new(root: &'a Record) -> Self {
        Self {
            root,
            bindings: HashMap::new(),
        }
    }

    /// Create a new context with a variable binding added
    pub fn with_binding(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }

    pub fn root(&self) -> &'a Record {
        self.root
    }

    pub fn resolve_variable(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

// =============================================================================
// Evaluation
// =============================================================================

pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, ExecError> {
    match &expr.kind {
        ExprKind::Literal(value) => Ok(value.clone()),
        ExprKind::Field(field) => Ok(path::resolve(ctx.root(), field).unwrap_or(Value::Null)),
        ExprKind::Variable { name, path: sub_path } => Ok(eval_variable(name, sub_path.as_ref(), ctx)),
        ExprKind::Array(items) => items
            .iter()
            .map(|item| evaluate(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ExprKind::Object(fields) => {
            let mut record = Record::with_capacity(fields.len());
            for (name, field_expr) in fields {
                record.insert(name.clone(), evaluate(field_expr, ctx)?);
            }
            Ok(Value::Record(record))
        }
        ExprKind::Op { op, args } => eval_op(*op, args, ctx).map_err(|err| err.or_path(&expr.path)),
        ExprKind::Switch { branches, default } => eval_switch(branches, default, ctx),
        ExprKind::Let { bindings, body } => {
            let mut inner = ctx.clone();
            for (name, binding) in bindings {
                let value = evaluate(binding, ctx)?;
                inner = inner.with_binding(name.clone(), value);
            }
            evaluate(body, &inner)
        }
    }
}

fn eval_variable(name: &str, sub_path: Option<&crate::path::FieldPath>, ctx: &EvalContext<'_>) -> Value {
    if name == ROOT_VARIABLE || name == CURRENT_VARIABLE {
        return match sub_path {
            Some(field) => path::resolve(ctx.root(), field).unwrap_or(Value::Null),
            None => Value::Record(ctx.root().clone()),
        };
    }
    let Some(value) = ctx.resolve_variable(name) else {
        return Value::Null;
    };
    match sub_path {
        Some(field) => path::resolve_value(value, field.segments()).unwrap_or(Value::Null),
        None => value.clone(),
    }
}

/// First truthy branch wins. A division by zero inside a branch predicate
/// makes that branch not match instead of failing the evaluation.
fn eval_switch(branches: &[SwitchBranch], default: &Expr, ctx: &EvalContext<'_>) -> Result<Value, ExecError> {
    for branch in branches {
        let matched = match evaluate(&branch.case, ctx) {
            Ok(value) => value.is_truthy(),
            Err(err) if err.kind == ExecErrorKind::DivisionByZero => {
                tracing::trace!(path = %branch.case.path, "division by zero in branch predicate");
                false
            }
            Err(err) => return Err(err),
        };
        if matched {
            return evaluate(&branch.then, ctx);
        }
    }
    evaluate(default, ctx)
}

fn eval_op(op: Operator, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value, ExecError> {
    match op {
        Operator::And => {
            for arg in args {
                if !evaluate(arg, ctx)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Operator::Or => {
            for arg in args {
                if evaluate(arg, ctx)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Operator::IfNull => {
            let Some((fallback, candidates)) = args.split_last() else {
                return Ok(Value::Null);
            };
            for candidate in candidates {
                let value = evaluate(candidate, ctx)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            evaluate(fallback, ctx)
        }
        _ => {
            let values = args
                .iter()
                .map(|arg| evaluate(arg, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            apply_op(op, values)
        }
    }
}

/// Applies an eagerly evaluated operator to its argument values.
fn apply_op(op: Operator, mut values: Vec<Value>) -> Result<Value, ExecError> {
    match op {
        Operator::Add => fold_arithmetic(op, &values, Number::Int(0), Number::add),
        Operator::Multiply => fold_arithmetic(op, &values, Number::Int(1), Number::mul),
        Operator::Subtract => {
            let left = numeric_operand(op, &values[0])?;
            let right = numeric_operand(op, &values[1])?;
            match (left, right) {
                (Some(l), Some(r)) => Ok(l.sub(r).into()),
                _ => Ok(Value::Null),
            }
        }
        Operator::Divide => divide(&values[0], &values[1]),
        Operator::Round => {
            let precision = values.get(1).cloned().unwrap_or(Value::Int(0));
            round(&values[0], &precision)
        }
        Operator::Eq => Ok(Value::Bool(values[0] == values[1])),
        Operator::Ne => Ok(Value::Bool(values[0] != values[1])),
        Operator::Gt => Ok(Value::Bool(values[0] > values[1])),
        Operator::Gte => Ok(Value::Bool(values[0] >= values[1])),
        Operator::Lt => Ok(Value::Bool(values[0] < values[1])),
        Operator::Lte => Ok(Value::Bool(values[0] <= values[1])),
        Operator::In => match &values[1] {
            Value::Array(items) => Ok(Value::Bool(items.contains(&values[0]))),
            other => Err(ExecError::type_coercion(format!(
                "$in requires an array as a second argument, found: {}",
                other.type_name()
            ))),
        },
        Operator::Not => Ok(Value::Bool(!values[0].is_truthy())),
        Operator::ArrayElemAt => array_elem_at(&values[0], &values[1]),
        Operator::Substr => substr(&values[0], &values[1], &values[2]),
        Operator::ToInt => to_int(&values[0]),
        Operator::Concat => {
            let mut out = String::new();
            for value in &values {
                match value {
                    Value::Null => return Ok(Value::Null),
                    Value::String(s) => out.push_str(s),
                    other => {
                        return Err(ExecError::type_coercion(format!(
                            "$concat only supports strings, not {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::String(out))
        }
        Operator::ToString => match values.swap_remove(0) {
            Value::Null => Ok(Value::Null),
            value @ Value::String(_) => Ok(value),
            value @ (Value::Bool(_) | Value::Int(_) | Value::Float(_)) => Ok(Value::String(value.to_string())),
            other => Err(ExecError::type_coercion(format!(
                "$toString cannot convert a {}",
                other.type_name()
            ))),
        },
        Operator::Size => match &values[0] {
            Value::Array(items) => Ok(Value::Int(items.len() as i64)),
            other => Err(ExecError::type_coercion(format!(
                "the argument to $size must be an array, found: {}",
                other.type_name()
            ))),
        },
        Operator::And | Operator::Or | Operator::IfNull => Ok(Value::Null),
    }
}

// =============================================================================
// Arithmetic
// =============================================================================

/// `None` means the operand is null and the result should be null.
fn numeric_operand(op: Operator, value: &Value) -> Result<Option<Number>, ExecError> {
    match value {
        Value::Null => Ok(None),
        Value::Int(i) => Ok(Some(Number::Int(*i))),
        Value::Float(f) => Ok(Some(Number::Float(*f))),
        other => Err(ExecError::type_coercion(format!(
            "{} only supports numeric types, not {}",
            op.name(),
            other.type_name()
        ))),
    }
}

fn fold_arithmetic(
    op: Operator,
    values: &[Value],
    init: Number,
    combine: fn(Number, Number) -> Number,
) -> Result<Value, ExecError> {
    let mut acc = init;
    let mut saw_null = false;
    for value in values {
        match numeric_operand(op, value)? {
            Some(n) => acc = combine(acc, n),
            None => saw_null = true,
        }
    }
    if saw_null { Ok(Value::Null) } else { Ok(acc.into()) }
}

/// A zero divisor fails even when the dividend is null.
fn divide(dividend: &Value, divisor: &Value) -> Result<Value, ExecError> {
    let divisor = numeric_operand(Operator::Divide, divisor)?;
    if divisor.is_some_and(Number::is_zero) {
        return Err(ExecError::division_by_zero("can't $divide by zero"));
    }
    let dividend = numeric_operand(Operator::Divide, dividend)?;
    match (dividend, divisor) {
        (Some(a), Some(b)) => Ok(Value::Float(a.as_f64() / b.as_f64())),
        _ => Ok(Value::Null),
    }
}

const MIN_PRECISION: i64 = -20;
const MAX_PRECISION: i64 = 100;
// beyond 2^52 every f64 is already an integer
const F64_INTEGRAL_LIMIT: f64 = 4_503_599_627_370_496.0;

fn round(value: &Value, precision: &Value) -> Result<Value, ExecError> {
    if precision.is_null() {
        return Ok(Value::Null);
    }
    let precision = match precision.as_integral() {
        Some(p) if (MIN_PRECISION..=MAX_PRECISION).contains(&p) => p as i32,
        _ => {
            return Err(ExecError::type_coercion(format!(
                "precision for $round must be an integral value in [{}, {}], found: {}",
                MIN_PRECISION, MAX_PRECISION, precision
            )));
        }
    };
    match numeric_operand(Operator::Round, value)? {
        None => Ok(Value::Null),
        Some(Number::Int(i)) if precision >= 0 => Ok(Value::Int(i)),
        Some(Number::Int(i)) => {
            let rounded = round_half_away(i as f64, precision);
            Ok(Value::Int(rounded as i64))
        }
        Some(Number::Float(f)) => Ok(Value::Float(round_half_away(f, precision))),
    }
}

/// Rounds half away from zero to `precision` decimal digits. Scaling goes
/// through the shortest decimal form of `value`, so `1.005` rounds to `1.01`
/// and `2.4999999999999996` rounds to `2`.
pub fn round_half_away(value: f64, precision: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let Some(scaled) = shift_decimal(value, precision) else {
        return value;
    };
    if scaled.abs() >= F64_INTEGRAL_LIMIT {
        return value;
    }
    shift_decimal(scaled.round(), -precision).unwrap_or(value)
}

/// `value * 10^exponent`, correctly rounded from the decimal digits.
fn shift_decimal(value: f64, exponent: i32) -> Option<f64> {
    format!("{}e{}", value, exponent)
        .parse::<f64>()
        .ok()
        .filter(|shifted| shifted.is_finite())
}

// =============================================================================
// Arrays and strings
// =============================================================================

fn array_elem_at(array: &Value, index: &Value) -> Result<Value, ExecError> {
    if index.is_null() {
        return Ok(Value::Null);
    }
    let Some(index) = index.as_integral() else {
        return Err(ExecError::type_coercion(format!(
            "$arrayElemAt's second argument must be an integral value, found: {}",
            index
        )));
    };
    let Value::Array(items) = array else {
        return Ok(Value::Null);
    };
    let position = if index < 0 {
        items.len() as i64 + index
    } else {
        index
    };
    if position < 0 {
        return Ok(Value::Null);
    }
    Ok(items.get(position as usize).cloned().unwrap_or(Value::Null))
}

fn substr(input: &Value, start: &Value, len: &Value) -> Result<Value, ExecError> {
    let text = match input {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Int(_) | Value::Float(_) => input.to_string(),
        other => {
            return Err(ExecError::type_coercion(format!(
                "$substr cannot take a {} as its first argument",
                other.type_name()
            )));
        }
    };
    let (Some(start), Some(len)) = (start.as_integral(), len.as_integral()) else {
        return Err(ExecError::type_coercion(
            "$substr start and length must be integral numbers",
        ));
    };
    let start = start.max(0) as usize;
    let chars = text.chars().skip(start);
    let out: String = if len < 0 {
        chars.collect()
    } else {
        chars.take(len as usize).collect()
    };
    Ok(Value::String(out))
}

fn numeric_prefix() -> Result<&'static Regex, ExecError> {
    static NUMERIC_PREFIX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    NUMERIC_PREFIX
        .get_or_init(|| Regex::new(r"^\s*([+-]?\d+)"))
        .as_ref()
        .map_err(|err| ExecError::type_coercion(format!("invalid numeric pattern: {}", err)))
}

fn to_int(value: &Value) -> Result<Value, ExecError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => {
            let truncated = f.trunc();
            match Value::Float(truncated).as_integral() {
                Some(i) if f.is_finite() => Ok(Value::Int(i)),
                _ => Err(ExecError::type_coercion(format!(
                    "$toInt cannot convert {} to an integer",
                    f
                ))),
            }
        }
        Value::String(s) => {
            let digits = numeric_prefix()?
                .captures(s)
                .and_then(|caps| caps.get(1))
                .ok_or_else(|| {
                    ExecError::type_coercion(format!("$toInt found no digits in \"{}\"", s))
                })?;
            digits.as_str().parse::<i64>().map(Value::Int).map_err(|_| {
                ExecError::type_coercion(format!("$toInt value \"{}\" overflows an integer", s))
            })
        }
        other => Err(ExecError::type_coercion(format!(
            "$toInt cannot convert a {}",
            other.type_name()
        ))),
    }
}
