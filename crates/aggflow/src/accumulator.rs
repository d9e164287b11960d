//! Group accumulators.
//!
//! Every accumulator is a small state machine: `init` produces the empty
//! state, `fold` absorbs one evaluated value, `merge` combines the states of
//! two contiguous partitions (left before right) and `finalize` produces the
//! output value.

use crate::error::ExecError;
use crate::value::{Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorOp {
    Count,
    Sum,
    Avg,
    Max,
    Min,
    Push,
    First,
    Last,
}

impl AccumulatorOp {
    /// Resolves an accumulator name without its `$` prefix.
    pub fn from_name(name: &str) -> Option<AccumulatorOp> {
        let op = match name {
            "count" => AccumulatorOp::Count,
            "sum" => AccumulatorOp::Sum,
            "avg" => AccumulatorOp::Avg,
            "max" => AccumulatorOp::Max,
            "min" => AccumulatorOp::Min,
            "push" => AccumulatorOp::Push,
            "first" => AccumulatorOp::First,
            "last" => AccumulatorOp::Last,
            _ => return None,
        };
        Some(op)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AccumulatorOp::Count => "$count",
            AccumulatorOp::Sum => "$sum",
            AccumulatorOp::Avg => "$avg",
            AccumulatorOp::Max => "$max",
            AccumulatorOp::Min => "$min",
            AccumulatorOp::Push => "$push",
            AccumulatorOp::First => "$first",
            AccumulatorOp::Last => "$last",
        }
    }

    /// `$count` takes no operand expression.
    pub fn takes_operand(&self) -> bool {
        !matches!(self, AccumulatorOp::Count)
    }

    pub fn init(&self) -> AccState {
        match self {
            AccumulatorOp::Count => AccState::Count(0),
            AccumulatorOp::Sum => AccState::Sum(Number::Int(0)),
            AccumulatorOp::Avg => AccState::Avg {
                sum: Number::Int(0),
                count: 0,
            },
            AccumulatorOp::Max => AccState::Max(None),
            AccumulatorOp::Min => AccState::Min(None),
            AccumulatorOp::Push => AccState::Push(Vec::new()),
            AccumulatorOp::First => AccState::First(None),
            AccumulatorOp::Last => AccState::Last(None),
        }
    }
}

/// Running state of one accumulator for one group key.
#[derive(Debug, Clone, PartialEq)]
pub enum AccState {
    Count(i64),
    Sum(Number),
    Avg { sum: Number, count: u64 },
    Max(Option<Value>),
    Min(Option<Value>),
    Push(Vec<Value>),
    First(Option<Value>),
    Last(Option<Value>),
}

impl AccState {
    pub fn fold(&mut self, value: Value) -> Result<(), ExecError> {
        match self {
            AccState::Count(n) => *n += 1,
            AccState::Sum(sum) => {
                if let Some(n) = numeric(AccumulatorOp::Sum, &value)? {
                    *sum = sum.add(n);
                }
            }
            AccState::Avg { sum, count } => {
                if let Some(n) = numeric(AccumulatorOp::Avg, &value)? {
                    *sum = sum.add(n);
                    *count += 1;
                }
            }
            AccState::Max(best) => {
                if !value.is_null() && best.as_ref().is_none_or(|b| value > *b) {
                    *best = Some(value);
                }
            }
            AccState::Min(best) => {
                if !value.is_null() && best.as_ref().is_none_or(|b| value < *b) {
                    *best = Some(value);
                }
            }
            AccState::Push(items) => items.push(value),
            AccState::First(first) => {
                if first.is_none() {
                    *first = Some(value);
                }
            }
            AccState::Last(last) => *last = Some(value),
        }
        Ok(())
    }

    /// Merges the state of the partition that follows `self` in input order.
    pub fn merge(&mut self, other: AccState) {
        match (self, other) {
            (AccState::Count(a), AccState::Count(b)) => *a += b,
            (AccState::Sum(a), AccState::Sum(b)) => *a = a.add(b),
            (
                AccState::Avg { sum, count },
                AccState::Avg {
                    sum: other_sum,
                    count: other_count,
                },
            ) => {
                *sum = sum.add(other_sum);
                *count += other_count;
            }
            (AccState::Max(a), AccState::Max(Some(b))) => {
                if a.as_ref().is_none_or(|current| b > *current) {
                    *a = Some(b);
                }
            }
            (AccState::Min(a), AccState::Min(Some(b))) => {
                if a.as_ref().is_none_or(|current| b < *current) {
                    *a = Some(b);
                }
            }
            (AccState::Push(a), AccState::Push(b)) => a.extend(b),
            (AccState::First(a), AccState::First(b)) => {
                if a.is_none() {
                    *a = b;
                }
            }
            (AccState::Last(a), AccState::Last(b)) => {
                if b.is_some() {
                    *a = b;
                }
            }
            _ => {}
        }
    }

    pub fn finalize(self) -> Result<Value, ExecError> {
        match self {
            AccState::Count(n) => Ok(Value::Int(n)),
            AccState::Sum(sum) => Ok(sum.into()),
            AccState::Avg { count: 0, .. } => Err(ExecError::division_by_zero(
                "$avg found no numeric values to average",
            )),
            AccState::Avg { sum, count } => Ok(Value::Float(sum.as_f64() / count as f64)),
            AccState::Max(best) | AccState::Min(best) => Ok(best.unwrap_or(Value::Null)),
            AccState::Push(items) => Ok(Value::Array(items)),
            AccState::First(value) | AccState::Last(value) => Ok(value.unwrap_or(Value::Null)),
        }
    }
}

fn numeric(op: AccumulatorOp, value: &Value) -> Result<Option<Number>, ExecError> {
    match value {
        Value::Null => Ok(None),
        other => other.as_number().map(Some).ok_or_else(|| {
            ExecError::type_coercion(format!(
                "{} only supports numeric types, not {}",
                op.name(),
                other.type_name()
            ))
        }),
    }
}
