//! Stage executors. Each takes the materialized output of the previous
//! stage and produces a new record list.

use std::cmp::Ordering;

use crate::error::ExecError;
use crate::eval::{EvalContext, evaluate};
use crate::group::run_group;
use crate::model::{PipelineOptions, UnwindEmpty};
use crate::path;
use crate::pipeline::CancelToken;
use crate::stage::{AddFieldsStage, MatchStage, ProjectStage, Projection, SortDirection, SortStage, Stage, UnwindStage};
use crate::value::{Record, Value};

/// Per-execution settings shared by every stage.
#[derive(Debug, Clone, Copy)]
pub struct ExecEnv<'a> {
    pub options: &'a PipelineOptions,
    pub cancel: Option<&'a CancelToken>,
}

impl ExecEnv<'_> {
    pub fn check_cancel(&self) -> Result<(), ExecError> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(ExecError::cancelled()),
            _ => Ok(()),
        }
    }
}

pub fn run_stage(stage: &Stage, records: Vec<Record>, env: &ExecEnv<'_>) -> Result<Vec<Record>, ExecError> {
    match stage {
        Stage::Match(stage) => run_match(stage, records, env),
        Stage::AddFields(stage) => run_add_fields(stage, records, env),
        Stage::Project(stage) => run_project(stage, records, env),
        Stage::Group(stage) => run_group(stage, records, env),
        Stage::Unwind(stage) => run_unwind(stage, records, env),
        Stage::Sort(stage) => run_sort(stage, records, env),
        Stage::Limit(n) => {
            let mut records = records;
            records.truncate(*n);
            Ok(records)
        }
        Stage::Skip(n) => Ok(records.into_iter().skip(*n).collect()),
    }
}

fn run_match(stage: &MatchStage, records: Vec<Record>, env: &ExecEnv<'_>) -> Result<Vec<Record>, ExecError> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        env.check_cancel()?;
        if evaluate(&stage.predicate, &EvalContext::new(&record))?.is_truthy() {
            out.push(record);
        }
    }
    Ok(out)
}

fn run_add_fields(
    stage: &AddFieldsStage,
    records: Vec<Record>,
    env: &ExecEnv<'_>,
) -> Result<Vec<Record>, ExecError> {
    let mut out = Vec::with_capacity(records.len());
    for mut record in records {
        env.check_cancel()?;
        // later fields see the values computed before them
        for (field, expr) in &stage.fields {
            let value = evaluate(expr, &EvalContext::new(&record))?;
            path::set(&mut record, field, value);
        }
        out.push(record);
    }
    Ok(out)
}

fn run_project(stage: &ProjectStage, records: Vec<Record>, env: &ExecEnv<'_>) -> Result<Vec<Record>, ExecError> {
    let mut out = Vec::with_capacity(records.len());
    match stage {
        ProjectStage::Exclude { fields } => {
            for mut record in records {
                env.check_cancel()?;
                for field in fields {
                    path::remove(&mut record, field);
                }
                out.push(record);
            }
        }
        ProjectStage::Include { include_id, fields } => {
            for mut scope in records {
                env.check_cancel()?;
                let mut projected = Record::with_capacity(fields.len() + 1);
                if *include_id {
                    if let Some(id) = scope.get("_id") {
                        projected.insert("_id".to_string(), id.clone());
                    }
                }
                for (field, projection) in fields {
                    match projection {
                        Projection::Copy => {
                            if let Some(value) = path::resolve(&scope, field) {
                                path::set(&mut projected, field, value);
                            }
                        }
                        Projection::Computed(expr) => {
                            let value = evaluate(expr, &EvalContext::new(&scope))?;
                            path::set(&mut projected, field, value.clone());
                            path::set(&mut scope, field, value);
                        }
                    }
                }
                out.push(projected);
            }
        }
    }
    Ok(out)
}

fn run_unwind(stage: &UnwindStage, records: Vec<Record>, env: &ExecEnv<'_>) -> Result<Vec<Record>, ExecError> {
    let preserve = stage
        .preserve_empty
        .unwrap_or(env.options.unwind_empty == UnwindEmpty::Preserve);
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        env.check_cancel()?;
        let items = match path::resolve(&record, &stage.path) {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => Vec::new(),
            Some(single) => vec![single],
        };
        if items.is_empty() {
            if preserve {
                let mut kept = record;
                path::set(&mut kept, &stage.path, Value::Null);
                if let Some(index_field) = &stage.include_array_index {
                    path::set(&mut kept, index_field, Value::Null);
                }
                out.push(kept);
            }
            continue;
        }
        for (index, item) in items.into_iter().enumerate() {
            let mut unwound = record.clone();
            path::set(&mut unwound, &stage.path, item);
            if let Some(index_field) = &stage.include_array_index {
                path::set(&mut unwound, index_field, Value::Int(index as i64));
            }
            out.push(unwound);
        }
    }
    Ok(out)
}

fn run_sort(stage: &SortStage, records: Vec<Record>, env: &ExecEnv<'_>) -> Result<Vec<Record>, ExecError> {
    let mut keyed = Vec::with_capacity(records.len());
    for record in records {
        env.check_cancel()?;
        let keys: Vec<Value> = stage
            .keys
            .iter()
            .map(|key| path::resolve(&record, &key.path).unwrap_or(Value::Null))
            .collect();
        keyed.push((keys, record));
    }
    // sort_by is stable: ties keep input order
    keyed.sort_by(|(left, _), (right, _)| {
        for ((l, r), key) in left.iter().zip(right).zip(&stage.keys) {
            let ord = match key.direction {
                SortDirection::Asc => l.cmp(r),
                SortDirection::Desc => r.cmp(l),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(keyed.into_iter().map(|(_, record)| record).collect())
}
