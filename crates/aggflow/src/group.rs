//! `$group` execution, sequential or over contiguous partitions.

use indexmap::IndexMap;

use crate::accumulator::AccState;
use crate::error::ExecError;
use crate::eval::{EvalContext, evaluate};
use crate::exec::ExecEnv;
use crate::model::MAX_GROUP_PARTITIONS;
use crate::stage::GroupStage;
use crate::value::{Record, Value};

/// Group key to per-accumulator state, in first-seen key order.
type GroupTable = IndexMap<Value, Vec<AccState>>;

/// Partitions smaller than this are not worth a thread.
const MIN_RECORDS_PER_PARTITION: usize = 2;

pub fn run_group(stage: &GroupStage, records: Vec<Record>, env: &ExecEnv<'_>) -> Result<Vec<Record>, ExecError> {
    let partitions = env.options.group_partitions.clamp(1, MAX_GROUP_PARTITIONS);
    let table = if partitions > 1 && records.len() >= partitions.saturating_mul(MIN_RECORDS_PER_PARTITION) {
        fold_partitioned(stage, &records, partitions, env)?
    } else {
        if partitions > 1 {
            tracing::debug!(
                partitions,
                records = records.len(),
                "input too small to partition; grouping sequentially"
            );
        }
        fold_partition(stage, &records, env)?
    };
    finalize(stage, table)
}

fn fold_partition(stage: &GroupStage, records: &[Record], env: &ExecEnv<'_>) -> Result<GroupTable, ExecError> {
    let mut table = GroupTable::new();
    for record in records {
        env.check_cancel()?;
        let ctx = EvalContext::new(record);
        let key = evaluate(&stage.key, &ctx)?;
        let states = table
            .entry(key)
            .or_insert_with(|| stage.accumulators.iter().map(|acc| acc.op.init()).collect());
        for (state, acc) in states.iter_mut().zip(&stage.accumulators) {
            let value = if acc.op.takes_operand() {
                evaluate(&acc.expr, &ctx)?
            } else {
                Value::Null
            };
            state.fold(value).map_err(|err| err.or_path(&acc.path))?;
        }
    }
    Ok(table)
}

/// Folds contiguous chunks on scoped threads and merges them in chunk order,
/// so key order and `$push` order match a sequential fold.
fn fold_partitioned(
    stage: &GroupStage,
    records: &[Record],
    partitions: usize,
    env: &ExecEnv<'_>,
) -> Result<GroupTable, ExecError> {
    let chunk_len = records.len().div_ceil(partitions);
    tracing::debug!(partitions, chunk_len, "grouping in partitions");

    let tables = std::thread::scope(|scope| {
        let handles: Vec<_> = records
            .chunks(chunk_len)
            .map(|chunk| scope.spawn(move || fold_partition(stage, chunk, env)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect::<Result<Vec<_>, _>>()
    })?;

    let mut tables = tables.into_iter();
    let mut merged = tables.next().unwrap_or_default();
    for table in tables {
        merge_tables(&mut merged, table);
    }
    Ok(merged)
}

fn merge_tables(left: &mut GroupTable, right: GroupTable) {
    for (key, states) in right {
        match left.get_mut(&key) {
            Some(existing) => {
                for (state, other) in existing.iter_mut().zip(states) {
                    state.merge(other);
                }
            }
            None => {
                left.insert(key, states);
            }
        }
    }
}

fn finalize(stage: &GroupStage, table: GroupTable) -> Result<Vec<Record>, ExecError> {
    let mut out = Vec::with_capacity(table.len());
    for (key, states) in table {
        let mut record = Record::with_capacity(states.len() + 1);
        record.insert("_id".to_string(), key);
        for (state, acc) in states.into_iter().zip(&stage.accumulators) {
            let value = state.finalize().map_err(|err| err.or_path(&acc.path))?;
            record.insert(acc.field.clone(), value);
        }
        out.push(record);
    }
    Ok(out)
}
