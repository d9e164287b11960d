//! The pipeline driver: compiles a stage list and runs it over records.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value as JsonValue;

use crate::error::{ErrorCode, ExecError, SpecResult};
use crate::exec::{ExecEnv, run_stage};
use crate::model::PipelineOptions;
use crate::stage::{Stage, compile_stage, referenced_fields};
use crate::validator::ValidationCtx;
use crate::value::Record;

/// Cooperative cancellation flag shared with a running execution.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub cancel: Option<CancelToken>,
}

impl ExecOptions {
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A compiled, immutable pipeline. Executions share nothing, so one
/// `Pipeline` may be run from many threads at once.
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
    options: PipelineOptions,
}

impl Pipeline {
    /// Compiles a pipeline document: an array of single-key stage objects.
    /// Every problem in the document is reported, not just the first.
    pub fn compile(document: &JsonValue) -> SpecResult<Pipeline> {
        let mut ctx = ValidationCtx::new();
        let Some(items) = document.as_array() else {
            ctx.push(
                ErrorCode::InvalidStageSpec,
                "a pipeline must be an array of stages",
                "pipeline",
            );
            return Err(ctx.errors().to_vec());
        };

        let mut stages = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if let Some(stage) = compile_stage(item, index, &mut ctx) {
                if tracing::enabled!(tracing::Level::TRACE) {
                    if let Stage::Match(matcher) = &stage {
                        let mut fields = Vec::new();
                        referenced_fields(&matcher.predicate, &mut fields);
                        tracing::trace!(index, fields = ?fields, "match predicate compiled");
                    }
                }
                stages.push(stage);
            }
        }
        ctx.finish(Pipeline {
            stages,
            options: PipelineOptions::default(),
        })
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn execute(&self, records: impl IntoIterator<Item = Record>) -> Result<Vec<Record>, ExecError> {
        self.execute_with(records, &ExecOptions::default())
    }

    /// Applies every stage in order; each stage materializes its whole
    /// output before the next one starts.
    pub fn execute_with(
        &self,
        records: impl IntoIterator<Item = Record>,
        exec_options: &ExecOptions,
    ) -> Result<Vec<Record>, ExecError> {
        let span = tracing::debug_span!("pipeline", stages = self.stages.len());
        let _guard = span.enter();

        let env = ExecEnv {
            options: &self.options,
            cancel: exec_options.cancel.as_ref(),
        };
        let mut records: Vec<Record> = records.into_iter().collect();
        for (index, stage) in self.stages.iter().enumerate() {
            env.check_cancel().map_err(|err| err.with_stage(index))?;
            let input_len = records.len();
            records = run_stage(stage, records, &env).map_err(|err| err.with_stage(index))?;
            tracing::debug!(
                index,
                stage = stage.name(),
                input = input_len,
                output = records.len(),
                "stage complete"
            );
        }
        Ok(records)
    }
}

pub fn compile_pipeline(document: &JsonValue) -> SpecResult<Pipeline> {
    Pipeline::compile(document)
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use crate::error::ExecErrorKind;
    use crate::value::Value;
    use serde_json::json;

    fn records(value: JsonValue) -> Vec<Record> {
        match Value::from(value) {
            Value::Array(items) => items.into_iter().filter_map(Value::into_record).collect(),
            _ => panic!("expected an array"),
        }
    }

    #[test]
    fn pipeline_must_be_an_array() {
        let errors = compile_pipeline(&json!({"$match": {}})).unwrap_err();
        assert_eq!(errors[0].code, ErrorCode::InvalidStageSpec);
    }

    #[test]
    fn all_stage_errors_are_reported() {
        let doc = json!([
            {"$match": {"a": {"$bad": 1}}},
            {"$sort": {}},
            {"$unknown": 1}
        ]);
        let errors = compile_pipeline(&doc).unwrap_err();
        let paths: Vec<&str> = errors.iter().filter_map(|err| err.path.as_deref()).collect();
        assert_eq!(paths, vec!["pipeline[0].$match.a.$bad", "pipeline[1].$sort", "pipeline[2]"]);
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let pipeline = compile_pipeline(&json!([])).unwrap();
        let input = records(json!([{"a": 1}, {"a": 2}]));
        assert_eq!(pipeline.execute(input.clone()).unwrap(), input);
    }

    #[test]
    fn errors_carry_the_stage_index() {
        let doc = json!([
            {"$match": {"a": {"$gte": 0}}},
            {"$addFields": {"ratio": {"$divide": ["$a", "$b"]}}}
        ]);
        let pipeline = compile_pipeline(&doc).unwrap();
        let err = pipeline.execute(records(json!([{"a": 1, "b": 0}]))).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::DivisionByZero);
        assert_eq!(err.stage, Some(1));
        assert_eq!(err.path.as_deref(), Some("pipeline[1].$addFields.ratio.$divide"));
    }

    #[test]
    fn cancelled_token_stops_execution() {
        let pipeline = compile_pipeline(&json!([{"$match": {}}])).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let options = ExecOptions::default().with_cancel(token);
        let err = pipeline
            .execute_with(records(json!([{"a": 1}])), &options)
            .unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Cancelled);
        assert_eq!(err.stage, Some(0));
    }

    #[test]
    fn limit_and_skip() {
        let doc = json!([{"$skip": 1}, {"$limit": 2}]);
        let pipeline = compile_pipeline(&doc).unwrap();
        let out = pipeline
            .execute(records(json!([{"n": 1}, {"n": 2}, {"n": 3}, {"n": 4}])))
            .unwrap();
        assert_eq!(out, records(json!([{"n": 2}, {"n": 3}])));
    }

    #[test]
    fn pipeline_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();
    }
}
