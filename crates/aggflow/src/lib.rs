//! An aggregation pipeline engine: `$match`, `$addFields`, `$project`,
//! `$group`, `$unwind`, `$sort`, `$limit` and `$skip` stages over
//! semi-structured records, with an expression language of arithmetic,
//! comparison, conditional and string operators.

pub mod accumulator;
mod error;
pub mod eval;
pub mod exec;
pub mod expr;
mod group;
mod model;
pub mod path;
mod pipeline;
mod source;
pub mod stage;
mod validator;
mod value;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use error::{ErrorCode, ExecError, ExecErrorKind, PipelineError, SpecError, SpecResult};
pub use model::{
    Column, ColumnType, CsvInput, InputFormat, InputSpec, MAX_GROUP_PARTITIONS, PipelineFile,
    PipelineOptions, UnwindEmpty, parse_pipeline_file, run_pipeline_file,
};
pub use path::{FieldPath, PathError};
pub use pipeline::{CancelToken, ExecOptions, Pipeline, compile_pipeline};
pub use source::{read_records, records_to_json};
pub use stage::Stage;
pub use validator::ValidationCtx;
pub use value::{Kind, Number, Record, Value};
