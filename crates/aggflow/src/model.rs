use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ErrorCode, PipelineError, SpecError, SpecResult};
use crate::path::FieldPath;
use crate::pipeline::Pipeline;
use crate::source::read_records;
use crate::validator::ValidationCtx;
use crate::value::Record;

pub const PIPELINE_FILE_VERSION: u8 = 1;

/// A pipeline document with its input description and execution options.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PipelineFile {
    pub version: u8,
    #[serde(default)]
    pub input: Option<InputSpec>,
    #[serde(default)]
    pub options: PipelineOptions,
    pub pipeline: Vec<JsonValue>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct InputSpec {
    pub format: InputFormat,
    #[serde(default)]
    pub csv: Option<CsvInput>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    #[default]
    Json,
    Ndjson,
    Csv,
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> String {
    ",".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CsvInput {
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Field names and types for each column, in order. When present they
    /// replace the header row's names.
    #[serde(default)]
    pub columns: Option<Vec<Column>>,
}

impl Default for CsvInput {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: default_delimiter(),
            columns: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Column {
    pub name: String,
    /// Without a type the column's kind is inferred from all of its cells.
    #[serde(rename = "type", default)]
    pub value_type: Option<ColumnType>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Int,
    Float,
    Bool,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
        }
    }
}

/// What `$unwind` does with a null, missing or empty array field when the
/// stage itself does not say.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnwindEmpty {
    #[default]
    Drop,
    Preserve,
}

fn default_partitions() -> usize {
    1
}

/// Upper bound for `group_partitions`; each partition is one thread.
pub const MAX_GROUP_PARTITIONS: usize = 256;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineOptions {
    #[serde(default)]
    pub unwind_empty: UnwindEmpty,
    /// Number of contiguous input partitions `$group` folds in parallel.
    #[serde(default = "default_partitions")]
    pub group_partitions: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            unwind_empty: UnwindEmpty::default(),
            group_partitions: default_partitions(),
        }
    }
}

impl PipelineOptions {
    pub(crate) fn validate(&self, ctx: &mut ValidationCtx) {
        if !(1..=MAX_GROUP_PARTITIONS).contains(&self.group_partitions) {
            ctx.push(
                ErrorCode::InvalidOption,
                format!(
                    "group_partitions must be between 1 and {}, found {}",
                    MAX_GROUP_PARTITIONS, self.group_partitions
                ),
                "options.group_partitions",
            );
        }
    }
}

impl PipelineFile {
    /// Validates the file-level settings and compiles the pipeline.
    pub fn compile(&self) -> SpecResult<Pipeline> {
        let mut ctx = ValidationCtx::new();
        if self.version != PIPELINE_FILE_VERSION {
            ctx.push(
                ErrorCode::InvalidOption,
                format!(
                    "unsupported version {}; expected {}",
                    self.version, PIPELINE_FILE_VERSION
                ),
                "version",
            );
        }
        if let Some(csv) = self.input.as_ref().and_then(|input| input.csv.as_ref()) {
            if csv.delimiter.len() != 1 {
                ctx.push(
                    ErrorCode::InvalidOption,
                    "csv delimiter must be a single byte",
                    "input.csv.delimiter",
                );
            }
            if let Some(columns) = &csv.columns {
                validate_columns(columns, &mut ctx);
            }
        }
        self.options.validate(&mut ctx);

        let document = JsonValue::Array(self.pipeline.clone());
        match Pipeline::compile(&document) {
            Ok(pipeline) => ctx.finish(pipeline.with_options(self.options.clone())),
            Err(errors) => {
                let mut all: Vec<SpecError> = ctx.errors().to_vec();
                all.extend(errors);
                Err(all)
            }
        }
    }
}

fn validate_columns(columns: &[Column], ctx: &mut ValidationCtx) {
    if columns.is_empty() {
        ctx.push(
            ErrorCode::InvalidOption,
            "columns must not be empty",
            "input.csv.columns",
        );
    }
    for (i, column) in columns.iter().enumerate() {
        let path = format!("input.csv.columns[{}].name", i);
        if let Err(err) = FieldPath::parse(&column.name) {
            ctx.push(
                ErrorCode::InvalidOption,
                format!("invalid column name {:?}: {}", column.name, err),
                path,
            );
        } else if columns[..i].iter().any(|prev| prev.name == column.name) {
            ctx.push(
                ErrorCode::InvalidOption,
                format!("duplicate column name {:?}", column.name),
                path,
            );
        }
    }
}

/// Parses a pipeline file. JSON is accepted as it is a subset of YAML.
pub fn parse_pipeline_file(text: &str) -> Result<PipelineFile, serde_yaml::Error> {
    serde_yaml::from_str(text)
}

/// Compiles `file`, reads `input` as described by its `input` section and
/// executes the pipeline.
pub fn run_pipeline_file(file: &PipelineFile, input: &str) -> Result<Vec<Record>, PipelineError> {
    let pipeline = file.compile()?;
    let spec = file.input.clone().unwrap_or_default();
    let records = read_records(input, &spec)?;
    Ok(pipeline.execute(records)?)
}
