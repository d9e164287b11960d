#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidStageSpec,
    UnknownStage,
    UnknownOperator,
    InvalidArgs,
    InvalidPath,
    UndefinedVariable,
    InvalidOption,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidStageSpec => "InvalidStageSpec",
            ErrorCode::UnknownStage => "UnknownStage",
            ErrorCode::UnknownOperator => "UnknownOperator",
            ErrorCode::InvalidArgs => "InvalidArgs",
            ErrorCode::InvalidPath => "InvalidPath",
            ErrorCode::UndefinedVariable => "UndefinedVariable",
            ErrorCode::InvalidOption => "InvalidOption",
        }
    }
}

/// A problem found while compiling a pipeline document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecError {
    pub code: ErrorCode,
    pub message: String,
    pub path: Option<String>,
}

impl SpecError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl std::fmt::Display for SpecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {} (path: {})", self.code.as_str(), self.message, path),
            None => write!(f, "{}: {}", self.code.as_str(), self.message),
        }
    }
}

impl std::error::Error for SpecError {}

pub type SpecResult<T> = Result<T, Vec<SpecError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    TypeCoercion,
    DivisionByZero,
    Cancelled,
    InvalidInput,
}

impl ExecErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecErrorKind::TypeCoercion => "TypeCoercion",
            ExecErrorKind::DivisionByZero => "DivisionByZero",
            ExecErrorKind::Cancelled => "Cancelled",
            ExecErrorKind::InvalidInput => "InvalidInput",
        }
    }
}

/// A failure while executing a compiled pipeline.
///
/// `path` names the expression node that failed, `stage` the index of the
/// stage in the pipeline document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub message: String,
    pub path: Option<String>,
    pub stage: Option<usize>,
}

impl ExecError {
    pub fn new(kind: ExecErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            stage: None,
        }
    }

    pub fn type_coercion(message: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::TypeCoercion, message)
    }

    pub fn division_by_zero(message: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::DivisionByZero, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ExecErrorKind::Cancelled, "pipeline execution cancelled")
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attaches a path only when the error does not already carry a more
    /// specific one.
    pub fn or_path(mut self, path: &str) -> Self {
        if self.path.is_none() {
            self.path = Some(path.to_string());
        }
        self
    }

    pub fn with_stage(mut self, stage: usize) -> Self {
        if self.stage.is_none() {
            self.stage = Some(stage);
        }
        self
    }
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)?;
        if let Some(stage) = self.stage {
            write!(f, " (stage: {})", stage)?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecError {}

impl From<csv::Error> for ExecError {
    fn from(err: csv::Error) -> Self {
        ExecError::new(ExecErrorKind::InvalidInput, format!("csv error: {}", err))
    }
}

impl From<serde_json::Error> for ExecError {
    fn from(err: serde_json::Error) -> Self {
        ExecError::new(ExecErrorKind::InvalidInput, format!("json error: {}", err))
    }
}

/// Any failure of a load → compile → execute round trip.
#[derive(Debug)]
pub enum PipelineError {
    Parse(serde_yaml::Error),
    Spec(Vec<SpecError>),
    Exec(ExecError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Parse(err) => write!(f, "failed to parse pipeline file: {}", err),
            PipelineError::Spec(errors) => {
                write!(f, "invalid pipeline ({} errors)", errors.len())?;
                for err in errors {
                    write!(f, "\n  {}", err)?;
                }
                Ok(())
            }
            PipelineError::Exec(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        PipelineError::Parse(err)
    }
}

impl From<Vec<SpecError>> for PipelineError {
    fn from(errors: Vec<SpecError>) -> Self {
        PipelineError::Spec(errors)
    }
}

impl From<ExecError> for PipelineError {
    fn from(err: ExecError) -> Self {
        PipelineError::Exec(err)
    }
}
