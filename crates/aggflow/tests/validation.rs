use aggflow::{ErrorCode, PipelineError, SpecError, compile_pipeline, parse_pipeline_file, run_pipeline_file};
use serde_json::json;

fn normalize_errors(errors: Vec<SpecError>) -> Vec<(String, Option<String>)> {
    let mut normalized: Vec<(String, Option<String>)> = errors
        .into_iter()
        .map(|err| (err.code.as_str().to_string(), err.path))
        .collect();
    normalized.sort();
    normalized
}

fn expected(items: &[(&str, &str)]) -> Vec<(String, Option<String>)> {
    let mut normalized: Vec<(String, Option<String>)> = items
        .iter()
        .map(|(code, path)| (code.to_string(), Some(path.to_string())))
        .collect();
    normalized.sort();
    normalized
}

fn compile_yaml(yaml: &str) -> Vec<SpecError> {
    let file = parse_pipeline_file(yaml).unwrap_or_else(|err| panic!("failed to parse YAML: {}", err));
    match file.compile() {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    }
}

#[test]
fn valid_pipeline_has_no_errors() {
    let yaml = r#"
version: 1
pipeline:
  - $match: { year: { $gte: 2019, $lt: 2021 }, $or: [{ dest.state: "CA" }, { dest.state: "WA" }] }
  - $addFields: { hour: { $toInt: { $substr: ["$crs_arr_time", 0, 2] } } }
  - $group: { _id: "$hour", n: { $count: {} }, delays: { $push: "$arr_delay" } }
  - $unwind: { path: "$delays", includeArrayIndex: "i" }
  - $sort: { _id: 1, i: -1 }
  - $skip: 1
  - $limit: 10
"#;
    assert!(compile_yaml(yaml).is_empty());
}

#[test]
fn errors_from_every_stage_are_collected() {
    let yaml = r#"
version: 1
pipeline:
  - $match: { arr_delay: { $between: [1, 2] } }
  - $addFields: { x: { $frobnicate: 1 } }
  - $project: { a: 1, b: 0 }
  - $group: { n: { $sum: 1 } }
  - $unwind: "items"
  - $sort: { year: 0 }
  - $lookup: { from: "airports" }
"#;
    assert_eq!(
        normalize_errors(compile_yaml(yaml)),
        expected(&[
            ("UnknownOperator", "pipeline[0].$match.arr_delay.$between"),
            ("UnknownOperator", "pipeline[1].$addFields.x.$frobnicate"),
            ("InvalidStageSpec", "pipeline[2].$project"),
            ("InvalidStageSpec", "pipeline[3].$group"),
            ("InvalidStageSpec", "pipeline[4].$unwind"),
            ("InvalidStageSpec", "pipeline[5].$sort.year"),
            ("UnknownStage", "pipeline[6]"),
        ])
    );
}

#[test]
fn expression_errors_carry_nested_paths() {
    let doc = json!([
        {"$project": {
            "month": {"$let": {"vars": {"names": ["Jan"]}, "in": {"$arrayElemAt": ["$$nams", 0]}}},
            "hour": {"$substr": ["$t", 0]},
            "bad": "$a..b",
            "code": {"$toInt": "$t..x"}
        }}
    ]);
    let errors = compile_pipeline(&doc).unwrap_err();
    assert_eq!(
        normalize_errors(errors),
        expected(&[
            ("UndefinedVariable", "pipeline[0].$project.month.$let.in.$arrayElemAt[0]"),
            ("InvalidArgs", "pipeline[0].$project.hour.$substr"),
            ("InvalidPath", "pipeline[0].$project.bad"),
            ("InvalidPath", "pipeline[0].$project.code.$toInt[0]"),
        ])
    );
}

#[test]
fn switch_without_default_is_rejected() {
    let doc = json!([
        {"$addFields": {"kind": {"$switch": {"branches": [{"case": true, "then": 1}]}}}}
    ]);
    let errors = compile_pipeline(&doc).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::InvalidArgs);
    assert_eq!(errors[0].path.as_deref(), Some("pipeline[0].$addFields.kind.$switch"));
}

#[test]
fn file_level_options_are_validated() {
    let yaml = r#"
version: 3
options: { group_partitions: 0 }
pipeline: []
"#;
    assert_eq!(
        normalize_errors(compile_yaml(yaml)),
        expected(&[
            ("InvalidOption", "version"),
            ("InvalidOption", "options.group_partitions"),
        ])
    );
}

#[test]
fn malformed_file_is_a_parse_error() {
    assert!(parse_pipeline_file("version: 1\nstages: []\n").is_err());
    assert!(parse_pipeline_file("version: 1\npipeline: {}\n").is_err());
}

#[test]
fn run_pipeline_file_reports_each_failure_kind() {
    let bad_spec = parse_pipeline_file("version: 1\npipeline: [{ $nope: 1 }]\n").unwrap();
    assert!(matches!(run_pipeline_file(&bad_spec, "[]"), Err(PipelineError::Spec(_))));

    let ok = parse_pipeline_file("version: 1\npipeline: []\n").unwrap();
    let err = run_pipeline_file(&ok, "not json").unwrap_err();
    assert!(matches!(err, PipelineError::Exec(_)));
    assert!(err.to_string().starts_with("InvalidInput"));
}
