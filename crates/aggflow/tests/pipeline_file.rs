use aggflow::{
    CancelToken, ExecErrorKind, ExecOptions, InputFormat, InputSpec, PipelineError, UnwindEmpty,
    parse_pipeline_file, read_records, records_to_json, run_pipeline_file,
};
use serde_json::json;

#[test]
fn csv_input_with_nested_headers() {
    let yaml = r#"
version: 1
input:
  format: csv
pipeline:
  - $match: { dest.state: "CA" }
  - $group:
      _id: "$carrier.airline"
      flights: { $count: {} }
      worst: { $max: "$arr_delay" }
      first_arrival: { $min: "$crs_arr_time" }
  - $sort: { _id: 1 }
"#;
    let csv = "\
carrier.airline,dest.state,arr_delay,crs_arr_time
Alaska,CA,15,0905
Delta,CA,,1410
Alaska,CA,40,0830
United,WA,3,1200
";
    let file = parse_pipeline_file(yaml).unwrap();
    let output = run_pipeline_file(&file, csv).unwrap();
    assert_eq!(
        records_to_json(&output),
        json!([
            {"_id": "Alaska", "flights": 2, "worst": 40, "first_arrival": "0830"},
            {"_id": "Delta", "flights": 1, "worst": null, "first_arrival": "1410"}
        ])
    );
}

#[test]
fn clock_times_keep_one_kind_per_column() {
    let yaml = r#"
version: 1
input: { format: csv }
pipeline:
  - $group: { _id: null, earliest: { $min: "$t" }, latest: { $max: "$t" } }
  - $project: { _id: 0, earliest: 1, latest: 1 }
"#;
    let file = parse_pipeline_file(yaml).unwrap();
    let output = run_pipeline_file(&file, "t\n0830\n1410\n0915\n").unwrap();
    assert_eq!(records_to_json(&output), json!([{"earliest": "0830", "latest": "1410"}]));
}

#[test]
fn declared_csv_columns() {
    let yaml = r#"
version: 1
input:
  format: csv
  csv:
    has_header: false
    columns:
      - { name: carrier.airline, type: string }
      - { name: crs_arr_time, type: int }
pipeline:
  - $sort: { crs_arr_time: 1 }
  - $project: { _id: 0, airline: "$carrier.airline", hour: { $toInt: { $divide: ["$crs_arr_time", 100] } } }
"#;
    let file = parse_pipeline_file(yaml).unwrap();
    let output = run_pipeline_file(&file, "Delta,1410\nAlaska,0830\nUnited,0915\n").unwrap();
    assert_eq!(
        records_to_json(&output),
        json!([
            {"airline": "Alaska", "hour": 8},
            {"airline": "United", "hour": 9},
            {"airline": "Delta", "hour": 14}
        ])
    );

    let err = run_pipeline_file(&file, "Delta,late\n").unwrap_err();
    assert!(matches!(err, PipelineError::Exec(ref exec) if exec.kind == ExecErrorKind::InvalidInput));
}

#[test]
fn semicolon_delimited_csv() {
    let yaml = r#"
version: 1
input:
  format: csv
  csv: { delimiter: ";" }
pipeline:
  - $addFields: { total: { $add: ["$a", "$b"] } }
"#;
    let file = parse_pipeline_file(yaml).unwrap();
    let output = run_pipeline_file(&file, "a;b\n1;2.5\n").unwrap();
    assert_eq!(records_to_json(&output), json!([{"a": 1, "b": 2.5, "total": 3.5}]));
}

#[test]
fn ndjson_input() {
    let yaml = r#"
version: 1
input: { format: ndjson }
pipeline:
  - $project: { _id: 0, code: "$dest.code" }
"#;
    let file = parse_pipeline_file(yaml).unwrap();
    let input = "{\"dest\": {\"code\": \"SFO\"}}\n{\"dest\": {\"code\": \"OAK\"}}\n";
    let output = run_pipeline_file(&file, input).unwrap();
    assert_eq!(records_to_json(&output), json!([{"code": "SFO"}, {"code": "OAK"}]));
}

#[test]
fn json_is_accepted_as_a_pipeline_file() {
    let text = r#"{"version": 1, "pipeline": [{"$sort": {"n": -1}}, {"$limit": 1}]}"#;
    let file = parse_pipeline_file(text).unwrap();
    let output = run_pipeline_file(&file, r#"[{"n": 1}, {"n": 3}, {"n": 2}]"#).unwrap();
    assert_eq!(records_to_json(&output), json!([{"n": 3}]));
}

#[test]
fn unwind_empty_option_preserves_records() {
    let yaml = r#"
version: 1
options: { unwind_empty: preserve }
pipeline:
  - $unwind: "$stops"
"#;
    let file = parse_pipeline_file(yaml).unwrap();
    assert_eq!(file.options.unwind_empty, UnwindEmpty::Preserve);
    let input = r#"[{"id": 1, "stops": ["DEN"]}, {"id": 2, "stops": []}, {"id": 3}]"#;
    let output = run_pipeline_file(&file, input).unwrap();
    assert_eq!(
        records_to_json(&output),
        json!([{"id": 1, "stops": "DEN"}, {"id": 2, "stops": null}, {"id": 3, "stops": null}])
    );
}

#[test]
fn unwind_drops_empty_by_default() {
    let file = parse_pipeline_file("version: 1\npipeline: [{ $unwind: \"$stops\" }]\n").unwrap();
    let input = r#"[{"id": 1, "stops": ["DEN", "ORD"]}, {"id": 2, "stops": []}, {"id": 3, "stops": null}]"#;
    let output = run_pipeline_file(&file, input).unwrap();
    assert_eq!(
        records_to_json(&output),
        json!([{"id": 1, "stops": "DEN"}, {"id": 1, "stops": "ORD"}])
    );
}

#[test]
fn cancellation_through_compiled_file() {
    let file = parse_pipeline_file("version: 1\npipeline: [{ $match: { a: 1 } }]\n").unwrap();
    let pipeline = file.compile().unwrap();
    let records = read_records(r#"[{"a": 1}]"#, &InputSpec { format: InputFormat::Json, csv: None }).unwrap();
    let token = CancelToken::new();
    token.cancel();
    let err = pipeline
        .execute_with(records, &ExecOptions::default().with_cancel(token))
        .unwrap_err();
    assert_eq!(err.kind, ExecErrorKind::Cancelled);
}
