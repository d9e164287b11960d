//! Stage model and compilation of single-key stage documents.

use serde_json::{Map, Value as JsonValue};

use crate::accumulator::AccumulatorOp;
use crate::error::ErrorCode;
use crate::expr::{Expr, ExprKind, Operator, Scope, compile_expr};
use crate::path::FieldPath;
use crate::validator::ValidationCtx;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(MatchStage),
    AddFields(AddFieldsStage),
    Project(ProjectStage),
    Group(GroupStage),
    Unwind(UnwindStage),
    Sort(SortStage),
    Limit(usize),
    Skip(usize),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::AddFields(_) => "$addFields",
            Stage::Project(_) => "$project",
            Stage::Group(_) => "$group",
            Stage::Unwind(_) => "$unwind",
            Stage::Sort(_) => "$sort",
            Stage::Limit(_) => "$limit",
            Stage::Skip(_) => "$skip",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchStage {
    pub predicate: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddFieldsStage {
    pub fields: Vec<(FieldPath, Expr)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectStage {
    Include {
        include_id: bool,
        fields: Vec<(FieldPath, Projection)>,
    },
    Exclude {
        fields: Vec<FieldPath>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Copy,
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupStage {
    pub key: Expr,
    pub accumulators: Vec<AccumulatorSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatorSpec {
    pub field: String,
    pub op: AccumulatorOp,
    pub expr: Expr,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnwindStage {
    pub path: FieldPath,
    /// `None` defers to the pipeline's `unwind_empty` option.
    pub preserve_empty: Option<bool>,
    pub include_array_index: Option<FieldPath>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub path: FieldPath,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortStage {
    pub keys: Vec<SortKey>,
}

// =============================================================================
// Compilation
// =============================================================================

pub fn compile_stage(value: &JsonValue, index: usize, ctx: &mut ValidationCtx) -> Option<Stage> {
    let base_path = format!("pipeline[{}]", index);
    let Some((name, spec)) = value.as_object().filter(|obj| obj.len() == 1).and_then(|obj| obj.iter().next())
    else {
        ctx.push(
            ErrorCode::InvalidStageSpec,
            "a stage must be an object with exactly one key",
            &base_path,
        );
        return None;
    };
    let path = format!("{}.{}", base_path, name);
    tracing::trace!(stage = %name, path = %path, "compiling stage");

    let errors_before = ctx.errors().len();
    let stage = match name.as_str() {
        "$match" => compile_match(spec, &path, ctx).map(Stage::Match),
        "$addFields" | "$set" => compile_add_fields(spec, &path, ctx).map(Stage::AddFields),
        "$project" => compile_project(spec, &path, ctx).map(Stage::Project),
        "$group" => compile_group(spec, &path, ctx).map(Stage::Group),
        "$unwind" => compile_unwind(spec, &path, ctx).map(Stage::Unwind),
        "$sort" => compile_sort(spec, &path, ctx).map(Stage::Sort),
        "$limit" => compile_count(spec, &path, 1, ctx).map(Stage::Limit),
        "$skip" => compile_count(spec, &path, 0, ctx).map(Stage::Skip),
        other => {
            ctx.push(
                ErrorCode::UnknownStage,
                format!("unknown stage: {}", other),
                &base_path,
            );
            None
        }
    };
    if ctx.errors().len() > errors_before {
        return None;
    }
    stage
}

fn spec_object<'a>(spec: &'a JsonValue, path: &str, ctx: &mut ValidationCtx) -> Option<&'a Map<String, JsonValue>> {
    let obj = spec.as_object();
    if obj.is_none() {
        ctx.push(ErrorCode::InvalidStageSpec, "stage document must be an object", path);
    }
    obj
}

fn parse_field_name(name: &str, path: &str, ctx: &mut ValidationCtx) -> Option<FieldPath> {
    match FieldPath::parse(name) {
        Ok(field) => Some(field),
        Err(err) => {
            ctx.push(ErrorCode::InvalidPath, format!("{}: {}", name, err), path);
            None
        }
    }
}

fn compile_count(spec: &JsonValue, path: &str, min: u64, ctx: &mut ValidationCtx) -> Option<usize> {
    let count = Value::from(spec).as_integral().and_then(|n| u64::try_from(n).ok());
    match count {
        Some(n) if n >= min => usize::try_from(n).ok(),
        _ => {
            ctx.push(
                ErrorCode::InvalidStageSpec,
                format!("expected an integer of at least {}, found {}", min, spec),
                path,
            );
            None
        }
    }
}

// -----------------------------------------------------------------------------
// $match
// -----------------------------------------------------------------------------

fn compile_match(spec: &JsonValue, path: &str, ctx: &mut ValidationCtx) -> Option<MatchStage> {
    let obj = spec_object(spec, path, ctx)?;
    let predicate = compile_query(obj, path, ctx);
    Some(MatchStage { predicate })
}

/// Compiles a query document into a predicate; top-level keys are and-ed.
fn compile_query(obj: &Map<String, JsonValue>, path: &str, ctx: &mut ValidationCtx) -> Expr {
    let mut clauses = Vec::with_capacity(obj.len());
    for (key, value) in obj {
        let clause_path = format!("{}.{}", path, key);
        let clause = match key.as_str() {
            "$and" | "$or" | "$nor" => compile_logical_query(key, value, &clause_path, ctx),
            "$expr" => compile_expr(value, &clause_path, &Scope::new(), ctx),
            other if other.starts_with('$') => {
                ctx.push(
                    ErrorCode::UnknownOperator,
                    format!("unknown top level query operator: {}", other),
                    &clause_path,
                );
                continue;
            }
            field => {
                let Some(field_path) = parse_field_name(field, &clause_path, ctx) else {
                    continue;
                };
                compile_field_query(field_path, value, &clause_path, ctx)
            }
        };
        clauses.push(clause);
    }
    conjunction(clauses, path)
}

fn conjunction(mut clauses: Vec<Expr>, path: &str) -> Expr {
    match clauses.len() {
        0 => Expr::literal(Value::Bool(true), path),
        1 => clauses.remove(0),
        _ => Expr::op(Operator::And, clauses, path),
    }
}

fn compile_logical_query(key: &str, value: &JsonValue, path: &str, ctx: &mut ValidationCtx) -> Expr {
    let Some(items) = value.as_array().filter(|items| !items.is_empty()) else {
        ctx.push(
            ErrorCode::InvalidArgs,
            format!("{} requires a non-empty array of queries", key),
            path,
        );
        return Expr::literal(Value::Bool(false), path);
    };
    let mut queries = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}[{}]", path, i);
        match item.as_object() {
            Some(sub) => queries.push(compile_query(sub, &item_path, ctx)),
            None => ctx.push(ErrorCode::InvalidArgs, "query must be an object", &item_path),
        }
    }
    match key {
        "$and" => Expr::op(Operator::And, queries, path),
        "$or" => Expr::op(Operator::Or, queries, path),
        _ => Expr::op(Operator::Not, vec![Expr::op(Operator::Or, queries, path)], path),
    }
}

/// `{field: literal}` is equality; `{field: {$op: v, ...}}` combines
/// comparison operators.
fn compile_field_query(field: FieldPath, value: &JsonValue, path: &str, ctx: &mut ValidationCtx) -> Expr {
    let field_expr = Expr::field(field, path);
    let operators = match value.as_object() {
        Some(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) => obj,
        Some(obj) if obj.keys().any(|k| k.starts_with('$')) => {
            ctx.push(
                ErrorCode::InvalidArgs,
                "query operators cannot be mixed with literal fields",
                path,
            );
            return Expr::literal(Value::Bool(false), path);
        }
        _ => {
            let literal = Expr::literal(Value::from(value), path);
            return Expr::op(Operator::Eq, vec![field_expr, literal], path);
        }
    };

    let mut clauses = Vec::with_capacity(operators.len());
    for (name, operand) in operators {
        let op_path = format!("{}.{}", path, name);
        let literal = Expr::literal(Value::from(operand), &op_path);
        let comparison = match name.as_str() {
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$in" | "$nin" => {
                if !operand.is_array() {
                    ctx.push(ErrorCode::InvalidArgs, format!("{} needs an array", name), &op_path);
                    continue;
                }
                let membership = Expr::op(Operator::In, vec![field_expr.clone(), literal], &op_path);
                if name == "$nin" {
                    clauses.push(Expr::op(Operator::Not, vec![membership], &op_path));
                } else {
                    clauses.push(membership);
                }
                continue;
            }
            other => {
                ctx.push(
                    ErrorCode::UnknownOperator,
                    format!("unknown query operator: {}", other),
                    &op_path,
                );
                continue;
            }
        };
        clauses.push(Expr::op(comparison, vec![field_expr.clone(), literal], &op_path));
    }
    conjunction(clauses, path)
}

// -----------------------------------------------------------------------------
// $addFields / $project
// -----------------------------------------------------------------------------

fn compile_add_fields(spec: &JsonValue, path: &str, ctx: &mut ValidationCtx) -> Option<AddFieldsStage> {
    let obj = spec_object(spec, path, ctx)?;
    if obj.is_empty() {
        ctx.push(ErrorCode::InvalidStageSpec, "stage document must have at least one field", path);
        return None;
    }
    let mut fields = Vec::with_capacity(obj.len());
    for (name, value) in obj {
        let field_path = format!("{}.{}", path, name);
        let Some(field) = parse_field_name(name, &field_path, ctx) else {
            continue;
        };
        fields.push((field, compile_expr(value, &field_path, &Scope::new(), ctx)));
    }
    Some(AddFieldsStage { fields })
}

/// `0`/`1`/`true`/`false` are projection flags; anything else is an expression.
fn projection_flag(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Number(_) => Some(Value::from(value).is_truthy()),
        _ => None,
    }
}

fn compile_project(spec: &JsonValue, path: &str, ctx: &mut ValidationCtx) -> Option<ProjectStage> {
    let obj = spec_object(spec, path, ctx)?;
    if obj.is_empty() {
        ctx.push(ErrorCode::InvalidStageSpec, "$project requires at least one output field", path);
        return None;
    }

    let mut include_id = true;
    let mut computed_id = None;
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for (name, value) in obj {
        let field_path = format!("{}.{}", path, name);
        if name == "_id" {
            match projection_flag(value) {
                Some(flag) => include_id = flag,
                None => computed_id = Some(compile_expr(value, &field_path, &Scope::new(), ctx)),
            }
            continue;
        }
        let Some(field) = parse_field_name(name, &field_path, ctx) else {
            continue;
        };
        match projection_flag(value) {
            Some(true) => included.push((field, Projection::Copy)),
            Some(false) => excluded.push(field),
            None => {
                let expr = compile_expr(value, &field_path, &Scope::new(), ctx);
                included.push((field, Projection::Computed(expr)));
            }
        }
    }

    if !included.is_empty() && !excluded.is_empty() {
        ctx.push(
            ErrorCode::InvalidStageSpec,
            "cannot mix inclusion and exclusion of fields other than _id",
            path,
        );
        return None;
    }

    if included.is_empty() && computed_id.is_none() && (!excluded.is_empty() || !include_id) {
        let mut fields = excluded;
        if !include_id {
            fields.insert(0, FieldPath::parse("_id").ok()?);
        }
        return Some(ProjectStage::Exclude { fields });
    }

    if let Some(expr) = computed_id {
        include_id = false;
        included.insert(0, (FieldPath::parse("_id").ok()?, Projection::Computed(expr)));
    }
    Some(ProjectStage::Include {
        include_id,
        fields: included,
    })
}

// -----------------------------------------------------------------------------
// $group
// -----------------------------------------------------------------------------

fn compile_group(spec: &JsonValue, path: &str, ctx: &mut ValidationCtx) -> Option<GroupStage> {
    let obj = spec_object(spec, path, ctx)?;
    let Some(key_spec) = obj.get("_id") else {
        ctx.push(ErrorCode::InvalidStageSpec, "a group stage must include an _id", path);
        return None;
    };
    let key = compile_expr(key_spec, &format!("{}._id", path), &Scope::new(), ctx);

    let mut accumulators = Vec::with_capacity(obj.len().saturating_sub(1));
    for (field, value) in obj.iter().filter(|(name, _)| name.as_str() != "_id") {
        let field_path = format!("{}.{}", path, field);
        if field.contains('.') || field.starts_with('$') {
            ctx.push(
                ErrorCode::InvalidStageSpec,
                format!("group field name '{}' cannot contain '.' or start with '$'", field),
                &field_path,
            );
            continue;
        }
        let acc = value
            .as_object()
            .filter(|acc| acc.len() == 1)
            .and_then(|acc| acc.iter().next());
        let Some((acc_name, operand)) = acc else {
            ctx.push(
                ErrorCode::InvalidStageSpec,
                format!("group field '{}' must be an accumulator object", field),
                &field_path,
            );
            continue;
        };
        let acc_path = format!("{}.{}", field_path, acc_name);
        let Some(op) = acc_name.strip_prefix('$').and_then(AccumulatorOp::from_name) else {
            ctx.push(
                ErrorCode::UnknownOperator,
                format!("unknown group operator: {}", acc_name),
                &acc_path,
            );
            continue;
        };
        let expr = if op.takes_operand() {
            compile_expr(operand, &acc_path, &Scope::new(), ctx)
        } else {
            if operand.as_object().is_none_or(|args| !args.is_empty()) {
                ctx.push(ErrorCode::InvalidArgs, "$count takes an empty object", &acc_path);
            }
            Expr::literal(Value::Null, &acc_path)
        };
        accumulators.push(AccumulatorSpec {
            field: field.clone(),
            op,
            expr,
            path: acc_path,
        });
    }
    Some(GroupStage { key, accumulators })
}

// -----------------------------------------------------------------------------
// $unwind / $sort
// -----------------------------------------------------------------------------

fn unwind_field(value: &JsonValue, path: &str, ctx: &mut ValidationCtx) -> Option<FieldPath> {
    let Some(field) = value.as_str().and_then(|s| s.strip_prefix('$')) else {
        ctx.push(
            ErrorCode::InvalidStageSpec,
            "$unwind path must be a string starting with '$'",
            path,
        );
        return None;
    };
    parse_field_name(field, path, ctx)
}

fn compile_unwind(spec: &JsonValue, path: &str, ctx: &mut ValidationCtx) -> Option<UnwindStage> {
    let Some(obj) = spec.as_object() else {
        return Some(UnwindStage {
            path: unwind_field(spec, path, ctx)?,
            preserve_empty: None,
            include_array_index: None,
        });
    };

    let mut field = None;
    let mut preserve_empty = None;
    let mut include_array_index = None;
    for (key, value) in obj {
        let key_path = format!("{}.{}", path, key);
        match key.as_str() {
            "path" => field = unwind_field(value, &key_path, ctx),
            "preserveNullAndEmptyArrays" => match value.as_bool() {
                Some(flag) => preserve_empty = Some(flag),
                None => ctx.push(ErrorCode::InvalidStageSpec, "expected a boolean", &key_path),
            },
            "includeArrayIndex" => match value.as_str() {
                Some(name) if !name.starts_with('$') => {
                    include_array_index = parse_field_name(name, &key_path, ctx);
                }
                _ => ctx.push(
                    ErrorCode::InvalidStageSpec,
                    "includeArrayIndex must be a field name without '$'",
                    &key_path,
                ),
            },
            other => ctx.push(
                ErrorCode::InvalidStageSpec,
                format!("unrecognized option to $unwind: {}", other),
                &key_path,
            ),
        }
    }
    let Some(field) = field else {
        if !obj.contains_key("path") {
            ctx.push(ErrorCode::InvalidStageSpec, "$unwind requires a path", path);
        }
        return None;
    };
    Some(UnwindStage {
        path: field,
        preserve_empty,
        include_array_index,
    })
}

fn compile_sort(spec: &JsonValue, path: &str, ctx: &mut ValidationCtx) -> Option<SortStage> {
    let obj = spec_object(spec, path, ctx)?;
    if obj.is_empty() {
        ctx.push(ErrorCode::InvalidStageSpec, "$sort requires at least one key", path);
        return None;
    }
    let mut keys = Vec::with_capacity(obj.len());
    for (name, value) in obj {
        let key_path = format!("{}.{}", path, name);
        let direction = match Value::from(value).as_integral() {
            Some(1) => SortDirection::Asc,
            Some(-1) => SortDirection::Desc,
            _ => {
                ctx.push(
                    ErrorCode::InvalidStageSpec,
                    format!("sort direction must be 1 or -1, found {}", value),
                    &key_path,
                );
                continue;
            }
        };
        if let Some(field) = parse_field_name(name, &key_path, ctx) {
            keys.push(SortKey { path: field, direction });
        }
    }
    Some(SortStage { keys })
}

/// Field paths read by a compiled expression, for diagnostics.
pub fn referenced_fields(expr: &Expr, out: &mut Vec<String>) {
    match &expr.kind {
        ExprKind::Field(field) => out.push(field.to_string()),
        ExprKind::Literal(_) | ExprKind::Variable { .. } => {}
        ExprKind::Array(items) => items.iter().for_each(|item| referenced_fields(item, out)),
        ExprKind::Object(fields) => fields.iter().for_each(|(_, e)| referenced_fields(e, out)),
        ExprKind::Op { args, .. } => args.iter().for_each(|arg| referenced_fields(arg, out)),
        ExprKind::Switch { branches, default } => {
            for branch in branches {
                referenced_fields(&branch.case, out);
                referenced_fields(&branch.then, out);
            }
            referenced_fields(default, out);
        }
        ExprKind::Let { bindings, body } => {
            bindings.iter().for_each(|(_, e)| referenced_fields(e, out));
            referenced_fields(body, out);
        }
    }
}

#[cfg(test)]
mod stage_tests {
    use super::*;
    use crate::error::SpecError;
    use serde_json::json;

    fn compile(doc: JsonValue) -> Result<Stage, Vec<SpecError>> {
        let mut ctx = ValidationCtx::new();
        let stage = compile_stage(&doc, 0, &mut ctx);
        match stage {
            Some(stage) => ctx.finish(stage),
            None => Err(ctx.finish(()).expect_err("a failed stage reports errors")),
        }
    }

    fn codes(doc: JsonValue) -> Vec<&'static str> {
        compile(doc)
            .expect_err("expected errors")
            .iter()
            .map(|err| err.code.as_str())
            .collect()
    }

    #[test]
    fn unknown_stage_is_rejected() {
        assert_eq!(codes(json!({"$lookup": {}})), vec!["UnknownStage"]);
        assert_eq!(codes(json!({"$match": {}, "$sort": {"a": 1}})), vec!["InvalidStageSpec"]);
    }

    #[test]
    fn match_query_compiles_field_operators() {
        let stage = compile(json!({"$match": {"year": 2020, "arr_delay": {"$gt": 0}}})).unwrap();
        let Stage::Match(MatchStage { predicate }) = stage else {
            panic!("expected match");
        };
        let ExprKind::Op { op: Operator::And, args } = &predicate.kind else {
            panic!("expected implicit and");
        };
        assert_eq!(args.len(), 2);
        let mut fields = Vec::new();
        referenced_fields(&predicate, &mut fields);
        assert_eq!(fields, vec!["year", "arr_delay"]);
    }

    #[test]
    fn match_rejects_unknown_query_operator() {
        assert_eq!(codes(json!({"$match": {"a": {"$regex": "x"}}})), vec!["UnknownOperator"]);
        assert_eq!(codes(json!({"$match": {"$where": "x"}})), vec!["UnknownOperator"]);
        assert_eq!(codes(json!({"$match": {"a": {"$in": 3}}})), vec!["InvalidArgs"]);
    }

    #[test]
    fn project_modes() {
        let stage = compile(json!({"$project": {"_id": 0, "airline": "$_id", "n": 1}})).unwrap();
        let Stage::Project(ProjectStage::Include { include_id, fields }) = stage else {
            panic!("expected inclusion");
        };
        assert!(!include_id);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].1, Projection::Copy);

        let stage = compile(json!({"$project": {"_id": 0, "tmp": 0}})).unwrap();
        let Stage::Project(ProjectStage::Exclude { fields }) = stage else {
            panic!("expected exclusion");
        };
        let names: Vec<String> = fields.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["_id", "tmp"]);
    }

    #[test]
    fn project_rejects_mixed_and_empty() {
        assert_eq!(codes(json!({"$project": {"a": 1, "b": 0}})), vec!["InvalidStageSpec"]);
        assert_eq!(codes(json!({"$project": {}})), vec!["InvalidStageSpec"]);
    }

    #[test]
    fn group_requires_id_and_known_accumulators() {
        assert_eq!(codes(json!({"$group": {"n": {"$sum": 1}}})), vec!["InvalidStageSpec"]);
        assert_eq!(
            codes(json!({"$group": {"_id": "$a", "n": {"$median": "$x"}}})),
            vec!["UnknownOperator"]
        );
        assert_eq!(
            codes(json!({"$group": {"_id": "$a", "a.b": {"$sum": 1}}})),
            vec!["InvalidStageSpec"]
        );
        assert_eq!(
            codes(json!({"$group": {"_id": "$a", "n": {"$count": 1}}})),
            vec!["InvalidArgs"]
        );
    }

    #[test]
    fn group_accumulators_keep_declaration_order() {
        let doc = json!({"$group": {
            "_id": {"airline": "$carrier.airline", "year": "$year"},
            "flights": {"$count": {}},
            "delay": {"$avg": "$arr_delay"},
            "codes": {"$push": "$dest.code"}
        }});
        let Stage::Group(group) = compile(doc).unwrap() else {
            panic!("expected group");
        };
        let names: Vec<&str> = group.accumulators.iter().map(|acc| acc.field.as_str()).collect();
        assert_eq!(names, vec!["flights", "delay", "codes"]);
        assert_eq!(group.accumulators[1].path, "pipeline[0].$group.delay.$avg");
    }

    #[test]
    fn unwind_forms() {
        let stage = compile(json!({"$unwind": "$items"})).unwrap();
        assert!(matches!(stage, Stage::Unwind(UnwindStage { preserve_empty: None, .. })));
        let stage = compile(json!({"$unwind": {
            "path": "$items", "preserveNullAndEmptyArrays": true, "includeArrayIndex": "idx"
        }}))
        .unwrap();
        let Stage::Unwind(unwind) = stage else {
            panic!("expected unwind");
        };
        assert_eq!(unwind.preserve_empty, Some(true));
        assert_eq!(unwind.include_array_index.map(|p| p.to_string()), Some("idx".to_string()));
        assert_eq!(codes(json!({"$unwind": "items"})), vec!["InvalidStageSpec"]);
        assert_eq!(codes(json!({"$unwind": {"preserveNullAndEmptyArrays": true}})), vec!["InvalidStageSpec"]);
    }

    #[test]
    fn sort_validation() {
        let Stage::Sort(sort) = compile(json!({"$sort": {"year": 1, "pct": -1}})).unwrap() else {
            panic!("expected sort");
        };
        assert_eq!(sort.keys[1].direction, SortDirection::Desc);
        assert_eq!(codes(json!({"$sort": {}})), vec!["InvalidStageSpec"]);
        assert_eq!(codes(json!({"$sort": {"a": 2}})), vec!["InvalidStageSpec"]);
    }

    #[test]
    fn limit_and_skip_bounds() {
        assert_eq!(compile(json!({"$limit": 5})).unwrap(), Stage::Limit(5));
        assert_eq!(compile(json!({"$skip": 0})).unwrap(), Stage::Skip(0));
        assert_eq!(codes(json!({"$limit": 0})), vec!["InvalidStageSpec"]);
        assert_eq!(codes(json!({"$skip": -1})), vec!["InvalidStageSpec"]);
    }

    #[test]
    fn set_is_an_alias_of_add_fields() {
        let stage = compile(json!({"$set": {"dest.code": "$code"}})).unwrap();
        assert_eq!(stage.name(), "$addFields");
    }
}
