use std::cmp::Ordering;

use serde_json::Value;

use crate::EntityRecord;

/// Comparison operator of a single filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    /// Case-insensitive substring match.
    Ilike,
    /// Membership in a list of candidate values.
    In,
    Gt,
    Ge,
    Lt,
    Le,
    /// Field is present with a truthy value.
    IsSet,
    /// Field is absent, null or false.
    IsNotSet,
}

/// The entity store's native query predicate form.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every record.
    True,
    Cmp {
        field: String,
        op: CmpOp,
        value: Value,
    },
    And(Vec<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    /// Conjunction of `parts`, dropping trivial members.
    pub fn all(parts: Vec<Predicate>) -> Predicate {
        let mut parts: Vec<Predicate> = parts
            .into_iter()
            .filter(|p| !matches!(p, Predicate::True))
            .collect();
        match parts.len() {
            0 => Predicate::True,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    /// Evaluates the predicate against a record.
    pub fn matches(&self, record: &EntityRecord) -> bool {
        match self {
            Predicate::True => true,
            Predicate::And(parts) => parts.iter().all(|p| p.matches(record)),
            Predicate::Or(left, right) => left.matches(record) || right.matches(record),
            Predicate::Cmp { field, op, value } => {
                let actual = lookup(record, field);
                match op {
                    CmpOp::Eq => actual.map(|a| values_equal(a, value)).unwrap_or(false),
                    CmpOp::Ne => actual.map(|a| !values_equal(a, value)).unwrap_or(true),
                    CmpOp::Ilike => actual.map(|a| ilike(a, value)).unwrap_or(false),
                    CmpOp::In => actual
                        .map(|a| match value {
                            Value::Array(candidates) => {
                                candidates.iter().any(|c| values_equal(a, c))
                            }
                            _ => false,
                        })
                        .unwrap_or(false),
                    CmpOp::Gt => cmp_is(actual, value, |o| o == Ordering::Greater),
                    CmpOp::Ge => cmp_is(actual, value, |o| o != Ordering::Less),
                    CmpOp::Lt => cmp_is(actual, value, |o| o == Ordering::Less),
                    CmpOp::Le => cmp_is(actual, value, |o| o != Ordering::Greater),
                    CmpOp::IsSet => actual.map(is_truthy).unwrap_or(false),
                    CmpOp::IsNotSet => !actual.map(is_truthy).unwrap_or(false),
                }
            }
        }
    }
}

/// Resolves a dotted field path against a record, descending into nested
/// objects.
fn lookup<'a>(record: &'a EntityRecord, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Value equality with numeric coercion, so `1` and `1.0` compare equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => a.as_f64().zip(b.as_f64()).and_then(|(x, y)| x.partial_cmp(&y)),
    }
}

fn cmp_is<F>(actual: Option<&Value>, expected: &Value, pred: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    actual
        .and_then(|a| ordering(a, expected))
        .map(pred)
        .unwrap_or(false)
}

fn ilike(actual: &Value, needle: &Value) -> bool {
    match (actual.as_str(), needle.as_str()) {
        (Some(haystack), Some(needle)) => {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        }
        _ => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> EntityRecord {
        value.as_object().unwrap().clone()
    }

    fn clause(field: &str, op: CmpOp, value: Value) -> Predicate {
        Predicate::Cmp {
            field: field.to_string(),
            op,
            value,
        }
    }

    #[test]
    fn test_eq_with_numeric_coercion() {
        let rec = record(json!({"id": 7, "name": "Ann"}));
        assert!(clause("id", CmpOp::Eq, json!(7.0)).matches(&rec));
        assert!(clause("name", CmpOp::Eq, json!("Ann")).matches(&rec));
        assert!(!clause("name", CmpOp::Eq, json!("Bob")).matches(&rec));
    }

    #[test]
    fn test_ne_matches_on_absent_field() {
        let rec = record(json!({"id": 1}));
        assert!(clause("name", CmpOp::Ne, json!("Ann")).matches(&rec));
    }

    #[test]
    fn test_ilike_is_case_insensitive_substring() {
        let rec = record(json!({"name": "Annabel Lee"}));
        assert!(clause("name", CmpOp::Ilike, json!("ABEL")).matches(&rec));
        assert!(!clause("name", CmpOp::Ilike, json!("xyz")).matches(&rec));
    }

    #[test]
    fn test_in_membership() {
        let rec = record(json!({"stage": "won"}));
        assert!(clause("stage", CmpOp::In, json!(["new", "won"])).matches(&rec));
        assert!(!clause("stage", CmpOp::In, json!(["lost"])).matches(&rec));
    }

    #[test]
    fn test_comparisons_on_numbers_and_strings() {
        let rec = record(json!({"age": 30, "name": "carol"}));
        assert!(clause("age", CmpOp::Gt, json!(29)).matches(&rec));
        assert!(clause("age", CmpOp::Le, json!(30)).matches(&rec));
        assert!(clause("name", CmpOp::Lt, json!("dave")).matches(&rec));
        // Mixed types never match.
        assert!(!clause("age", CmpOp::Gt, json!("abc")).matches(&rec));
    }

    #[test]
    fn test_is_set_semantics() {
        let rec = record(json!({"email": "a@b.c", "phone": null, "active": false}));
        assert!(clause("email", CmpOp::IsSet, Value::Null).matches(&rec));
        assert!(!clause("phone", CmpOp::IsSet, Value::Null).matches(&rec));
        assert!(clause("phone", CmpOp::IsNotSet, Value::Null).matches(&rec));
        assert!(clause("active", CmpOp::IsNotSet, Value::Null).matches(&rec));
        assert!(clause("missing", CmpOp::IsNotSet, Value::Null).matches(&rec));
    }

    #[test]
    fn test_dotted_path_descends_nested_objects() {
        let rec = record(json!({"department": {"name": "Sales"}}));
        assert!(clause("department.name", CmpOp::Eq, json!("Sales")).matches(&rec));
        assert!(!clause("department.code", CmpOp::Eq, json!("S")).matches(&rec));
    }

    #[test]
    fn test_and_or_composition() {
        let rec = record(json!({"a": 1, "b": 2}));
        let both = Predicate::all(vec![
            clause("a", CmpOp::Eq, json!(1)),
            clause("b", CmpOp::Eq, json!(2)),
        ]);
        assert!(both.matches(&rec));

        let either = Predicate::Or(
            Box::new(clause("a", CmpOp::Eq, json!(9))),
            Box::new(clause("b", CmpOp::Eq, json!(2))),
        );
        assert!(either.matches(&rec));
    }

    #[test]
    fn test_all_collapses_trivial_members() {
        assert_eq!(Predicate::all(vec![]), Predicate::True);
        let single = Predicate::all(vec![Predicate::True, clause("a", CmpOp::Eq, json!(1))]);
        assert!(matches!(single, Predicate::Cmp { .. }));
    }
}
