use serde_json::Value;

use crate::domain::{CmpOp, Predicate};
use crate::{Error, Result, NAME_SEARCH_FIELDS};

/// The closed operator whitelist. Anything else is rejected before the
/// entity store is ever consulted.
const OPERATORS: &[(&str, CmpOp)] = &[
    ("=", CmpOp::Eq),
    ("!=", CmpOp::Ne),
    ("ilike", CmpOp::Ilike),
    ("in", CmpOp::In),
    (">", CmpOp::Gt),
    (">=", CmpOp::Ge),
    ("<", CmpOp::Lt),
    ("<=", CmpOp::Le),
    ("set", CmpOp::IsSet),
    ("not set", CmpOp::IsNotSet),
];

/// Compiles a domain token stream into a [`Predicate`].
///
/// The grammar is prefix boolean notation: a `"|"` (or `"&"`) marker takes
/// the next two terms as operands, a `[field, operator, value]` triple is a
/// leaf clause, and top-level terms are joined by implicit AND.
pub fn compile_domain(tokens: &[Value]) -> Result<Predicate> {
    let mut terms = Vec::new();
    let mut pos = 0;
    while pos < tokens.len() {
        let (term, next) = parse_term(tokens, pos)?;
        terms.push(term);
        pos = next;
    }
    Ok(Predicate::all(terms))
}

/// Builds the implicit free-text predicate: prefix-OR of `ilike` clauses
/// across the fixed name-like field set.
pub fn search_predicate(text: &str) -> Predicate {
    let mut fields = NAME_SEARCH_FIELDS.iter().rev();
    // Non-empty by construction.
    let first = ilike_clause(fields.next().unwrap_or(&"name"), text);
    fields.fold(first, |acc, field| {
        Predicate::Or(Box::new(ilike_clause(field, text)), Box::new(acc))
    })
}

fn ilike_clause(field: &str, text: &str) -> Predicate {
    Predicate::Cmp {
        field: field.to_string(),
        op: CmpOp::Ilike,
        value: Value::String(text.to_string()),
    }
}

fn parse_term(tokens: &[Value], pos: usize) -> Result<(Predicate, usize)> {
    match &tokens[pos] {
        Value::String(marker) if marker == "|" || marker == "&" => {
            if pos + 2 >= tokens.len() {
                return Err(Error::BadRequest(format!(
                    "domain operator '{}' is missing an operand",
                    marker
                )));
            }
            let (left, after_left) = parse_term(tokens, pos + 1)?;
            let (right, after_right) = parse_term(tokens, after_left)?;
            let term = if marker == "|" {
                Predicate::Or(Box::new(left), Box::new(right))
            } else {
                Predicate::all(vec![left, right])
            };
            Ok((term, after_right))
        }
        Value::Array(items) => Ok((compile_clause(items)?, pos + 1)),
        other => Err(Error::BadRequest(format!(
            "invalid domain token: {}",
            other
        ))),
    }
}

fn compile_clause(items: &[Value]) -> Result<Predicate> {
    if items.len() != 3 {
        return Err(Error::BadRequest(
            "domain clause must be a [field, operator, value] triple".to_string(),
        ));
    }
    let field = items[0]
        .as_str()
        .ok_or_else(|| Error::BadRequest("domain field must be a string".to_string()))?;
    if !valid_field_path(field) {
        return Err(Error::BadRequest(format!(
            "invalid field path: '{}'",
            field
        )));
    }
    let op_name = items[1]
        .as_str()
        .ok_or_else(|| Error::BadRequest("domain operator must be a string".to_string()))?;
    let op = OPERATORS
        .iter()
        .find(|(name, _)| *name == op_name)
        .map(|(_, op)| *op)
        .ok_or_else(|| Error::BadRequest(format!("operator '{}' is not allowed", op_name)))?;
    let value = items[2].clone();
    if op == CmpOp::In && !value.is_array() {
        return Err(Error::BadRequest(
            "'in' operator requires a list value".to_string(),
        ));
    }
    Ok(Predicate::Cmp {
        field: field.to_string(),
        op,
        value,
    })
}

/// Field paths are dot-separated identifiers. Anything else is rejected so
/// the domain language cannot smuggle arbitrary query fragments through.
fn valid_field_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::EntityRecord;

    fn record(value: Value) -> EntityRecord {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_empty_domain_matches_everything() {
        let p = compile_domain(&[]).unwrap();
        assert_eq!(p, Predicate::True);
    }

    #[test]
    fn test_plain_clauses_join_with_and() {
        let tokens = vec![json!(["active", "=", true]), json!(["age", ">", 18])];
        let p = compile_domain(&tokens).unwrap();
        assert!(p.matches(&record(json!({"active": true, "age": 30}))));
        assert!(!p.matches(&record(json!({"active": true, "age": 10}))));
    }

    #[test]
    fn test_prefix_or_takes_two_operands() {
        let tokens = vec![
            json!("|"),
            json!(["name", "ilike", "ann"]),
            json!(["name", "ilike", "bob"]),
        ];
        let p = compile_domain(&tokens).unwrap();
        assert!(p.matches(&record(json!({"name": "Annabel"}))));
        assert!(p.matches(&record(json!({"name": "Bobby"}))));
        assert!(!p.matches(&record(json!({"name": "Carol"}))));
    }

    #[test]
    fn test_or_precedence_against_trailing_and() {
        // ['|', a, b, c]  ==  (a OR b) AND c
        let tokens = vec![
            json!("|"),
            json!(["name", "ilike", "ann"]),
            json!(["name", "ilike", "bob"]),
            json!(["active", "=", true]),
        ];
        let p = compile_domain(&tokens).unwrap();
        assert!(p.matches(&record(json!({"name": "Ann", "active": true}))));
        assert!(!p.matches(&record(json!({"name": "Ann", "active": false}))));
        assert!(!p.matches(&record(json!({"name": "Carol", "active": true}))));
    }

    #[test]
    fn test_chained_prefix_or_spans_three_clauses() {
        // ['|', '|', a, b, c]  ==  a OR b OR c
        let tokens = vec![
            json!("|"),
            json!("|"),
            json!(["name", "ilike", "a"]),
            json!(["name", "ilike", "b"]),
            json!(["name", "ilike", "c"]),
        ];
        let p = compile_domain(&tokens).unwrap();
        for name in ["alpha", "beta", "charlie"] {
            assert!(p.matches(&record(json!({ "name": name }))), "{}", name);
        }
        assert!(!p.matches(&record(json!({"name": "delta"}))));
    }

    #[test]
    fn test_explicit_and_marker() {
        let tokens = vec![
            json!("&"),
            json!(["a", "=", 1]),
            json!(["b", "=", 2]),
        ];
        let p = compile_domain(&tokens).unwrap();
        assert!(p.matches(&record(json!({"a": 1, "b": 2}))));
        assert!(!p.matches(&record(json!({"a": 1, "b": 3}))));
    }

    #[test]
    fn test_unlisted_operator_is_rejected() {
        let tokens = vec![json!(["id", "child_of", 3])];
        let err = compile_domain(&tokens).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert!(err.to_string().contains("child_of"));
    }

    #[test]
    fn test_dangling_or_marker_is_rejected() {
        let tokens = vec![json!("|"), json!(["a", "=", 1])];
        assert!(matches!(
            compile_domain(&tokens),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_malformed_clause_shapes_are_rejected() {
        for tokens in [
            vec![json!(["only_field"])],
            vec![json!([1, "=", 2])],
            vec![json!(["f", 42, 2])],
            vec![json!(["f", "in", 5])],
            vec![json!(42)],
        ] {
            assert!(
                matches!(compile_domain(&tokens), Err(Error::BadRequest(_))),
                "{:?}",
                tokens
            );
        }
    }

    #[test]
    fn test_hostile_field_paths_are_rejected() {
        for field in ["", "1name", "a b", "a;drop", "a..b", ".a"] {
            let tokens = vec![json!([field, "=", 1])];
            assert!(
                matches!(compile_domain(&tokens), Err(Error::BadRequest(_))),
                "{}",
                field
            );
        }
    }

    #[test]
    fn test_search_predicate_fans_out_over_name_fields() {
        let p = search_predicate("ann");
        assert!(p.matches(&record(json!({"name": "Annabel"}))));
        assert!(p.matches(&record(json!({"display_name": "ANN Smith"}))));
        assert!(!p.matches(&record(json!({"email": "ann@x.io"}))));
    }
}
