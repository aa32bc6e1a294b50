//! Edge activation condition grammar (§4.3).
//!
//! A [`Condition`] gates an edge: it is evaluated against the edge's
//! projected test-context and never raises — any type mismatch, missing
//! variable, or unrecognized operator resolves to `false` (the spec's open
//! question: this is the Python source's behaviour, kept deliberately).

use crate::graph::Record;
use serde::{Deserialize, Serialize};

/// The closed set of comparison operators edge conditions may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "contains")]
    Contains,
}

/// `{var, op, value}` — compares the test-context's `var` entry against the
/// literal `value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub var: String,
    pub op: Op,
    pub value: serde_json::Value,
}

impl Condition {
    pub fn new(var: impl Into<String>, op: Op, value: serde_json::Value) -> Self {
        Self {
            var: var.into(),
            op,
            value,
        }
    }

    /// Evaluate against a projected test-context. Never returns an error;
    /// any failure mode (missing key, type mismatch, unrecognized op)
    /// evaluates to `false`.
    pub fn evaluate(&self, ctx: &Record) -> bool {
        let left = ctx.get(&self.var).unwrap_or(&serde_json::Value::Null);
        eval_op(self.op, left, &self.value)
    }
}

/// An edge with no condition is always activated; `Option<Condition>` is
/// evaluated through this helper so call sites don't special-case `None`.
pub fn evaluate_optional(cond: Option<&Condition>, ctx: &Record) -> bool {
    match cond {
        None => true,
        Some(c) => c.evaluate(ctx),
    }
}

fn eval_op(op: Op, left: &serde_json::Value, right: &serde_json::Value) -> bool {
    use serde_json::Value;
    match op {
        Op::Eq => left == right,
        Op::Ne => left != right,
        Op::Lt | Op::Le | Op::Gt | Op::Ge => match (as_f64(left), as_f64(right)) {
            (Some(l), Some(r)) => match op {
                Op::Lt => l < r,
                Op::Le => l <= r,
                Op::Gt => l > r,
                Op::Ge => l >= r,
                _ => unreachable!(),
            },
            _ => false,
        },
        Op::Contains => match left {
            Value::String(s) => right.as_str().is_some_and(|needle| s.contains(needle)),
            Value::Array(items) => items.contains(right),
            _ => false,
        },
    }
}

fn as_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn ctx_with(key: &str, value: serde_json::Value) -> Record {
        let mut m = Record::new();
        m.insert(key.to_string(), value);
        m
    }

    #[test]
    fn equality() {
        let c = Condition::new("status", Op::Eq, json!(200));
        assert!(c.evaluate(&ctx_with("status", json!(200))));
        assert!(!c.evaluate(&ctx_with("status", json!(404))));
    }

    #[test]
    fn inequality() {
        let c = Condition::new("status", Op::Ne, json!(200));
        assert!(c.evaluate(&ctx_with("status", json!(404))));
        assert!(!c.evaluate(&ctx_with("status", json!(200))));
    }

    #[test]
    fn numeric_comparisons() {
        let ctx = ctx_with("score", json!(7.5));
        assert!(Condition::new("score", Op::Gt, json!(5)).evaluate(&ctx));
        assert!(Condition::new("score", Op::Ge, json!(7.5)).evaluate(&ctx));
        assert!(Condition::new("score", Op::Lt, json!(10)).evaluate(&ctx));
        assert!(Condition::new("score", Op::Le, json!(7.5)).evaluate(&ctx));
        assert!(!Condition::new("score", Op::Gt, json!(100)).evaluate(&ctx));
    }

    #[test]
    fn non_numeric_comparison_is_false_not_error() {
        let ctx = ctx_with("name", json!("alice"));
        assert!(!Condition::new("name", Op::Gt, json!(5)).evaluate(&ctx));
        assert!(!Condition::new("name", Op::Lt, json!("bob")).evaluate(&ctx));
    }

    #[test]
    fn contains_on_string_and_array() {
        let ctx = ctx_with("text", json!("hello world"));
        assert!(Condition::new("text", Op::Contains, json!("world")).evaluate(&ctx));
        assert!(!Condition::new("text", Op::Contains, json!("xyz")).evaluate(&ctx));

        let ctx = ctx_with("tags", json!(["a", "b"]));
        assert!(Condition::new("tags", Op::Contains, json!("a")).evaluate(&ctx));
        assert!(!Condition::new("tags", Op::Contains, json!("z")).evaluate(&ctx));
    }

    #[test]
    fn contains_on_non_sequence_is_false() {
        let ctx = ctx_with("n", json!(42));
        assert!(!Condition::new("n", Op::Contains, json!(4)).evaluate(&ctx));
    }

    #[test]
    fn missing_variable_is_false_except_equals_null() {
        let ctx = Record::new();
        assert!(!Condition::new("missing", Op::Eq, json!(200)).evaluate(&ctx));
        assert!(Condition::new("missing", Op::Eq, serde_json::Value::Null).evaluate(&ctx));
    }

    #[test]
    fn no_condition_always_activates() {
        assert!(evaluate_optional(None, &Record::new()));
    }

    proptest! {
        /// No operator/operand pair ever panics, regardless of the
        /// variable's type or whether it's even present in the context.
        #[test]
        fn evaluate_never_panics(
            op_idx in 0usize..7,
            left in prop_oneof![
                any::<bool>().prop_map(|v| json!(v)),
                any::<i64>().prop_map(|v| json!(v)),
                any::<f64>().prop_map(|v| json!(v)),
                ".*".prop_map(|v| json!(v)),
                Just(serde_json::Value::Null),
            ],
            right in prop_oneof![
                any::<bool>().prop_map(|v| json!(v)),
                any::<i64>().prop_map(|v| json!(v)),
                any::<f64>().prop_map(|v| json!(v)),
                ".*".prop_map(|v| json!(v)),
                Just(serde_json::Value::Null),
            ],
        ) {
            let ops = [Op::Eq, Op::Ne, Op::Lt, Op::Le, Op::Gt, Op::Ge, Op::Contains];
            let cond = Condition::new("v", ops[op_idx], right);
            let _ = cond.evaluate(&ctx_with("v", left));
        }
    }
}
