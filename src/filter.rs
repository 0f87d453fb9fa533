//! Composable boolean filter trees for metric queries.
//!
//! A filter is one of three shapes:
//!
//!   field     `{"op":"EQ","field":"metric.topic","value":"orders"}`
//!   compound  `{"op":"AND","filters":[...]}`
//!   unary     `{"op":"NOT","filter":{...}}`
//!
//! Combining never nests a same-operator group needlessly:
//!   and([a, b]).and([c])  → AND(a, b, c)
//!   or([a, b]).and([c])   → AND(OR(a, b), c)

use serde::{Deserialize, Serialize};

use crate::labels::Label;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOp {
    #[serde(rename = "EQ")]
    Eq,
    #[serde(rename = "GT")]
    Gt,
    #[serde(rename = "GTE")]
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundOp {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "NOT")]
    Not,
}

/// Leaf predicate comparing one label to a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub op: FieldOp,
    pub field: Label,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundFilter {
    pub op: CompoundOp,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryFilter {
    pub op: UnaryOp,
    pub filter: Box<Filter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Field(FieldFilter),
    Compound(CompoundFilter),
    Unary(UnaryFilter),
}

impl CompoundFilter {
    /// Append children to this group in place.
    pub fn add(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.filters.extend(filters);
        self
    }
}

impl Filter {
    /// AND this filter with `filters`, appending to an existing AND group.
    pub fn and(self, filters: impl IntoIterator<Item = Filter>) -> Filter {
        self.combine(CompoundOp::And, filters)
    }

    /// OR this filter with `filters`, appending to an existing OR group.
    pub fn or(self, filters: impl IntoIterator<Item = Filter>) -> Filter {
        self.combine(CompoundOp::Or, filters)
    }

    pub fn not(self) -> Filter {
        not(self)
    }

    fn combine(self, op: CompoundOp, filters: impl IntoIterator<Item = Filter>) -> Filter {
        let group = match self {
            Filter::Compound(c) if c.op == op => c,
            other => CompoundFilter {
                op,
                filters: vec![other],
            },
        };
        Filter::Compound(group.add(filters))
    }

    pub fn and_equal_to(self, field: Label, value: impl Into<String>) -> Filter {
        self.and([equal_to(field, value)])
    }

    pub fn and_not_equal_to(self, field: Label, value: impl Into<String>) -> Filter {
        self.and([not_equal_to(field, value)])
    }

    pub fn and_greater_than(self, field: Label, value: impl Into<String>) -> Filter {
        self.and([greater_than(field, value)])
    }

    pub fn and_not_greater_than(self, field: Label, value: impl Into<String>) -> Filter {
        self.and([not_greater_than(field, value)])
    }

    pub fn and_greater_than_or_equal_to(self, field: Label, value: impl Into<String>) -> Filter {
        self.and([greater_than_or_equal_to(field, value)])
    }

    pub fn and_not_greater_than_or_equal_to(
        self,
        field: Label,
        value: impl Into<String>,
    ) -> Filter {
        self.and([not_greater_than_or_equal_to(field, value)])
    }

    pub fn or_equal_to(self, field: Label, value: impl Into<String>) -> Filter {
        self.or([equal_to(field, value)])
    }

    pub fn or_not_equal_to(self, field: Label, value: impl Into<String>) -> Filter {
        self.or([not_equal_to(field, value)])
    }

    pub fn or_greater_than(self, field: Label, value: impl Into<String>) -> Filter {
        self.or([greater_than(field, value)])
    }

    pub fn or_not_greater_than(self, field: Label, value: impl Into<String>) -> Filter {
        self.or([not_greater_than(field, value)])
    }

    pub fn or_greater_than_or_equal_to(self, field: Label, value: impl Into<String>) -> Filter {
        self.or([greater_than_or_equal_to(field, value)])
    }

    pub fn or_not_greater_than_or_equal_to(
        self,
        field: Label,
        value: impl Into<String>,
    ) -> Filter {
        self.or([not_greater_than_or_equal_to(field, value)])
    }

    /// Number of leaf predicates in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Filter::Field(_) => 1,
            Filter::Compound(c) => c.filters.iter().map(Filter::leaf_count).sum(),
            Filter::Unary(u) => u.filter.leaf_count(),
        }
    }
}

impl From<FieldFilter> for Filter {
    fn from(f: FieldFilter) -> Self {
        Filter::Field(f)
    }
}

impl From<CompoundFilter> for Filter {
    fn from(f: CompoundFilter) -> Self {
        Filter::Compound(f)
    }
}

impl From<UnaryFilter> for Filter {
    fn from(f: UnaryFilter) -> Self {
        Filter::Unary(f)
    }
}

/// Human-readable rendering, used in logs.
impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::Field(field) => {
                let op = match field.op {
                    FieldOp::Eq => "=",
                    FieldOp::Gt => ">",
                    FieldOp::Gte => ">=",
                };
                write!(f, "{} {op} {:?}", field.field, field.value)
            }
            Filter::Compound(c) => {
                let sep = match c.op {
                    CompoundOp::And => " AND ",
                    CompoundOp::Or => " OR ",
                };
                let parts: Vec<String> = c.filters.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(sep))
            }
            Filter::Unary(u) => write!(f, "NOT {}", u.filter),
        }
    }
}

fn field(op: FieldOp, field: Label, value: impl Into<String>) -> Filter {
    Filter::Field(FieldFilter {
        op,
        field,
        value: value.into(),
    })
}

pub fn equal_to(field_label: Label, value: impl Into<String>) -> Filter {
    field(FieldOp::Eq, field_label, value)
}

pub fn greater_than(field_label: Label, value: impl Into<String>) -> Filter {
    field(FieldOp::Gt, field_label, value)
}

pub fn greater_than_or_equal_to(field_label: Label, value: impl Into<String>) -> Filter {
    field(FieldOp::Gte, field_label, value)
}

pub fn not_equal_to(field_label: Label, value: impl Into<String>) -> Filter {
    not(equal_to(field_label, value))
}

pub fn not_greater_than(field_label: Label, value: impl Into<String>) -> Filter {
    not(greater_than(field_label, value))
}

pub fn not_greater_than_or_equal_to(field_label: Label, value: impl Into<String>) -> Filter {
    not(greater_than_or_equal_to(field_label, value))
}

/// Wrap in a fresh NOT node. Double negation is kept as written.
pub fn not(filter: Filter) -> Filter {
    Filter::Unary(UnaryFilter {
        op: UnaryOp::Not,
        filter: Box::new(filter),
    })
}

pub fn and(filters: impl IntoIterator<Item = Filter>) -> Filter {
    Filter::Compound(CompoundFilter {
        op: CompoundOp::And,
        filters: filters.into_iter().collect(),
    })
}

pub fn or(filters: impl IntoIterator<Item = Filter>) -> Filter {
    Filter::Compound(CompoundFilter {
        op: CompoundOp::Or,
        filters: filters.into_iter().collect(),
    })
}

pub fn all_of(filters: impl IntoIterator<Item = Filter>) -> Filter {
    and(filters)
}

pub fn any_of(filters: impl IntoIterator<Item = Filter>) -> Filter {
    or(filters)
}

pub fn one_of(filters: impl IntoIterator<Item = Filter>) -> Filter {
    or(filters)
}

pub fn not_any_of(filters: impl IntoIterator<Item = Filter>) -> Filter {
    not(or(filters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{KAFKA_ID, PARTITION, TOPIC};

    fn children(filter: &Filter) -> (CompoundOp, &[Filter]) {
        match filter {
            Filter::Compound(c) => (c.op, c.filters.as_slice()),
            other => panic!("expected compound, got {other:?}"),
        }
    }

    #[test]
    fn and_flattens_into_existing_and_group() {
        let f = and([equal_to(TOPIC, "a"), equal_to(TOPIC, "b")]).and([equal_to(TOPIC, "c")]);
        let (op, kids) = children(&f);
        assert_eq!(op, CompoundOp::And);
        assert_eq!(kids.len(), 3);
        assert!(kids.iter().all(|k| matches!(k, Filter::Field(_))));

        let json = serde_json::to_string(&f).unwrap();
        assert_eq!(
            json,
            r#"{"op":"AND","filters":[{"op":"EQ","field":"metric.topic","value":"a"},{"op":"EQ","field":"metric.topic","value":"b"},{"op":"EQ","field":"metric.topic","value":"c"}]}"#
        );
    }

    #[test]
    fn and_on_or_group_nests_instead_of_flattening() {
        let f = or([equal_to(TOPIC, "a"), equal_to(TOPIC, "b")]).and([equal_to(TOPIC, "c")]);
        let (op, kids) = children(&f);
        assert_eq!(op, CompoundOp::And);
        assert_eq!(kids.len(), 2);

        let (inner_op, inner) = children(&kids[0]);
        assert_eq!(inner_op, CompoundOp::Or);
        assert_eq!(inner.len(), 2);
        assert_eq!(kids[1], equal_to(TOPIC, "c"));
    }

    #[test]
    fn or_flattens_symmetrically() {
        let f = or([equal_to(TOPIC, "a")])
            .or_equal_to(TOPIC, "b")
            .or([equal_to(TOPIC, "c")]);
        let (op, kids) = children(&f);
        assert_eq!(op, CompoundOp::Or);
        assert_eq!(kids.len(), 3);
    }

    #[test]
    fn field_and_creates_new_group_with_receiver_first() {
        let f = equal_to(KAFKA_ID, "lkc-1").and_equal_to(TOPIC, "orders");
        let (op, kids) = children(&f);
        assert_eq!(op, CompoundOp::And);
        assert_eq!(kids[0], equal_to(KAFKA_ID, "lkc-1"));
        assert_eq!(kids[1], equal_to(TOPIC, "orders"));
    }

    #[test]
    fn unary_and_creates_new_group() {
        let f = not_equal_to(TOPIC, "a").and_greater_than(PARTITION, "3");
        let (op, kids) = children(&f);
        assert_eq!(op, CompoundOp::And);
        assert!(matches!(kids[0], Filter::Unary(_)));
        assert!(matches!(kids[1], Filter::Field(FieldFilter { op: FieldOp::Gt, .. })));
    }

    #[test]
    fn double_negation_is_not_collapsed() {
        let f = not(not(equal_to(TOPIC, "a")));
        match &f {
            Filter::Unary(outer) => assert!(matches!(*outer.filter, Filter::Unary(_))),
            other => panic!("expected unary, got {other:?}"),
        }
        assert_eq!(
            serde_json::to_string(&f).unwrap(),
            r#"{"op":"NOT","filter":{"op":"NOT","filter":{"op":"EQ","field":"metric.topic","value":"a"}}}"#
        );
    }

    #[test]
    fn negated_helpers_wrap_in_not() {
        for f in [
            not_equal_to(TOPIC, "a"),
            not_greater_than(TOPIC, "a"),
            not_greater_than_or_equal_to(TOPIC, "a"),
            not_any_of([equal_to(TOPIC, "a")]),
        ] {
            assert!(matches!(f, Filter::Unary(_)));
        }
        assert_eq!(any_of([equal_to(TOPIC, "a")]), one_of([equal_to(TOPIC, "a")]));
        assert_eq!(all_of([equal_to(TOPIC, "a")]), and([equal_to(TOPIC, "a")]));
    }

    #[test]
    fn deserializes_every_shape() {
        let f = and([
            equal_to(KAFKA_ID, "lkc-1"),
            or([greater_than(PARTITION, "1"), greater_than_or_equal_to(PARTITION, "5")]),
            not(equal_to(TOPIC, "internal")),
        ]);
        let json = serde_json::to_string(&f).unwrap();
        let back: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
        assert_eq!(back.leaf_count(), 4);
    }

    #[test]
    fn display_renders_readable_expression() {
        let f = or([equal_to(TOPIC, "a"), equal_to(TOPIC, "b")]).and_not_equal_to(KAFKA_ID, "x");
        assert_eq!(
            f.to_string(),
            r#"((metric.topic = "a" OR metric.topic = "b") AND NOT kafka.id = "x")"#
        );
    }
}
