//! Postprocessor pipeline over single entities and collections.

use serde_json::Value;
use std::sync::Arc;

/// Pure transform applied to one serialized entity.
pub type Postprocessor = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Result of a CRUD operation: one entity or a sequence of entities.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Single(Value),
    Many(Vec<Value>),
}

impl Payload {
    pub fn into_value(self) -> Value {
        match self {
            Payload::Single(v) => v,
            Payload::Many(items) => Value::Array(items),
        }
    }
}

fn apply(postprocessors: &[Postprocessor], entity: Value) -> Value {
    postprocessors.iter().fold(entity, |acc, p| p(acc))
}

/// Apply `postprocessors` left to right, to each entity of a `Many` and once to a `Single`.
pub fn run_postprocessors(postprocessors: &[Postprocessor], payload: Payload) -> Payload {
    if postprocessors.is_empty() {
        return payload;
    }
    match payload {
        Payload::Single(v) => Payload::Single(apply(postprocessors, v)),
        Payload::Many(items) => Payload::Many(
            items
                .into_iter()
                .map(|v| apply(postprocessors, v))
                .collect(),
        ),
    }
}

/// Postprocessor that sets `name` to `value` on object entities.
pub fn add_field(name: impl Into<String>, value: Value) -> Postprocessor {
    let name = name.into();
    Arc::new(move |mut entity: Value| {
        if let Value::Object(map) = &mut entity {
            map.insert(name.clone(), value.clone());
        }
        entity
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn applies_to_each_entity_of_a_sequence() {
        let out = run_postprocessors(
            &[add_field("x", json!(1))],
            Payload::Many(vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]),
        );
        let Payload::Many(items) = out else {
            panic!("sequence in, sequence out");
        };
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|e| e["x"] == json!(1)));
    }

    #[test]
    fn single_entity_stays_single() {
        let out = run_postprocessors(&[add_field("x", json!(1))], Payload::Single(json!({"id": 1})));
        assert_eq!(out, Payload::Single(json!({"id": 1, "x": 1})));
    }

    #[test]
    fn runs_left_to_right() {
        let double: Postprocessor = Arc::new(|mut e: Value| {
            if let Some(n) = e["x"].as_i64() {
                e["x"] = json!(n * 2);
            }
            e
        });
        let out = run_postprocessors(
            &[add_field("x", json!(3)), double],
            Payload::Single(json!({})),
        );
        assert_eq!(out.into_value(), json!({"x": 6}));
    }
}
