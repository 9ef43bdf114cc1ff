use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};

use crate::config::BodyTemplate;

pub const RANDOM_STRING: &str = "{{random_string}}";
pub const RANDOM_INT: &str = "{{random_int}}";
pub const RANDOM_FLOAT: &str = "{{random_float}}";

const RANDOM_STRING_LEN: usize = 10;

/// Resolve one template value. Strings that are not a placeholder token and
/// all non-string values are returned unchanged.
pub fn resolve_value<R: Rng + ?Sized>(value: &Value, rng: &mut R) -> Value {
    let Value::String(token) = value else {
        return value.clone();
    };
    let resolved = match token.as_str() {
        RANDOM_STRING => (0..RANDOM_STRING_LEN)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect(),
        RANDOM_INT => rng.gen_range(1..=1_000_000u32).to_string(),
        RANDOM_FLOAT => format!("{:.2}", rng.gen_range(0.0..=1000.0f64)),
        _ => return value.clone(),
    };
    Value::String(resolved)
}

/// Materialize a concrete body using the supplied RNG.
pub fn materialize_with<R: Rng + ?Sized>(template: &BodyTemplate, rng: &mut R) -> Map<String, Value> {
    template
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, rng)))
        .collect()
}

/// Materialize a concrete body from the thread-local RNG.
pub fn materialize(template: &BodyTemplate) -> Map<String, Value> {
    materialize_with(template, &mut rand::thread_rng())
}

/// Per-attempt RNG for seeded runs. Each attempt gets its own stream so no
/// RNG state is shared between concurrent attempts.
pub fn attempt_rng(seed: u64, index: u64) -> StdRng {
    StdRng::seed_from_u64(seed ^ index.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(v: Value) -> BodyTemplate {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_random_int_in_range() {
        let t = template(json!({"id": "{{random_int}}"}));
        for _ in 0..200 {
            let body = materialize(&t);
            let id: u32 = body["id"].as_str().unwrap().parse().unwrap();
            assert!((1..=1_000_000).contains(&id), "id: {}", id);
        }
    }

    #[test]
    fn test_random_string_shape() {
        let t = template(json!({"name": "{{random_string}}"}));
        let body = materialize(&t);
        let name = body["name"].as_str().unwrap();
        assert_eq!(name.len(), 10);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_random_float_two_decimals() {
        let t = template(json!({"price": "{{random_float}}"}));
        for _ in 0..100 {
            let body = materialize(&t);
            let s = body["price"].as_str().unwrap();
            let (_, frac) = s.split_once('.').unwrap();
            assert_eq!(frac.len(), 2);
            let v: f64 = s.parse().unwrap();
            assert!((0.0..=1000.0).contains(&v));
        }
    }

    #[test]
    fn test_literals_pass_through() {
        let t = template(json!({
            "kind": "order",
            "qty": 3,
            "flag": true,
            "nested": {"id": "{{random_int}}"},
            "almost": "{{random_int}} "
        }));
        let body = materialize(&t);
        assert_eq!(body["kind"], json!("order"));
        assert_eq!(body["qty"], json!(3));
        assert_eq!(body["flag"], json!(true));
        assert_eq!(body["nested"], json!({"id": "{{random_int}}"}));
        assert_eq!(body["almost"], json!("{{random_int}} "));
    }

    #[test]
    fn test_seeded_attempts_are_reproducible() {
        let t = template(json!({"a": "{{random_string}}", "b": "{{random_float}}"}));
        let first = materialize_with(&t, &mut attempt_rng(42, 3));
        let again = materialize_with(&t, &mut attempt_rng(42, 3));
        let other = materialize_with(&t, &mut attempt_rng(42, 4));
        assert_eq!(first, again);
        assert_ne!(first, other);
    }
}
