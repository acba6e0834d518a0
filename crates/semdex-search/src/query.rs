//! k-NN query body builders.
//!
//! Bodies are assembled with `serde_json`, never by string templating, so
//! the output is valid JSON by construction.

use serde_json::{Map, Value};

/// Single-field k-NN query: `{size, query: {knn: {<field>: {vector, k}}}}`.
pub fn knn_query(field: &str, vector: &[f32], k: usize) -> Value {
    let mut knn = Map::new();
    knn.insert(
        field.to_string(),
        serde_json::json!({ "vector": vector, "k": k }),
    );
    serde_json::json!({
        "size": k,
        "query": { "knn": Value::Object(knn) },
    })
}

/// Weighted multi-field k-NN query: a boolean `should` of one
/// `function_score`-wrapped knn clause per field.
pub fn multi_field_knn_query(
    weights: &[(String, f32)],
    vector: &[f32],
    k_per_field: usize,
) -> Value {
    let should: Vec<Value> = weights
        .iter()
        .map(|(field, weight)| {
            let mut knn = Map::new();
            knn.insert(
                field.clone(),
                serde_json::json!({ "vector": vector, "k": k_per_field }),
            );
            serde_json::json!({
                "function_score": {
                    "query": { "knn": Value::Object(knn) },
                    "weight": weight,
                }
            })
        })
        .collect();

    serde_json::json!({
        "size": k_per_field * weights.len().max(1),
        "query": { "bool": { "should": should } },
    })
}
