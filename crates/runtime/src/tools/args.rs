//! Typed argument objects, one per tool.
//!
//! Required keys have no serde default, so a missing key is a decode error
//! and never reaches the bridge.

use bridge::Variable;
use serde::Deserialize;

fn default_simulations() -> usize {
    10_000
}

fn default_alpha() -> f64 {
    0.85
}

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub(crate) struct PtasKnapsackArgs {
    pub capacity: i64,
    pub epsilon: f64,
    pub weights: Vec<i64>,
    pub values: Vec<i64>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExactKnapsackArgs {
    pub capacity: i64,
    pub weights: Vec<i64>,
    pub values: Vec<i64>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BinPackingArgs {
    pub items: Vec<i64>,
    pub bin_capacity: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IntervalArgs {
    pub start_times: Vec<i64>,
    pub end_times: Vec<i64>,
    pub weights: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetCoverArgs {
    pub subsets: Vec<Vec<i64>>,
    pub costs: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MaxCoverageArgs {
    pub subsets: Vec<Vec<i64>>,
    pub k: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MatchingArgs {
    pub left_nodes: Vec<i64>,
    pub right_nodes: Vec<i64>,
    pub edges: Vec<(i64, i64)>,
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MakespanArgs {
    pub jobs: Vec<f64>,
    pub m: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MixedIlpArgs {
    pub variables: Vec<Variable>,
    pub constraints: Vec<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub sense: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InfluenceArgs {
    pub edges: Vec<(usize, usize)>,
    pub weights: Vec<f64>,
    pub k: usize,
    #[serde(default = "default_simulations")]
    pub n_simulations: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DensestArgs {
    pub edges: Vec<(usize, usize)>,
    #[serde(default)]
    pub directed: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EdgesArgs {
    pub edges: Vec<(usize, usize)>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CentralityArgs {
    pub edges: Vec<(usize, usize)>,
    #[serde(default = "yes")]
    pub normalized: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageRankArgs {
    pub edges: Vec<(usize, usize)>,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge::VarType;
    use serde_json::json;

    #[test]
    fn optional_fields_take_defaults() {
        let args: InfluenceArgs =
            serde_json::from_value(json!({"edges": [[0, 1]], "weights": [0.5], "k": 1})).unwrap();
        assert_eq!(args.n_simulations, 10_000);

        let args: CentralityArgs = serde_json::from_value(json!({"edges": [[0, 1]]})).unwrap();
        assert!(args.normalized);

        let args: PageRankArgs = serde_json::from_value(json!({"edges": []})).unwrap();
        assert_eq!(args.alpha, 0.85);

        let args: DensestArgs = serde_json::from_value(json!({"edges": [[1, 2]]})).unwrap();
        assert!(!args.directed);
    }

    #[test]
    fn missing_required_key_fails() {
        let err = serde_json::from_value::<BinPackingArgs>(json!({"items": [1, 2]})).unwrap_err();
        assert!(err.to_string().contains("bin_capacity"));
    }

    #[test]
    fn edges_must_be_pairs_of_ids() {
        assert!(serde_json::from_value::<EdgesArgs>(json!({"edges": [[0, 1, 2]]})).is_err());
        assert!(serde_json::from_value::<EdgesArgs>(json!({"edges": [[-1, 1]]})).is_err());
    }

    #[test]
    fn ilp_variables_decode_with_defaults() {
        let args: MixedIlpArgs = serde_json::from_value(json!({
            "variables": [
                {"name": "x", "lower_bound": 5, "var_type": "integer"},
                {"name": "y", "var_type": null},
            ],
            "constraints": ["x + y <= 20"],
        }))
        .unwrap();
        assert_eq!(args.variables[0], Variable::new("x").lower(5.0).kind(VarType::Integer));
        assert_eq!(args.variables[1], Variable::new("y"));
        assert!(args.objective.is_none());
        assert!(args.sense.is_none());
    }
}
