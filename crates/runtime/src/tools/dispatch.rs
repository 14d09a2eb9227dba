//! The tool host backed by the solver bridge.

use std::sync::Arc;

use bridge::{Runtime, solvers};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::args::*;
use super::catalog::{Solver, SolverMeta, catalog};
use super::{ToolError, ToolHost};
use crate::model::{ToolCall, ToolSpec};

/// Executes catalog tools against a solver runtime.
pub struct SolverToolHost<R> {
    runtime: Arc<R>,
    specs: Vec<ToolSpec>,
}

impl<R: Runtime> SolverToolHost<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self {
            runtime,
            specs: catalog(),
        }
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    async fn dispatch(&self, solver: Solver, raw: &str) -> Result<Value, ToolError> {
        let rt = self.runtime.as_ref();
        match solver {
            Solver::PtasKnapsack => {
                let a: PtasKnapsackArgs = decode(raw)?;
                let solution =
                    solvers::ptas_knapsack(rt, a.capacity, a.epsilon, &a.weights, &a.values).await?;
                with_labels(encode(&solution)?, &solution.items, &a.labels)
            }
            Solver::ExactKnapsack => {
                let a: ExactKnapsackArgs = decode(raw)?;
                let solution = solvers::exact_knapsack(rt, a.capacity, &a.weights, &a.values).await?;
                with_labels(encode(&solution)?, &solution.items, &a.labels)
            }
            Solver::BinPacking => {
                let a: BinPackingArgs = decode(raw)?;
                encode(&solvers::bin_packing(rt, &a.items, a.bin_capacity).await?)
            }
            Solver::WeightedIntervalScheduling => {
                let a: IntervalArgs = decode(raw)?;
                encode(
                    &solvers::weighted_interval_scheduling(rt, &a.start_times, &a.end_times, &a.weights)
                        .await?,
                )
            }
            Solver::SetCover => {
                let a: SetCoverArgs = decode(raw)?;
                encode(&solvers::set_cover(rt, &a.subsets, &a.costs).await?)
            }
            Solver::MaxCoverage => {
                let a: MaxCoverageArgs = decode(raw)?;
                encode(&solvers::max_coverage(rt, &a.subsets, a.k).await?)
            }
            Solver::WeightedBipartiteMatching => {
                let a: MatchingArgs = decode(raw)?;
                encode(
                    &solvers::weighted_bipartite_matching(
                        rt,
                        &a.left_nodes,
                        &a.right_nodes,
                        &a.edges,
                        a.weights.as_deref(),
                    )
                    .await?,
                )
            }
            Solver::MakespanScheduling => {
                let a: MakespanArgs = decode(raw)?;
                encode(&solvers::makespan_scheduling(rt, &a.jobs, a.m).await?)
            }
            Solver::MixedIlp => {
                let a: MixedIlpArgs = decode(raw)?;
                encode(
                    &solvers::mixed_ilp(
                        rt,
                        &a.variables,
                        &a.constraints,
                        a.objective.as_deref(),
                        a.sense.as_deref(),
                    )
                    .await?,
                )
            }
            Solver::InfluenceMaximization => {
                let a: InfluenceArgs = decode(raw)?;
                encode(
                    &solvers::influence_maximization(rt, &a.edges, &a.weights, a.k, a.n_simulations)
                        .await?,
                )
            }
            Solver::DensestSubgraph => {
                let a: DensestArgs = decode(raw)?;
                encode(&solvers::densest_subgraph(rt, &a.edges, a.directed).await?)
            }
            Solver::KCoreDecomposition => {
                let a: EdgesArgs = decode(raw)?;
                encode(&solvers::k_core_decomposition(rt, &a.edges).await?)
            }
            Solver::BetweennessCentrality => {
                let a: CentralityArgs = decode(raw)?;
                encode(&solvers::betweenness_centrality(rt, &a.edges, a.normalized).await?)
            }
            Solver::PageRank => {
                let a: PageRankArgs = decode(raw)?;
                encode(&solvers::pagerank(rt, &a.edges, a.alpha).await?)
            }
        }
    }
}

impl<R: Runtime> ToolHost for SolverToolHost<R> {
    fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let solver =
            Solver::from_name(&call.name).ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        debug!(tool = %call.name, id = %call.id, "dispatching tool call");
        let raw = match call.arguments.trim() {
            "" => "{}",
            raw => raw,
        };
        self.dispatch(solver, raw).await
    }

    fn metadata(&self, name: &str) -> Option<SolverMeta> {
        Solver::from_name(name).map(Solver::metadata)
    }

    async fn runtime_threads(&self) -> Option<usize> {
        self.runtime.threads().await.ok()
    }
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, ToolError> {
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn encode<T: Serialize>(result: &T) -> Result<Value, ToolError> {
    serde_json::to_value(result).map_err(|e| ToolError::Encode(e.to_string()))
}

/// Attach the caller's names for the chosen items. Items without a label
/// are shown as `Item <id>`.
fn with_labels(mut result: Value, items: &[usize], labels: &[String]) -> Result<Value, ToolError> {
    if labels.is_empty() {
        return Ok(result);
    }
    let named: Vec<String> = items
        .iter()
        .map(|&i| labels.get(i).cloned().unwrap_or_else(|| format!("Item {i}")))
        .collect();
    if let Value::Object(map) = &mut result {
        map.insert("selected_labels".into(), Value::from(named));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bridge::Program;
    use serde_json::json;

    use super::*;

    /// Replies with canned values and remembers the programs it was given.
    struct FakeRuntime {
        reply: bridge::Result<Value>,
        threads: usize,
        seen: Mutex<Vec<String>>,
    }

    impl FakeRuntime {
        fn returning(value: Value) -> Self {
            Self {
                reply: Ok(value),
                threads: 4,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(bridge::Error::Eval(message.into())),
                threads: 4,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Runtime for FakeRuntime {
        async fn eval(&self, program: &Program) -> bridge::Result<Value> {
            self.seen.lock().unwrap().push(program.source());
            match &self.reply {
                Ok(value) => Ok(value.clone()),
                Err(bridge::Error::Eval(message)) => Err(bridge::Error::Eval(message.clone())),
                Err(other) => Err(bridge::Error::Protocol(other.to_string())),
            }
        }

        async fn threads(&self) -> bridge::Result<usize> {
            Ok(self.threads)
        }
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments: arguments.to_string(),
        }
    }

    fn host(rt: FakeRuntime) -> SolverToolHost<FakeRuntime> {
        SolverToolHost::new(Arc::new(rt))
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_without_runtime() {
        let host = host(FakeRuntime::returning(json!(null)));
        let err = host.execute(&call("foo", json!({}))).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("foo".into()));
        assert_eq!(host.runtime().calls(), 0);
    }

    #[tokio::test]
    async fn every_catalog_entry_dispatches() {
        let host = host(FakeRuntime::returning(json!(null)));
        for spec in host.specs() {
            let err = host.execute(&call(&spec.name, json!({}))).await.unwrap_err();
            assert!(
                matches!(err, ToolError::InvalidArguments(_)),
                "{} should reach its argument decoder, got {err:?}",
                spec.name
            );
        }
        assert_eq!(host.runtime().calls(), 0);
    }

    #[tokio::test]
    async fn malformed_arguments_are_caller_errors() {
        let host = host(FakeRuntime::returning(json!(null)));
        let bad = ToolCall {
            id: "1".into(),
            name: "bin_packing".into(),
            arguments: "{not json".into(),
        };
        let err = host.execute(&bad).await.unwrap_err();
        assert!(err.is_caller_error());

        let empty = ToolCall {
            arguments: "  ".into(),
            ..bad
        };
        assert!(matches!(
            host.execute(&empty).await.unwrap_err(),
            ToolError::InvalidArguments(m) if m.contains("missing field")
        ));
    }

    #[tokio::test]
    async fn bin_packing_result_is_zero_based() {
        let host = host(FakeRuntime::returning(json!([2, [[1, 2], [3, 4]]])));
        let value = host
            .execute(&call("bin_packing", json!({"items": [5, 5, 5, 5], "bin_capacity": 10})))
            .await
            .unwrap();
        assert_eq!(value, json!({"num_bins": 2, "bins": [[0, 1], [2, 3]]}));
    }

    #[tokio::test]
    async fn knapsack_labels_are_attached() {
        let host = host(FakeRuntime::returning(json!([35.0, [1, 2]])));
        let value = host
            .execute(&call(
                "ptas_knapsack",
                json!({
                    "capacity": 10,
                    "epsilon": 0.0,
                    "weights": [6, 4, 3],
                    "values": [30, 20, 15],
                    "labels": ["tent"],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(value["value"], 35);
        assert_eq!(value["items"], json!([0, 1]));
        assert_eq!(value["selected_labels"], json!(["tent", "Item 1"]));
    }

    #[tokio::test]
    async fn validation_failures_skip_the_runtime() {
        let host = host(FakeRuntime::returning(json!(null)));
        let err = host
            .execute(&call(
                "mixed_ilp",
                json!({"variables": [{"name": "2x"}], "constraints": ["2x <= 1"]}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert_eq!(host.runtime().calls(), 0);
    }

    #[tokio::test]
    async fn out_of_range_node_ids_are_caller_errors() {
        let host = host(FakeRuntime::returning(json!({})));
        for edges in [json!([[9223372036854775807u64, 0]]), json!([[0, 1000000000000u64]])] {
            let err = host
                .execute(&call("k_core_decomposition", json!({ "edges": edges })))
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidArguments(_)), "{err:?}");
        }
        assert_eq!(host.runtime().calls(), 0);
    }

    #[tokio::test]
    async fn julia_faults_are_runtime_errors() {
        let host = host(FakeRuntime::failing("BoundsError"));
        let err = host
            .execute(&call("makespan_scheduling", json!({"jobs": [1.0, 2.0], "m": 2})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Runtime(m) if m.contains("BoundsError")));
    }

    #[tokio::test]
    async fn metadata_and_threads() {
        let host = host(FakeRuntime::returning(json!(null)));
        assert_eq!(host.metadata("set_cover").unwrap().display_name, "Set Cover");
        assert!(host.metadata("foo").is_none());
        assert_eq!(host.runtime_threads().await, Some(4));
    }
}
