//! The registered solver tools.
//!
//! [`Solver`] is the single source of truth: names, descriptions, schemas
//! and display metadata are exhaustive matches on it, and the dispatcher
//! matches on it too, so a tool cannot be advertised without a handler.

use serde::Serialize;
use serde_json::{Value, json};

use crate::model::ToolSpec;

/// Human-facing description of the algorithm behind a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SolverMeta {
    pub display_name: &'static str,
    pub algorithm: &'static str,
    pub guarantee: &'static str,
    pub complexity: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Solver {
    PtasKnapsack,
    BinPacking,
    WeightedIntervalScheduling,
    SetCover,
    MaxCoverage,
    WeightedBipartiteMatching,
    MakespanScheduling,
    MixedIlp,
    ExactKnapsack,
    InfluenceMaximization,
    DensestSubgraph,
    KCoreDecomposition,
    BetweennessCentrality,
    PageRank,
}

impl Solver {
    /// Catalog order, which is also the order tools are shown to the model.
    pub const ALL: [Solver; 14] = [
        Solver::PtasKnapsack,
        Solver::BinPacking,
        Solver::WeightedIntervalScheduling,
        Solver::SetCover,
        Solver::MaxCoverage,
        Solver::WeightedBipartiteMatching,
        Solver::MakespanScheduling,
        Solver::MixedIlp,
        Solver::ExactKnapsack,
        Solver::InfluenceMaximization,
        Solver::DensestSubgraph,
        Solver::KCoreDecomposition,
        Solver::BetweennessCentrality,
        Solver::PageRank,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PtasKnapsack => "ptas_knapsack",
            Self::BinPacking => "bin_packing",
            Self::WeightedIntervalScheduling => "weighted_interval_scheduling",
            Self::SetCover => "set_cover",
            Self::MaxCoverage => "max_coverage",
            Self::WeightedBipartiteMatching => "weighted_bipartite_matching",
            Self::MakespanScheduling => "makespan_scheduling",
            Self::MixedIlp => "mixed_ilp",
            Self::ExactKnapsack => "exact_knapsack",
            Self::InfluenceMaximization => "influence_maximization",
            Self::DensestSubgraph => "densest_subgraph",
            Self::KCoreDecomposition => "k_core_decomposition",
            Self::BetweennessCentrality => "betweenness_centrality",
            Self::PageRank => "pagerank",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|solver| solver.name() == name)
    }

    pub fn metadata(self) -> SolverMeta {
        let (display_name, algorithm, guarantee, complexity) = match self {
            Self::PtasKnapsack => (
                "FPTAS Knapsack",
                "Value-Scaled Dynamic Programming (PTAS)",
                "(1 - epsilon)-approximation",
                "O(n^2 / epsilon)",
            ),
            Self::BinPacking => (
                "Bin Packing",
                "First Fit Decreasing",
                "(11/9) OPT + O(1) bins",
                "O(n log n)",
            ),
            Self::WeightedIntervalScheduling => (
                "Weighted Interval Scheduling",
                "Dynamic Programming + Binary Search",
                "Exact",
                "O(n log n)",
            ),
            Self::SetCover => (
                "Set Cover",
                "Greedy (cost-effectiveness ratio)",
                "O(ln n)-approximation",
                "O(n * m)",
            ),
            Self::MaxCoverage => (
                "Max Coverage",
                "Greedy (marginal gain)",
                "(1 - 1/e)-approximation",
                "O(k * n * m)",
            ),
            Self::WeightedBipartiteMatching => (
                "Weighted Bipartite Matching",
                "LP Relaxation (exact for bipartite graph matching)",
                "Exact optimal",
                "O(n^3) via LP",
            ),
            Self::MakespanScheduling => (
                "Makespan Scheduling",
                "Longest Processing Time (LPT)",
                "(4/3 - 1/(3m))-approximation",
                "O(n log n)",
            ),
            Self::MixedIlp => (
                "Mixed ILP",
                "MILP via JuMP + HiGHS",
                "Exact (for solved model)",
                "Problem-dependent",
            ),
            Self::ExactKnapsack => (
                "Exact Knapsack",
                "Dynamic Programming over capacity",
                "Exact",
                "O(n * W)",
            ),
            Self::InfluenceMaximization => (
                "Influence Maximization",
                "Greedy seeding with Monte Carlo Independent Cascade",
                "(1 - 1/e)-approximation in expectation",
                "O(k * n * R * m)",
            ),
            Self::DensestSubgraph => (
                "Densest Subgraph",
                "Greedy peeling",
                "1/2-approximation",
                "O(m log n)",
            ),
            Self::KCoreDecomposition => (
                "K-Core Decomposition",
                "Minimum-degree peeling",
                "Exact",
                "O(n + m)",
            ),
            Self::BetweennessCentrality => (
                "Betweenness Centrality",
                "Brandes' algorithm",
                "Exact",
                "O(n * m)",
            ),
            Self::PageRank => (
                "PageRank",
                "Power iteration",
                "Converges to the stationary distribution",
                "O(iterations * m)",
            ),
        };
        SolverMeta {
            display_name,
            algorithm,
            guarantee,
            complexity,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::PtasKnapsack => {
                "Solve 0/1 knapsack with a (1-epsilon)-approximation. Use for any budget or \
                 capacity selection problem."
            }
            Self::BinPacking => {
                "Pack items into fixed-capacity bins with a decreasing-size heuristic. \
                 Returns the bin assignments."
            }
            Self::WeightedIntervalScheduling => {
                "Find the maximum-weight set of non-overlapping intervals. Returns the \
                 selected jobs and their total weight."
            }
            Self::SetCover => {
                "Find an approximate minimum-cost set cover with the greedy algorithm."
            }
            Self::MaxCoverage => {
                "Select up to k subsets to maximize the number of distinct covered elements."
            }
            Self::WeightedBipartiteMatching => {
                "Find a maximum-weight matching in a bipartite graph. Use for one-to-one \
                 assignment problems: workers to jobs, students to schools, tasks to machines."
            }
            Self::MakespanScheduling => {
                "Schedule jobs on m identical parallel machines to minimize the largest \
                 machine load."
            }
            Self::MixedIlp => {
                "Solve a mixed integer linear program built from named variables, linear \
                 constraints and an optional linear objective. Omit the objective for a \
                 feasibility check."
            }
            Self::ExactKnapsack => {
                "Solve 0/1 knapsack exactly by dynamic programming. Suitable when the \
                 capacity is a modest integer."
            }
            Self::InfluenceMaximization => {
                "Choose k seed nodes of a directed graph that maximize expected spread under \
                 the independent cascade model."
            }
            Self::DensestSubgraph => {
                "Find a subgraph with high edge density (edges per node)."
            }
            Self::KCoreDecomposition => {
                "Compute the core number of every node of an undirected graph."
            }
            Self::BetweennessCentrality => {
                "Compute betweenness centrality for every node of an undirected graph."
            }
            Self::PageRank => "Compute PageRank scores for every node of an undirected graph.",
        }
    }

    fn parameters(self) -> Value {
        match self {
            Self::PtasKnapsack => object(
                json!({
                    "capacity": {"type": "integer", "description": "Knapsack capacity"},
                    "epsilon": {"type": "number", "description": "Approximation parameter in [0, 1), e.g. 0.1 for 90% optimality"},
                    "weights": int_array("Weight of each item"),
                    "values": int_array("Value of each item"),
                    "labels": labels(),
                }),
                &["capacity", "epsilon", "weights", "values"],
            ),
            Self::ExactKnapsack => object(
                json!({
                    "capacity": {"type": "integer", "description": "Knapsack capacity"},
                    "weights": int_array("Weight of each item"),
                    "values": int_array("Value of each item"),
                    "labels": labels(),
                }),
                &["capacity", "weights", "values"],
            ),
            Self::BinPacking => object(
                json!({
                    "items": int_array("Size of each item"),
                    "bin_capacity": {"type": "integer", "description": "Maximum capacity per bin"},
                }),
                &["items", "bin_capacity"],
            ),
            Self::WeightedIntervalScheduling => object(
                json!({
                    "start_times": int_array("Start time of each job"),
                    "end_times": int_array("End time of each job"),
                    "weights": int_array("Weight or value of each job"),
                }),
                &["start_times", "end_times", "weights"],
            ),
            Self::SetCover => object(
                json!({
                    "subsets": subsets(),
                    "costs": {"type": "array", "items": {"type": "number"}, "description": "Cost of each subset"},
                }),
                &["subsets", "costs"],
            ),
            Self::MaxCoverage => object(
                json!({
                    "subsets": subsets(),
                    "k": {"type": "integer", "description": "Maximum number of subsets to select"},
                }),
                &["subsets", "k"],
            ),
            Self::WeightedBipartiteMatching => object(
                json!({
                    "left_nodes": int_array("Node ids of the left partition. May overlap with right_nodes; the sides are independent label spaces."),
                    "right_nodes": int_array("Node ids of the right partition. May overlap with left_nodes; the sides are independent label spaces."),
                    "edges": edge_list("List of [u, v] edges where u is a left node id and v is a right node id"),
                    "weights": {"type": "array", "items": {"type": "number"}, "description": "Optional weight per edge, parallel to edges. Defaults to 1.0 per edge."},
                }),
                &["left_nodes", "right_nodes", "edges"],
            ),
            Self::MakespanScheduling => object(
                json!({
                    "jobs": {"type": "array", "items": {"type": "number"}, "description": "Processing time of each job"},
                    "m": {"type": "integer", "description": "Number of machines"},
                }),
                &["jobs", "m"],
            ),
            Self::MixedIlp => object(
                json!({
                    "variables": {
                        "type": "array",
                        "description": "Decision variables",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string", "description": "Variable name, e.g. x"},
                                "lower_bound": {"type": "number", "description": "Optional lower bound"},
                                "upper_bound": {"type": "number", "description": "Optional upper bound"},
                                "var_type": {"type": "string", "description": "continuous|integer|binary", "default": "continuous"},
                            },
                            "required": ["name"],
                        },
                    },
                    "constraints": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Linear constraints using ASCII operators only (<=, >=, ==), e.g. ['2x + y <= 10', 'x + 3y <= 12']",
                    },
                    "objective": {"type": "string", "description": "Optional linear objective, e.g. '3x + 5y'. Omit for feasibility-only models."},
                    "sense": {"type": "string", "description": "Optimization sense: Max or Min", "default": "Max"},
                }),
                &["variables", "constraints"],
            ),
            Self::InfluenceMaximization => object(
                json!({
                    "edges": edge_list("Directed [u, v] edges with 0-indexed node ids"),
                    "weights": {"type": "array", "items": {"type": "number"}, "description": "Activation probability in [0, 1] per edge, parallel to edges"},
                    "k": {"type": "integer", "description": "Number of seed nodes"},
                    "n_simulations": {"type": "integer", "description": "Monte Carlo simulations per estimate", "default": 10000},
                }),
                &["edges", "weights", "k"],
            ),
            Self::DensestSubgraph => object(
                json!({
                    "edges": edge_list("[u, v] edges with 0-indexed node ids"),
                    "directed": {"type": "boolean", "description": "Treat edges as directed", "default": false},
                }),
                &["edges"],
            ),
            Self::KCoreDecomposition => object(
                json!({"edges": edge_list("Undirected [u, v] edges with 0-indexed node ids")}),
                &["edges"],
            ),
            Self::BetweennessCentrality => object(
                json!({
                    "edges": edge_list("Undirected [u, v] edges with 0-indexed node ids"),
                    "normalized": {"type": "boolean", "description": "Normalize scores", "default": true},
                }),
                &["edges"],
            ),
            Self::PageRank => object(
                json!({
                    "edges": edge_list("Undirected [u, v] edges with 0-indexed node ids"),
                    "alpha": {"type": "number", "description": "Damping factor in (0, 1)", "default": 0.85},
                }),
                &["edges"],
            ),
        }
    }

    pub fn spec(self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            schema: self.parameters(),
        }
    }
}

/// Specs for every registered tool, in catalog order.
pub fn catalog() -> Vec<ToolSpec> {
    Solver::ALL.into_iter().map(Solver::spec).collect()
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({"type": "object", "properties": properties, "required": required})
}

fn int_array(description: &str) -> Value {
    json!({"type": "array", "items": {"type": "integer"}, "description": description})
}

fn edge_list(description: &str) -> Value {
    json!({
        "type": "array",
        "items": {"type": "array", "items": {"type": "integer"}, "minItems": 2, "maxItems": 2},
        "description": description,
    })
}

fn subsets() -> Value {
    json!({
        "type": "array",
        "items": {"type": "array", "items": {"type": "integer"}},
        "description": "Collection of subsets, each a list of element ids",
    })
}

fn labels() -> Value {
    json!({"type": "array", "items": {"type": "string"}, "description": "Optional label for each item, e.g. its name"})
}
