//! One entry point per JuliAlg routine.
//!
//! Every function validates its arguments, synthesizes a program whose value
//! is a fixed-shape tuple, evaluates it, and converts the tuple back into a
//! result with zero-based ids. Argument problems are reported as
//! [`Error::InvalidInput`] before the runtime is touched.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ilp::{IlpModel, IlpSolution, Variable};
use crate::index::{self, BipartiteLabels};
use crate::program::{GraphKind, Literal, Program};
use crate::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnapsackSolution {
    pub value: i64,
    pub items: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinPacking {
    pub num_bins: usize,
    pub bins: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalSchedule {
    pub max_weight: i64,
    pub selected_jobs: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetCover {
    pub total_cost: f64,
    pub selected_subsets: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaxCoverage {
    pub num_covered: i64,
    pub selected_subsets: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Makespan {
    pub makespan: f64,
    /// Machine index per job.
    pub assignments: Vec<usize>,
    /// Jobs per machine, in job order.
    pub machines: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BipartiteMatching {
    pub total_weight: f64,
    /// `[left label, right label]` pairs in the caller's label spaces.
    pub matched_edges: Vec<[i64; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfluenceSeeds {
    pub seed_nodes: Vec<usize>,
    pub expected_spread: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DenseSubgraph {
    pub nodes: Vec<usize>,
    pub density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreNumbers {
    pub core_numbers: BTreeMap<usize, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Centrality {
    /// Score per node, indexed by node id.
    pub centrality: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRank {
    pub scores: Vec<f64>,
}

/// 0/1 knapsack solved exactly by dynamic programming.
pub async fn exact_knapsack<R: Runtime>(
    rt: &R,
    capacity: i64,
    weights: &[i64],
    values: &[i64],
) -> Result<KnapsackSolution> {
    same_len("weights", weights.len(), "values", values.len())?;
    let program = solver_program()
        .stmt(format!(
            "__v, __items = exact_knapsack({}, {}, {})",
            Literal::int(capacity),
            Literal::ints(weights),
            Literal::ints(values)
        ))
        .stmt("(__v, collect(__items))");
    let (value, items): (f64, Vec<i64>) = run(rt, "exact_knapsack", &program).await?;
    Ok(KnapsackSolution {
        value: whole(value, "knapsack value")?,
        items: index::to_external(&items)?,
    })
}

/// 0/1 knapsack with a `(1 - epsilon)` guarantee. `epsilon` must lie in
/// `[0, 1)`.
pub async fn ptas_knapsack<R: Runtime>(
    rt: &R,
    capacity: i64,
    epsilon: f64,
    weights: &[i64],
    values: &[i64],
) -> Result<KnapsackSolution> {
    same_len("weights", weights.len(), "values", values.len())?;
    if !(0.0..1.0).contains(&epsilon) {
        return Err(Error::invalid(format!("epsilon must be in [0, 1), got {epsilon}")));
    }
    let program = solver_program()
        .stmt(format!(
            "__v, __items = ptas_knapsack({}, {}, {}, {})",
            Literal::int(capacity),
            Literal::float(epsilon)?,
            Literal::ints(weights),
            Literal::ints(values)
        ))
        .stmt("(__v, collect(__items))");
    let (value, items): (f64, Vec<i64>) = run(rt, "ptas_knapsack", &program).await?;
    Ok(KnapsackSolution {
        value: whole(value, "knapsack value")?,
        items: index::to_external(&items)?,
    })
}

pub async fn bin_packing<R: Runtime>(rt: &R, items: &[i64], bin_capacity: i64) -> Result<BinPacking> {
    if bin_capacity <= 0 {
        return Err(Error::invalid("bin_capacity must be positive"));
    }
    if let Some(size) = items.iter().find(|&&size| size > bin_capacity) {
        return Err(Error::invalid(format!(
            "item of size {size} does not fit in a bin of capacity {bin_capacity}"
        )));
    }
    let program = solver_program()
        .stmt(format!(
            "__n, __bins = bin_packing({}, {})",
            Literal::ints(items),
            Literal::int(bin_capacity)
        ))
        .stmt("(__n, [collect(b) for b in __bins])");
    let (num_bins, bins): (f64, Vec<Vec<i64>>) = run(rt, "bin_packing", &program).await?;
    Ok(BinPacking {
        num_bins: count(num_bins, "bin count")?,
        bins: bins
            .iter()
            .map(|bin| index::to_external(bin))
            .collect::<Result<_>>()?,
    })
}

pub async fn weighted_interval_scheduling<R: Runtime>(
    rt: &R,
    start_times: &[i64],
    end_times: &[i64],
    weights: &[i64],
) -> Result<IntervalSchedule> {
    same_len("start_times", start_times.len(), "end_times", end_times.len())?;
    same_len("start_times", start_times.len(), "weights", weights.len())?;
    if let Some(job) = start_times.iter().zip(end_times).position(|(s, e)| e < s) {
        return Err(Error::invalid(format!("job {job} ends before it starts")));
    }
    let program = solver_program()
        .stmt(format!(
            "__w, __jobs = weighted_interval_scheduling({}, {}, {})",
            Literal::ints(start_times),
            Literal::ints(end_times),
            Literal::ints(weights)
        ))
        .stmt("(__w, collect(__jobs))");
    let (max_weight, jobs): (f64, Vec<i64>) =
        run(rt, "weighted_interval_scheduling", &program).await?;
    Ok(IntervalSchedule {
        max_weight: whole(max_weight, "schedule weight")?,
        selected_jobs: index::to_external(&jobs)?,
    })
}

/// Greedy weighted set cover. Element ids inside the subsets are opaque
/// labels and are passed through untouched.
pub async fn set_cover<R: Runtime>(rt: &R, subsets: &[Vec<i64>], costs: &[f64]) -> Result<SetCover> {
    same_len("subsets", subsets.len(), "costs", costs.len())?;
    let program = solver_program()
        .stmt(format!(
            "__cost, __selected = set_cover({}, {})",
            Literal::int_lists(subsets),
            Literal::floats(costs)?
        ))
        .stmt("(__cost, collect(__selected))");
    let (total_cost, selected): (f64, Vec<i64>) = run(rt, "set_cover", &program).await?;
    Ok(SetCover {
        total_cost,
        selected_subsets: index::to_external(&selected)?,
    })
}

pub async fn max_coverage<R: Runtime>(rt: &R, subsets: &[Vec<i64>], k: usize) -> Result<MaxCoverage> {
    let program = solver_program()
        .stmt(format!(
            "__covered, __selected = max_coverage({}, {})",
            Literal::int_lists(subsets),
            Literal::int(int_arg(k, "k")?)
        ))
        .stmt("(__covered, collect(__selected))");
    let (covered, selected): (f64, Vec<i64>) = run(rt, "max_coverage", &program).await?;
    Ok(MaxCoverage {
        num_covered: whole(covered, "covered count")?,
        selected_subsets: index::to_external(&selected)?,
    })
}

/// Longest-processing-time scheduling of `jobs` on `m` identical machines.
pub async fn makespan_scheduling<R: Runtime>(rt: &R, jobs: &[f64], m: usize) -> Result<Makespan> {
    if m == 0 {
        return Err(Error::invalid("m must be at least 1"));
    }
    if m > index::MAX_NODES {
        return Err(Error::invalid(format!(
            "m must be at most {}, got {m}",
            index::MAX_NODES
        )));
    }
    let program = solver_program()
        .stmt(format!(
            "__span, __assign = lpt_makespan({}, {})",
            Literal::floats(jobs)?,
            Literal::int(int_arg(m, "m")?)
        ))
        .stmt("(__span, collect(__assign))");
    let (makespan, assignments): (f64, Vec<i64>) = run(rt, "makespan_scheduling", &program).await?;
    let assignments = index::to_external(&assignments)?;

    let mut machines = vec![Vec::new(); m];
    for (job, &machine) in assignments.iter().enumerate() {
        machines
            .get_mut(machine)
            .ok_or_else(|| Error::Protocol(format!("job {job} assigned to machine {machine} of {m}")))?
            .push(job);
    }
    Ok(Makespan {
        makespan,
        assignments,
        machines,
    })
}

/// Maximum-weight bipartite matching. `left` and `right` are independent
/// label spaces; edges are `(left label, right label)`. Without weights
/// every edge weighs one.
pub async fn weighted_bipartite_matching<R: Runtime>(
    rt: &R,
    left: &[i64],
    right: &[i64],
    edges: &[(i64, i64)],
    weights: Option<&[f64]>,
) -> Result<BipartiteMatching> {
    let labels = BipartiteLabels::new(left, right)?;
    let internal = edges
        .iter()
        .map(|&e| labels.edge(e))
        .collect::<Result<Vec<_>>>()?;

    let weighted: Vec<((i64, i64), f64)> = match weights {
        Some(weights) => {
            same_len("edges", edges.len(), "weights", weights.len())?;
            internal.iter().copied().zip(weights.iter().copied()).collect()
        }
        None => Vec::new(),
    };

    let program = solver_program()
        .using("JuMP, HiGHS")
        .graph("g", GraphKind::Undirected, labels.node_count(), &internal)
        .stmt(format!("__L = {}", Literal::ints(&labels.left_ids())))
        .stmt(format!("__R = {}", Literal::ints(&labels.right_ids())))
        .stmt(format!("__w = {}", Literal::edge_weights(&weighted)?))
        .stmt("__total, __matched = weighted_bipartite_matching(g, __L, __R; weights=__w)")
        .stmt("(__total, [(e[1], e[2]) for e in __matched])");
    let (total_weight, matched): (f64, Vec<(i64, i64)>) =
        run(rt, "weighted_bipartite_matching", &program).await?;

    let matched_edges = matched
        .into_iter()
        .map(|(u, v)| Ok([labels.left_label(u)?, labels.right_label(v)?]))
        .collect::<Result<_>>()?;
    Ok(BipartiteMatching {
        total_weight,
        matched_edges,
    })
}

/// Solve a mixed integer linear program with JuMP and HiGHS.
///
/// Without an objective the model is a feasibility problem and `sense` is
/// not consulted.
pub async fn mixed_ilp<R: Runtime>(
    rt: &R,
    variables: &[Variable],
    constraints: &[String],
    objective: Option<&str>,
    sense: Option<&str>,
) -> Result<IlpSolution> {
    let model = IlpModel::new(variables, constraints, objective, sense)?;
    let program = model.program()?;
    let (status, objective_value, variable_values): (String, Option<f64>, BTreeMap<String, f64>) =
        run(rt, "mixed_ilp", &program).await?;
    Ok(IlpSolution {
        status,
        mode: model.mode(),
        objective_value,
        variable_values,
    })
}

/// Seed selection under the independent cascade model. `probabilities` is
/// parallel to `edges`.
pub async fn influence_maximization<R: Runtime>(
    rt: &R,
    edges: &[(usize, usize)],
    probabilities: &[f64],
    k: usize,
    simulations: usize,
) -> Result<InfluenceSeeds> {
    same_len("edges", edges.len(), "weights", probabilities.len())?;
    if let Some(p) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(Error::invalid(format!("edge probability {p} is outside [0, 1]")));
    }
    if simulations == 0 {
        return Err(Error::invalid("n_simulations must be at least 1"));
    }
    let internal = index::edges_to_internal(edges)?;
    let weighted: Vec<_> = internal.iter().copied().zip(probabilities.iter().copied()).collect();

    let program = solver_program()
        .graph("g", GraphKind::Directed, index::node_count(&internal)?, &internal)
        .stmt(format!("__w = {}", Literal::edge_weights(&weighted)?))
        .stmt(format!(
            "__seeds, __spread = influence_maximization_ic(g, __w, {}, 1000, {})",
            Literal::int(int_arg(k, "k")?),
            Literal::int(int_arg(simulations, "n_simulations")?)
        ))
        .stmt("(collect(__seeds), __spread)");
    let (seeds, expected_spread): (Vec<i64>, f64) =
        run(rt, "influence_maximization", &program).await?;
    Ok(InfluenceSeeds {
        seed_nodes: index::to_external(&seeds)?,
        expected_spread,
    })
}

pub async fn densest_subgraph<R: Runtime>(
    rt: &R,
    edges: &[(usize, usize)],
    directed: bool,
) -> Result<DenseSubgraph> {
    let kind = if directed {
        GraphKind::Directed
    } else {
        GraphKind::Undirected
    };
    let program = graph_program(edges, kind)?
        .stmt("__nodes, __density = densest_subgraph(g)")
        .stmt("(collect(__nodes), __density)");
    let (nodes, density): (Vec<i64>, f64) = run(rt, "densest_subgraph", &program).await?;
    Ok(DenseSubgraph {
        nodes: index::to_external(&nodes)?,
        density,
    })
}

pub async fn k_core_decomposition<R: Runtime>(rt: &R, edges: &[(usize, usize)]) -> Result<CoreNumbers> {
    let program = graph_program(edges, GraphKind::Undirected)?.stmt("k_core_decomposition(g)");
    let raw: BTreeMap<String, f64> = run(rt, "k_core_decomposition", &program).await?;

    let mut core_numbers = BTreeMap::new();
    for (node, core) in raw {
        let id: i64 = node
            .parse()
            .map_err(|_| Error::Protocol(format!("non-integer node key {node:?}")))?;
        core_numbers.insert(index::external_id(id)?, whole(core, "core number")?);
    }
    Ok(CoreNumbers { core_numbers })
}

pub async fn betweenness_centrality<R: Runtime>(
    rt: &R,
    edges: &[(usize, usize)],
    normalized: bool,
) -> Result<Centrality> {
    let program = graph_program(edges, GraphKind::Undirected)?.stmt(format!(
        "collect(bw_centrality(g; normalized={}))",
        Literal::bool(normalized)
    ));
    Ok(Centrality {
        centrality: run(rt, "betweenness_centrality", &program).await?,
    })
}

/// PageRank with damping factor `alpha`, which must lie strictly between
/// zero and one.
pub async fn pagerank<R: Runtime>(rt: &R, edges: &[(usize, usize)], alpha: f64) -> Result<PageRank> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(Error::invalid(format!("alpha must be in (0, 1), got {alpha}")));
    }
    let program = graph_program(edges, GraphKind::Undirected)?
        .stmt(format!("collect(pagerank(g; α={}))", Literal::float(alpha)?));
    Ok(PageRank {
        scores: run(rt, "pagerank", &program).await?,
    })
}

fn graph_program(edges: &[(usize, usize)], kind: GraphKind) -> Result<Program> {
    let internal = index::edges_to_internal(edges)?;
    let nodes = index::node_count(&internal)?;
    Ok(solver_program().graph("g", kind, nodes, &internal))
}

/// Every request runs in a fresh module, so each program loads the solver
/// packages itself.
fn solver_program() -> Program {
    Program::new().using("JuliAlg, Graphs")
}

async fn run<R: Runtime, T: DeserializeOwned>(rt: &R, solver: &'static str, program: &Program) -> Result<T> {
    debug!(solver, statements = program.statements().len(), "invoking solver");
    decode(rt.eval(program).await?)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Protocol(format!("unexpected result shape: {e}")))
}

/// Counts the runtime receives as integer literals.
fn int_arg(value: usize, name: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::invalid(format!("{name} is too large: {value}")))
}

fn same_len(a: &str, a_len: usize, b: &str, b_len: usize) -> Result<()> {
    if a_len != b_len {
        return Err(Error::invalid(format!(
            "{a} and {b} must have the same length ({a_len} vs {b_len})"
        )));
    }
    Ok(())
}

/// Julia may hand back integral results as floats; accept those but nothing
/// with a fractional part.
fn whole(value: f64, what: &str) -> Result<i64> {
    if value.is_finite() && value.fract() == 0.0 {
        Ok(value as i64)
    } else {
        Err(Error::Protocol(format!("{what} should be an integer, got {value}")))
    }
}

fn count(value: f64, what: &str) -> Result<usize> {
    usize::try_from(whole(value, what)?)
        .map_err(|_| Error::Protocol(format!("{what} should be non-negative, got {value}")))
}
