//! End-to-end checks against a real Julia installation.
//!
//! Run with `cargo test -p bridge -- --ignored`. The first run installs the
//! solver packages into the runtime depot and can take several minutes.
//! `JULIA_EXE` selects the executable; `GRAPHBEES_RUNTIME_DIR` keeps the
//! depot between runs.

use std::path::PathBuf;

use bridge::{Bridge, Mode, Runtime, RuntimeLayout, RuntimeSettings, VarType, Variable, solvers};

fn bridge() -> Bridge {
    let settings = RuntimeSettings {
        runtime_dir: std::env::var_os("GRAPHBEES_RUNTIME_DIR").map(PathBuf::from),
        ..Default::default()
    };
    let layout = RuntimeLayout::configure(&settings).unwrap();
    let exe = std::env::var("JULIA_EXE").unwrap_or_else(|_| bridge::DEFAULT_EXECUTABLE.into());
    Bridge::new(layout, exe)
}

#[tokio::test]
#[ignore = "requires julia and network access"]
async fn solver_scenarios() {
    let bridge = bridge();
    let session = bridge.ensure_ready().await.unwrap();
    let rt = session.as_ref();
    assert!(rt.threads().await.unwrap() >= 1);

    // Knapsack: items 0 and 1 fill the capacity exactly.
    let knapsack = solvers::ptas_knapsack(rt, 10, 0.0, &[6, 4, 3], &[30, 20, 15])
        .await
        .unwrap();
    assert_eq!(knapsack.value, 35);
    let mut items = knapsack.items.clone();
    items.sort();
    assert_eq!(items, vec![0, 1]);

    // Bin packing: two full bins.
    let sizes = [5, 5, 5, 5];
    let packing = solvers::bin_packing(rt, &sizes, 10).await.unwrap();
    assert_eq!(packing.num_bins, 2);
    assert_eq!(packing.bins.len(), 2);
    for bin in &packing.bins {
        assert_eq!(bin.len(), 2);
        assert_eq!(bin.iter().map(|&i| sizes[i]).sum::<i64>(), 10);
    }

    // Feasibility-only ILP.
    let vars = [
        Variable::new("x").lower(5.0).kind(VarType::Integer),
        Variable::new("y").lower(2.5),
    ];
    let ilp = solvers::mixed_ilp(rt, &vars, &["x + y <= 20".to_string()], None, None)
        .await
        .unwrap();
    assert_eq!(ilp.mode, Mode::Feasibility);
    assert!(ilp.is_feasible(), "status {}", ilp.status);
    assert!(ilp.variable_values["x"] >= 5.0);
    assert!(ilp.variable_values["y"] >= 2.5);

    // A second bootstrap is a no-op.
    bridge.ensure_ready().await.unwrap();
    bridge.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires julia and network access"]
async fn hostile_constraint_text_stays_data() {
    let bridge = bridge();
    let session = bridge.ensure_ready().await.unwrap();

    let marker = std::env::temp_dir().join("graphbees_quote_marker");
    let _ = std::fs::remove_file(&marker);
    let hostile = format!("x <= 1\"); touch(\"{}\"); (\"", marker.display());

    let result = solvers::mixed_ilp(
        session.as_ref(),
        &[Variable::new("x")],
        &[hostile],
        Some("x"),
        Some("Max"),
    )
    .await;
    assert!(result.is_err());
    assert!(!marker.exists());
    bridge.shutdown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires julia and network access"]
async fn model_variables_do_not_outlive_their_request() {
    let bridge = bridge();
    bridge.ensure_ready().await.unwrap();

    let ilp = solvers::mixed_ilp(
        &bridge,
        &[Variable::new("pagerank").upper(1.0)],
        &["pagerank >= 0".to_string()],
        Some("pagerank"),
        Some("Max"),
    )
    .await
    .unwrap();
    assert_eq!(ilp.variable_values["pagerank"], 1.0);

    let ranks = solvers::pagerank(&bridge, &[(0, 1), (1, 2)], 0.85).await.unwrap();
    assert_eq!(ranks.scores.len(), 3);
    bridge.shutdown().await.unwrap();
}
