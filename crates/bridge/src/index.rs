//! Translation between host ids and runtime ids.
//!
//! The host numbers items and nodes from zero; Julia numbers them from one.
//! "External" ids are what callers see, "internal" ids are what the runtime
//! sees.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Distance between a host id and the matching runtime id.
pub const OFFSET: i64 = 1;

/// Largest graph the host will ask the runtime to build. The runtime
/// allocates every vertex up to the highest id, so a single large id is
/// enough to exhaust memory.
pub const MAX_NODES: usize = 1_000_000;

/// Host ids to runtime ids.
pub fn to_internal(ids: &[usize]) -> Result<Vec<i64>> {
    ids.iter().map(|&id| internal_id(id)).collect()
}

pub fn internal_id(id: usize) -> Result<i64> {
    i64::try_from(id)
        .ok()
        .and_then(|v| v.checked_add(OFFSET))
        .ok_or_else(|| Error::invalid(format!("node id {id} is out of range")))
}

/// Runtime ids back to host ids. Anything below one cannot have come from a
/// well-formed runtime answer.
pub fn to_external(ids: &[i64]) -> Result<Vec<usize>> {
    ids.iter().map(|&id| external_id(id)).collect()
}

pub fn external_id(id: i64) -> Result<usize> {
    usize::try_from(id - OFFSET)
        .map_err(|_| Error::Protocol(format!("runtime returned id {id}, expected ids >= {OFFSET}")))
}

/// Shift both endpoints of every edge into runtime ids.
pub fn edges_to_internal(edges: &[(usize, usize)]) -> Result<Vec<(i64, i64)>> {
    edges
        .iter()
        .map(|&(u, v)| Ok((internal_id(u)?, internal_id(v)?)))
        .collect()
}

/// Node count of the smallest graph holding every internal edge endpoint,
/// capped at [`MAX_NODES`].
pub fn node_count(edges: &[(i64, i64)]) -> Result<i64> {
    let nodes = edges
        .iter()
        .map(|&(u, v)| u.max(v))
        .max()
        .ok_or_else(|| Error::invalid("edges must not be empty"))?;
    if !usize::try_from(nodes).is_ok_and(|n| n <= MAX_NODES) {
        return Err(Error::invalid(format!(
            "graph would need {nodes} nodes, at most {MAX_NODES} are supported"
        )));
    }
    Ok(nodes)
}

/// Disjoint runtime ids for the two sides of a bipartite graph.
///
/// Left and right labels are independent label spaces and may overlap. The
/// left label at position `i` becomes internal id `i + 1`; the right label at
/// position `j` becomes `left.len() + j + 1`. The inverse maps live as long
/// as this value, which covers one solver invocation.
#[derive(Debug, Clone)]
pub struct BipartiteLabels {
    left: HashMap<i64, i64>,
    right: HashMap<i64, i64>,
    left_inverse: HashMap<i64, i64>,
    right_inverse: HashMap<i64, i64>,
    left_len: usize,
    right_len: usize,
}

impl BipartiteLabels {
    pub fn new(left: &[i64], right: &[i64]) -> Result<Self> {
        if left.len() + right.len() > MAX_NODES {
            return Err(Error::invalid(format!(
                "bipartite graph has {} nodes, at most {MAX_NODES} are supported",
                left.len() + right.len()
            )));
        }
        let left_map = rank(left, 0, "left_nodes")?;
        let right_map = rank(right, left.len() as i64, "right_nodes")?;
        Ok(Self {
            left_inverse: invert(&left_map),
            right_inverse: invert(&right_map),
            left: left_map,
            right: right_map,
            left_len: left.len(),
            right_len: right.len(),
        })
    }

    pub fn left_id(&self, label: i64) -> Result<i64> {
        self.left
            .get(&label)
            .copied()
            .ok_or_else(|| Error::invalid(format!("edge uses unknown left node {label}")))
    }

    pub fn right_id(&self, label: i64) -> Result<i64> {
        self.right
            .get(&label)
            .copied()
            .ok_or_else(|| Error::invalid(format!("edge uses unknown right node {label}")))
    }

    pub fn left_label(&self, id: i64) -> Result<i64> {
        self.left_inverse
            .get(&id)
            .copied()
            .ok_or_else(|| Error::Protocol(format!("runtime returned unknown left id {id}")))
    }

    pub fn right_label(&self, id: i64) -> Result<i64> {
        self.right_inverse
            .get(&id)
            .copied()
            .ok_or_else(|| Error::Protocol(format!("runtime returned unknown right id {id}")))
    }

    /// Translate a `(left, right)` labelled edge to internal ids.
    pub fn edge(&self, (u, v): (i64, i64)) -> Result<(i64, i64)> {
        Ok((self.left_id(u)?, self.right_id(v)?))
    }

    /// Internal ids of the left side, in input order.
    pub fn left_ids(&self) -> Vec<i64> {
        (1..=self.left_len as i64).collect()
    }

    /// Internal ids of the right side, in input order.
    pub fn right_ids(&self) -> Vec<i64> {
        let start = self.left_len as i64 + 1;
        (start..start + self.right_len as i64).collect()
    }

    /// Total number of vertices in the combined graph.
    pub fn node_count(&self) -> i64 {
        (self.left_len + self.right_len) as i64
    }
}

fn rank(labels: &[i64], base: i64, side: &str) -> Result<HashMap<i64, i64>> {
    let mut map = HashMap::with_capacity(labels.len());
    for (i, &label) in labels.iter().enumerate() {
        if map.insert(label, base + i as i64 + OFFSET).is_some() {
            return Err(Error::invalid(format!("{side} contains duplicate label {label}")));
        }
    }
    Ok(map)
}

fn invert(map: &HashMap<i64, i64>) -> HashMap<i64, i64> {
    map.iter().map(|(&label, &id)| (id, label)).collect()
}
