//! Julia program synthesis.
//!
//! Host data reaches Julia source text only through [`Literal`]
//! constructors, which render typed values (numbers, vectors, dicts) or go
//! through [`quote`] for strings. Statement templates are fixed in this crate;
//! nothing here splices caller-provided text into code unescaped.

use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

/// Quote `text` as a Julia string literal.
///
/// JSON escaping covers quotes, backslashes and control characters with
/// escapes Julia shares. Julia additionally interpolates `$` inside string
/// literals, so it is escaped as well.
pub fn quote(text: &str) -> String {
    Value::String(text.to_owned())
        .to_string()
        .replace('$', "\\$")
}

/// A Julia expression rendered from typed host data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal(String);

impl Literal {
    pub fn int(value: i64) -> Self {
        Self(value.to_string())
    }

    /// Render a float. NaN and infinities are rejected; they have no
    /// meaning as solver input.
    pub fn float(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::invalid(format!("expected a finite number, got {value}")));
        }
        Ok(Self(format!("{value:?}")))
    }

    pub fn bool(value: bool) -> Self {
        Self(value.to_string())
    }

    pub fn string(value: &str) -> Self {
        Self(quote(value))
    }

    /// `[1, 2, 3]`, or `Int[]` when empty so the element type is fixed.
    pub fn ints(values: &[i64]) -> Self {
        if values.is_empty() {
            return Self("Int[]".into());
        }
        Self(bracket(values.iter().map(i64::to_string)))
    }

    pub fn floats(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Ok(Self("Float64[]".into()));
        }
        let rendered = values
            .iter()
            .map(|v| Self::float(*v).map(|l| l.0))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(bracket(rendered)))
    }

    /// A vector of integer vectors, e.g. the subsets of a cover instance.
    pub fn int_lists(lists: &[Vec<i64>]) -> Self {
        if lists.is_empty() {
            return Self("Vector{Int}[]".into());
        }
        Self(bracket(lists.iter().map(|l| Self::ints(l).0)))
    }

    pub fn strings(values: &[String]) -> Self {
        if values.is_empty() {
            return Self("String[]".into());
        }
        Self(bracket(values.iter().map(|v| quote(v))))
    }

    /// `Dict((u, v) => w, ...)` keyed by runtime node ids. An empty input
    /// yields a typed empty dict.
    pub fn edge_weights(weights: &[((i64, i64), f64)]) -> Result<Self> {
        if weights.is_empty() {
            return Ok(Self("Dict{Tuple{Int,Int},Float64}()".into()));
        }
        let pairs = weights
            .iter()
            .map(|((u, v), w)| Ok(format!("({u}, {v}) => {}", Self::float(*w)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(format!("Dict({})", pairs.join(", "))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn bracket(items: impl IntoIterator<Item = String>) -> String {
    format!("[{}]", items.into_iter().collect::<Vec<_>>().join(", "))
}

/// Graph flavor from the `Graphs` package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Undirected,
    Directed,
}

impl GraphKind {
    fn constructor(self) -> &'static str {
        match self {
            Self::Undirected => "SimpleGraph",
            Self::Directed => "SimpleDiGraph",
        }
    }
}

/// A complete program for the driver.
///
/// Rendered as optional top-level `using` lines followed by one
/// `begin ... end` block. The block's last statement is the program's value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    imports: Vec<&'static str>,
    statements: Vec<String>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load packages before the block runs. Module names are fixed by the
    /// caller, never derived from input.
    pub fn using(mut self, modules: &'static str) -> Self {
        self.imports.push(modules);
        self
    }

    pub fn stmt(mut self, statement: impl Into<String>) -> Self {
        self.statements.push(statement.into());
        self
    }

    pub fn push(&mut self, statement: impl Into<String>) {
        self.statements.push(statement.into());
    }

    /// Declare `name` as a graph on `nodes` vertices and add every edge.
    /// Edge endpoints must already be runtime (one-based) ids.
    pub fn graph(mut self, name: &str, kind: GraphKind, nodes: i64, edges: &[(i64, i64)]) -> Self {
        self.push(format!("{name} = {}({nodes})", kind.constructor()));
        for (u, v) in edges {
            self.push(format!("add_edge!({name}, {u}, {v})"));
        }
        self
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Render the full source text.
    pub fn source(&self) -> String {
        let mut out = String::new();
        for modules in &self.imports {
            out.push_str("using ");
            out.push_str(modules);
            out.push('\n');
        }
        out.push_str("begin\n");
        for statement in &self.statements {
            out.push_str("    ");
            out.push_str(statement);
            out.push('\n');
        }
        out.push_str("end\n");
        out
    }
}
