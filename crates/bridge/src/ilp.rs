//! Mixed integer linear programs built from structured arguments.
//!
//! Constraint and objective text is never parsed here. It travels to Julia as
//! quoted string literals and is parsed there with `Meta.parse`. Variable
//! names are the only text that becomes code directly, which is why they are
//! checked against the identifier pattern before anything is rendered.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::program::{Literal, Program};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is a valid regex")
});

/// Names a variable may not take: Julia keywords, and bindings the
/// synthesized model program reads after the variables are declared.
const RESERVED: &[&str] = &[
    "abstract", "baremodule", "begin", "break", "catch", "const", "continue", "do", "else",
    "elseif", "end", "export", "false", "finally", "for", "function", "global", "if", "import",
    "in", "isa", "let", "local", "macro", "module", "mutable", "outer", "primitive", "public",
    "quote", "return", "struct", "true", "try", "type", "using", "where", "while",
    "Dict", "Float64", "HiGHS", "JuMP", "Max", "Meta", "Min", "Model", "eval", "has_values", "nothing",
    "objective_value", "set_binary", "set_integer", "set_lower_bound", "set_silent",
    "set_upper_bound", "String", "string", "termination_status", "value",
];

/// Check a variable name before it is spliced into the program.
pub fn validate_name(name: &str) -> Result<()> {
    if !IDENTIFIER.is_match(name) {
        return Err(Error::invalid(format!("invalid variable name: {name:?}")));
    }
    if name.starts_with("__") || RESERVED.contains(&name) {
        return Err(Error::invalid(format!("variable name {name:?} is reserved")));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    #[default]
    Continuous,
    Integer,
    Binary,
}

impl FromStr for VarType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" | "" => Ok(Self::Continuous),
            "integer" => Ok(Self::Integer),
            "binary" => Ok(Self::Binary),
            other => Err(Error::invalid(format!("unsupported var_type: {other}"))),
        }
    }
}

impl<'de> Deserialize<'de> for VarType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// A decision variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default)]
    pub lower_bound: Option<f64>,
    #[serde(default)]
    pub upper_bound: Option<f64>,
    #[serde(default)]
    pub var_type: VarType,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lower_bound: None,
            upper_bound: None,
            var_type: VarType::Continuous,
        }
    }

    pub fn lower(mut self, bound: f64) -> Self {
        self.lower_bound = Some(bound);
        self
    }

    pub fn upper(mut self, bound: f64) -> Self {
        self.upper_bound = Some(bound);
        self
    }

    pub fn kind(mut self, var_type: VarType) -> Self {
        self.var_type = var_type;
        self
    }
}

/// Optimization direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sense {
    #[default]
    Max,
    Min,
}

impl FromStr for Sense {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            _ => Err(Error::invalid(format!("sense must be 'Max' or 'Min', got {s:?}"))),
        }
    }
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Max => "Max",
            Self::Min => "Min",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Optimization,
    Feasibility,
}

/// A validated model, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct IlpModel {
    variables: Vec<Variable>,
    constraints: Vec<String>,
    objective: Option<(String, Sense)>,
}

impl IlpModel {
    /// Validate the pieces of a model.
    ///
    /// A blank or missing objective selects feasibility mode, in which case
    /// `sense` is ignored. Names are trimmed before validation.
    pub fn new(
        variables: &[Variable],
        constraints: &[String],
        objective: Option<&str>,
        sense: Option<&str>,
    ) -> Result<Self> {
        if variables.is_empty() {
            return Err(Error::invalid("variables must be non-empty"));
        }
        if constraints.is_empty() {
            return Err(Error::invalid("constraints must be non-empty"));
        }

        let objective = match objective.map(str::trim).filter(|o| !o.is_empty()) {
            Some(text) => {
                let sense = sense.map(str::parse).transpose()?.unwrap_or_default();
                Some((text.to_string(), sense))
            }
            None => None,
        };

        let mut seen = HashSet::new();
        let mut checked = Vec::with_capacity(variables.len());
        for var in variables {
            let name = var.name.trim();
            validate_name(name)?;
            if !seen.insert(name.to_string()) {
                return Err(Error::invalid(format!("duplicate variable name: {name:?}")));
            }
            checked.push(Variable {
                name: name.to_string(),
                ..var.clone()
            });
        }

        Ok(Self {
            variables: checked,
            constraints: constraints.to_vec(),
            objective,
        })
    }

    pub fn mode(&self) -> Mode {
        if self.objective.is_some() {
            Mode::Optimization
        } else {
            Mode::Feasibility
        }
    }

    /// Render the model as one program whose value is
    /// `(status, objective value or nothing, Dict(name => value))`.
    pub fn program(&self) -> Result<Program> {
        let mut program = Program::new()
            .using("JuMP, HiGHS")
            .stmt("__model = Model(HiGHS.Optimizer)")
            .stmt("set_silent(__model)");

        for var in &self.variables {
            program.push(format!("@variable(__model, {})", var.name));
        }
        for var in &self.variables {
            if let Some(lb) = var.lower_bound {
                program.push(format!("set_lower_bound({}, {})", var.name, Literal::float(lb)?));
            }
            if let Some(ub) = var.upper_bound {
                program.push(format!("set_upper_bound({}, {})", var.name, Literal::float(ub)?));
            }
            match var.var_type {
                VarType::Continuous => {}
                VarType::Integer => program.push(format!("set_integer({})", var.name)),
                VarType::Binary => program.push(format!("set_binary({})", var.name)),
            }
        }

        program.push(format!("__constraints = {}", Literal::strings(&self.constraints)));
        program.push("for __c in __constraints");
        program.push("    __expr = Meta.parse(__c)");
        program.push("    eval(:(@constraint(__model, $__expr)))");
        program.push("end");

        match &self.objective {
            Some((text, sense)) => {
                program.push(format!("__objective = Meta.parse({})", Literal::string(text)));
                program.push(format!("eval(:(@objective(__model, {sense}, $__objective)))"));
            }
            None => program.push("@objective(__model, Min, 0)"),
        }

        let pairs: Vec<String> = self
            .variables
            .iter()
            .map(|v| format!("{} => value({})", Literal::string(&v.name), v.name))
            .collect();

        program.push("optimize!(__model)");
        program.push("__status = string(termination_status(__model))");
        program.push("__obj = has_values(__model) ? objective_value(__model) : nothing");
        program.push(format!(
            "__vals = has_values(__model) ? Dict{{String,Float64}}({}) : Dict{{String,Float64}}()",
            pairs.join(", ")
        ));
        program.push("(__status, __obj, __vals)");
        Ok(program)
    }
}

/// Outcome of a solved model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IlpSolution {
    /// Solver termination status, e.g. `OPTIMAL` or `INFEASIBLE`.
    pub status: String,
    pub mode: Mode,
    pub objective_value: Option<f64>,
    /// Empty when the solver produced no primal solution.
    pub variable_values: BTreeMap<String, f64>,
}

impl IlpSolution {
    pub fn is_feasible(&self) -> bool {
        !self.variable_values.is_empty()
    }
}
