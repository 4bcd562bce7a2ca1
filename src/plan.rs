//! In-process model of planning and applying the example configurations.
//!
//! The context manages no resources, so a plan here is only the data source
//! reads it would perform and the output values that would change. Applying a
//! plan records the outputs in a [`State`]; destroying clears it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use tracing::info;

use crate::context::{Context, ContextInputs};
use crate::environment::EnvironmentType;
use crate::errors::{ContextError, Result};
use crate::source_repo::RepoMetadataSource;
use crate::subcontext::{compose, primary_failover, Subcontext};

pub const GIT_REPO_DATA_SOURCE: &str = "data.external.git_repo[0]";

/// The example configurations shipped with the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Example {
    Defaults,
    Complete,
    Subcontext,
}

impl FromStr for Example {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "defaults" => Ok(Example::Defaults),
            "complete" => Ok(Example::Complete),
            "subcontext" => Ok(Example::Subcontext),
            other => Err(ContextError::InvalidInput(format!("unknown example {other:?}"))),
        }
    }
}

/// A root configuration: either a single root-level context or a set of
/// subcontext module instances sharing one base.
#[derive(Debug, Clone)]
pub struct Configuration {
    base: ContextInputs,
    subcontexts: Vec<Subcontext>,
}

impl Configuration {
    pub fn root(inputs: ContextInputs) -> Self {
        Self { base: inputs, subcontexts: Vec::new() }
    }

    pub fn with_subcontexts(base: ContextInputs, subcontexts: Vec<Subcontext>) -> Self {
        Self { base, subcontexts }
    }

    /// Build one of the example configurations from its variables. `defaults`
    /// only reads `name`; `subcontext` fixes the QA primary/failover pair.
    pub fn example(example: Example, vars: ContextInputs) -> Self {
        match example {
            Example::Defaults => Self::root(ContextInputs::new(vars.name)),
            Example::Complete => Self::root(vars),
            Example::Subcontext => Self::with_subcontexts(
                vars,
                primary_failover(EnvironmentType::QaPrimary, EnvironmentType::QaFailover),
            ),
        }
    }

    /// Evaluate every instance and diff the outputs against `state`.
    pub fn plan(&self, state: &State, source: &dyn RepoMetadataSource) -> Result<Plan> {
        let reads_source = self.base.enabled && self.base.source_repo_tags_enabled;
        let mut data_reads = Vec::new();
        let mut outputs = Map::new();

        if self.subcontexts.is_empty() {
            let ctx = Context::evaluate(&self.base, source)?;
            if reads_source {
                data_reads.push(GIT_REPO_DATA_SOURCE.to_string());
            }
            outputs.extend(ctx.outputs(""));
        } else {
            let evaluated = compose(&self.base, &self.subcontexts, source)?;
            for (sub, (label, ctx)) in self.subcontexts.iter().zip(evaluated) {
                if reads_source {
                    data_reads.push(format!("{}.{GIT_REPO_DATA_SOURCE}", sub.module_address()));
                }
                outputs.extend(ctx.outputs(&format!("{label}_")));
            }
        }

        let output_changes = diff_outputs(&state.outputs, &outputs);
        info!(
            data_reads = data_reads.len(),
            output_changes = output_changes.len(),
            "plan computed"
        );
        Ok(Plan { data_reads, outputs, output_changes })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputChange {
    Add { name: String, value: Value },
    Update { name: String, old: Value, new: Value },
    Remove { name: String, old: Value },
}

impl OutputChange {
    pub fn name(&self) -> &str {
        match self {
            OutputChange::Add { name, .. }
            | OutputChange::Update { name, .. }
            | OutputChange::Remove { name, .. } => name,
        }
    }
}

// null outputs are never stored, so they diff as absent
fn diff_outputs(old: &BTreeMap<String, Value>, new: &Map<String, Value>) -> Vec<OutputChange> {
    let mut changes = Vec::new();
    for (name, value) in new.iter().filter(|(_, v)| !v.is_null()) {
        match old.get(name) {
            None => changes.push(OutputChange::Add { name: name.clone(), value: value.clone() }),
            Some(prev) if prev != value => changes.push(OutputChange::Update {
                name: name.clone(),
                old: prev.clone(),
                new: value.clone(),
            }),
            Some(_) => {}
        }
    }
    for (name, prev) in old {
        if new.get(name).map_or(true, Value::is_null) {
            changes.push(OutputChange::Remove { name: name.clone(), old: prev.clone() });
        }
    }
    changes
}

#[derive(Debug, Clone)]
pub struct Plan {
    data_reads: Vec<String>,
    outputs: Map<String, Value>,
    output_changes: Vec<OutputChange>,
}

impl Plan {
    /// Addresses of the data sources read while planning.
    pub fn data_reads(&self) -> &[String] {
        &self.data_reads
    }

    pub fn outputs(&self) -> &Map<String, Value> {
        &self.outputs
    }

    pub fn output_changes(&self) -> &[OutputChange] {
        &self.output_changes
    }

    /// Terraform-style plan text.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Record the planned outputs.
    pub fn apply(&self, state: &mut State) {
        state.outputs = self
            .outputs
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        info!(outputs = state.outputs.len(), "plan applied");
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for addr in &self.data_reads {
            writeln!(f, "{addr}: Reading...")?;
            writeln!(f, "{addr}: Read complete after 0s [id=-]")?;
        }
        if !self.data_reads.is_empty() {
            writeln!(f)?;
        }

        writeln!(f, "No changes. Your infrastructure matches the configuration.")?;

        if self.output_changes.is_empty() {
            writeln!(f)?;
            writeln!(f, "Terraform has compared your real infrastructure against your configuration")?;
            return writeln!(f, "and found no differences, so no changes are needed.");
        }

        writeln!(f)?;
        writeln!(f, "Changes to Outputs:")?;
        for change in &self.output_changes {
            match change {
                OutputChange::Add { name, value } => writeln!(f, "  + {name} = {value}")?,
                OutputChange::Update { name, old, new } => writeln!(f, "  ~ {name} = {old} -> {new}")?,
                OutputChange::Remove { name, old } => writeln!(f, "  - {name} = {old} -> null")?,
            }
        }
        writeln!(f)?;
        writeln!(f, "You can apply this plan to save these new output values to the Terraform")?;
        writeln!(f, "state, without changing any real infrastructure.")
    }
}

/// Output values saved by the last apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    outputs: BTreeMap<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn output_json(&self, name: &str) -> Result<&Value> {
        self.outputs
            .get(name)
            .ok_or_else(|| ContextError::Output(format!("output {name:?} not found")))
    }

    pub fn output(&self, name: &str) -> Result<String> {
        match self.output_json(name)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(ContextError::Output(format!("output {name:?} is not a string: {other}"))),
        }
    }

    pub fn output_map(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let Value::Object(obj) = self.output_json(name)? else {
            return Err(ContextError::Output(format!("output {name:?} is not a map")));
        };
        Ok(obj
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect())
    }

    pub fn destroy(&mut self) {
        info!(outputs = self.outputs.len(), "destroying state");
        self.outputs.clear();
    }
}
