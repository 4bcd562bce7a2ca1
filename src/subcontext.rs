//! Several contexts evaluated from one shared base.
//!
//! Each [`Subcontext`] applies its overrides on top of the base inputs. A
//! failover subcontext points at another label; that one is evaluated first and
//! its `name_prefix` becomes the failover's `FailoverPrimary` data tag.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::context::{Context, ContextInputs};
use crate::environment::EnvironmentType;
use crate::errors::{ContextError, Result};
use crate::source_repo::RepoMetadataSource;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextOverrides {
    pub environment_type: Option<EnvironmentType>,
    pub environment: Option<String>,
    pub environment_name: Option<String>,
    /// Label of the subcontext this one fails over from.
    pub failover_of: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subcontext {
    pub label: String,
    pub overrides: ContextOverrides,
}

impl Subcontext {
    pub fn new(label: impl Into<String>, environment_type: EnvironmentType) -> Self {
        Self {
            label: label.into(),
            overrides: ContextOverrides {
                environment_type: Some(environment_type),
                ..ContextOverrides::default()
            },
        }
    }

    pub fn failover_of(mut self, label: impl Into<String>) -> Self {
        self.overrides.failover_of = Some(label.into());
        self
    }

    /// Terraform address of the module instance backing this subcontext.
    pub fn module_address(&self) -> String {
        format!("module.{}_context", self.label)
    }

    /// Base inputs with this subcontext's overrides applied.
    ///
    /// Overriding `environment_type` also drops the base's environment label and
    /// name overrides, so every instance derives its own. `failover_primary` is
    /// never inherited; only [`compose`] sets it, from `failover_of`.
    pub fn inputs(&self, base: &ContextInputs) -> ContextInputs {
        let mut inputs = base.clone();
        inputs.failover_primary = None;
        let o = &self.overrides;
        if let Some(env) = o.environment_type {
            inputs.environment_type = env;
            inputs.environment = None;
            inputs.environment_name = None;
        }
        if o.environment.is_some() {
            inputs.environment = o.environment.clone();
        }
        if o.environment_name.is_some() {
            inputs.environment_name = o.environment_name.clone();
        }
        inputs
    }
}

/// The `primary` / `failover` pair.
pub fn primary_failover(primary_env: EnvironmentType, failover_env: EnvironmentType) -> Vec<Subcontext> {
    vec![
        Subcontext::new("primary", primary_env),
        Subcontext::new("failover", failover_env).failover_of("primary"),
    ]
}

/// Evaluate every subcontext, primaries before their failovers. The result keeps
/// declaration order.
pub fn compose(
    base: &ContextInputs,
    subcontexts: &[Subcontext],
    source: &dyn RepoMetadataSource,
) -> Result<Vec<(String, Context)>> {
    let mut labels = HashSet::new();
    for sub in subcontexts {
        if !labels.insert(sub.label.as_str()) {
            return Err(ContextError::InvalidInput(format!("duplicate subcontext {:?}", sub.label)));
        }
    }
    for sub in subcontexts {
        if let Some(target) = &sub.overrides.failover_of {
            if !labels.contains(target.as_str()) {
                return Err(ContextError::InvalidInput(format!(
                    "subcontext {:?} fails over from unknown subcontext {target:?}",
                    sub.label
                )));
            }
        }
    }

    let mut done: BTreeMap<String, Context> = BTreeMap::new();
    while done.len() < subcontexts.len() {
        let before = done.len();
        for sub in subcontexts {
            if done.contains_key(&sub.label) {
                continue;
            }
            let mut inputs = sub.inputs(base);
            if let Some(target) = &sub.overrides.failover_of {
                match done.get(target) {
                    Some(primary) => inputs.failover_primary = Some(primary.name_prefix.clone()),
                    // primary not evaluated yet
                    None => continue,
                }
            }
            debug!(label = %sub.label, "evaluating subcontext");
            let ctx = Context::evaluate(&inputs, source)?;
            done.insert(sub.label.clone(), ctx);
        }
        if done.len() == before {
            let stuck: Vec<&str> = subcontexts
                .iter()
                .filter(|s| !done.contains_key(&s.label))
                .map(|s| s.label.as_str())
                .collect();
            return Err(ContextError::InvalidInput(format!("failover cycle between {stuck:?}")));
        }
    }

    Ok(subcontexts
        .iter()
        .filter_map(|s| done.remove(&s.label).map(|ctx| (s.label.clone(), ctx)))
        .collect())
}
