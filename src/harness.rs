//! Drive the real `terraform` CLI the way infrastructure test suites do:
//! build [`TerraformOptions`], run `init` / `plan` / `apply`, read outputs, and
//! always `destroy` at the end (see [`DestroyGuard`]).
//!
//! Every call blocks until the process exits. A non-zero exit becomes
//! [`ContextError::Tool`] with the captured stderr.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::process::Command;

use itertools::Itertools;
use rand::Rng;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::errors::{ContextError, Result};

/// Environment variable naming the terraform binary to run.
pub const TERRAFORM_BINARY_ENV: &str = "TERRAFORM_BINARY";

pub const RANDOM_ID_LENGTH: usize = 10;

const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone)]
pub struct TerraformOptions {
    pub terraform_dir: PathBuf,
    /// Passed as `-var key=value`.
    pub vars: BTreeMap<String, Value>,
    pub env_vars: BTreeMap<String, String>,
    pub binary: PathBuf,
    pub no_color: bool,
}

impl TerraformOptions {
    /// Options for `dir`, using `$TERRAFORM_BINARY` or `terraform` from PATH.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let binary = env::var_os(TERRAFORM_BINARY_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("terraform"));
        Self {
            terraform_dir: dir.into(),
            vars: BTreeMap::new(),
            env_vars: BTreeMap::new(),
            binary,
            no_color: true,
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn var_args(&self) -> Vec<String> {
        self.vars
            .iter()
            .flat_map(|(k, v)| ["-var".to_string(), format!("{k}={}", format_var(v))])
            .collect()
    }

    fn command_args(&self, subcommand: &str, flags: &[&str], with_vars: bool) -> Vec<String> {
        let mut args = vec![subcommand.to_string()];
        args.extend(flags.iter().map(|f| f.to_string()));
        if self.no_color {
            args.push("-no-color".into());
        }
        if with_vars {
            args.extend(self.var_args());
        }
        args
    }
}

/// Render a variable value for `-var`: top-level strings verbatim, everything
/// else in HCL literal syntax.
pub fn format_var(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => hcl_literal(other),
    }
}

fn hcl_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(items) => format!("[{}]", items.iter().map(hcl_literal).join(", ")),
        Value::Object(obj) => format!(
            "{{{}}}",
            obj.iter()
                .map(|(k, v)| format!("{} = {}", Value::String(k.clone()), hcl_literal(v)))
                .join(", ")
        ),
    }
}

fn run(options: &TerraformOptions, args: &[String]) -> Result<String> {
    let command_line = format!("{} {}", options.binary.display(), args.join(" "));
    info!(dir = %options.terraform_dir.display(), command = %command_line, "running terraform");

    let output = Command::new(&options.binary)
        .args(args)
        .current_dir(&options.terraform_dir)
        .envs(&options.env_vars)
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(ContextError::Tool {
            command: command_line,
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(stdout + &stderr)
}

pub fn init(options: &TerraformOptions) -> Result<String> {
    run(options, &options.command_args("init", &["-upgrade=false"], false))
}

pub fn plan(options: &TerraformOptions) -> Result<String> {
    run(options, &options.command_args("plan", &["-input=false", "-lock=false"], true))
}

pub fn apply(options: &TerraformOptions) -> Result<String> {
    run(
        options,
        &options.command_args("apply", &["-input=false", "-auto-approve", "-lock=false"], true),
    )
}

pub fn destroy(options: &TerraformOptions) -> Result<String> {
    run(
        options,
        &options.command_args("destroy", &["-input=false", "-auto-approve", "-lock=false"], true),
    )
}

fn output_raw(options: &TerraformOptions, name: Option<&str>) -> Result<String> {
    let mut args = options.command_args("output", &["-json"], false);
    args.extend(name.map(String::from));
    run(options, &args)
}

/// A single output as a string. Non-string values come back as JSON text.
pub fn output(options: &TerraformOptions, name: &str) -> Result<String> {
    let value: Value = serde_json::from_str(output_raw(options, Some(name))?.trim())?;
    Ok(scalar_string(&value))
}

/// A map output with every value flattened to a string.
pub fn output_map(options: &TerraformOptions, name: &str) -> Result<BTreeMap<String, String>> {
    let value: Value = serde_json::from_str(output_raw(options, Some(name))?.trim())?;
    parse_output_map(name, value)
}

/// All outputs, keyed by name.
pub fn output_all(options: &TerraformOptions) -> Result<Map<String, Value>> {
    parse_output_all(&output_raw(options, None)?)
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_output_map(name: &str, value: Value) -> Result<BTreeMap<String, String>> {
    let Value::Object(obj) = value else {
        return Err(ContextError::Output(format!("output {name:?} is not a map: {value}")));
    };
    Ok(obj.iter().map(|(k, v)| (k.clone(), scalar_string(v))).collect())
}

// `terraform output -json` wraps each value as {"sensitive", "type", "value"}
fn parse_output_all(raw: &str) -> Result<Map<String, Value>> {
    let Value::Object(all) = serde_json::from_str::<Value>(raw.trim())? else {
        return Err(ContextError::Output("`output -json` did not return an object".into()));
    };
    all.into_iter()
        .map(|(name, entry)| match entry {
            Value::Object(mut fields) => {
                let value = fields.remove("value").unwrap_or(Value::Null);
                Ok((name, value))
            }
            other => Err(ContextError::Output(format!("malformed output {name:?}: {other}"))),
        })
        .collect()
}

/// Runs `destroy` when dropped, whatever happened before.
#[must_use = "the guard destroys on drop; binding it to `_` drops it immediately"]
pub struct DestroyGuard<'a> {
    options: &'a TerraformOptions,
}

impl<'a> DestroyGuard<'a> {
    pub fn new(options: &'a TerraformOptions) -> Self {
        Self { options }
    }
}

impl Drop for DestroyGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = destroy(self.options) {
            warn!(dir = %self.options.terraform_dir.display(), error = %e, "destroy failed");
        }
    }
}

/// `prefix` followed by a random lowercase id, unique enough to keep parallel
/// runs apart.
pub fn generate_test_name_prefix(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let id: String = (0..RANDOM_ID_LENGTH)
        .map(|_| char::from(ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())]))
        .collect();
    format!("{prefix}{id}")
}
