//! The label/tag deriver.
//!
//! A [`Context`] is a pure function of its [`ContextInputs`] plus, when source
//! repo tags are on, whatever the metadata source reports. Nothing is cached or
//! persisted between evaluations.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::environment::EnvironmentType;
use crate::errors::{ContextError, Result};
use crate::source_repo::RepoMetadataSource;

pub type Tags = BTreeMap<String, String>;

pub const TAG_NAMESPACE: &str = "ck-namespace";
pub const TAG_NAME: &str = "ck-name";
pub const TAG_PRODUCT: &str = "ck-product";
pub const TAG_ENVIRONMENT: &str = "ck-environment";
pub const TAG_ENVIRONMENT_NAME: &str = "ck-environment-name";
pub const SOURCE_TAG_PREFIX: &str = "ck-source-";

pub const DATA_CLASSIFICATION: &str = "DataClassification";
pub const RETENTION_PERIOD: &str = "RetentionPeriod";
pub const FAILOVER_PRIMARY: &str = "FailoverPrimary";

fn default_namespace() -> String {
    "ck".into()
}
fn default_true() -> bool {
    true
}
fn default_classification() -> String {
    "Internal".into()
}
fn default_retention() -> String {
    "Standard".into()
}
fn default_delimiter() -> String {
    "-".into()
}

/// Variables accepted by the context. Missing fields take their defaults when
/// deserialized from a vars file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInputs {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub environment_type: EnvironmentType,
    /// Overrides the abbreviation derived from `environment_type`.
    #[serde(default)]
    pub environment: Option<String>,
    /// Overrides the display name derived from `environment_type`.
    #[serde(default)]
    pub environment_name: Option<String>,
    /// Defaults to `name`.
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub source_repo_tags_enabled: bool,
    #[serde(default = "default_classification")]
    pub data_classification: String,
    #[serde(default = "default_retention")]
    pub retention_period: String,
    /// Name prefix of the primary this context fails over from.
    #[serde(default)]
    pub failover_primary: Option<String>,
    #[serde(default)]
    pub additional_tags: Tags,
    #[serde(default)]
    pub additional_data_tags: Tags,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl ContextInputs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: default_namespace(),
            environment_type: EnvironmentType::None,
            environment: None,
            environment_name: None,
            product: None,
            enabled: true,
            source_repo_tags_enabled: true,
            data_classification: default_classification(),
            retention_period: default_retention(),
            failover_primary: None,
            additional_tags: Tags::new(),
            additional_data_tags: Tags::new(),
            delimiter: default_delimiter(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_environment_type(mut self, env: EnvironmentType) -> Self {
        self.environment_type = env;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_source_repo_tags(mut self, enabled: bool) -> Self {
        self.source_repo_tags_enabled = enabled;
        self
    }

    pub fn with_failover_primary(mut self, prefix: impl Into<String>) -> Self {
        self.failover_primary = Some(prefix.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_tags.insert(key.into(), value.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ContextError::InvalidInput("name must not be empty".into()));
        }
        check_label("name", &self.name)?;
        check_label("namespace", &self.namespace)?;
        if let Some(env) = &self.environment {
            check_label("environment", env)?;
        }
        if self.delimiter.is_empty() {
            return Err(ContextError::InvalidInput("delimiter must not be empty".into()));
        }
        Ok(())
    }
}

fn check_label(field: &str, value: &str) -> Result<()> {
    match value.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-')) {
        Some(c) => Err(ContextError::InvalidInput(format!(
            "{field} {value:?} contains {c:?}; only ASCII letters, digits and '-' are allowed"
        ))),
        None => Ok(()),
    }
}

/// Derived naming and tagging for one context instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Context {
    pub enabled: bool,
    pub namespace: String,
    pub name: String,
    /// Environment abbreviation, empty for `None`.
    pub environment: String,
    pub environment_name: String,
    pub product: String,
    pub name_prefix: String,
    pub tags: Tags,
    pub data_tags: Tags,
}

impl Context {
    /// A context that contributes nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Derive naming and tags. The metadata source is consulted only when the
    /// context is enabled and source repo tags are on.
    pub fn evaluate(inputs: &ContextInputs, source: &dyn RepoMetadataSource) -> Result<Self> {
        if !inputs.enabled {
            debug!(name = %inputs.name, "context disabled");
            return Ok(Self::disabled());
        }
        inputs.validate()?;

        let environment = inputs
            .environment
            .clone()
            .or_else(|| inputs.environment_type.abbreviation().map(String::from))
            .unwrap_or_default();
        let environment_name = inputs
            .environment_name
            .clone()
            .unwrap_or_else(|| inputs.environment_type.display_name().to_string());
        let product = inputs.product.clone().unwrap_or_else(|| inputs.name.clone());

        let name_prefix = [inputs.namespace.as_str(), environment.as_str(), inputs.name.as_str()]
            .into_iter()
            .filter(|label| !label.is_empty())
            .map(str::to_lowercase)
            .join(&inputs.delimiter);

        let mut tags = inputs.additional_tags.clone();
        if inputs.source_repo_tags_enabled {
            for (key, value) in source.lookup()? {
                tags.insert(source_tag_key(&key), value);
            }
        }
        tags.insert(TAG_NAMESPACE.into(), inputs.namespace.clone());
        tags.insert(TAG_NAME.into(), inputs.name.clone());
        tags.insert(TAG_PRODUCT.into(), product.clone());
        if !environment.is_empty() {
            tags.insert(TAG_ENVIRONMENT.into(), environment.clone());
        }
        tags.insert(TAG_ENVIRONMENT_NAME.into(), environment_name.clone());

        let mut data_tags = inputs.additional_data_tags.clone();
        data_tags.insert(DATA_CLASSIFICATION.into(), inputs.data_classification.clone());
        data_tags.insert(RETENTION_PERIOD.into(), inputs.retention_period.clone());
        if let Some(primary) = &inputs.failover_primary {
            data_tags.insert(FAILOVER_PRIMARY.into(), primary.clone());
        }

        debug!(%name_prefix, tags = tags.len(), "context derived");
        Ok(Self {
            enabled: true,
            namespace: inputs.namespace.clone(),
            name: inputs.name.clone(),
            environment,
            environment_name,
            product,
            name_prefix,
            tags,
            data_tags,
        })
    }

    /// The `context` output: namespace, name, environment, environment_name.
    pub fn context_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("namespace".to_string(), self.namespace.clone()),
            ("name".to_string(), self.name.clone()),
            ("environment".to_string(), self.environment.clone()),
            ("environment_name".to_string(), self.environment_name.clone()),
        ])
    }

    /// Named output values, each key prefixed with `prefix` (`""`, `"primary_"`...).
    /// A disabled context renders every output as null.
    pub fn outputs(&self, prefix: &str) -> Map<String, Value> {
        let values = if self.enabled {
            [
                ("name_prefix", json!(self.name_prefix)),
                ("context", json!(self.context_map())),
                ("tags", json!(self.tags)),
                ("data_tags", json!(self.data_tags)),
            ]
        } else {
            [
                ("name_prefix", Value::Null),
                ("context", Value::Null),
                ("tags", Value::Null),
                ("data_tags", Value::Null),
            ]
        };
        values
            .into_iter()
            .map(|(name, value)| (format!("{prefix}{name}"), value))
            .collect()
    }
}

fn source_tag_key(key: &str) -> String {
    format!("{SOURCE_TAG_PREFIX}{}", key.replace('_', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_repo::StaticRepoMetadata;
    use pretty_assertions::assert_eq;

    fn repo() -> StaticRepoMetadata {
        StaticRepoMetadata::new([
            ("repo", "https://github.com/acme/infra.git"),
            ("branch", "main"),
            ("commit", "0123abcd"),
        ])
    }

    #[test]
    fn qa_primary_prefix() {
        let inputs = ContextInputs::new("svc1").with_environment_type(EnvironmentType::QaPrimary);
        let ctx = Context::evaluate(&inputs, &repo()).unwrap();
        assert_eq!(ctx.name_prefix, "ck-qaprim-svc1");
        assert_eq!(ctx.environment, "qaprim");
        assert_eq!(ctx.environment_name, "QA Primary");
    }

    #[test]
    fn none_environment_has_no_label() {
        let ctx = Context::evaluate(&ContextInputs::new("comp123"), &repo()).unwrap();
        assert_eq!(ctx.name_prefix, "ck-comp123");
        assert!(!ctx.tags.contains_key(TAG_ENVIRONMENT));
        assert_eq!(ctx.tags[TAG_ENVIRONMENT_NAME], "None");
    }

    #[test]
    fn prefix_is_lower_cased() {
        let ctx = Context::evaluate(&ContextInputs::new("Billing").with_namespace("CK"), &repo()).unwrap();
        assert_eq!(ctx.name_prefix, "ck-billing");
        assert_eq!(ctx.tags[TAG_NAME], "Billing");
    }

    #[test]
    fn standard_and_source_tags() {
        let ctx = Context::evaluate(&ContextInputs::new("svc1"), &repo()).unwrap();
        let expected: Tags = [
            ("ck-environment-name", "None"),
            ("ck-name", "svc1"),
            ("ck-namespace", "ck"),
            ("ck-product", "svc1"),
            ("ck-source-branch", "main"),
            ("ck-source-commit", "0123abcd"),
            ("ck-source-repo", "https://github.com/acme/infra.git"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(ctx.tags, expected);
    }

    #[test]
    fn source_tags_disabled_skips_lookup() {
        let src = repo();
        let inputs = ContextInputs::new("svc1").with_source_repo_tags(false);
        let ctx = Context::evaluate(&inputs, &src).unwrap();
        assert_eq!(src.calls(), 0);
        assert!(ctx.tags.keys().all(|k| !k.starts_with(SOURCE_TAG_PREFIX)));
    }

    #[test]
    fn disabled_context_is_empty_and_never_looks_up() {
        let src = repo();
        let ctx = Context::evaluate(&ContextInputs::new("svc1").with_enabled(false), &src).unwrap();
        assert_eq!(ctx, Context::disabled());
        assert_eq!(src.calls(), 0);
        assert!(ctx.outputs("").values().all(Value::is_null));
    }

    #[test]
    fn disabled_context_skips_validation() {
        let ctx = Context::evaluate(&ContextInputs::new("").with_enabled(false), &repo()).unwrap();
        assert!(!ctx.enabled);
    }

    #[test]
    fn standard_tags_win_over_additional_tags() {
        let inputs = ContextInputs::new("svc1")
            .with_tag("ck-name", "spoofed")
            .with_tag("team", "platform");
        let ctx = Context::evaluate(&inputs, &repo()).unwrap();
        assert_eq!(ctx.tags["ck-name"], "svc1");
        assert_eq!(ctx.tags["team"], "platform");
    }

    #[test]
    fn data_tags_with_and_without_failover() {
        let primary = Context::evaluate(&ContextInputs::new("svc1"), &repo()).unwrap();
        assert_eq!(primary.data_tags[DATA_CLASSIFICATION], "Internal");
        assert_eq!(primary.data_tags[RETENTION_PERIOD], "Standard");
        assert!(!primary.data_tags.contains_key(FAILOVER_PRIMARY));

        let failover = Context::evaluate(
            &ContextInputs::new("svc1").with_failover_primary("ck-qaprim-svc1"),
            &repo(),
        )
        .unwrap();
        assert_eq!(failover.data_tags[FAILOVER_PRIMARY], "ck-qaprim-svc1");
    }

    #[test]
    fn environment_overrides_take_precedence() {
        let mut inputs = ContextInputs::new("svc1").with_environment_type(EnvironmentType::QaPrimary);
        inputs.environment = Some("qa2".into());
        inputs.environment_name = Some("QA Second".into());
        let ctx = Context::evaluate(&inputs, &repo()).unwrap();
        assert_eq!(ctx.name_prefix, "ck-qa2-svc1");
        assert_eq!(ctx.tags[TAG_ENVIRONMENT_NAME], "QA Second");
    }

    #[test]
    fn invalid_names_are_rejected_before_lookup() {
        let src = repo();
        for bad in ["", "   ", "has space", "under_score", "dot.ted"] {
            let err = Context::evaluate(&ContextInputs::new(bad), &src).unwrap_err();
            assert!(matches!(err, ContextError::InvalidInput(_)), "{bad:?} accepted");
        }
        assert_eq!(src.calls(), 0);
    }

    #[test]
    fn outputs_are_prefixed() {
        let ctx = Context::evaluate(&ContextInputs::new("svc1"), &repo()).unwrap();
        let out = ctx.outputs("primary_");
        let keys: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["primary_context", "primary_data_tags", "primary_name_prefix", "primary_tags"]
        );
        assert_eq!(out["primary_name_prefix"], json!("ck-svc1"));
        assert_eq!(out["primary_context"]["environment_name"], json!("None"));
    }

    #[test]
    fn vars_file_defaults() {
        let inputs: ContextInputs = serde_json::from_str(r#"{"name": "def1"}"#).unwrap();
        assert_eq!(inputs, ContextInputs::new("def1"));

        let inputs: ContextInputs = serde_json::from_str(
            r#"{"name": "comp1", "environment_type": "QA Failover", "enabled": false}"#,
        )
        .unwrap();
        assert_eq!(inputs.environment_type, EnvironmentType::QaFailover);
        assert!(!inputs.enabled);
        assert!(inputs.source_repo_tags_enabled);
    }
}
