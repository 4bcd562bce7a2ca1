use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ContextError;

/// Kind of environment a context is deployed into.
///
/// Parsed from (and serialized as) its display name, e.g. `"QA Primary"`.
/// The abbreviation is what ends up in name prefixes and the `ck-environment` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EnvironmentType {
    #[default]
    None,
    Ephemeral,
    Sandbox,
    Development,
    Testing,
    QaPrimary,
    QaFailover,
    UatPrimary,
    UatFailover,
    ProductionPrimary,
    ProductionFailover,
    Management,
}

// display name, abbreviation
const TABLE: &[(EnvironmentType, &str, Option<&str>)] = &[
    (EnvironmentType::None, "None", None),
    (EnvironmentType::Ephemeral, "Ephemeral", Some("eph")),
    (EnvironmentType::Sandbox, "Sandbox", Some("sbx")),
    (EnvironmentType::Development, "Development", Some("dev")),
    (EnvironmentType::Testing, "Testing", Some("test")),
    (EnvironmentType::QaPrimary, "QA Primary", Some("qaprim")),
    (EnvironmentType::QaFailover, "QA Failover", Some("qafo")),
    (EnvironmentType::UatPrimary, "UAT Primary", Some("uatprim")),
    (EnvironmentType::UatFailover, "UAT Failover", Some("uatfo")),
    (EnvironmentType::ProductionPrimary, "Production Primary", Some("prdprim")),
    (EnvironmentType::ProductionFailover, "Production Failover", Some("prdfo")),
    (EnvironmentType::Management, "Management", Some("mgmt")),
];

impl EnvironmentType {
    pub fn all() -> impl Iterator<Item = EnvironmentType> {
        TABLE.iter().map(|(env, _, _)| *env)
    }

    fn entry(&self) -> &'static (EnvironmentType, &'static str, Option<&'static str>) {
        // TABLE lists every variant, so the fallback is the `None` row
        TABLE.iter().find(|(env, _, _)| env == self).unwrap_or(&TABLE[0])
    }

    pub fn display_name(&self) -> &'static str {
        self.entry().1
    }

    /// Short label used in name prefixes; `None` has no label.
    pub fn abbreviation(&self) -> Option<&'static str> {
        self.entry().2
    }

    pub fn is_failover(&self) -> bool {
        matches!(
            self,
            EnvironmentType::QaFailover
                | EnvironmentType::UatFailover
                | EnvironmentType::ProductionFailover
        )
    }
}

impl FromStr for EnvironmentType {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.split_whitespace().collect::<Vec<_>>().join(" ");
        TABLE
            .iter()
            .find(|(_, name, _)| name.eq_ignore_ascii_case(&wanted))
            .map(|(env, _, _)| *env)
            .ok_or_else(|| ContextError::UnknownEnvironment(s.to_string()))
    }
}

impl TryFrom<String> for EnvironmentType {
    type Error = ContextError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EnvironmentType> for String {
    fn from(env: EnvironmentType) -> Self {
        env.display_name().to_string()
    }
}

impl fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
