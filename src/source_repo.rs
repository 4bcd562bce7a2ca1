//! Source-control metadata for `ck-source-*` tags.
//!
//! The lookup is an external collaborator: a process run during evaluation whose
//! output (a flat string map) is folded into the tags. [`GitRepoSource`] asks `git`
//! directly, and the `ckctx git-repo` subcommand exposes the same lookup through
//! terraform's `external` data source protocol ([`read_query`] / [`write_result`]).

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{ContextError, Result};

pub type RepoMetadata = BTreeMap<String, String>;

/// Something that can report repository metadata as string pairs.
pub trait RepoMetadataSource {
    fn lookup(&self) -> Result<RepoMetadata>;
}

/// Runs `git` inside a working tree.
#[derive(Debug, Clone)]
pub struct GitRepoSource {
    working_dir: PathBuf,
    git: PathBuf,
}

impl GitRepoSource {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self { working_dir: working_dir.into(), git: PathBuf::from("git") }
    }

    pub fn with_git(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    // Ok(None) when git ran fine but had nothing to say (exit 1, silent stderr)
    fn git(&self, args: &[&str]) -> Result<Option<String>> {
        let output = Command::new(&self.git)
            .arg("-C")
            .arg(&self.working_dir)
            .args(args)
            .output()
            .map_err(|e| ContextError::Lookup(format!("cannot run {}: {e}", self.git.display())))?;

        if output.status.success() {
            let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
            return Ok(if out.is_empty() { None } else { Some(out) });
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if output.status.code() == Some(1) && stderr.is_empty() {
            return Ok(None);
        }
        Err(ContextError::Lookup(format!("git {}: {stderr}", args.join(" "))))
    }
}

impl RepoMetadataSource for GitRepoSource {
    fn lookup(&self) -> Result<RepoMetadata> {
        debug!(dir = %self.working_dir.display(), "reading git metadata");
        let mut meta = RepoMetadata::new();

        match self.git(&["config", "--get", "remote.origin.url"])? {
            Some(url) => {
                meta.insert("repo".into(), strip_credentials(&url));
            }
            None => warn!(dir = %self.working_dir.display(), "no origin remote configured"),
        }
        // detached HEAD has no branch; an unborn branch has no commit yet
        if let Some(branch) = self.git(&["symbolic-ref", "--short", "-q", "HEAD"])? {
            meta.insert("branch".into(), branch);
        }
        if let Some(commit) = self.git(&["rev-parse", "-q", "--verify", "HEAD"])? {
            meta.insert("commit".into(), commit);
        }
        Ok(meta)
    }
}

/// Fixed metadata. Counts how often it was asked, which lets callers check
/// that disabled lookups never happen.
#[derive(Debug, Default)]
pub struct StaticRepoMetadata {
    meta: RepoMetadata,
    calls: AtomicUsize,
}

impl StaticRepoMetadata {
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            meta: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RepoMetadataSource for StaticRepoMetadata {
    fn lookup(&self) -> Result<RepoMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.meta.clone())
    }
}

/// Drop `user:token@` from URL-style remotes. scp-style remotes
/// (`git@host:org/repo.git`) carry no secret and are returned untouched.
pub fn strip_credentials(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(authority_end);
    match authority.rsplit_once('@') {
        Some((_, host)) => format!("{scheme}://{host}{path}"),
        None => url.to_string(),
    }
}

/// Parse the query terraform writes to the program's stdin: a JSON object whose
/// values are all strings. Empty input is an empty query.
pub fn read_query<R: Read>(mut reader: R) -> Result<BTreeMap<String, String>> {
    let mut raw = String::new();
    reader.read_to_string(&mut raw)?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let Value::Object(obj) = serde_json::from_str::<Value>(&raw)? else {
        return Err(ContextError::InvalidInput("query must be a JSON object".into()));
    };
    obj.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k, s)),
            other => Err(ContextError::InvalidInput(format!(
                "query value for {k:?} must be a string, got {other}"
            ))),
        })
        .collect()
}

/// Write the result object terraform expects on stdout.
pub fn write_result<W: Write>(mut writer: W, meta: &RepoMetadata) -> Result<()> {
    serde_json::to_writer(&mut writer, meta)?;
    writeln!(writer)?;
    Ok(())
}
