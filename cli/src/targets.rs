//! Turning hosts into engine targets

use anyhow::{Context, Result};
use netsweep_engine::strategy::expand_argv;
use netsweep_engine::{CommandAction, CommandKind, CommandTable, Platform, Target, TemplateVars};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::inventory::Device;

/// A host to run against, with the variables its command template may use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub id: String,
    pub vars: TemplateVars,
}

impl TargetSpec {
    /// A bare host name or address
    pub fn host(host: &str) -> Self {
        Self {
            id: host.to_string(),
            vars: TemplateVars::from([
                ("target".to_string(), host.to_string()),
                ("host".to_string(), host.to_string()),
            ]),
        }
    }
}

impl From<&Device> for TargetSpec {
    fn from(device: &Device) -> Self {
        Self {
            id: device.host.clone(),
            vars: device.vars(),
        }
    }
}

/// Where a target's argv comes from
pub enum CommandSource {
    Table {
        table: CommandTable,
        kind: CommandKind,
        platform: Platform,
    },
    Template(Vec<String>),
}

impl CommandSource {
    fn argv(&self, vars: &TemplateVars) -> Result<Vec<String>> {
        let argv = match self {
            Self::Table {
                table,
                kind,
                platform,
            } => table.argv(*kind, *platform, vars)?,
            Self::Template(template) => expand_argv(template, vars)?,
        };
        Ok(argv)
    }
}

/// One host per line; blank lines and `#` comments are skipped
pub fn parse_targets(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn read_targets_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read targets from {}", path.display()))?;
    Ok(parse_targets(&content))
}

/// Keep the first occurrence of each id, warning about the rest
pub fn dedupe(specs: Vec<TargetSpec>) -> Vec<TargetSpec> {
    let mut seen = HashSet::with_capacity(specs.len());
    specs
        .into_iter()
        .filter(|spec| {
            let fresh = seen.insert(spec.id.clone());
            if !fresh {
                warn!("Dropping duplicate target {}", spec.id);
            }
            fresh
        })
        .collect()
}

/// Expand the command for every spec
pub fn build_targets(
    specs: &[TargetSpec],
    source: &CommandSource,
    timeout: Duration,
) -> Result<Vec<Target>> {
    specs
        .iter()
        .map(|spec| {
            let argv = source
                .argv(&spec.vars)
                .with_context(|| format!("Failed to build command for {}", spec.id))?;
            let action = CommandAction::from_argv(argv)
                .with_context(|| format!("Failed to build command for {}", spec.id))?;
            Ok(Target::new(spec.id.clone(), action, timeout))
        })
        .collect()
}
