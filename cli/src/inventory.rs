//! Device inventory — sites → categories → devices
//!
//! ```toml
//! [[sites.dc1.core]]
//! host = "r1.dc1.example.net"
//! user = "netops"
//! port = 830
//! ```
//!
//! Selection narrows the inventory one level at a time. A level with a single
//! option needs no choice; anything else must be chosen explicitly.
//!
//! `.yml`/`.yaml` files are read as YAML with the sites at the top level,
//! the layout of existing `device_inventory.yml` files:
//!
//! ```yaml
//! dc1:
//!   core:
//!     - host: r1.dc1.example.net
//!       user: netops
//!       password: secret
//! ```

use anyhow::{Context, Result};
use netsweep_engine::TemplateVars;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Host choice that selects every device in the category
pub const ALL_HOSTS: &str = "all";

const DEFAULT_PORT: u16 = 830;

type Sites = BTreeMap<String, BTreeMap<String, Vec<Device>>>;

#[derive(Debug, Default, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub sites: Sites,
}

/// One managed device. Credential fields in the file are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Device {
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Device {
    /// Template variables for commands run against this device
    pub fn vars(&self) -> TemplateVars {
        TemplateVars::from([
            ("target".to_string(), self.host.clone()),
            ("host".to_string(), self.host.clone()),
            ("user".to_string(), self.user.clone()),
            ("port".to_string(), self.port.to_string()),
        ])
    }
}

/// What the user asked for; unset levels are resolved when unambiguous
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub site: Option<String>,
    pub category: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("inventory has no {level}s")]
    Empty { level: &'static str },
    #[error("a {level} must be chosen, available: {}", .options.join(", "))]
    Missing {
        level: &'static str,
        options: Vec<String>,
    },
    #[error("unknown {level} {choice:?}, available: {}", .options.join(", "))]
    Unknown {
        level: &'static str,
        choice: String,
        options: Vec<String>,
    },
}

pub fn load_inventory(path: &Path) -> Result<Inventory> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory from {}", path.display()))?;
    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml" | "yaml")
    );
    let inventory = if yaml {
        let sites: Sites = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse inventory from {}", path.display()))?;
        Inventory { sites }
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse inventory from {}", path.display()))?
    };
    tracing::debug!(
        "Loaded inventory with {} sites from {}",
        inventory.sites.len(),
        path.display()
    );
    Ok(inventory)
}

impl Inventory {
    /// Resolve a selection to the devices it names
    pub fn select(&self, selection: &Selection) -> Result<Vec<&Device>, SelectionError> {
        let (_, categories) = choose("site", &self.sites, selection.site.as_deref())?;
        let (_, devices) = choose("category", categories, selection.category.as_deref())?;

        if devices.is_empty() {
            return Err(SelectionError::Empty { level: "host" });
        }
        let hosts: Vec<String> = devices.iter().map(|d| d.host.clone()).collect();

        match selection.host.as_deref() {
            Some(ALL_HOSTS) => Ok(devices.iter().collect()),
            Some(choice) => {
                let chosen: Vec<&Device> = devices.iter().filter(|d| d.host == choice).collect();
                if chosen.is_empty() {
                    Err(SelectionError::Unknown {
                        level: "host",
                        choice: choice.to_string(),
                        options: with_all(hosts),
                    })
                } else {
                    Ok(chosen)
                }
            }
            None if devices.len() == 1 => Ok(devices.iter().collect()),
            None => Err(SelectionError::Missing {
                level: "host",
                options: with_all(hosts),
            }),
        }
    }
}

fn with_all(mut hosts: Vec<String>) -> Vec<String> {
    hosts.push(ALL_HOSTS.to_string());
    hosts
}

/// Pick one entry of a level by name, or the only entry when unnamed
fn choose<'a, V>(
    level: &'static str,
    options: &'a BTreeMap<String, V>,
    choice: Option<&str>,
) -> Result<(&'a String, &'a V), SelectionError> {
    if options.is_empty() {
        return Err(SelectionError::Empty { level });
    }
    let names = || options.keys().cloned().collect::<Vec<_>>();
    match choice {
        Some(choice) => options
            .get_key_value(choice)
            .ok_or_else(|| SelectionError::Unknown {
                level,
                choice: choice.to_string(),
                options: names(),
            }),
        None if options.len() == 1 => options
            .iter()
            .next()
            .ok_or(SelectionError::Empty { level }),
        None => Err(SelectionError::Missing {
            level,
            options: names(),
        }),
    }
}
