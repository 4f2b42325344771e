//! Command strategy table
//!
//! Maps (command kind, platform) to an argv template. Templates use `{name}`
//! placeholders filled from per-target variables; `{{` and `}}` are literal
//! braces.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::TemplateError;

/// Diagnostic command families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    Ping,
    ContinuousPing,
    Traceroute,
    Whois,
    Nslookup,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        Self::Ping,
        Self::ContinuousPing,
        Self::Traceroute,
        Self::Whois,
        Self::Nslookup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::ContinuousPing => "continuous-ping",
            Self::Traceroute => "traceroute",
            Self::Whois => "whois",
            Self::Nslookup => "nslookup",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TemplateError::UnknownKind(s.to_string()))
    }
}

/// Platform family that decides command flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unix => "unix",
            Self::Windows => "windows",
        })
    }
}

/// Values substituted into templates, e.g. `target`, `host`, `user`, `port`
pub type TemplateVars = BTreeMap<String, String>;

/// Lookup table of argv templates
#[derive(Debug, Clone)]
pub struct CommandTable {
    entries: HashMap<(CommandKind, Platform), Vec<String>>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CommandTable {
    /// Table with no entries
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Stock flags for the system diagnostic tools
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        let builtin: [(CommandKind, Platform, &[&str]); 10] = [
            (CommandKind::Ping, Platform::Unix, &["ping", "-c", "4", "{target}"]),
            (CommandKind::Ping, Platform::Windows, &["ping", "-n", "4", "{target}"]),
            (CommandKind::ContinuousPing, Platform::Unix, &["ping", "{target}"]),
            (CommandKind::ContinuousPing, Platform::Windows, &["ping", "-t", "{target}"]),
            (CommandKind::Traceroute, Platform::Unix, &["traceroute", "{target}"]),
            (CommandKind::Traceroute, Platform::Windows, &["tracert", "{target}"]),
            (CommandKind::Whois, Platform::Unix, &["whois", "{target}"]),
            (CommandKind::Whois, Platform::Windows, &["whois", "{target}"]),
            (CommandKind::Nslookup, Platform::Unix, &["nslookup", "{target}"]),
            (CommandKind::Nslookup, Platform::Windows, &["nslookup", "{target}"]),
        ];
        for (kind, platform, argv) in builtin {
            table.insert(kind, platform, argv.iter().map(|s| s.to_string()).collect());
        }
        table
    }

    /// Add or replace an entry
    pub fn insert(&mut self, kind: CommandKind, platform: Platform, argv: Vec<String>) {
        self.entries.insert((kind, platform), argv);
    }

    pub fn template(&self, kind: CommandKind, platform: Platform) -> Option<&[String]> {
        self.entries.get(&(kind, platform)).map(Vec::as_slice)
    }

    /// Expanded argv for one target
    pub fn argv(
        &self,
        kind: CommandKind,
        platform: Platform,
        vars: &TemplateVars,
    ) -> Result<Vec<String>, TemplateError> {
        let template = self
            .template(kind, platform)
            .ok_or_else(|| TemplateError::NoEntry {
                kind: kind.to_string(),
                platform: platform.to_string(),
            })?;
        expand_argv(template, vars)
    }
}

/// Expand every element of an argv template
pub fn expand_argv(template: &[String], vars: &TemplateVars) -> Result<Vec<String>, TemplateError> {
    if template.is_empty() {
        return Err(TemplateError::Empty);
    }
    template.iter().map(|arg| expand(arg, vars)).collect()
}

/// Substitute `{name}` placeholders in one string
pub fn expand(template: &str, vars: &TemplateVars) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(TemplateError::Unterminated(template.to_string()));
                }
                let value = vars
                    .get(name.trim())
                    .ok_or_else(|| TemplateError::UnknownPlaceholder(name.clone()))?;
                out.push_str(value);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> TemplateVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_builtin_ping_per_platform() {
        let table = CommandTable::builtin();
        let v = vars(&[("target", "10.0.0.1")]);
        assert_eq!(
            table.argv(CommandKind::Ping, Platform::Unix, &v).unwrap(),
            ["ping", "-c", "4", "10.0.0.1"]
        );
        assert_eq!(
            table.argv(CommandKind::Ping, Platform::Windows, &v).unwrap(),
            ["ping", "-n", "4", "10.0.0.1"]
        );
        assert_eq!(
            table.argv(CommandKind::ContinuousPing, Platform::Windows, &v).unwrap(),
            ["ping", "-t", "10.0.0.1"]
        );
        assert_eq!(
            table.argv(CommandKind::Traceroute, Platform::Windows, &v).unwrap(),
            ["tracert", "10.0.0.1"]
        );
    }

    #[test]
    fn test_every_kind_has_both_platforms() {
        let table = CommandTable::builtin();
        for kind in CommandKind::ALL {
            for platform in [Platform::Unix, Platform::Windows] {
                assert!(table.template(kind, platform).is_some(), "{kind} on {platform}");
            }
        }
    }

    #[test]
    fn test_override_entry() {
        let mut table = CommandTable::builtin();
        table.insert(
            CommandKind::Whois,
            Platform::Unix,
            vec!["whois".into(), "-h".into(), "whois.radb.net".into(), "{target}".into()],
        );
        let argv = table
            .argv(CommandKind::Whois, Platform::Unix, &vars(&[("target", "AS64500")]))
            .unwrap();
        assert_eq!(argv, ["whois", "-h", "whois.radb.net", "AS64500"]);
    }

    #[test]
    fn test_missing_entry() {
        let table = CommandTable::empty();
        let err = table
            .argv(CommandKind::Ping, Platform::Unix, &TemplateVars::new())
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::NoEntry {
                kind: "ping".into(),
                platform: "unix".into()
            }
        );
    }

    #[test]
    fn test_expand_placeholders() {
        let v = vars(&[("user", "netops"), ("host", "r1.lab"), ("port", "830")]);
        assert_eq!(expand("{user}@{host}", &v).unwrap(), "netops@r1.lab");
        assert_eq!(expand("-p{port}", &v).unwrap(), "-p830");
        assert_eq!(expand("{{literal}}", &v).unwrap(), "{literal}");
        assert_eq!(expand("plain", &v).unwrap(), "plain");
    }

    #[test]
    fn test_expand_errors() {
        let v = vars(&[("target", "x")]);
        assert_eq!(
            expand("{password}", &v).unwrap_err(),
            TemplateError::UnknownPlaceholder("password".into())
        );
        assert!(matches!(
            expand("{target", &v).unwrap_err(),
            TemplateError::Unterminated(_)
        ));
        assert_eq!(expand_argv(&[], &v).unwrap_err(), TemplateError::Empty);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("continuous-ping".parse::<CommandKind>().unwrap(), CommandKind::ContinuousPing);
        assert_eq!(
            "dig".parse::<CommandKind>().unwrap_err(),
            TemplateError::UnknownKind("dig".into())
        );
    }
}
