//! Component Snapshot Model
//!
//! The persisted form of a context: one [`ComponentRecord`] per live
//! component, holding everything needed to construct it again. Records are
//! unordered; [`ConfigSnapshot::dependency_order`] recovers a creation order
//! from the names each record's arguments refer to.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Component kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Processes and forwards frames
    Engine,
    /// Moves frames across a medium
    Transport,
    /// Establishes connections to peers asynchronously
    ConnectionManager,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 3] = [
        ComponentKind::Engine,
        ComponentKind::Transport,
        ComponentKind::ConnectionManager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Engine => "engine",
            ComponentKind::Transport => "transport",
            ComponentKind::ConnectionManager => "connection_manager",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        ComponentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::invalid(format!("unknown component kind '{}'", s), Some("kind")))
    }
}

/// Construction arguments, one variant per argument shape a family accepts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentArgs {
    /// Family takes no arguments
    #[default]
    None,
    Transport(TransportArgs),
    ConnectionManager(ConnectionManagerArgs),
}

/// Arguments for transports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportArgs {
    /// Engine fed by this transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Extra head room reserved in every packet read
    #[serde(default)]
    pub head_size: usize,
    /// Extra tail room reserved in every packet read
    #[serde(default)]
    pub tail_size: usize,
}

/// Arguments for connection managers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionManagerArgs {
    /// Transport used for new connections
    pub transport: String,
    /// Engine new connections are attached to
    pub engine: String,
    /// Delay before a connect request completes
    #[serde(default)]
    pub delay_ms: u64,
    /// Refuse every connect request
    #[serde(default)]
    pub refuse: bool,
}

impl ComponentArgs {
    /// Names of other components these arguments refer to
    pub fn references(&self) -> Vec<&str> {
        match self {
            ComponentArgs::None => Vec::new(),
            ComponentArgs::Transport(args) => args.engine.as_deref().into_iter().collect(),
            ComponentArgs::ConnectionManager(args) => {
                vec![args.transport.as_str(), args.engine.as_str()]
            }
        }
    }

    /// Variant tag, for diagnostics
    pub fn variant(&self) -> &'static str {
        match self {
            ComponentArgs::None => "none",
            ComponentArgs::Transport(_) => "transport",
            ComponentArgs::ConnectionManager(_) => "connection_manager",
        }
    }
}

/// One persisted component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub kind: ComponentKind,
    pub family: String,
    pub name: String,
    #[serde(default)]
    pub args: ComponentArgs,
}

/// Complete persisted component set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default, rename = "component")]
    pub components: Vec<ComponentRecord>,
}

impl ConfigSnapshot {
    pub fn new(mut components: Vec<ComponentRecord>) -> Self {
        components.sort_by(|a, b| a.name.cmp(&b.name));
        Self { components }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ComponentRecord> {
        self.components.iter().find(|record| record.name == name)
    }

    /// Records ordered so that every record comes after the records it
    /// references. References to names outside the snapshot are left for
    /// the caller to resolve. Ties are broken by name.
    pub fn dependency_order(&self) -> Result<Vec<&ComponentRecord>> {
        let mut by_name: BTreeMap<&str, &ComponentRecord> = BTreeMap::new();
        for record in &self.components {
            if by_name.insert(record.name.as_str(), record).is_some() {
                return Err(ConfigError::invalid(
                    format!("duplicate component name '{}'", record.name),
                    Some("name"),
                ));
            }
        }

        let mut pending: BTreeMap<&str, BTreeSet<&str>> = by_name
            .iter()
            .map(|(name, record)| {
                let deps = record
                    .args
                    .references()
                    .into_iter()
                    .filter(|dep| by_name.contains_key(dep))
                    .collect();
                (*name, deps)
            })
            .collect();

        let mut ordered = Vec::with_capacity(by_name.len());
        while !pending.is_empty() {
            let ready: Vec<&str> = pending
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(name, _)| *name)
                .collect();

            if ready.is_empty() {
                let stuck: Vec<&str> = pending.keys().copied().collect();
                return Err(ConfigError::invalid(
                    format!("circular component references among {:?}", stuck),
                    Some("args"),
                ));
            }

            for name in ready {
                pending.remove(name);
                for deps in pending.values_mut() {
                    deps.remove(name);
                }
                ordered.push(by_name[name]);
            }
        }

        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: ComponentKind, name: &str, args: ComponentArgs) -> ComponentRecord {
        ComponentRecord {
            kind,
            family: "null".to_string(),
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn test_kind_names() {
        for kind in ComponentKind::ALL {
            assert_eq!(kind.as_str().parse::<ComponentKind>().unwrap(), kind);
        }
        assert!("switch".parse::<ComponentKind>().is_err());
    }

    #[test]
    fn test_dependency_order_ignores_input_order() {
        let snapshot = ConfigSnapshot {
            components: vec![
                record(
                    ComponentKind::ConnectionManager,
                    "cm",
                    ComponentArgs::ConnectionManager(ConnectionManagerArgs {
                        transport: "tap0".to_string(),
                        engine: "hub".to_string(),
                        ..Default::default()
                    }),
                ),
                record(
                    ComponentKind::Transport,
                    "tap0",
                    ComponentArgs::Transport(TransportArgs {
                        engine: Some("hub".to_string()),
                        ..Default::default()
                    }),
                ),
                record(ComponentKind::Engine, "hub", ComponentArgs::None),
            ],
        };

        let names: Vec<&str> = snapshot
            .dependency_order()
            .unwrap()
            .into_iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["hub", "tap0", "cm"]);
    }

    #[test]
    fn test_external_references_are_not_dependencies() {
        let snapshot = ConfigSnapshot::new(vec![record(
            ComponentKind::Transport,
            "t",
            ComponentArgs::Transport(TransportArgs {
                engine: Some("elsewhere".to_string()),
                ..Default::default()
            }),
        )]);
        assert_eq!(snapshot.dependency_order().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let snapshot = ConfigSnapshot {
            components: vec![
                record(ComponentKind::Engine, "a", ComponentArgs::None),
                record(ComponentKind::Transport, "a", ComponentArgs::None),
            ],
        };
        assert!(snapshot.dependency_order().is_err());
    }

    #[test]
    fn test_cycle_rejected() {
        let transport = |name: &str, engine: &str| {
            record(
                ComponentKind::Transport,
                name,
                ComponentArgs::Transport(TransportArgs {
                    engine: Some(engine.to_string()),
                    ..Default::default()
                }),
            )
        };
        let snapshot = ConfigSnapshot::new(vec![transport("a", "b"), transport("b", "a")]);
        assert!(matches!(
            snapshot.dependency_order(),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
