//! Configuration (ambient, §6 "Configuration schema"; SPEC_FULL.md §A.3):
//! the on-disk schema for one simulator instance. One `#[derive(
//! Deserialize)]` struct tree plus a `load_from_file`/`load_from_env`/
//! `validate`/`default_config` quartet, with field groups mirroring §6's
//! `endpoints/contexts/v3_users/behaviors/counters/state_machines/restart/
//! limits`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub general: GeneralConfig,
    pub logging: LoggingConfig,
    pub endpoints: Vec<EndpointConfig>,
    pub contexts: Vec<ContextConfig>,
    #[serde(default)]
    pub v3_users: Vec<V3UserConfig>,
    #[serde(default)]
    pub behaviors: BehaviorsConfig,
    #[serde(default)]
    pub counters: Vec<CounterConfig>,
    #[serde(default)]
    pub state_machines: Vec<StateMachineConfig>,
    #[serde(default)]
    pub restart: RestartConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub node_id: String,
    pub description: String,
    pub location: String,
    pub contact: String,
    /// Simulation tick granularity (§4.7, default 100ms).
    pub tick_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub max_size: u64,
    pub max_files: u32,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "full")]
    Full,
}

/// One UDP endpoint to bind (§6 `endpoints: [{udp: host:port}]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub udp: String,
}

/// One named context (§6 `contexts: [{name, allowed_users[], store_ref,
/// oid_overrides, denied_patterns[]}]`). `store_ref` names a data file in
/// the `.snmprec`-style format (§6) loaded at boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    pub name: String,
    #[serde(default)]
    pub allowed_users: Vec<String>,
    pub store_ref: String,
    /// `oid -> <type-code>|<value>` seeded into the overlay at boot, before
    /// any state machine or scenario has run.
    #[serde(default)]
    pub oid_overrides: HashMap<String, String>,
    #[serde(default)]
    pub denied_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V3UserConfig {
    pub username: String,
    pub auth: Option<V3AuthConfig>,
    #[serde(rename = "priv")]
    pub privacy: Option<V3PrivConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V3AuthConfig {
    pub proto: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct V3PrivConfig {
    pub proto: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorsConfig {
    #[serde(default)]
    pub delay: DelayConfig,
    #[serde(default)]
    pub drops: DropsConfig,
    #[serde(default)]
    pub agentx: AgentxConfig,
    #[serde(default)]
    pub resource: ResourceConfig,
    #[serde(default)]
    pub errors: ErrorsConfig,
    #[serde(default)]
    pub boundaries: BoundariesConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelayConfig {
    pub enabled: bool,
    pub global_ms: u64,
    pub deviation_ms: u64,
    #[serde(default)]
    pub per_oid: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropsConfig {
    pub enabled: bool,
    pub rate_pct: f64,
    pub side: DropSideConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DropSideConfig {
    Request,
    #[default]
    Response,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentxConfig {
    pub enabled: bool,
    /// `subtree prefix -> added delay ms`.
    #[serde(default)]
    pub subagent_delays: HashMap<String, u64>,
    pub reg_timeout_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub enabled: bool,
    pub max_concurrent: usize,
    pub queue_depth: usize,
    pub cpu_limit_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorsConfig {
    pub enabled: bool,
    pub rate_pct: f64,
    #[serde(default)]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub per_oid: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundariesConfig {
    /// `subtree prefix -> oid marking the view end`.
    #[serde(default)]
    pub mib_view_end: HashMap<String, String>,
    #[serde(default)]
    pub missing_objects: Vec<String>,
    /// `subtree prefix -> sparse indices`, expanded to full OIDs at load.
    #[serde(default)]
    pub sparse_tables: HashMap<String, Vec<String>>,
}

/// One counter group (§6 `counters: [{oids[], bits, rate, acceleration}]`);
/// every OID listed shares a [`crate::producers::CounterGroup`] `t0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterConfig {
    pub oids: Vec<String>,
    pub bits: u8,
    pub rate: f64,
    pub acceleration: f64,
}

/// One device lifecycle machine (§6 `state_machines: [{id, states[],
/// transitions[], overlays{}}]`), bound to a context by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachineConfig {
    pub id: String,
    pub context: String,
    pub initial_state: String,
    pub states: Vec<String>,
    pub transitions: Vec<TransitionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionConfig {
    pub from_state: String,
    pub to_state: String,
    pub after_ms: u64,
    /// `oid -> <type-code>|<value>` applied when this transition fires.
    #[serde(default)]
    pub overlay: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    pub enabled: bool,
    pub interval_s: u64,
    pub downtime_s: u64,
    pub jitter_s: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_s: 3600,
            downtime_s: 2,
            jitter_s: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub pdu_max_bytes: usize,
    pub max_repetitions_cap: u32,
    pub per_request_budget_ms: u64,
}

impl SimulatorConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SimulatorConfig = toml::from_str(&contents)
            .map_err(|e| Error::parse(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("SNMP_SIM").separator("_"))
            .build()?;
        let cfg: SimulatorConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// §6/§7: config errors are returned synchronously and never partially
    /// applied, so every field is checked before any of it is used.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::parse("at least one endpoint is required"));
        }
        for endpoint in &self.endpoints {
            endpoint
                .udp
                .parse::<std::net::SocketAddr>()
                .map_err(|e| Error::parse(format!("endpoint {}: invalid udp address: {e}", endpoint.name)))?;
        }
        if self.contexts.is_empty() {
            return Err(Error::parse("at least one context is required"));
        }
        for context in &self.contexts {
            for pattern in &context.denied_patterns {
                regex::Regex::new(pattern)
                    .map_err(|e| Error::parse(format!("context {}: invalid denied pattern: {e}", context.name)))?;
            }
        }
        let context_names: std::collections::HashSet<&str> =
            self.contexts.iter().map(|c| c.name.as_str()).collect();
        for machine in &self.state_machines {
            if !context_names.contains(machine.context.as_str()) {
                return Err(Error::parse(format!(
                    "state machine {}: unknown context {}",
                    machine.id, machine.context
                )));
            }
            if !machine.states.contains(&machine.initial_state) {
                return Err(Error::parse(format!(
                    "state machine {}: initial_state {} not in states",
                    machine.id, machine.initial_state
                )));
            }
        }
        if self.limits.pdu_max_bytes == 0 {
            return Err(Error::parse("limits.pdu_max_bytes must be nonzero"));
        }
        if !(0.0..=100.0).contains(&self.behaviors.drops.rate_pct) {
            return Err(Error::parse("behaviors.drops.rate_pct must be within 0..=100"));
        }
        Ok(())
    }

    /// A runnable single-context instance for `GenerateConfig`/local testing.
    pub fn default_config() -> Self {
        Self {
            general: GeneralConfig {
                node_id: "snmp-sim-agent-1".to_string(),
                description: "Programmable SNMP agent simulator".to_string(),
                location: "lab".to_string(),
                contact: "admin@example.com".to_string(),
                tick_ms: 100,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: None,
                max_size: 10 * 1024 * 1024,
                max_files: 5,
                format: LogFormat::Full,
            },
            endpoints: vec![EndpointConfig {
                name: "default".to_string(),
                udp: "127.0.0.1:11611".to_string(),
            }],
            contexts: vec![ContextConfig {
                name: "default".to_string(),
                allowed_users: vec![],
                store_ref: "data/default.snmprec".to_string(),
                oid_overrides: HashMap::new(),
                denied_patterns: vec![],
            }],
            v3_users: vec![],
            behaviors: BehaviorsConfig::default(),
            counters: vec![],
            state_machines: vec![],
            restart: RestartConfig::default(),
            limits: LimitsConfig {
                pdu_max_bytes: 1472,
                max_repetitions_cap: 1000,
                per_request_budget_ms: 2000,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        SimulatorConfig::default_config().validate().unwrap();
    }

    #[test]
    fn empty_endpoints_rejected() {
        let mut cfg = SimulatorConfig::default_config();
        cfg.endpoints.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_denied_pattern_rejected() {
        let mut cfg = SimulatorConfig::default_config();
        cfg.contexts[0].denied_patterns.push("(unclosed".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn state_machine_unknown_context_rejected() {
        let mut cfg = SimulatorConfig::default_config();
        cfg.state_machines.push(StateMachineConfig {
            id: "m1".to_string(),
            context: "does-not-exist".to_string(),
            initial_state: "booting".to_string(),
            states: vec!["booting".to_string()],
            transitions: vec![],
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = SimulatorConfig::default_config();
        let text = toml::to_string(&cfg).unwrap();
        let parsed: SimulatorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.endpoints.len(), cfg.endpoints.len());
    }
}
