// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Server Configuration Types
//
// Defines the configuration schema for a dirgate server, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Directory layout (configuration subtree, schema subentry, tasks base)
// - Administrative default privileges
// - Task engine concurrency and caller-side polling tiers
// - Backends addressed by backup/restore/import/export tasks

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::dn::{Dn, DnError};
use crate::domain::privilege::{Privilege, PrivilegeError, PrivilegeSet};

pub const API_VERSION: &str = "dirgate/v1";
pub const KIND: &str = "ServerConfig";

/// Top-level Kubernetes-style server configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfigManifest {
    /// API version (must be "dirgate/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ServerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ServerConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfigSpec {
    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub privileges: PrivilegeConfig,

    #[serde(default)]
    pub tasks: TaskEngineConfig,

    /// Backends addressable by task entries
    #[serde(default)]
    pub backends: Vec<BackendConfig>,

    /// Directory holding schema LDIF files for schema-file-add tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_directory: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Root of the configuration subtree
    #[serde(default = "default_config_base")]
    pub config_base: String,

    /// The schema subentry
    #[serde(default = "default_schema_dn")]
    pub schema_dn: String,

    /// Parent of task entries
    #[serde(default = "default_tasks_base")]
    pub tasks_base: String,

    /// Entry holding the administrative default privilege list
    #[serde(default = "default_root_dns_base")]
    pub root_dns_base: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            config_base: default_config_base(),
            schema_dn: default_schema_dn(),
            tasks_base: default_tasks_base(),
            root_dns_base: default_root_dns_base(),
        }
    }
}

impl LayoutConfig {
    pub fn resolve(&self) -> Result<DirectoryLayout, DnError> {
        Ok(DirectoryLayout {
            config_base: Dn::parse(&self.config_base)?,
            schema_dn: Dn::parse(&self.schema_dn)?,
            tasks_base: Dn::parse(&self.tasks_base)?,
            root_dns_base: Dn::parse(&self.root_dns_base)?,
        })
    }
}

/// Parsed directory layout consulted by the operation gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    pub config_base: Dn,
    pub schema_dn: Dn,
    pub tasks_base: Dn,
    pub root_dns_base: Dn,
}

impl DirectoryLayout {
    pub fn is_configuration(&self, dn: &Dn) -> bool {
        dn.is_within(&self.config_base)
    }

    /// The schema subentry or anything beneath it.
    pub fn is_schema(&self, dn: &Dn) -> bool {
        dn.is_within(&self.schema_dn)
    }

    pub fn is_task_entry(&self, dn: &Dn) -> bool {
        dn.is_child_of(&self.tasks_base)
    }
}

impl Default for DirectoryLayout {
    fn default() -> Self {
        Self {
            config_base: Dn::root().child("cn", "config"),
            schema_dn: Dn::root().child("cn", "schema"),
            tasks_base: Dn::root().child("cn", "Tasks").child("cn", "Scheduled Tasks"),
            root_dns_base: Dn::root().child("cn", "config").child("cn", "Root DNs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivilegeConfig {
    /// Privileges every administrative identity holds unless revoked on its entry
    #[serde(default = "default_root_privileges")]
    pub default_root_privileges: Vec<String>,
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self {
            default_root_privileges: default_root_privileges(),
        }
    }
}

impl PrivilegeConfig {
    pub fn resolve(&self) -> Result<PrivilegeSet, PrivilegeError> {
        self.default_root_privileges
            .iter()
            .map(|name| name.parse::<Privilege>())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEngineConfig {
    /// Upper bound on tasks executing at once
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Delay between polls when waiting on a task
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a caller waits for a submitted task to appear
    #[serde(default = "default_scheduling_timeout_ms")]
    pub scheduling_timeout_ms: u64,

    /// How long a caller waits for a task to reach a terminal state
    #[serde(default = "default_completion_timeout_ms")]
    pub completion_timeout_ms: u64,

    /// How long a finished task stays visible before it is purged
    #[serde(default = "default_completed_task_retention_secs")]
    pub completed_task_retention_secs: u64,
}

impl Default for TaskEngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            poll_interval_ms: default_poll_interval_ms(),
            scheduling_timeout_ms: default_scheduling_timeout_ms(),
            completion_timeout_ms: default_completion_timeout_ms(),
            completed_task_retention_secs: default_completed_task_retention_secs(),
        }
    }
}

impl TaskEngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scheduling_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduling_timeout_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    pub fn completed_task_retention(&self) -> Duration {
        Duration::from_secs(self.completed_task_retention_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend identifier referenced by task entries (e.g. "userRoot")
    pub id: String,

    /// Base DN of the data the backend holds
    pub base_dn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_config_base() -> String {
    "cn=config".to_string()
}

fn default_schema_dn() -> String {
    "cn=schema".to_string()
}

fn default_tasks_base() -> String {
    "cn=Scheduled Tasks,cn=Tasks".to_string()
}

fn default_root_dns_base() -> String {
    "cn=Root DNs,cn=config".to_string()
}

fn default_root_privileges() -> Vec<String> {
    Privilege::ALL.iter().map(|p| p.name().to_string()).collect()
}

fn default_max_concurrent_tasks() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_scheduling_timeout_ms() -> u64 {
    10_000
}

fn default_completion_timeout_ms() -> u64 {
    20_000
}

fn default_completed_task_retention_secs() -> u64 {
    86_400
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for ServerConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "dirgate".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: ServerConfigSpec::default(),
        }
    }
}

impl ServerConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. DIRGATE_CONFIG_PATH environment variable
    /// 2. ./dirgate-config.yaml (working directory)
    /// 3. ~/.dirgate/config.yaml (user home)
    /// 4. /etc/dirgate/config.yaml (system, Unix) or C:\ProgramData\Dirgate\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("DIRGATE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./dirgate-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".dirgate").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/dirgate/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Dirgate\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (Fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DIRGATE_MAX_CONCURRENT_TASKS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => {
                    tracing::info!("Environment override: DIRGATE_MAX_CONCURRENT_TASKS={}", n);
                    self.spec.tasks.max_concurrent_tasks = n;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for DIRGATE_MAX_CONCURRENT_TASKS: '{}'. Expected a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Backend id → parsed base DN
    pub fn resolve_backends(&self) -> anyhow::Result<Vec<(String, Dn)>> {
        self.spec
            .backends
            .iter()
            .map(|b| {
                let base = Dn::parse(&b.base_dn)
                    .map_err(|e| anyhow::anyhow!("Invalid base_dn for backend '{}': {}", b.id, e))?;
                Ok((b.id.clone(), base))
            })
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        self.spec
            .layout
            .resolve()
            .map_err(|e| anyhow::anyhow!("Invalid spec.layout: {}", e))?;

        self.spec
            .privileges
            .resolve()
            .map_err(|e| anyhow::anyhow!("Invalid spec.privileges.default_root_privileges: {}", e))?;

        if self.spec.tasks.max_concurrent_tasks == 0 {
            anyhow::bail!("spec.tasks.max_concurrent_tasks must be at least 1");
        }

        let mut seen = HashSet::new();
        for backend in &self.spec.backends {
            if backend.id.is_empty() {
                anyhow::bail!("Backend id cannot be empty");
            }
            if !seen.insert(backend.id.to_ascii_lowercase()) {
                anyhow::bail!("Duplicate backend id: '{}'", backend.id);
            }
        }
        self.resolve_backends()?;

        Ok(())
    }
}
