//! Configuration module for pgstack
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values (the stack as it is deployed today)
//! - System configuration (/etc/pgstack/pgstack.toml)
//! - User configuration (~/.pgstack.toml)
//! - Project configuration (./pgstack.toml)
//! - Environment variables (`PGSTACK_*`)
//!
//! Later sources override earlier ones key by key, so a project file only
//! needs to name the settings it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constructs::ec2::cidr::{Ipv4Cidr, MAX_SUBNET_MASK};
use crate::constructs::ec2::{EndpointService, InstanceType};
use crate::constructs::rds::RemovalPolicy;
use crate::constructs::secretsmanager::USERNAME_FIELD;
use crate::error::Error;

/// Variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "PGSTACK_CONFIG";

/// Which snapshot of the stack to synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StackRevision {
    /// Default VPC layout, one NAT gateway per zone
    Baseline,
    /// `/24` subnets and a single NAT gateway
    SingleNat,
    /// Single NAT plus VPC endpoints and in-VPC database access
    #[default]
    Endpoints,
}

impl StackRevision {
    /// All revisions, oldest first.
    pub const ALL: [StackRevision; 3] = [
        StackRevision::Baseline,
        StackRevision::SingleNat,
        StackRevision::Endpoints,
    ];

    /// Name as written in configuration and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            StackRevision::Baseline => "baseline",
            StackRevision::SingleNat => "single-nat",
            StackRevision::Endpoints => "endpoints",
        }
    }
}

impl fmt::Display for StackRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StackRevision {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::config(
                    "stack.revision",
                    format!("unknown revision '{}' (expected baseline, single-nat or endpoints)", s),
                )
            })
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Stack identity and environment
    pub stack: StackSettings,

    /// VPC layout
    pub network: NetworkConfig,

    /// Database instance
    pub database: DatabaseConfig,

    /// Master credentials secret
    pub secret: SecretConfig,

    /// Output exports
    pub outputs: OutputsConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Stack identity and environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackSettings {
    /// Stack name
    pub name: String,

    /// Template description
    pub description: Option<String>,

    /// Snapshot to synthesize
    pub revision: StackRevision,

    /// Target account; overrides `CDK_DEFAULT_ACCOUNT`
    pub account: Option<String>,

    /// Target region; overrides `CDK_DEFAULT_REGION`
    pub region: Option<String>,

    /// Leave account and region to the engine (pseudo parameters)
    pub environment_agnostic: bool,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            name: "CdkRdsPgdslStack".to_string(),
            description: None,
            revision: StackRevision::default(),
            account: None,
            region: None,
            environment_agnostic: false,
        }
    }
}

/// VPC layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Construct id of the VPC
    pub vpc_id: String,

    /// VPC CIDR block
    pub cidr: String,

    /// Number of availability zones
    pub max_azs: usize,

    /// Explicit zone names; empty means `Fn::GetAZs`
    pub availability_zones: Vec<String>,

    /// NAT gateway count; unset means the revision's default
    pub nat_gateways: Option<usize>,

    /// Prefix length of every subnet; unset means the revision's default
    pub subnet_mask: Option<u8>,

    /// Interface endpoints (revision `endpoints`)
    pub interface_endpoints: Vec<EndpointService>,

    /// Gateway endpoints (revision `endpoints`)
    pub gateway_endpoints: Vec<EndpointService>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            vpc_id: "Athena-POC-VPC".to_string(),
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            availability_zones: vec![],
            nat_gateways: None,
            subnet_mask: None,
            interface_endpoints: vec![
                EndpointService::Lambda,
                EndpointService::Glue,
                EndpointService::SecretsManager,
            ],
            gateway_endpoints: vec![EndpointService::S3],
        }
    }
}

/// Database instance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Construct id of the instance
    pub id: String,

    /// Full engine version
    pub engine_version: String,

    /// Instance class and size, e.g. `t3.micro`
    pub instance_type: InstanceType,

    /// Storage in GiB
    pub allocated_storage: u32,

    /// Storage type
    pub storage_type: String,

    /// Automated backup retention in days
    pub backup_retention_days: u32,

    /// Initial database name
    pub database_name: String,

    /// Standby in a second zone
    pub multi_az: bool,

    /// Refuse deletion through the API
    pub deletion_protection: bool,

    /// What happens to the instance when it leaves the stack
    pub removal_policy: RemovalPolicy,

    /// Construct id of the role granted IAM database access
    pub connect_role_id: String,

    /// Service principal allowed to assume that role
    pub connect_role_principal: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            id: "DatabaseInstance".to_string(),
            engine_version: "15.3".to_string(),
            instance_type: InstanceType::default(),
            allocated_storage: 15,
            storage_type: "gp2".to_string(),
            backup_retention_days: 3,
            database_name: "my_initial_database".to_string(),
            multi_az: false,
            deletion_protection: false,
            removal_policy: RemovalPolicy::Destroy,
            connect_role_id: "RDSRole".to_string(),
            connect_role_principal: "rds.amazonaws.com".to_string(),
        }
    }
}

/// Master credentials secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretConfig {
    /// Construct id of the secret
    pub id: String,

    /// Master user name
    pub username: String,

    /// Field the generated password is stored under
    pub password_key: String,

    /// Leave punctuation out of the password
    pub exclude_punctuation: bool,

    /// Further characters to leave out
    pub exclude_characters: String,
}

impl Default for SecretConfig {
    fn default() -> Self {
        Self {
            id: "DBSecret".to_string(),
            username: "postgresadmin".to_string(),
            password_key: "password".to_string(),
            exclude_punctuation: true,
            exclude_characters: "\"@/".to_string(),
        }
    }
}

/// Output exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputsConfig {
    /// Appended to every export name
    pub export_suffix: String,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            export_suffix: "-2".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when neither `-v` nor `RUST_LOG` is given
    pub level: String,

    /// Emit JSON log lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                let layer = Self::read_layer(&path)?;
                merge_values(&mut merged, layer);
            } else if config_path.is_some() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
        }

        let mut config: Config =
            serde_json::from_value(merged).context("Failed to apply configuration files")?;

        // Apply environment variable overrides
        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load from a single file on top of the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;
        merge_values(&mut merged, Self::read_layer(path.as_ref())?);
        let config: Config = serde_json::from_value(merged)
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&Path>) -> Vec<PathBuf> {
        // Explicit path takes priority
        if let Some(path) = explicit_path {
            return vec![path.to_path_buf()];
        }

        let mut paths = vec![PathBuf::from("/etc/pgstack/pgstack.toml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".pgstack.toml"));
        }

        paths.push(PathBuf::from("pgstack.toml"));

        if let Ok(env_config) = std::env::var(CONFIG_ENV_VAR) {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Parse one file into a generic value, format chosen by extension.
    fn read_layer(path: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let value: Value = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
        };

        if !value.is_object() && !value.is_null() {
            anyhow::bail!("Config file {} must contain a table", path.display());
        }
        Ok(value)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(revision) = env_var("PGSTACK_REVISION") {
            self.stack.revision = revision.parse()?;
        }

        if let Some(name) = env_var("PGSTACK_STACK_NAME") {
            self.stack.name = name;
        }

        if let Some(region) = env_var("PGSTACK_REGION") {
            self.stack.region = Some(region);
        }

        if let Some(account) = env_var("PGSTACK_ACCOUNT") {
            self.stack.account = Some(account);
        }

        if let Some(cidr) = env_var("PGSTACK_VPC_CIDR") {
            self.network.cidr = cidr;
        }

        if let Some(azs) = env_var("PGSTACK_MAX_AZS") {
            self.network.max_azs = azs
                .parse()
                .with_context(|| format!("PGSTACK_MAX_AZS is not a number: {}", azs))?;
        }

        if let Some(instance_type) = env_var("PGSTACK_INSTANCE_TYPE") {
            self.database.instance_type = instance_type.parse()?;
        }

        if let Some(storage) = env_var("PGSTACK_ALLOCATED_STORAGE") {
            self.database.allocated_storage = storage
                .parse()
                .with_context(|| format!("PGSTACK_ALLOCATED_STORAGE is not a number: {}", storage))?;
        }

        if let Some(version) = env_var("PGSTACK_ENGINE_VERSION") {
            self.database.engine_version = version;
        }

        if let Some(name) = env_var("PGSTACK_DATABASE_NAME") {
            self.database.database_name = name;
        }

        if let Some(suffix) = std::env::var_os("PGSTACK_EXPORT_SUFFIX") {
            self.outputs.export_suffix = suffix.to_string_lossy().into_owned();
        }

        if let Some(level) = env_var("PGSTACK_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> crate::Result<()> {
        if self.stack.name.is_empty()
            || !self
                .stack
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
            || !self.stack.name.starts_with(|c: char| c.is_ascii_alphabetic())
        {
            return Err(Error::config(
                "stack.name",
                format!(
                    "'{}' must start with a letter and contain only letters, digits and hyphens",
                    self.stack.name
                ),
            ));
        }

        let cidr: Ipv4Cidr = self
            .network
            .cidr
            .parse()
            .map_err(|e: Error| Error::config("network.cidr", e.to_string()))?;

        if self.network.max_azs == 0 {
            return Err(Error::config("network.max_azs", "must be at least 1"));
        }

        if let Some(mask) = self.network.subnet_mask {
            if mask < cidr.prefix() || mask > MAX_SUBNET_MASK {
                return Err(Error::config(
                    "network.subnet_mask",
                    format!("/{} must be between /{} and /{}", mask, cidr.prefix(), MAX_SUBNET_MASK),
                ));
            }
        }

        if let Some(service) = self
            .network
            .gateway_endpoints
            .iter()
            .find(|s| !s.supports_gateway())
        {
            return Err(Error::config(
                "network.gateway_endpoints",
                format!("{} has no gateway endpoint", service),
            ));
        }

        for (key, value) in [
            ("network.vpc_id", &self.network.vpc_id),
            ("database.id", &self.database.id),
            ("database.connect_role_id", &self.database.connect_role_id),
            ("secret.id", &self.secret.id),
            ("secret.username", &self.secret.username),
            ("secret.password_key", &self.secret.password_key),
        ] {
            if value.trim().is_empty() {
                return Err(Error::config(key, "must not be empty"));
            }
        }

        if self.secret.password_key == USERNAME_FIELD {
            return Err(Error::config(
                "secret.password_key",
                "must differ from the username field",
            ));
        }

        if self.database.allocated_storage == 0 {
            return Err(Error::config("database.allocated_storage", "must be at least 1 GiB"));
        }

        Ok(())
    }

    /// Serialize as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Recursively overlay `layer` onto `base`; tables merge, everything else
/// replaces.
fn merge_values(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, layer) => *base = layer,
    }
}
