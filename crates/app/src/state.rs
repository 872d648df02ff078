use std::fs;
use std::path::{Path, PathBuf};

use common::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const APP_NAME: &str = "tagtrust";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const ENTITY_FILE_NAME: &str = "entity.json";
pub const STORE_DIR_NAME: &str = "store";

pub type OrgContext = Context<FsStore, FsStore>;

/// What this principal acts as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Node,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Node => write!(f, "node"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub role: Role,
    /// Shared store root (defaults to <state dir>/store)
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Organization this principal belongs to, once known
    #[serde(default)]
    pub org_id: Option<Uuid>,
    /// CSRs a node keeps queued for the organization
    #[serde(default = "default_csr_pool_min")]
    pub csr_pool_min: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_csr_pool_min() -> usize {
    2
}

pub fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            store_path: None,
            org_id: None,
            csr_pool_min: default_csr_pool_min(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.tagtrust)
    pub dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Path to this principal's private entity
    pub entity_path: PathBuf,
    /// Resolved shared store root
    pub store_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.tagtrust)
    pub fn dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory holding a freshly generated entity
    pub fn init(
        custom_path: Option<PathBuf>,
        name: &str,
        config: AppConfig,
    ) -> Result<(Self, Entity), StateError> {
        let dir = Self::dir(custom_path)?;
        if dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&dir)?;

        let state = Self::paths(dir, config);
        fs::create_dir_all(&state.store_path)?;

        let entity = match state.config.role {
            Role::Admin => Entity::generate(name)?,
            Role::Node => {
                let store = state.open_store()?;
                create_node(name, store.clone(), store)?.entity().clone()
            }
        };
        write_private_file(&state.entity_path, &serde_json::to_vec_pretty(&entity)?)?;
        state.save_config()?;

        tracing::info!("Initialized {} state at {}", state.config.role, state.dir.display());
        Ok((state, entity))
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let dir = Self::dir(custom_path)?;
        if !dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        let state = Self::paths(dir, config);
        if !state.entity_path.exists() {
            return Err(StateError::MissingFile(ENTITY_FILE_NAME.to_string()));
        }
        Ok(state)
    }

    fn paths(dir: PathBuf, config: AppConfig) -> Self {
        let store_path = config
            .store_path
            .clone()
            .unwrap_or_else(|| dir.join(STORE_DIR_NAME));
        Self {
            config_path: dir.join(CONFIG_FILE_NAME),
            entity_path: dir.join(ENTITY_FILE_NAME),
            store_path,
            config,
            dir,
        }
    }

    pub fn save_config(&self) -> Result<(), StateError> {
        fs::write(&self.config_path, toml::to_string_pretty(&self.config)?)?;
        Ok(())
    }

    /// Load this principal's private entity
    pub fn load_entity(&self) -> Result<Entity, StateError> {
        let entity: Entity = serde_json::from_slice(&fs::read(&self.entity_path)?)?;
        if !entity.is_private() {
            return Err(StateError::InvalidEntity(
                "entity file has no private keys".to_string(),
            ));
        }
        Ok(entity)
    }

    pub fn open_store(&self) -> Result<FsStore, StateError> {
        Ok(FsStore::open(&self.store_path)?)
    }

    pub fn require_role(&self, role: Role) -> Result<(), StateError> {
        if self.config.role != role {
            return Err(StateError::WrongRole {
                expected: role,
                actual: self.config.role,
            });
        }
        Ok(())
    }

    pub fn org_id(&self) -> Result<Uuid, StateError> {
        self.config.org_id.ok_or(StateError::NoOrganization)
    }

    /// Open the configured organization as this admin
    pub fn open_organization(&self) -> Result<OrgContext, StateError> {
        self.require_role(Role::Admin)?;
        let admin = self.load_entity()?;
        let store = self.open_store()?;
        Ok(Context::load_organization(
            &admin,
            &self.org_id()?,
            store.clone(),
            store,
        )?)
    }

    /// Open this node's own context
    pub fn open_node(&self) -> Result<OrgContext, StateError> {
        self.require_role(Role::Node)?;
        let node = self.load_entity()?;
        let store = self.open_store()?;
        Ok(Context::load(node, store.clone(), store)?)
    }
}

/// Write `contents` to `path` readable by the owner only
pub fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), std::io::Error> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("tagtrust directory not initialized. Run 'tagtrust init' first")]
    NotInitialized,

    #[error("tagtrust directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    #[error("this command needs the {expected} role, state is configured as {actual}")]
    WrongRole { expected: Role, actual: Role },

    #[error("no organization configured")]
    NoOrganization,

    #[error("entity error: {0}")]
    Entity(#[from] EntityError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
