use std::path::PathBuf;

use clap::Args;

use crate::state::{AppConfig, AppState, Role};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Name of the admin or node principal
    #[arg(long)]
    pub name: String,

    /// Role of this principal
    #[arg(long, value_enum)]
    pub role: Role,

    /// Shared store root (defaults to <state dir>/store)
    #[arg(long)]
    pub store_path: Option<PathBuf>,

    /// CSRs a node keeps queued for the organization
    #[arg(long, default_value_t = 2)]
    pub csr_pool_min: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::new(self.role);
        config.store_path = self.store_path.clone();
        config.csr_pool_min = self.csr_pool_min;

        let (state, entity) = AppState::init(ctx.config_path.clone(), &self.name, config)?;

        Ok(format!(
            "Initialized tagtrust directory at: {}\n\
             - Role: {}\n\
             - Name: {}\n\
             - Id: {}\n\
             - Entity: {}\n\
             - Store: {}\n\
             - Config: {}",
            state.dir.display(),
            state.config.role,
            entity.name(),
            entity.id(),
            state.entity_path.display(),
            state.store_path.display(),
            state.config_path.display(),
        ))
    }
}
