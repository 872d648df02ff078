use clap::Args;
use common::prelude::*;

use crate::state::{Role, StateError};

#[derive(Args, Debug, Clone)]
pub struct Create {
    /// Organization name
    #[arg(long)]
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("already a member of organization {0}")]
    AlreadyMember(uuid::Uuid),
}

impl crate::op::Op for Create {
    type Error = CreateError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = ctx.state()?;
        state.require_role(Role::Admin)?;
        if let Some(org_id) = state.config.org_id {
            return Err(CreateError::AlreadyMember(org_id));
        }

        let admin = state.load_entity()?;
        let store = state.open_store()?;
        let org = create_organization(&self.name, &admin, store.clone(), store)?;

        state.config.org_id = Some(*org.id());
        state.save_config()?;

        Ok(format!(
            "Created organization {} (id: {}) administered by {}",
            org.entity().name(),
            org.id(),
            admin.name()
        ))
    }
}
