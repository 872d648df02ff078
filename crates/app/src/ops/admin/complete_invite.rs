use clap::Args;
use common::prelude::*;

use crate::state::{Role, StateError};

/// Pick up the organization sent back for an accepted invite
#[derive(Args, Debug, Clone)]
pub struct CompleteInvite;

#[derive(Debug, thiserror::Error)]
pub enum CompleteInviteError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl crate::op::Op for CompleteInvite {
    type Error = CompleteInviteError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = ctx.state()?;
        state.require_role(Role::Admin)?;
        let admin = state.load_entity()?;
        let store = state.open_store()?;

        let org = complete_invite(&admin, store.clone(), store)?;
        state.config.org_id = Some(*org.id());
        state.save_config()?;

        Ok(format!(
            "Joined organization {} (id: {}) as {}",
            org.entity().name(),
            org.id(),
            admin.name()
        ))
    }
}
