use clap::Args;
use common::prelude::*;
use uuid::Uuid;

use crate::state::{Role, StateError};

/// Ask an organization to admit this admin
#[derive(Args, Debug, Clone)]
pub struct RequestInvite {
    /// Organization id
    #[arg(long)]
    pub org: Uuid,

    /// Invite key id issued by an existing admin
    #[arg(long)]
    pub invite_id: String,

    /// Invite secret issued by an existing admin
    #[arg(long)]
    pub secret: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RequestInviteError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl crate::op::Op for RequestInvite {
    type Error = RequestInviteError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        state.require_role(Role::Admin)?;
        let admin = state.load_entity()?;
        let store = state.open_store()?;

        request_invite(&admin, &self.org, &self.invite_id, &self.secret, &store)?;
        Ok(format!(
            "Sent invite request for {} to organization {}. Run 'tagtrust admin complete-invite' once it is processed",
            admin.name(),
            self.org
        ))
    }
}
