use clap::Args;
use common::prelude::*;

use crate::state::StateError;

/// Re-encrypt the organization for an admitted admin and resend its answer
#[derive(Args, Debug, Clone)]
pub struct ResendInvite {
    /// Name of the admitted admin
    #[arg(long)]
    pub admin: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ResendInviteError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl crate::op::Op for ResendInvite {
    type Error = ResendInviteError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let org = ctx.state()?.open_organization()?;
        let admin = org.resend_invite(&self.admin)?;
        Ok(format!(
            "Resent invite answer to {} (id: {})",
            admin.name(),
            admin.id()
        ))
    }
}
