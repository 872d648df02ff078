use clap::Args;
use common::prelude::*;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct InviteKey {
    /// Key id the invited admin quotes
    #[arg(long)]
    pub id: String,

    /// Shared secret handed to the invited admin out of band
    #[arg(long)]
    pub secret: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InviteKeyError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl crate::op::Op for InviteKey {
    type Error = InviteKeyError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut org = ctx.state()?.open_organization()?;
        org.add_invite_key(&self.id, &self.secret)?;
        Ok(format!("Added invite key {}", self.id))
    }
}
