use clap::Args;
use common::prelude::*;
use uuid::Uuid;

use crate::state::StateError;

/// Register this node with an organization using a pairing secret
#[derive(Args, Debug, Clone)]
pub struct Register {
    /// Organization id
    #[arg(long)]
    pub org: Uuid,

    /// Pairing key id issued by an admin
    #[arg(long)]
    pub pairing_id: String,

    /// Pairing secret issued by an admin
    #[arg(long)]
    pub secret: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl crate::op::Op for Register {
    type Error = RegisterError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = ctx.state()?;
        let mut node = state.open_node()?;

        // CSRs must be waiting before the organization fans out
        let generated = node.replenish_csrs(state.config.csr_pool_min)?;
        node.register_node(&self.org, &self.pairing_id, &self.secret)?;

        state.config.org_id = Some(self.org);
        state.save_config()?;

        Ok(format!(
            "Sent registration for node {} to organization {} ({} new CSR(s) queued)",
            node.entity().name(),
            self.org,
            generated
        ))
    }
}
