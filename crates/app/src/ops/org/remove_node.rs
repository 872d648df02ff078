use clap::Args;
use common::prelude::*;

use crate::state::StateError;

/// Forget a registered node and its issued certificates
#[derive(Args, Debug, Clone)]
pub struct RemoveNode {
    #[arg(long)]
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoveNodeError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl crate::op::Op for RemoveNode {
    type Error = RemoveNodeError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut org = ctx.state()?.open_organization()?;
        let id = org.remove_node(&self.name)?;
        Ok(format!("Removed node {} (id: {})", self.name, id))
    }
}
