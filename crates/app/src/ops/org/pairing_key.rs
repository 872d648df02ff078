use clap::Args;
use common::prelude::*;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct PairingKey {
    /// Key id the node quotes when registering
    #[arg(long)]
    pub id: String,

    /// Shared secret handed to the node out of band
    #[arg(long)]
    pub secret: String,

    /// Tags the registering node receives (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PairingKeyError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl crate::op::Op for PairingKey {
    type Error = PairingKeyError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut org = ctx.state()?.open_organization()?;
        org.add_pairing_key(&self.id, &self.secret, &self.tags)?;

        let tags = org.index().pairing_key(&self.id).map(|k| k.tags.clone()).unwrap_or_default();
        Ok(format!(
            "Added pairing key {} with tags [{}]",
            self.id,
            tags.into_iter().collect::<Vec<_>>().join(", ")
        ))
    }
}
