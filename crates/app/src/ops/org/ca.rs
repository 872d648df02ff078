use clap::Args;
use common::prelude::*;

use crate::state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum CaError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Create a certificate authority serving the given tags
#[derive(Args, Debug, Clone)]
pub struct CaCreate {
    #[arg(long)]
    pub name: String,

    /// Node tags this CA issues for (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

impl crate::op::Op for CaCreate {
    type Error = CaError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut org = ctx.state()?.open_organization()?;
        let ca = org.create_ca(&self.name, &self.tags)?;
        Ok(format!(
            "Created CA {} (id: {}) for tags [{}]",
            ca.name,
            ca.id,
            ca.tags.iter().cloned().collect::<Vec<_>>().join(", ")
        ))
    }
}

/// Add or remove a tag on a certificate authority
#[derive(Args, Debug, Clone)]
pub struct CaTag {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub tag: String,

    /// Remove the tag instead of adding it
    #[arg(long, default_value_t = false)]
    pub remove: bool,
}

impl crate::op::Op for CaTag {
    type Error = CaError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut org = ctx.state()?.open_organization()?;
        let (changed, verb) = if self.remove {
            (org.untag_ca(&self.name, &self.tag)?, "Removed")
        } else {
            (org.tag_ca(&self.name, &self.tag)?, "Added")
        };
        if !changed {
            return Ok(format!("CA {} unchanged", self.name));
        }
        Ok(format!("{} tag {} on CA {}", verb, self.tag, self.name))
    }
}

/// Delete a certificate authority and its key
#[derive(Args, Debug, Clone)]
pub struct CaRemove {
    #[arg(long)]
    pub name: String,
}

impl crate::op::Op for CaRemove {
    type Error = CaError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut org = ctx.state()?.open_organization()?;
        let id = org.remove_ca(&self.name)?;
        Ok(format!("Removed CA {} (id: {})", self.name, id))
    }
}
