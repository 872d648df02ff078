use std::fmt::Write;

use clap::Args;
use common::prelude::*;
use common::protocol::{Issuance, Registered};

use crate::state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum RegisterNodesError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

fn describe_issuance(out: &mut String, issuance: &Issuance) {
    for issued in &issuance.issued {
        let _ = writeln!(
            out,
            "  issued {} from CA {} for tag {}",
            issued.cert_id, issued.ca_id, issued.tag
        );
    }
    for failure in &issuance.failed {
        let _ = writeln!(
            out,
            "  failed CA {} for tag {}: {}",
            failure.ca_id, failure.tag, failure.error
        );
    }
}

/// Accept queued node registrations and issue their certificates
#[derive(Args, Debug, Clone)]
pub struct RegisterNodes;

impl crate::op::Op for RegisterNodes {
    type Error = RegisterNodesError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut org = ctx.state()?.open_organization()?;
        let report: DrainReport<Registered> = org.register_nodes(&X509Authority)?;

        let mut out = format!(
            "Registered {} node(s), {} requeued",
            report.accepted.len(),
            report.requeued.len()
        );
        for registered in &report.accepted {
            let _ = write!(
                out,
                "\n{} (id: {}) via pairing key {}\n",
                registered.node.name(),
                registered.node.id(),
                registered.pairing_key
            );
            describe_issuance(&mut out, &registered.issuance);
        }
        for error in &report.requeued {
            let _ = write!(out, "\nrequeued: {}", error);
        }
        Ok(out.trim_end().to_string())
    }
}

/// Issue certificates to an already registered node from its tags' CAs
#[derive(Args, Debug, Clone)]
pub struct Issue {
    /// Registered node name
    #[arg(long)]
    pub node: String,
}

impl crate::op::Op for Issue {
    type Error = RegisterNodesError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut org = ctx.state()?.open_organization()?;
        let issuance = org.issue_certificates(&self.node, &X509Authority)?;

        let mut out = format!(
            "Node {}: {} issued, {} failed\n",
            self.node,
            issuance.issued.len(),
            issuance.failed.len()
        );
        describe_issuance(&mut out, &issuance);
        Ok(out.trim_end().to_string())
    }
}
