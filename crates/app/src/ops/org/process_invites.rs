use clap::Args;
use common::prelude::*;

use crate::state::StateError;

/// Admit admins whose invite requests are queued
#[derive(Args, Debug, Clone)]
pub struct ProcessInvites;

#[derive(Debug, thiserror::Error)]
pub enum ProcessInvitesError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl crate::op::Op for ProcessInvites {
    type Error = ProcessInvitesError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut org = ctx.state()?.open_organization()?;
        let report = org.process_invites()?;

        let mut lines = vec![format!(
            "Admitted {} admin(s), {} requeued",
            report.accepted.len(),
            report.requeued.len()
        )];
        lines.extend(report.accepted.iter().map(|invited| {
            let mut line = format!(
                "{} (id: {}) via invite key {}",
                invited.admin.name(),
                invited.admin.id(),
                invited.invite_key
            );
            if let Some(e) = &invited.welcome_error {
                line.push_str(&format!(
                    "\n  not welcomed: {} (retry with `org resend-invite --admin {}`)",
                    e,
                    invited.admin.name()
                ));
            }
            line
        }));
        lines.extend(report.requeued.iter().map(|e| format!("requeued: {}", e)));
        Ok(lines.join("\n"))
    }
}
