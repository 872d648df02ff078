use clap::{Args, Subcommand};

pub mod complete_invite;
pub mod request_invite;

use crate::op::Op;

crate::command_enum! {
    (RequestInvite, request_invite::RequestInvite),
    (CompleteInvite, complete_invite::CompleteInvite),
}

pub type AdminCommand = Command;

/// Joining an organization as an additional admin
#[derive(Args, Debug, Clone)]
pub struct Admin {
    #[command(subcommand)]
    pub command: AdminCommand,
}

impl Op for Admin {
    type Error = OpError;
    type Output = OpOutput;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx)
    }
}
