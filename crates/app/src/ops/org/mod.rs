use clap::{Args, Subcommand};

pub mod ca;
pub mod create;
pub mod invite_key;
pub mod pairing_key;
pub mod process_invites;
pub mod register_nodes;
pub mod remove_node;
pub mod resend_invite;
pub mod show;

use crate::op::Op;

crate::command_enum! {
    (Create, create::Create),
    (PairingKey, pairing_key::PairingKey),
    (InviteKey, invite_key::InviteKey),
    (CaCreate, ca::CaCreate),
    (CaTag, ca::CaTag),
    (CaRemove, ca::CaRemove),
    (RegisterNodes, register_nodes::RegisterNodes),
    (Issue, register_nodes::Issue),
    (RemoveNode, remove_node::RemoveNode),
    (ProcessInvites, process_invites::ProcessInvites),
    (ResendInvite, resend_invite::ResendInvite),
    (Show, show::Show),
}

pub type OrgCommand = Command;

/// Organization administration (admin role)
#[derive(Args, Debug, Clone)]
pub struct Org {
    #[command(subcommand)]
    pub command: OrgCommand,
}

impl Op for Org {
    type Error = OpError;
    type Output = OpOutput;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx)
    }
}
