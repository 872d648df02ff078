use clap::{Args, Subcommand};

pub mod certs;
pub mod register;

use crate::op::Op;

crate::command_enum! {
    (Register, register::Register),
    (Certs, certs::Certs),
}

pub type NodeCommand = Command;

/// Node-side registration and certificate collection (node role)
#[derive(Args, Debug, Clone)]
pub struct Node {
    #[command(subcommand)]
    pub command: NodeCommand,
}

impl Op for Node {
    type Error = OpError;
    type Output = OpOutput;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx)
    }
}
