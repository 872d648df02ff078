use clap::Args;
use common::prelude::*;

use crate::state::StateError;

/// Print the organization's index
#[derive(Args, Debug, Clone)]
pub struct Show;

#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    #[error("state error: {0}")]
    State(#[from] StateError),
}

fn join<I: IntoIterator<Item = String>>(items: I) -> String {
    items.into_iter().collect::<Vec<_>>().join(", ")
}

pub fn render_index(name: &str, id: &uuid::Uuid, index: &TagIndex) -> String {
    let mut lines = vec![format!("Organization {} (id: {})", name, id)];
    for kind in [ObjectKind::Admin, ObjectKind::Ca, ObjectKind::Node, ObjectKind::Cert] {
        let entries = index.list(kind);
        lines.push(format!("{}s: {}", kind, entries.len()));
        for (entry, id) in entries {
            let tags = index.tags_of(kind, &id);
            if tags.is_empty() {
                lines.push(format!("  {} ({})", entry, id));
            } else {
                lines.push(format!("  {} ({}) [{}]", entry, id, join(tags)));
            }
        }
    }
    lines.push(format!(
        "pending pairing keys: {}",
        join(index.pairing_keys().map(|k| format!("{} [{}]", k.id, join(k.tags.iter().cloned()))))
    ));
    lines.push(format!(
        "pending invite keys: {}",
        join(index.invite_keys().map(|k| k.id.clone()))
    ));
    lines.join("\n")
}

impl crate::op::Op for Show {
    type Error = ShowError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let org = ctx.state()?.open_organization()?;
        Ok(render_index(org.entity().name(), org.id(), org.index()))
    }
}
