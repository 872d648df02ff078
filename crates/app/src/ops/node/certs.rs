use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use common::prelude::*;

use crate::state::{write_private_file, StateError};

/// Collect delivered certificates and top the CSR pool back up
#[derive(Args, Debug, Clone)]
pub struct Certs {
    /// Write every held certificate and key as PEM files into this directory
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CertsError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("certificate name {0:?} is not a plain file name")]
    UnsafeName(String),
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control)
}

/// Write `<name>.crt` and, when held, an owner-only `<name>.key`
///
/// Nothing is written unless every name stays inside `dir`.
pub fn write_pem_files(dir: &Path, certs: &[CertRecord]) -> Result<usize, CertsError> {
    if let Some(cert) = certs.iter().find(|cert| !is_plain_file_name(&cert.name)) {
        return Err(CertsError::UnsafeName(cert.name.clone()));
    }
    fs::create_dir_all(dir)?;
    for cert in certs {
        fs::write(dir.join(format!("{}.crt", cert.name)), &cert.certificate_pem)?;
        if let Some(key) = &cert.private_key_pem {
            write_private_file(&dir.join(format!("{}.key", cert.name)), key.as_bytes())?;
        }
    }
    Ok(certs.len())
}

impl crate::op::Op for Certs {
    type Error = CertsError;
    type Output = String;

    fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let org_id = state.org_id()?;
        let mut node = state.open_node()?;

        let org = public_organization(node.kv(), &org_id)?;
        let collected = node.collect_certificates(&org)?;
        let generated = node.replenish_csrs(state.config.csr_pool_min)?;

        let mut lines = vec![format!(
            "Collected {} certificate(s), {} new CSR(s) queued",
            collected.len(),
            generated
        )];
        let held = node.certificates()?;
        for cert in &held {
            lines.push(format!(
                "  {} (id: {}) [{}]",
                cert.name,
                cert.id,
                cert.tags.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if let Some(dir) = &self.out {
            let written = write_pem_files(dir, &held)?;
            lines.push(format!("Wrote {} certificate(s) to {}", written, dir.display()));
        }
        Ok(lines.join("\n"))
    }
}
