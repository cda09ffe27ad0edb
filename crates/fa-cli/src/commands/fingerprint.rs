//! `forwagent fingerprint`

use std::path::Path;

use anyhow::{Context, Result};

use fa_core::config::TrustPaths;
use fa_core::tls::{self, Fingerprint};

/// Print the fingerprint of the local certificate
pub fn fingerprint_command(config_dir: &Path) -> Result<()> {
    let paths = TrustPaths::in_dir(config_dir);
    let certs = tls::load_certificates(&paths.cert)
        .with_context(|| "No certificate found (run 'forwagent init')")?;

    for cert in &certs {
        println!("{}", Fingerprint::of(cert));
    }
    Ok(())
}
