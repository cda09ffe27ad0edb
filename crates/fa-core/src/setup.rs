//! First-run setup for forwagent
//!
//! Creates the configuration directory, a key pair with a self-signed
//! certificate, an empty trust bundle and a default `config.toml`. Existing
//! artifacts are never overwritten.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};

use crate::config::{self, ConfigFile, TrustPaths};
use crate::tls::{self, Fingerprint};

/// Setup result containing paths to generated files
#[derive(Debug)]
pub struct SetupResult {
    pub config_dir: PathBuf,
    pub paths: TrustPaths,
    pub config_path: PathBuf,
    /// A new key and certificate were written
    pub generated_identity: bool,
    /// An empty trust bundle was created
    pub created_trust_bundle: bool,
    /// Fingerprint of the certificate in `cert.pem`
    pub fingerprint: Fingerprint,
}

/// PEM-encoded key and self-signed certificate
pub struct Identity {
    pub key_pem: String,
    pub cert_pem: String,
}

/// Initialize `config_dir`
pub fn init(config_dir: &Path) -> Result<SetupResult> {
    if !config_dir.is_dir() {
        tracing::info!("Creating directory: {:?}", config_dir);
        create_private_dir(config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
    }

    let paths = TrustPaths::in_dir(config_dir);
    check_identity_pair(&paths)?;

    let generated_identity = if !paths.key.exists() && !paths.cert.exists() {
        tracing::info!("Generating key and certificate...");
        let name = format!(
            "{}-{}",
            gethostname::gethostname().to_string_lossy(),
            hex::encode(rand::random::<[u8; 4]>())
        );
        let identity = generate_identity(&name)?;

        write_private(&paths.key, identity.key_pem.as_bytes())
            .with_context(|| format!("Failed to write key to {:?}", paths.key))?;
        tracing::info!("Wrote key to: {:?}", paths.key);

        fs::write(&paths.cert, identity.cert_pem.as_bytes())
            .with_context(|| format!("Failed to write certificate to {:?}", paths.cert))?;
        tracing::info!("Wrote cert to: {:?}", paths.cert);
        true
    } else {
        false
    };

    let created_trust_bundle = if !paths.trusted.exists() {
        tracing::info!("Creating empty trust bundle: {:?}", paths.trusted);
        fs::write(&paths.trusted, b"")
            .with_context(|| format!("Failed to create {:?}", paths.trusted))?;
        true
    } else {
        false
    };

    let config_path = config_dir.join(config::CONFIG_FILE);
    if !config_path.exists() {
        config::save_config(&config_path, &ConfigFile::default())
            .with_context(|| "Failed to write config file")?;
        tracing::info!("Created default configuration");
    }

    let fingerprint = tls::load_certificates(&paths.cert)?
        .first()
        .map(|cert| Fingerprint::of(cert))
        .with_context(|| format!("No certificate in {:?}", paths.cert))?;

    Ok(SetupResult {
        config_dir: config_dir.to_path_buf(),
        paths,
        config_path,
        generated_identity,
        created_trust_bundle,
        fingerprint,
    })
}

/// A key without its certificate (or the reverse) cannot be repaired by init
fn check_identity_pair(paths: &TrustPaths) -> Result<()> {
    match (paths.key.exists(), paths.cert.exists()) {
        (true, false) => bail!(
            "Certificate {:?} is missing but key {:?} exists; restore the certificate or remove the key to generate a new identity",
            paths.cert,
            paths.key
        ),
        (false, true) => bail!(
            "Key {:?} is missing but certificate {:?} exists; restore the key or remove the certificate to generate a new identity",
            paths.key,
            paths.cert
        ),
        _ => Ok(()),
    }
}

/// Generate a key pair and a self-signed CA certificate named `common_name`
pub fn generate_identity(common_name: &str) -> Result<Identity> {
    let mut params = CertificateParams::new(Vec::<String>::new())
        .context("Failed to build certificate parameters")?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

    let key_pair = KeyPair::generate().context("Failed to generate key pair")?;
    let cert = params
        .self_signed(&key_pair)
        .context("Failed to self-sign certificate")?;

    Ok(Identity {
        key_pem: key_pair.serialize_pem(),
        cert_pem: cert.pem(),
    })
}

fn create_private_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)
}
