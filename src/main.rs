use std::{fs, path::PathBuf, str::FromStr};

use anyhow::{Context, Error};
use clap::Parser;
use der::EncodePem;
use mdoc_reader_backend::{config::ReaderBackendConfig, x509::root::self_signed_root};
use p256::{
    ecdsa::SigningKey,
    pkcs8::{EncodePrivateKey, LineEnding},
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use x509_cert::name::Name;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, clap::Subcommand)]
enum Action {
    /// Generate a P-256 reader root key and a self-signed CA certificate for it.
    GenerateRoot {
        /// Subject of the root certificate, e.g. "CN=Example Reader Root,O=Example".
        #[arg(long)]
        subject: String,
        /// Lifetime of the certificate in days.
        #[arg(long, default_value_t = 3650, value_parser = clap::value_parser!(u16).range(1..))]
        days: u16,
        /// Write `<out>.key.pem` and `<out>.crt.pem` instead of printing a JSON root entry.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Load a configuration file and report whether it is usable.
    CheckConfig {
        /// Path to the JSON configuration.
        config: PathBuf,
    },
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().action {
        Action::GenerateRoot { subject, days, out } => generate_root(&subject, days, out),
        Action::CheckConfig { config } => check_config(config),
    }
}

fn generate_root(subject: &str, days: u16, out: Option<PathBuf>) -> Result<(), Error> {
    let subject = Name::from_str(subject).context("invalid subject name")?;
    let key = SigningKey::random(&mut rand::thread_rng());
    let certificate = self_signed_root(&key, subject, time::Duration::days(days.into()))?
        .to_pem(LineEnding::LF)
        .context("unable to encode certificate")?;
    let key_pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| anyhow::anyhow!("unable to encode private key: {e}"))?;

    match out {
        Some(out) => {
            let key_path = out.with_extension("key.pem");
            let certificate_path = out.with_extension("crt.pem");
            fs::write(&key_path, key_pem.as_bytes())
                .with_context(|| format!("unable to write {}", key_path.display()))?;
            fs::write(&certificate_path, &certificate)
                .with_context(|| format!("unable to write {}", certificate_path.display()))?;
            info!(
                "wrote {} and {}",
                key_path.display(),
                certificate_path.display()
            );
        }
        None => {
            let root = serde_json::json!({
                "privateKeyPem": key_pem.as_str(),
                "certificateChainPem": certificate,
            });
            println!("{}", serde_json::to_string_pretty(&root)?);
        }
    }
    Ok(())
}

fn check_config(path: PathBuf) -> Result<(), Error> {
    let config = ReaderBackendConfig::from_file(&path)?;
    let settings = config.settings()?;
    let identities = config.reader_identities()?;
    println!(
        "{}: ok (trust list version {}, {} reader identities)",
        path.display(),
        settings.trust_list.version(),
        identities.len()
    );
    Ok(())
}
