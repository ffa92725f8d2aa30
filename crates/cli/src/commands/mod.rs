// Path: crates/cli/src/commands/mod.rs

//! Command implementations and shared keystore plumbing.

mod account;
mod license;
mod start;
mod wallet;

use clap::Subcommand;
use mlayer_crypto::key_store::KeyStoreFile;
use mlayer_types::config::NodeConfig;
use std::path::{Path, PathBuf};

pub use license::LicenseCommand;
pub use start::run_start;

/// A command failure, split by who has to fix it.
#[derive(Debug)]
pub enum CliError {
    /// The user can correct this (bad input, wrong password, missing file).
    User(String),
    /// A bug or environment failure.
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        CliError::Internal(e)
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::User(msg) => write!(f, "{msg}"),
            CliError::Internal(e) => write!(f, "{e}"),
        }
    }
}

/// `mlayer node ...` subcommands.
#[derive(Subcommand)]
pub enum NodeCommand {
    /// Manage the account (SECP256k1 license) key.
    Account {
        #[command(subcommand)]
        command: KeystoreCommand,
    },
    /// Manage the wallet key.
    Wallet {
        #[command(subcommand)]
        command: KeystoreCommand,
    },
    /// License registration helpers.
    License {
        #[command(subcommand)]
        command: LicenseCommand,
    },
}

/// init/import/export over one named keystore.
#[derive(Subcommand)]
pub enum KeystoreCommand {
    /// Create a fresh key and store it encrypted.
    Init,
    /// Import an existing private key (hex, prompted without echo).
    Import,
    /// Decrypt and print the stored private key.
    Export,
}

/// Loads the node configuration, defaulting when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<NodeConfig, CliError> {
    match path {
        Some(path) => NodeConfig::load(path).map_err(|e| CliError::User(e.to_string())),
        None => Ok(NodeConfig::default()),
    }
}

/// Dispatches a `node` subcommand.
pub fn run_node_command(
    command: NodeCommand,
    config: &NodeConfig,
    keystore_dir: Option<PathBuf>,
) -> Result<(), CliError> {
    let dir = keystore_dir.unwrap_or_else(|| config.keystore_dir());
    match command {
        NodeCommand::Account { command } => account::run(command, &dir),
        NodeCommand::Wallet { command } => wallet::run(command, &dir),
        NodeCommand::License { command } => license::run(command, config, &dir),
    }
}

// --- shared keystore plumbing ---

pub(crate) fn keystore_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

/// Prompts without echo. The prompt library installs a terminal guard that
/// restores the original settings on every exit path, panics included.
pub(crate) fn read_password(prompt: &str) -> Result<String, CliError> {
    rpassword::prompt_password(prompt)
        .map_err(|e| CliError::User(format!("could not read password: {e}")))
}

/// Creates or imports a key into a named keystore.
pub(crate) fn save_key(dir: &Path, name: &str, private_key: &[u8]) -> Result<(), CliError> {
    let path = keystore_path(dir, name);
    if path.exists() {
        return Err(CliError::User(format!(
            "key store already exists at {}; delete it to continue",
            path.display()
        )));
    }
    let password = read_password("Enter key store password: ")?;
    let confirm = read_password("Confirm new key store password: ")?;
    if password != confirm {
        return Err(CliError::User("passwords don't match".into()));
    }
    let doc = KeyStoreFile::seal(private_key, &password)
        .map_err(|e| CliError::Internal(anyhow::anyhow!(e)))?;
    doc.save(&path)
        .map_err(|e| CliError::Internal(anyhow::anyhow!(e)))?;
    println!("Key store saved to {}. Back up your password!", path.display());
    Ok(())
}

/// Decrypts a named keystore after prompting for its password.
pub(crate) fn load_key(dir: &Path, name: &str) -> Result<Vec<u8>, CliError> {
    let path = keystore_path(dir, name);
    let doc = KeyStoreFile::load(&path).map_err(|e| {
        CliError::User(format!("could not read {}: {e}", path.display()))
    })?;
    let password = read_password(&format!("Enter {name} keystore password: "))?;
    let secret = doc
        .open(&password)
        .map_err(|_| CliError::User("invalid keystore password".into()))?;
    Ok(secret.0.clone())
}

/// Prompts for a hex private key without echo and normalizes it.
pub(crate) fn read_private_key_hex(prompt: &str) -> Result<Vec<u8>, CliError> {
    let entered = read_password(prompt)?;
    let trimmed = entered.trim().trim_start_matches("0x");
    if trimmed.len() != 64 {
        return Err(CliError::User("invalid private key entered".into()));
    }
    hex::decode(trimmed).map_err(|e| CliError::User(format!("invalid private key: {e}")))
}
