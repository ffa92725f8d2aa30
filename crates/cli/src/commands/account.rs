// Path: crates/cli/src/commands/account.rs

use super::{load_key, read_private_key_hex, save_key, CliError, KeystoreCommand};
use mlayer_crypto::sign::secp::SecpKeyPair;
use std::path::Path;

const KEYSTORE_NAME: &str = "account";

/// `mlayer node account init|import|export`.
pub fn run(command: KeystoreCommand, dir: &Path) -> Result<(), CliError> {
    match command {
        KeystoreCommand::Init => {
            let pair = SecpKeyPair::generate();
            save_key(dir, KEYSTORE_NAME, &pair.private_key_bytes())?;
            println!("Account address: {}", pair.address());
            println!("Account public key: {}", pair.public_key_hex());
            Ok(())
        }
        KeystoreCommand::Import => {
            let bytes = read_private_key_hex("Enter private key to import (hex): ")?;
            let pair =
                SecpKeyPair::from_bytes(&bytes).map_err(|e| CliError::User(e.to_string()))?;
            save_key(dir, KEYSTORE_NAME, &bytes)?;
            println!("Imported account {}", pair.address());
            Ok(())
        }
        KeystoreCommand::Export => {
            let bytes = load_key(dir, KEYSTORE_NAME)?;
            println!("{}", hex::encode(bytes));
            Ok(())
        }
    }
}
