// Path: crates/cli/src/commands/wallet.rs

use super::{load_key, read_private_key_hex, save_key, CliError, KeystoreCommand};
use mlayer_crypto::sign::secp::SecpKeyPair;
use std::path::Path;

const KEYSTORE_NAME: &str = "wallet";

/// `mlayer node wallet init|import|export`.
pub fn run(command: KeystoreCommand, dir: &Path) -> Result<(), CliError> {
    match command {
        KeystoreCommand::Init => {
            let pair = SecpKeyPair::generate();
            save_key(dir, KEYSTORE_NAME, &pair.private_key_bytes())?;
            println!("Wallet address: {}", pair.address());
            Ok(())
        }
        KeystoreCommand::Import => {
            let bytes = read_private_key_hex("Enter wallet private key (hex): ")?;
            let pair =
                SecpKeyPair::from_bytes(&bytes).map_err(|e| CliError::User(e.to_string()))?;
            save_key(dir, KEYSTORE_NAME, &bytes)?;
            println!("Imported wallet {}", pair.address());
            Ok(())
        }
        KeystoreCommand::Export => {
            let bytes = load_key(dir, KEYSTORE_NAME)?;
            println!("{}", hex::encode(bytes));
            Ok(())
        }
    }
}
