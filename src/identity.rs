use std::error::Error;
use std::fs;
use std::path::Path;

use libp2p::identity;

/// Loads the keypair stored at `path`, or generates one and saves it there.
/// Without a path the identity only lives as long as the process.
pub fn load_or_generate_key(
    path: Option<&Path>,
) -> Result<identity::Keypair, Box<dyn Error + Send + Sync>> {
    let Some(path) = path else {
        return Ok(identity::Keypair::generate_ed25519());
    };

    if path.exists() {
        let bytes = fs::read(path)?;
        let keypair = identity::Keypair::from_protobuf_encoding(&bytes)
            .map_err(|e| format!("Failed to decode identity key {}: {e}", path.display()))?;
        log::info!("Loaded persisted identity key from {}", path.display());
        return Ok(keypair);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let keypair = identity::Keypair::generate_ed25519();
    let encoded = keypair
        .to_protobuf_encoding()
        .map_err(|e| format!("Failed to encode identity key: {e}"))?;
    fs::write(path, encoded)?;
    log::info!("Generated new identity key and saved to {}", path.display());
    Ok(keypair)
}
