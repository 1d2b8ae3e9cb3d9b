//! Have a protected value transcoded for a fresh key pair and open it.

use anyhow::{Context, Result};

use super::{generate_key_pair, Peer};

/// Run the decrypt command.
pub async fn run(peer: &Peer, value: &str, key_bits: usize) -> Result<()> {
    let pair = generate_key_pair(key_bits).await?;
    let mut client = peer.login().await?;

    let status = client
        .register_public_key(pair.public_key_pem())
        .await
        .context("Failed to register public key")?;
    tracing::info!("{}", status);

    let plaintext = client
        .decrypt(value, &pair)
        .await
        .context("Failed to decrypt value")?;
    println!("{}", String::from_utf8_lossy(&plaintext));

    client.close().await?;
    Ok(())
}
