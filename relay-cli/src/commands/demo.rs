//! Two-peer walkthrough: one peer fetches, the other decrypts.

use anyhow::{Context, Result};

use super::{generate_key_pair, Peer};

/// Run the demo command.
pub async fn run(sender: &Peer, receiver: &Peer, key_bits: usize) -> Result<()> {
    println!("Generating {key_bits}-bit key pair for {}...", receiver.username);
    let pair = generate_key_pair(key_bits).await?;

    let mut first = sender.login().await?;
    println!("{} authenticated", sender.username);
    let value = first
        .request_encrypted_value()
        .await
        .context("Failed to fetch encrypted value")?;
    println!("{} received encrypted value: {}", sender.username, value);

    let mut second = receiver.login().await?;
    println!("{} authenticated", receiver.username);
    let status = second
        .register_public_key(pair.public_key_pem())
        .await
        .context("Failed to register public key")?;
    println!("{}: {}", receiver.username, status);

    let plaintext = second
        .decrypt(&value, &pair)
        .await
        .context("Failed to decrypt value")?;
    println!(
        "{} decrypted: {}",
        receiver.username,
        String::from_utf8_lossy(&plaintext)
    );

    first.close().await?;
    second.close().await?;
    Ok(())
}
