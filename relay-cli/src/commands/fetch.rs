//! Fetch the relay's protected value.

use anyhow::{Context, Result};

use super::Peer;

/// Run the fetch command.
pub async fn run(peer: &Peer) -> Result<()> {
    let mut client = peer.login().await?;

    let value = client
        .request_encrypted_value()
        .await
        .context("Failed to fetch encrypted value")?;
    println!("{value}");

    client.close().await?;
    Ok(())
}
