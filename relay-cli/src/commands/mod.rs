//! CLI command implementations.

pub mod decrypt;
pub mod demo;
pub mod fetch;

use anyhow::{Context, Result};
use relay_crypto::RecipientKeyPair;

use crate::client::RelayClient;

/// Where to connect and who to log in as.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Relay URL
    pub url: String,
    /// Username
    pub username: String,
    /// Password; prompted for when absent
    pub password: Option<String>,
}

impl Peer {
    /// Connect and authenticate.
    pub async fn login(&self) -> Result<RelayClient> {
        let password = match &self.password {
            Some(password) => password.clone(),
            None => prompt_password(&format!("Password for {}: ", self.username))?,
        };

        let mut client = RelayClient::connect(&self.url)
            .await
            .with_context(|| format!("Failed to connect to {}", self.url))?;
        client
            .authenticate(&self.username, &password)
            .await
            .with_context(|| format!("Failed to authenticate as {}", self.username))?;
        Ok(client)
    }
}

/// Generate a recipient key pair off the async runtime.
pub async fn generate_key_pair(bits: usize) -> Result<RecipientKeyPair> {
    tokio::task::spawn_blocking(move || RecipientKeyPair::generate(bits))
        .await
        .context("Key generation task failed")?
        .context("Failed to generate RSA key pair")
}

/// Prompt for password input with echo suppression.
fn prompt_password(prompt: &str) -> Result<String> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }
    Ok(password)
}
