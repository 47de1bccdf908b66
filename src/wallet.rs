//! Wallet identity source.
//!
//! The engine never signs or talks to a chain. It only needs an address to
//! put on a stake, so the wallet is an opaque collaborator behind
//! `WalletProvider`.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// An external wallet / identity provider.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Whether the provider has finished initialising.
    fn ready(&self) -> bool;

    fn authenticated(&self) -> bool;

    async fn login(&self) -> Result<()>;

    async fn logout(&self) -> Result<()>;

    /// Connected wallet addresses, primary first.
    fn addresses(&self) -> Vec<String>;

    /// Address to stake from, if the user is logged in.
    fn primary_address(&self) -> Option<String> {
        if self.ready() && self.authenticated() {
            self.addresses().into_iter().next()
        } else {
            None
        }
    }
}

/// A wallet with one pre-configured address. Login succeeds iff an
/// address is configured.
pub struct StaticWallet {
    address: Option<String>,
    authenticated: AtomicBool,
}

impl StaticWallet {
    pub fn new(address: Option<String>) -> Self {
        let address = address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        Self {
            address,
            authenticated: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl WalletProvider for StaticWallet {
    fn ready(&self) -> bool {
        true
    }

    fn authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn login(&self) -> Result<()> {
        let address = self
            .address
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No wallet address configured"))?;
        self.authenticated.store(true, Ordering::SeqCst);
        info!(address, "Wallet connected");
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.authenticated.store(false, Ordering::SeqCst);
        info!("Wallet disconnected");
        Ok(())
    }

    fn addresses(&self) -> Vec<String> {
        if self.authenticated() {
            self.address.iter().cloned().collect()
        } else {
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
