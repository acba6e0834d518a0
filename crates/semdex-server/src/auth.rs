//! Request authentication seam.
//!
//! The platform's key helper is an external collaborator; deployments plug
//! it in behind `KeyVerifier`. The bundled implementation compares the
//! request key against the service secret.

use tracing::warn;

pub trait KeyVerifier: Send + Sync {
    /// `encrypt_key` is the service secret, `auth_key` comes from the
    /// request, `app_id` identifies the caller.
    fn verify(&self, encrypt_key: &str, auth_key: &str, app_id: &str) -> bool;
}

pub struct StaticKeyVerifier;

impl KeyVerifier for StaticKeyVerifier {
    fn verify(&self, encrypt_key: &str, auth_key: &str, app_id: &str) -> bool {
        if encrypt_key.is_empty() {
            warn!("no encrypt key configured, rejecting request from '{app_id}'");
            return false;
        }
        // Length check first so unequal-length keys don't shortcut the scan.
        auth_key.len() == encrypt_key.len()
            && auth_key
                .bytes()
                .zip(encrypt_key.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}
