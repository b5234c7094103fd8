// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential backends: plain files and the OS secure store.
//!
//! Files are tried in order, then the secure store. Write-back always goes to
//! the backend recorded in the [`BackendHandle`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{BackendHandle, CredentialRecord, ResolvedCredential};
use crate::error::MeterError;
use crate::provider::Profile;

/// An opaque key/value secret store addressed by service name.
pub trait SecureStore: Send + Sync {
    /// Returns `Ok(None)` when the store has no entry for `service`.
    fn read<'a>(
        &'a self,
        service: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<String>>> + Send + 'a>>;

    /// Create or overwrite the entry for `service`.
    fn write<'a>(
        &'a self,
        service: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

/// macOS keychain access through the `security` utility.
#[derive(Debug, Clone)]
pub struct KeychainStore {
    program: PathBuf,
    timeout: Duration,
}

impl KeychainStore {
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("security", timeout)
    }

    pub fn with_program(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { program: program.into(), timeout }
    }

    async fn exec(&self, args: &[&str]) -> anyhow::Result<std::process::Output> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => Ok(output?),
            Err(_) => anyhow::bail!("{} timed out after {:?}", self.program.display(), self.timeout),
        }
    }
}

impl SecureStore for KeychainStore {
    fn read<'a>(
        &'a self,
        service: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<String>>> + Send + 'a>> {
        Box::pin(async move {
            let output = self.exec(&["find-generic-password", "-s", service, "-w"]).await?;
            if !output.status.success() {
                debug!(service, status = %output.status, "keychain has no entry");
                return Ok(None);
            }
            let raw = String::from_utf8_lossy(&output.stdout);
            let decoded = decode_hex_payload(&raw);
            if decoded.is_empty() {
                return Ok(None);
            }
            Ok(Some(decoded))
        })
    }

    fn write<'a>(
        &'a self,
        service: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let output =
                self.exec(&["add-generic-password", "-s", service, "-U", "-w", value]).await?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                anyhow::bail!("keychain write failed ({}): {}", output.status, stderr.trim());
            }
            Ok(())
        })
    }
}

/// Undo the hex encoding the keychain applies to some stored values.
///
/// Decodes only when the trimmed input is entirely hex digits of even length
/// and the bytes are valid UTF-8; anything else comes back trimmed.
pub fn decode_hex_payload(raw: &str) -> String {
    let cleaned = raw.trim();
    if cleaned.is_empty() || cleaned.len() % 2 != 0 {
        return cleaned.to_owned();
    }
    if !cleaned.bytes().all(|b| b.is_ascii_hexdigit()) {
        return cleaned.to_owned();
    }
    let bytes: Option<Vec<u8>> = cleaned
        .as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).ok().and_then(|s| u8::from_str_radix(s, 16).ok()))
        .collect();
    match bytes.map(String::from_utf8) {
        Some(Ok(decoded)) => decoded,
        _ => cleaned.to_owned(),
    }
}

/// Locates a provider's credential record and writes updates back to it.
pub struct Resolver {
    profile: &'static Profile,
    paths: Vec<PathBuf>,
    store: Option<Arc<dyn SecureStore>>,
}

impl Resolver {
    pub fn new(profile: &'static Profile, paths: Vec<PathBuf>) -> Self {
        Self { profile, paths, store: None }
    }

    /// Enable the secure store fallback. Ignored for providers without a service name.
    pub fn with_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn resolve(&self) -> Result<ResolvedCredential, MeterError> {
        for path in &self.paths {
            if let Some(record) = self.read_file(path).await {
                info!(path = %path.display(), "using credentials file");
                return Ok(ResolvedCredential { record, handle: BackendHandle::File(path.clone()) });
            }
        }

        if let (Some(store), Some(service)) = (&self.store, self.profile.keychain_service) {
            match store.read(service).await {
                Ok(Some(raw)) => match CredentialRecord::parse(&raw, self.profile.layout) {
                    Ok(record) => {
                        info!(service, "using keychain credentials");
                        return Ok(ResolvedCredential {
                            record,
                            handle: BackendHandle::SecureStore { service: service.to_owned() },
                        });
                    }
                    Err(e) => warn!(service, "ignoring keychain entry: {e}"),
                },
                Ok(None) => {}
                Err(e) => warn!(service, "keychain query failed: {e:#}"),
            }
        }

        Err(MeterError::NotFound {
            provider: self.profile.display_name,
            hint: self.profile.login_hint,
        })
    }

    async fn read_file(&self, path: &Path) -> Option<CredentialRecord> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), "failed to read credentials: {e}");
                return None;
            }
        };
        match CredentialRecord::parse(&contents, self.profile.layout) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), "ignoring credentials file: {e}");
                None
            }
        }
    }

    /// Write the record back to the backend it was resolved from.
    pub async fn persist(&self, resolved: &ResolvedCredential) -> anyhow::Result<()> {
        let json = resolved.record.to_json()?;
        match &resolved.handle {
            BackendHandle::File(path) => write_atomic(path, &json).await?,
            BackendHandle::SecureStore { service } => {
                let Some(ref store) = self.store else {
                    anyhow::bail!("no secure store available for {service}");
                };
                store.write(service, &json).await?;
            }
        }
        debug!(backend = %resolved.handle, "persisted credentials");
        Ok(())
    }
}

/// Write to a sibling tmp file then rename over the target, keeping its permissions.
async fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    let tmp = path.with_extension("tmp");
    let permissions = tokio::fs::metadata(path).await.ok().map(|m| m.permissions());
    tokio::fs::write(&tmp, contents).await?;
    if let Some(perms) = permissions {
        tokio::fs::set_permissions(&tmp, perms).await?;
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
