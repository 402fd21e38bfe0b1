use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PoolError;
use crate::proxy::{AnonymityLevel, HealthStatus, ProxyIdentity, Scheme};

fn storage_failure(reason: impl std::fmt::Display) -> PoolError {
	PoolError::StorageFailure(reason.to_string())
}

/// A single proxy as persisted; credentials are stored encrypted and
/// never touch the wire format in cleartext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRecord {
	pub host: String,
	pub port: u16,
	pub scheme: Scheme,
	pub username: Option<String>,
	/// base64(nonce || ciphertext), present only if the original had a secret.
	pub encrypted_secret: Option<String>,
	pub country_code: Option<String>,
	pub region: Option<String>,
	pub source_tag: String,
	pub first_seen: DateTime<Utc>,
	pub status: HealthStatus,
	pub anonymity: AnonymityLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Snapshot {
	pub proxies: Vec<ProxyRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotFilter {
	pub source_tag: Option<String>,
	pub status: Option<HealthStatus>,
}

impl SnapshotFilter {
	fn matches(&self, record: &ProxyRecord) -> bool {
		if let Some(tag) = &self.source_tag {
			if &record.source_tag != tag {
				return false;
			}
		}
		if let Some(status) = self.status {
			if record.status != status {
				return false;
			}
		}
		true
	}
}

/// Durable persistence contract (C10): a host can swap in any backend
/// that can round-trip a `Snapshot`.
#[async_trait]
pub trait Store: Send + Sync {
	async fn save(&self, snapshot: &Snapshot) -> Result<(), PoolError>;
	async fn load(&self) -> Result<Snapshot, PoolError>;
	async fn query(&self, filter: &SnapshotFilter) -> Result<Vec<ProxyRecord>, PoolError> {
		let snapshot = self.load().await?;
		Ok(snapshot.proxies.into_iter().filter(|r| filter.matches(r)).collect())
	}
}

/// JSON-on-disk store with AES-256-GCM credential encryption and
/// atomic writes (temp file + fsync + rename), so a crash mid-save never
/// leaves a half-written snapshot on disk.
pub struct JsonFileStore {
	path: PathBuf,
	cipher: Aes256Gcm,
}

impl JsonFileStore {
	pub fn new(path: impl Into<PathBuf>, passphrase: &str) -> Self {
		let mut hasher = Sha256::new();
		hasher.update(passphrase.as_bytes());
		let key_bytes = hasher.finalize();
		let cipher = Aes256Gcm::new_from_slice(&key_bytes).expect("sha256 output is 32 bytes");
		JsonFileStore {
			path: path.into(),
			cipher,
		}
	}

	fn encrypt(&self, plaintext: &str) -> String {
		let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
		let ciphertext = self
			.cipher
			.encrypt(&nonce, plaintext.as_bytes())
			.expect("aes-gcm encryption of bounded-size credential");
		let mut combined = nonce.to_vec();
		combined.extend_from_slice(&ciphertext);
		base64::Engine::encode(&base64::engine::general_purpose::STANDARD, combined)
	}

	fn decrypt(&self, encoded: &str) -> Result<String, PoolError> {
		let combined = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
			.map_err(|_| storage_failure("malformed base64 in encrypted credential"))?;
		if combined.len() < 12 {
			return Err(storage_failure("encrypted credential shorter than nonce length"));
		}
		let (nonce_bytes, ciphertext) = combined.split_at(12);
		let nonce = Nonce::from_slice(nonce_bytes);
		let plaintext = self
			.cipher
			.decrypt(nonce, ciphertext)
			.map_err(|_| storage_failure("credential decryption failed, corrupt snapshot or key mismatch"))?;
		String::from_utf8(plaintext).map_err(|_| storage_failure("decrypted credential is not valid utf-8"))
	}

	pub fn record_from_identity(&self, identity: &ProxyIdentity, status: HealthStatus, anonymity: AnonymityLevel) -> ProxyRecord {
		ProxyRecord {
			host: identity.host.clone(),
			port: identity.port,
			scheme: identity.scheme,
			username: identity.username.clone(),
			encrypted_secret: identity.secret.as_ref().map(|s| self.encrypt(s.expose())),
			country_code: identity.country_code.clone(),
			region: identity.region.clone(),
			source_tag: identity.source_tag.clone(),
			first_seen: identity.first_seen,
			status,
			anonymity,
		}
	}

	pub fn decrypt_secret(&self, record: &ProxyRecord) -> Result<Option<String>, PoolError> {
		record.encrypted_secret.as_deref().map(|enc| self.decrypt(enc)).transpose()
	}
}

#[async_trait]
impl Store for JsonFileStore {
	async fn save(&self, snapshot: &Snapshot) -> Result<(), PoolError> {
		let body = serde_json::to_vec_pretty(snapshot).map_err(storage_failure)?;

		let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
		let tmp_path = dir.join(format!(
			".{}.tmp",
			self.path.file_name().and_then(|n| n.to_str()).unwrap_or("snapshot")
		));

		let mut file = tokio::fs::File::create(&tmp_path).await.map_err(storage_failure)?;
		use tokio::io::AsyncWriteExt;
		file.write_all(&body).await.map_err(storage_failure)?;
		file.sync_all().await.map_err(storage_failure)?;
		drop(file);

		tokio::fs::rename(&tmp_path, &self.path).await.map_err(storage_failure)?;
		Ok(())
	}

	async fn load(&self) -> Result<Snapshot, PoolError> {
		match tokio::fs::read(&self.path).await {
			Ok(bytes) => serde_json::from_slice(&bytes).map_err(storage_failure),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::default()),
			Err(e) => Err(storage_failure(e)),
		}
	}
}
