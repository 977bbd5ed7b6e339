//! Object storage for photos, thumbnails and generated reports.
//!
//! Objects are addressed by slash-separated keys such as
//! `users/{user}/inspections/{inspection}/images/{id}.jpg`. Browsers never
//! see storage paths directly; they receive short-lived signed URLs served
//! by the `/files` route.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("invalid signature")]
    BadSignature,
    #[error("link expired")]
    Expired,
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata returned alongside object content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub content_type: String,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<(Vec<u8>, ObjectInfo), StorageError>;

    /// Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// A URL that grants read access to `key` for `ttl`.
    fn url(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Reject keys that could escape the storage root.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        Err(StorageError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

/// Signs and verifies `/files` URLs with HMAC-SHA256 over `"{key}:{expires}"`.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, key: &str, expires: i64) -> Hmac<Sha256> {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(format!("{}:{}", key, expires).as_bytes());
        mac
    }

    pub fn sign(&self, key: &str, expires: i64) -> String {
        hex::encode(self.mac(key, expires).finalize().into_bytes())
    }

    pub fn signed_url(&self, key: &str, ttl: Duration) -> String {
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let path = key
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "/files/{}?expires={}&sig={}",
            path,
            expires,
            self.sign(key, expires)
        )
    }

    /// Check a signature in constant time, then the expiry.
    pub fn verify(&self, key: &str, expires: i64, sig: &str) -> Result<(), StorageError> {
        let sig = hex::decode(sig).map_err(|_| StorageError::BadSignature)?;
        self.mac(key, expires)
            .verify_slice(&sig)
            .map_err(|_| StorageError::BadSignature)?;
        if Utc::now().timestamp() > expires {
            return Err(StorageError::Expired);
        }
        Ok(())
    }
}

/// Filesystem-backed storage rooted at a directory.
pub struct LocalStorage {
    root: PathBuf,
    signer: UrlSigner,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, secret: &str) -> Self {
        Self {
            root: root.into(),
            signer: UrlSigner::new(secret),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // write to a temp name first so readers never see partial files
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(key, size = bytes.len(), "stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<(Vec<u8>, ObjectInfo), StorageError> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let info = ObjectInfo {
            key: key.to_string(),
            size: bytes.len() as u64,
            content_type: mime_guess::from_path(&path)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };
        Ok((bytes, info))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        validate_key(key)?;
        Ok(self.signer.signed_url(key, ttl))
    }
}

/// Key for an inspection photo or its thumbnail.
pub fn image_key(user_id: &str, inspection_id: &str, image_id: &str, variant: &str, ext: &str) -> String {
    format!(
        "users/{}/inspections/{}/images/{}_{}.{}",
        user_id, inspection_id, image_id, variant, ext
    )
}

/// Key for a generated report file.
pub fn report_key(user_id: &str, inspection_id: &str, report_id: &str, ext: &str) -> String {
    format!(
        "users/{}/inspections/{}/reports/{}.{}",
        user_id, inspection_id, report_id, ext
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("users/u1/inspections/i1/images/a_original.jpg").is_ok());
        for bad in ["", "/etc/passwd", "users/../secret", "users//x", "a\\b", "./x"] {
            assert!(
                matches!(validate_key(bad), Err(StorageError::InvalidKey(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_signatures() {
        let signer = UrlSigner::new("secret");
        let expires = Utc::now().timestamp() + 60;
        let sig = signer.sign("a/b.jpg", expires);

        assert!(signer.verify("a/b.jpg", expires, &sig).is_ok());
        assert!(matches!(
            signer.verify("a/c.jpg", expires, &sig),
            Err(StorageError::BadSignature)
        ));
        assert!(matches!(
            signer.verify("a/b.jpg", expires, "zz"),
            Err(StorageError::BadSignature)
        ));
        assert!(matches!(
            UrlSigner::new("other").verify("a/b.jpg", expires, &sig),
            Err(StorageError::BadSignature)
        ));

        let past = Utc::now().timestamp() - 10;
        let old = signer.sign("a/b.jpg", past);
        assert!(matches!(
            signer.verify("a/b.jpg", past, &old),
            Err(StorageError::Expired)
        ));
    }

    #[test]
    fn test_signed_url_shape() {
        let url = UrlSigner::new("s").signed_url("users/u/x.pdf", Duration::from_secs(300));
        assert!(url.starts_with("/files/users/u/x.pdf?expires="));
        assert!(url.contains("&sig="));
    }

    #[tokio::test]
    async fn test_local_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "secret");
        let key = image_key("u1", "i1", "img", "original", "png");

        storage.put(&key, b"png-bytes", "image/png").await.unwrap();
        let (bytes, info) = storage.get(&key).await.unwrap();
        assert_eq!(bytes, b"png-bytes");
        assert_eq!(info.content_type, "image/png");
        assert_eq!(info.size, 9);

        storage.delete(&key).await.unwrap();
        storage.delete(&key).await.unwrap();
        assert!(matches!(
            storage.get(&key).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(storage.put("../escape", b"x", "text/plain").await.is_err());
    }
}
