//! Presigned URLs for staged imagery objects.
//!
//! A URL carries its expiry and an HMAC-SHA256 signature over the object
//! path and that expiry; whoever holds the signing key can verify it
//! without any server-side state.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum PresignError {
    #[error("signing key must not be empty")]
    EmptySigningKey,

    #[error("object key must not be empty")]
    EmptyObjectKey,

    #[error("ttl must be positive, got {0}")]
    InvalidTtl(i64),

    #[error("invalid base url: {0}")]
    Url(#[from] url::ParseError),
}

/// Signs and verifies presigned URLs.
#[derive(Clone)]
pub struct UrlSigner {
    key: Vec<u8>,
    base_url: Url,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(signing_key: &str, base_url: &str) -> Result<Self, PresignError> {
        if signing_key.is_empty() {
            return Err(PresignError::EmptySigningKey);
        }
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(PresignError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        Ok(Self {
            key: signing_key.as_bytes().to_vec(),
            base_url,
        })
    }

    fn mac(&self, path: &str, expires: i64) -> Result<HmacSha256, PresignError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).map_err(|_| PresignError::EmptySigningKey)?;
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// URL for `key` in `stage`, valid for `ttl_secs` from `now` (unix seconds).
    pub fn presign_at(
        &self,
        stage: &str,
        key: &str,
        ttl_secs: i64,
        now: i64,
    ) -> Result<String, PresignError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(PresignError::EmptyObjectKey);
        }
        if ttl_secs <= 0 {
            return Err(PresignError::InvalidTtl(ttl_secs));
        }
        let expires = now.saturating_add(ttl_secs);

        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(stage.trim_start_matches('@'))
                .extend(key.split('/'));
        }
        let signature = hex::encode(self.mac(url.path(), expires)?.finalize().into_bytes());
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.into())
    }

    pub fn presign(&self, stage: &str, key: &str, ttl_secs: i64) -> Result<String, PresignError> {
        self.presign_at(stage, key, ttl_secs, chrono::Utc::now().timestamp())
    }

    /// Check a URL produced by this signer at time `now`.
    pub fn verify_at(&self, presigned: &str, now: i64) -> bool {
        let Ok(url) = Url::parse(presigned) else {
            return false;
        };
        if url.origin() != self.base_url.origin() {
            return false;
        }
        let mut expires = None;
        let mut signature = None;
        for (k, v) in url.query_pairs() {
            match k.as_ref() {
                "expires" => expires = v.parse::<i64>().ok(),
                "signature" => signature = hex::decode(v.as_bytes()).ok(),
                _ => {}
            }
        }
        let (Some(expires), Some(signature)) = (expires, signature) else {
            return false;
        };
        if now > expires {
            return false;
        }
        self.mac(url.path(), expires)
            .map(|mac| mac.verify_slice(&signature).is_ok())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_714_000_000;

    fn signer() -> UrlSigner {
        UrlSigner::new("test-key", "https://imagery.localhost").unwrap()
    }

    #[test]
    fn test_presigned_url_shape() {
        let url = signer()
            .presign_at("@s3_imagery_stage_direct", "2024/05/scene_01.tif", 3600, NOW)
            .unwrap();
        assert!(url.starts_with(
            "https://imagery.localhost/s3_imagery_stage_direct/2024/05/scene_01.tif?expires=1714003600&signature="
        ));
        let sig = url.rsplit("signature=").next().unwrap();
        assert_eq!(sig.len(), 64);
    }

    #[test]
    fn test_verify_round_trip_and_expiry() {
        let s = signer();
        let url = s.presign_at("@stage", "a/b.png", 60, NOW).unwrap();
        assert!(s.verify_at(&url, NOW + 30));
        assert!(!s.verify_at(&url, NOW + 61));
    }

    #[test]
    fn test_tampered_url_rejected() {
        let s = signer();
        let url = s.presign_at("@stage", "a/b.png", 60, NOW).unwrap();
        assert!(!s.verify_at(&url.replace("b.png", "c.png"), NOW));
        assert!(!s.verify_at(&url.replace("expires=", "expires=9"), NOW));

        let other = UrlSigner::new("other-key", "https://imagery.localhost").unwrap();
        assert!(!other.verify_at(&url, NOW));
    }

    #[test]
    fn test_invalid_inputs() {
        let s = signer();
        assert!(matches!(s.presign_at("@stage", "", 60, NOW), Err(PresignError::EmptyObjectKey)));
        assert!(matches!(s.presign_at("@stage", "k", 0, NOW), Err(PresignError::InvalidTtl(0))));
        assert!(matches!(UrlSigner::new("", "https://x"), Err(PresignError::EmptySigningKey)));
        assert!(UrlSigner::new("k", "not a url").is_err());
    }
}
