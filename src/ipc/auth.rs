use anyhow::Result;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

/// Return the auth token for this daemon instance.
///
/// On first call, generates a random 32-character hex token and writes it to
/// `{data_dir}/auth_token` with user-only read/write permissions (mode 0600
/// on Unix). On subsequent calls, reads and returns the existing token.
///
/// The token file must be kept secret — it is the only credential protecting
/// the local WebSocket port from unauthorized access by other processes on
/// the same machine.
pub fn get_or_create_token(data_dir: &Path) -> Result<String> {
    let path = data_dir.join("auth_token");

    if path.exists() {
        check_token_permissions(&path);
        let token = std::fs::read_to_string(&path)?.trim().to_string();
        if !token.is_empty() {
            return Ok(token);
        }
    }

    // Generate a new token (UUID v4, hex without dashes = 32 chars)
    let token = Uuid::new_v4().to_string().replace('-', "");

    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&path, &token)?;

    // Restrict to owner read/write only on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(token)
}

/// Warn when the token file is readable by other users.
fn check_token_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(path) {
            let mode = meta.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                warn!(
                    path = %path.display(),
                    mode = format!("{mode:o}"),
                    "auth token file is readable by other users — run chmod 600"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// An RFC 7636 PKCE verifier/challenge pair (S256 method).
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// 43-character URL-safe string encoding 32 random bytes.
    pub verifier: String,
    /// base64url(SHA-256(verifier)), no padding.
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh verifier and its S256 challenge.
    pub fn generate() -> Self {
        // 32 random bytes from two v4 UUIDs (122 random bits each).
        let mut entropy = [0u8; 32];
        entropy[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        entropy[16..].copy_from_slice(Uuid::new_v4().as_bytes());

        let verifier = URL_SAFE_NO_PAD.encode(entropy);
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn token_is_created_once_and_reused() {
        let dir = tempdir().unwrap();
        let first = get_or_create_token(dir.path()).unwrap();
        let second = get_or_create_token(dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        get_or_create_token(dir.path()).unwrap();
        let mode = std::fs::metadata(dir.path().join("auth_token"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn pkce_pair_has_rfc7636_shape() {
        let pair = PkcePair::generate();
        assert_eq!(pair.verifier.len(), 43);
        assert!(!pair.verifier.contains('='));
        // S256 of the verifier, base64url without padding = 43 chars too.
        assert_eq!(pair.challenge.len(), 43);
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pair.verifier.as_bytes()));
        assert_eq!(pair.challenge, expected);
    }

    #[test]
    fn pkce_pairs_are_unique() {
        assert_ne!(PkcePair::generate().verifier, PkcePair::generate().verifier);
    }
}
