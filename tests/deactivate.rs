//! Tests for deactivating a `did:webvh` DID.

mod common;

use chrono::{DateTime, Utc};
use common::{Ed25519Verifier, Keyring};
use webvh_core::{
    CreateBuilder, CreateResult, DeactivateBuilder, DocumentBuilder, Error, UpdateBuilder,
    VerificationMethod, resolve_log,
};

fn time(s: &str) -> DateTime<Utc> {
    s.parse().expect("should parse time")
}

async fn create(signer: &Keyring, next_key: Option<String>) -> CreateResult {
    let update_multi = signer.multibase();
    let mut builder = CreateBuilder::new("https://example.com")
        .document(DocumentBuilder::new().verification_method(VerificationMethod::new(
            update_multi.clone(),
        )))
        .update_keys(vec![update_multi])
        .version_time(time("2024-01-01T08:32:55Z"));
    if let Some(next) = next_key {
        builder = builder.next_key(next);
    }
    builder.signer(signer).build(&Ed25519Verifier).await.expect("should create")
}

// Deactivation is terminal: the resolved metadata says so and further
// updates are rejected.
#[tokio::test]
async fn deactivate_and_resolve() {
    let signer = Keyring::new();
    let created = create(&signer, None).await;

    let result = DeactivateBuilder::from(&created.log)
        .expect("should load log")
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect("should deactivate");

    assert_eq!(result.log.len(), 2);
    assert!(result.metadata.deactivated);
    assert!(result.metadata.update_keys.is_empty());

    let resolved =
        resolve_log(&result.log, None, None, &Ed25519Verifier).await.expect("should resolve");
    assert!(resolved.metadata.deactivated);
    assert_eq!(resolved.metadata.version_id, result.metadata.version_id);

    // a further update must fail
    let err = UpdateBuilder::from(&result.log)
        .expect("should load log")
        .version_time(time("2024-03-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect_err("should fail");
    let Error::Policy(msg) = err else { panic!("expected policy error") };
    assert!(msg.contains("deactivated"), "got {msg}");
}

// Active pre-rotation requires a nullifying rotation entry ahead of the
// terminal entry.
#[tokio::test]
async fn deactivate_with_prerotation() {
    let signer = Keyring::new();
    let next_multi = signer.next_multibase();
    let created = create(&signer, Some(next_multi.clone())).await;

    // without the final rotation the build is rejected
    let err = DeactivateBuilder::from(&created.log)
        .expect("should load log")
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect_err("should fail");
    assert!(matches!(err, Error::Policy(_)));

    let rotated = signer.rotate();
    let result = DeactivateBuilder::from(&created.log)
        .expect("should load log")
        .rotate_keys(&[&next_multi], &[])
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&rotated)
        .build(&Ed25519Verifier)
        .await
        .expect("should deactivate");

    assert_eq!(result.log.len(), 3);
    assert!(result.log[1].version_id.starts_with("2-"));
    assert!(result.log[2].version_id.starts_with("3-"));
    assert!(result.metadata.deactivated);
    assert!(!result.metadata.prerotation);

    let resolved =
        resolve_log(&result.log, None, None, &Ed25519Verifier).await.expect("should resolve");
    assert!(resolved.metadata.deactivated);
}

// Deactivating twice is rejected.
#[tokio::test]
async fn deactivate_is_idempotent_failure() {
    let signer = Keyring::new();
    let created = create(&signer, None).await;

    let result = DeactivateBuilder::from(&created.log)
        .expect("should load log")
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect("should deactivate");

    let err = DeactivateBuilder::from(&result.log)
        .expect("should load log")
        .version_time(time("2024-03-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect_err("should fail");
    assert!(matches!(err, Error::Policy(_)));
}

// Appending any entry after the terminal one fails resolution.
#[tokio::test]
async fn entries_after_deactivation_fail() {
    let signer = Keyring::new();
    let created = create(&signer, None).await;

    let result = DeactivateBuilder::from(&created.log)
        .expect("should load log")
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect("should deactivate");

    let mut log = result.log.clone();
    let mut extra = log.last().expect("should have entries").clone();
    extra.version_id = "3-zQmExtraEntry".to_string();
    extra.version_time = time("2024-03-01T08:32:55Z");
    log.push(extra);

    let err = resolve_log(&log, None, None, &Ed25519Verifier).await.expect_err("should fail");
    let Error::Policy(msg) = err else { panic!("expected policy error") };
    assert!(msg.contains("deactivation"), "got {msg}");
}
