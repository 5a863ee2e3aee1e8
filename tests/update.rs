//! Tests for updating a `did:webvh` DID document and log.

mod common;

use chrono::{DateTime, Utc};
use common::{Ed25519Verifier, Keyring};
use webvh_core::{
    CreateBuilder, CreateResult, DocumentBuilder, Error, Service, UpdateBuilder,
    VerificationMethod, Witness, WitnessWeight, core::{Kind, OneMany}, resolve_log,
};

fn time(s: &str) -> DateTime<Utc> {
    s.parse().expect("should parse time")
}

async fn create(signer: &Keyring) -> CreateResult {
    let update_multi = signer.multibase();
    CreateBuilder::new("https://example.com")
        .document(DocumentBuilder::new().verification_method(VerificationMethod::new(
            update_multi.clone(),
        )))
        .update_keys(vec![update_multi])
        .version_time(time("2024-01-01T08:32:55Z"))
        .signer(signer)
        .build(&Ed25519Verifier)
        .await
        .expect("should create")
}

// Replace the document: add a service and a second verification method.
#[tokio::test]
async fn update_document() {
    let signer = Keyring::new();
    let created = create(&signer).await;

    let second = Keyring::new();
    let service = Service {
        id: format!("{}#linked-domain", created.did),
        type_: "LinkedDomains".to_string(),
        service_endpoint: OneMany::One(Kind::String("https://example.com".to_string())),
    };
    let document = DocumentBuilder::from(&created.log[0].state)
        .verification_method(VerificationMethod::new(second.multibase()))
        .service(service)
        .build(&created.did)
        .expect("should build document");

    let result = UpdateBuilder::from(&created.log)
        .expect("should load log")
        .document(document)
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect("should update");

    assert_eq!(result.log.len(), 2);
    assert!(result.metadata.version_id.starts_with("2-"));

    let resolved =
        resolve_log(&result.log, None, None, &Ed25519Verifier).await.expect("should resolve");
    let methods = resolved.document.verification_method.expect("should have methods");
    assert_eq!(methods.len(), 2);
    let services = resolved.document.service.expect("should have services");
    assert!(services.iter().any(|s| s.type_ == "LinkedDomains"));
    assert_eq!(
        resolved.metadata.previous_log_entry_hash,
        created.log[0].version_id.split('-').nth(1).map(ToString::to_string)
    );
}

// Witness and watcher parameters can be set and cleared.
#[tokio::test]
async fn witness_and_watchers_transitions() {
    let signer = Keyring::new();
    let created = create(&signer).await;

    let witness_key = Keyring::new();
    let declaration = Witness {
        threshold: 1,
        witnesses: vec![WitnessWeight {
            id: format!("did:key:{}", witness_key.multibase()),
            weight: None,
        }],
    };

    let result = UpdateBuilder::from(&created.log)
        .expect("should load log")
        .witness(&declaration)
        .watchers(vec!["https://watcher.example/log".to_string()])
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect("should update");

    assert_eq!(result.metadata.witness, Some(declaration));
    assert_eq!(
        result.metadata.watchers,
        Some(vec!["https://watcher.example/log".to_string()])
    );

    // an explicit null clears both
    let result = UpdateBuilder::from(&result.log)
        .expect("should load log")
        .remove_witness()
        .remove_watchers()
        .version_time(time("2024-03-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect("should update");

    assert_eq!(result.metadata.witness, None);
    assert_eq!(result.metadata.watchers, None);

    // absent parameters carry values forward unchanged
    let final_entry = result.log.last().expect("should have entries");
    assert!(final_entry.parameters.update_keys.is_none());
}

// A signing key round-trips through its secret Multikey form and the
// restored keyring still signs valid updates.
#[tokio::test]
async fn restored_keyring_can_sign_updates() {
    let signer = Keyring::new();
    let created = create(&signer).await;

    let restored = Keyring::from_secret_multibase(&signer.secret_multibase())
        .expect("should restore keyring");
    assert_eq!(restored.multibase(), signer.multibase());

    UpdateBuilder::from(&created.log)
        .expect("should load log")
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&restored)
        .build(&Ed25519Verifier)
        .await
        .expect("should update with the restored key");
}

// While pre-rotation is active every update must rotate keys.
#[tokio::test]
async fn prerotation_requires_rotation() {
    let signer = Keyring::new();
    let update_multi = signer.multibase();

    let created = CreateBuilder::new("https://example.com")
        .document(DocumentBuilder::new().verification_method(VerificationMethod::new(
            update_multi.clone(),
        )))
        .update_keys(vec![update_multi])
        .next_key(signer.next_multibase())
        .version_time(time("2024-01-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect("should create");

    let err = UpdateBuilder::from(&created.log)
        .expect("should load log")
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect_err("should fail");
    let Error::Policy(msg) = err else { panic!("expected policy error") };
    assert!(msg.contains("rotated"), "got {msg}");

    // rotating to a key outside the commitments also fails
    let intruder = Keyring::new();
    let err = UpdateBuilder::from(&created.log)
        .expect("should load log")
        .rotate_keys(&[&intruder.multibase()], &[])
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect_err("should fail");
    let Error::Policy(msg) = err else { panic!("expected policy error") };
    assert!(msg.contains("commitment"), "got {msg}");
}

// Clearing the next key hashes ends pre-rotation.
#[tokio::test]
async fn rotation_can_end_prerotation() {
    let signer = Keyring::new();
    let update_multi = signer.multibase();
    let next_multi = signer.next_multibase();

    let created = CreateBuilder::new("https://example.com")
        .document(DocumentBuilder::new().verification_method(VerificationMethod::new(
            update_multi.clone(),
        )))
        .update_keys(vec![update_multi])
        .next_key(next_multi.clone())
        .version_time(time("2024-01-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect("should create");

    let rotated = signer.rotate();
    let result = UpdateBuilder::from(&created.log)
        .expect("should load log")
        .rotate_keys(&[&next_multi], &[])
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&rotated)
        .build(&Ed25519Verifier)
        .await
        .expect("should update");

    assert!(!result.metadata.prerotation);
    assert!(result.metadata.next_key_hashes.is_empty());

    // the next update no longer needs a rotation
    UpdateBuilder::from(&result.log)
        .expect("should load log")
        .version_time(time("2024-03-01T08:32:55Z"))
        .signer(&rotated)
        .build(&Ed25519Verifier)
        .await
        .expect("should update without rotation");
}

// Changing a non-trailing path segment is not a move: the trailing colon
// segment is what the engine compares.
#[tokio::test]
async fn update_accepts_path_change_with_same_trailing_segment() {
    let signer = Keyring::new();
    let update_multi = signer.multibase();
    let created = CreateBuilder::new("https://example.com/dids/alice")
        .document(DocumentBuilder::new().verification_method(VerificationMethod::new(
            update_multi.clone(),
        )))
        .update_keys(vec![update_multi])
        .version_time(time("2024-01-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect("should create");
    assert!(created.did.contains(":dids:alice"));

    let mut moved = created.log[0].state.clone();
    moved.id = moved.id.replace(":dids:", ":users:");

    let result = UpdateBuilder::from(&created.log)
        .expect("should load log")
        .document(moved)
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect("should update");

    assert!(result.did.contains(":users:alice"));
    let resolved =
        resolve_log(&result.log, None, None, &Ed25519Verifier).await.expect("should resolve");
    assert_eq!(resolved.did, result.did);
}

// A non-portable DID cannot be moved by an update.
#[tokio::test]
async fn update_rejects_moved_document() {
    let signer = Keyring::new();
    let created = create(&signer).await;

    let mut moved = created.log[0].state.clone();
    moved.id = moved.id.replace("example.com", "newdomain.com");

    let err = UpdateBuilder::from(&created.log)
        .expect("should load log")
        .document(moved)
        .version_time(time("2024-02-01T08:32:55Z"))
        .signer(&signer)
        .build(&Ed25519Verifier)
        .await
        .expect_err("should fail");
    assert!(matches!(err, Error::Policy(_)));
}
