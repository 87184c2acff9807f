//! Artifact files across the offline boundary
//!
//! Exercises only the public API: draft offline, persist unsigned, sign
//! from the file, read the signed artifact back.

use offline_signer::artifact::{self, ArtifactError};
use offline_signer::offline_signer::{CancellationSignal, OfflineSigner, SigningDelay};
use offline_signer::tx_builder::{durable_accounts_of, TxBuilder, ValidityReference};
use offline_signer::RunMode;
use proptest::prelude::*;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use tempfile::tempdir;

fn blockhash_draft(sender: &Pubkey, lamports: u64) -> Transaction {
    let validity = ValidityReference::BlockhashReferenced {
        blockhash: Hash::new_unique(),
        last_valid_block_height: 1_000,
    };
    TxBuilder::assemble(&validity, sender, &Pubkey::new_unique(), lamports).unwrap()
}

#[test]
fn test_unsigned_file_format() {
    let sender = Keypair::new();
    let tx = blockhash_draft(&sender.pubkey(), 10_000_000);
    let dir = tempdir().unwrap();
    let path = dir.path().join("unsigned.txt");

    let encoded = artifact::write(&tx, &path, false).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, format!("{}\n", encoded));
    assert_eq!(text.lines().count(), 1);
    assert!(bs58::decode(encoded.as_str()).into_vec().is_ok());

    let back = artifact::read(&path).unwrap();
    assert_eq!(back, tx);
    assert!(back.signatures.iter().all(|s| *s == Signature::default()));
    assert_eq!(artifact::missing_signers(&back), vec![sender.pubkey()]);
}

#[tokio::test]
async fn test_nonce_artifact_signed_from_file() {
    let sender = Keypair::new();
    let authority = Keypair::new();
    let nonce_account = Pubkey::new_unique();
    let validity = ValidityReference::NonceReferenced {
        nonce_account,
        nonce_authority: authority.pubkey(),
        nonce_value: Hash::new_unique(),
    };
    let tx =
        TxBuilder::assemble(&validity, &sender.pubkey(), &Pubkey::new_unique(), 5_000).unwrap();

    let dir = tempdir().unwrap();
    let unsigned = dir.path().join("unsigned.txt");
    let signed = dir.path().join("signed.txt");
    artifact::write(&tx, &unsigned, false).unwrap();

    let result = OfflineSigner::new(CancellationSignal::new())
        .sign(
            RunMode::Nonce,
            &unsigned,
            &signed,
            &[&authority, &sender],
            SigningDelay::from_millis(0),
        )
        .await
        .unwrap();

    let back = artifact::read(&signed).unwrap();
    assert_eq!(back, result.tx);
    assert_eq!(back.message, tx.message);
    assert_eq!(durable_accounts_of(&back), Some((nonce_account, authority.pubkey())));
    assert!(artifact::ensure_fully_signed(&back).is_ok());
    assert!(artifact::to_wire_bytes(&back).unwrap().len() <= artifact::PACKET_DATA_SIZE);

    // The unsigned artifact is left as drafted
    assert_eq!(artifact::read(&unsigned).unwrap(), tx);
}

#[test]
fn test_partially_signed_write_refused() {
    let sender = Keypair::new();
    let authority = Keypair::new();
    let validity = ValidityReference::NonceReferenced {
        nonce_account: Pubkey::new_unique(),
        nonce_authority: authority.pubkey(),
        nonce_value: Hash::new_unique(),
    };
    let mut tx =
        TxBuilder::assemble(&validity, &sender.pubkey(), &Pubkey::new_unique(), 1).unwrap();
    let recent = tx.message.recent_blockhash;
    tx.partial_sign(&[&sender], recent);

    let dir = tempdir().unwrap();
    let path = dir.path().join("signed.txt");
    match artifact::write(&tx, &path, true) {
        Err(ArtifactError::MissingSignatures { missing }) => {
            assert_eq!(missing, vec![authority.pubkey()])
        }
        other => panic!("Expected MissingSignatures, got {:?}", other),
    }
    assert!(!path.exists());
}

#[test]
fn test_tampered_signature_refused() {
    let sender = Keypair::new();
    let mut tx = blockhash_draft(&sender.pubkey(), 1);
    let recent = tx.message.recent_blockhash;
    tx.sign(&[&sender], recent);
    tx.signatures[0] = Keypair::new().sign_message(b"not this message");

    let dir = tempdir().unwrap();
    let path = dir.path().join("signed.txt");
    let err = artifact::write(&tx, &path, true).unwrap_err();
    assert!(matches!(err, ArtifactError::InvalidSignature { .. }));
    assert!(!path.exists());
}

#[test]
fn test_corrupt_artifacts_rejected() {
    assert_eq!(artifact::decode("").unwrap_err().category(), "decoding");
    assert_eq!(artifact::decode("  \n").unwrap_err().category(), "decoding");
    // '0' and 'l' are outside the base58 alphabet
    assert_eq!(artifact::decode("0l0l").unwrap_err().category(), "decoding");
    assert_eq!(
        artifact::decode(&bs58::encode([1u8, 2, 3]).into_string())
            .unwrap_err()
            .category(),
        "decoding"
    );

    let dir = tempdir().unwrap();
    let err = artifact::read(dir.path().join("absent.txt")).unwrap_err();
    assert_eq!(err.category(), "io");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_text_framing_is_tolerated(
        lamports in 1u64..=u64::MAX,
        leading in "[ \t\r\n]{0,4}",
        trailing in "[ \t\r\n]{0,4}",
    ) {
        let sender = Keypair::new();
        let tx = blockhash_draft(&sender.pubkey(), lamports);
        let encoded = artifact::encode(&tx).unwrap();

        let framed = format!("{}{}{}", leading, encoded, trailing);
        prop_assert_eq!(artifact::decode(&framed).unwrap(), tx);
    }
}
