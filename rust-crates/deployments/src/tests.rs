#![allow(non_snake_case)]

use super::*;
use crate::wallets::{
    list_wallets,
    wallet_from_secret,
};
use ethers::signers::Signer;
use tempdir::TempDir;

fn record(contract: &str) -> DeploymentRecord {
    DeploymentRecord {
        deployed_at: "2024-01-01T00:00:00+00:00".into(),
        contract_address: contract.into(),
        dice_game_address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".into(),
        bytecode_hash: compute_bytecode_hash(b"bytecode"),
        network_url: "http://127.0.0.1:8545".into(),
        deployer: None,
        owner: Some("0xd00b9215e7f45c2198d4e1f9b1d1f45de6affd99".into()),
        deployment_block: Some(3),
        funding_wei: None,
        ownership_transferred: true,
        ownership_error: None,
    }
}

#[test]
fn load__fresh_store__is_empty() {
    let dir = TempDir::new("deployments").unwrap();
    let store = DeploymentStore::at(dir.path(), DeploymentEnv::Local).unwrap();
    assert!(store.load().unwrap().is_empty());
    assert_eq!(store.latest().unwrap(), None);
    assert!(store.path().ends_with("local/deployments.json"));
}

#[test]
fn append__two_records__latest_is_second() {
    // given
    let dir = TempDir::new("deployments").unwrap();
    let store = DeploymentStore::at(dir.path(), DeploymentEnv::Sepolia).unwrap();

    // when
    store.append(record("0x01")).unwrap();
    store.append(record("0x02")).unwrap();

    // then
    let reopened = DeploymentStore::at(dir.path(), DeploymentEnv::Sepolia).unwrap();
    assert_eq!(reopened.load().unwrap().len(), 2);
    assert_eq!(reopened.latest().unwrap().unwrap().contract_address, "0x02");
}

#[test]
fn load__single_object_file__reads_one_record() {
    // given
    let dir = TempDir::new("deployments").unwrap();
    let store = DeploymentStore::at(dir.path(), DeploymentEnv::Local).unwrap();
    fs::write(store.path(), serde_json::to_vec(&record("0x09")).unwrap()).unwrap();

    // when
    let records = store.load().unwrap();

    // then
    assert_eq!(records, vec![record("0x09")]);
}

#[test]
fn load__record_without_optional_fields__uses_defaults() {
    let dir = TempDir::new("deployments").unwrap();
    let store = DeploymentStore::at(dir.path(), DeploymentEnv::Local).unwrap();
    fs::write(
        store.path(),
        r#"[{"deployed_at":"t","contract_address":"0x1","dice_game_address":"0x2",
            "bytecode_hash":"h","network_url":"u"}]"#,
    )
    .unwrap();

    let latest = store.latest().unwrap().unwrap();
    assert!(!latest.ownership_transferred);
    assert_eq!(latest.deployment_block, None);
}

#[test]
fn load__garbage__is_error() {
    let dir = TempDir::new("deployments").unwrap();
    let store = DeploymentStore::at(dir.path(), DeploymentEnv::Local).unwrap();
    fs::write(store.path(), "not json").unwrap();
    assert!(store.load().is_err());
}

#[test]
fn compute_bytecode_hash__is_stable_hex_sha256() {
    let hash = compute_bytecode_hash(b"");
    assert_eq!(
        hash,
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert!(record("0x1").is_compatible_with_hash(&compute_bytecode_hash(b"bytecode")));
}

#[test]
fn wallet_from_secret__raw_key__uses_it() {
    let key = [7u8; 32];
    let wallet = wallet_from_secret("raw", &key).unwrap();
    assert_eq!(wallet.signer().to_bytes().as_slice(), &key);
}

#[test]
fn wallet_from_secret__mnemonic__derives_first_account() {
    let mnemonic = b"test test test test test test test test test test test junk";
    let wallet = wallet_from_secret("dev", mnemonic).unwrap();
    assert_eq!(
        format!("{:?}", wallet.address()),
        "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
    );
}

#[test]
fn wallet_from_secret__short_garbage__is_rejected() {
    assert!(wallet_from_secret("bad", b"hello").is_err());
}

#[test]
fn list_wallets__skips_other_extensions_and_sorts() {
    // given
    let dir = TempDir::new("keystores").unwrap();
    fs::write(dir.path().join("zed"), "{}").unwrap();
    fs::write(dir.path().join("alice.json"), "{}").unwrap();
    fs::write(dir.path().join("notes.txt"), "").unwrap();

    // when
    let names: Vec<String> = list_wallets(dir.path())
        .unwrap()
        .into_iter()
        .map(|w| w.name)
        .collect();

    // then
    assert_eq!(names, ["alice", "zed"]);
}
