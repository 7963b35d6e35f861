//! Config hash stability.
//!
//! - Same input, same hash.
//! - Key order inside YAML does not affect the hash.
//! - Overlays change the hash; a changed value changes the hash.

use w3b_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
chain:
  rpc_url: "https://rpc.example.invalid"
  relay_url: "https://relay.example.invalid"
  state_address: "11111111111111111111111111111111"
reserve:
  auto_mint: true
  debounce_ms: 2000
price:
  drift_threshold_bps: 100
"#;

const BASE_YAML_REORDERED: &str = r#"
price:
  drift_threshold_bps: 100
reserve:
  debounce_ms: 2000
  auto_mint: true
chain:
  state_address: "11111111111111111111111111111111"
  relay_url: "https://relay.example.invalid"
  rpc_url: "https://rpc.example.invalid"
"#;

const OVERLAY_YAML: &str = r#"
reserve:
  auto_mint: false
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        a.config_hash, b.config_hash,
        "reordering keys in YAML must not change the hash"
    );
}

#[test]
fn overlay_changes_hash_and_value() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();

    assert_ne!(base.config_hash, layered.config_hash);
    assert_eq!(layered.config_json["reserve"]["auto_mint"], false);
    // Sibling keys from the base layer survive the overlay.
    assert_eq!(layered.config_json["reserve"]["debounce_ms"], 2000);
}

#[test]
fn empty_overlay_is_a_no_op() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let with_empty = load_layered_yaml_from_strings(&[BASE_YAML, ""]).unwrap();
    assert_eq!(base.config_hash, with_empty.config_hash);
}
