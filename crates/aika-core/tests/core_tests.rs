//! Tests for aika-core: identifiers, phases, ranges, config, errors

use aika_core::*;
use std::io::Write;

// ===========================================================================
// Identifiers
// ===========================================================================

#[test]
fn ids_display_with_prefix() {
    assert_eq!(format!("{}", NeuronId(3)), "n3");
    assert_eq!(format!("{}", SynapseId(7)), "s7");
    assert_eq!(format!("{}", ActivationId(0)), "a0");
    assert_eq!(format!("{}", DocumentId(12)), "doc-12");
}

#[test]
fn activation_id_is_arena_index() {
    assert_eq!(ActivationId(5).index(), 5);
}

// ===========================================================================
// Phase ordering
// ===========================================================================

#[test]
fn phases_order_by_declaration() {
    assert!(Phase::Linking < Phase::Propagate);
    assert!(Phase::Propagate < Phase::Inference);
    assert!(Phase::Inference < Phase::Training);
    assert!(Phase::Training < Phase::PostProcessing);
}

// ===========================================================================
// TextRange
// ===========================================================================

#[test]
fn text_range_union_and_len() {
    let a = TextRange::new(0, 2);
    let b = TextRange::new(3, 5);
    let u = a.union(&b);
    assert_eq!(u, TextRange::new(0, 5));
    assert_eq!(u.len(), 5);
    assert!(TextRange::new(4, 4).is_empty());
    assert_eq!(format!("{}", a), "[0..2]");
}

// ===========================================================================
// Config
// ===========================================================================

#[test]
fn config_defaults() {
    let config = Config::default();
    assert!((config.learn_rate - 0.01).abs() < f64::EPSILON);
    assert!(config.alpha.is_none());
    assert!(!config.training_enabled);
    assert!((config.tolerance - 1e-6).abs() < f64::EPSILON);
    assert_eq!(config.max_search_steps, 10_000);
    assert_eq!(config.max_rounds, 20);
    assert!(config.validate().is_ok());
}

#[test]
fn config_from_toml_partial_keeps_defaults() {
    let config = Config::from_toml_str("learn_rate = 0.5\ntraining_enabled = true\n").unwrap();
    assert!((config.learn_rate - 0.5).abs() < f64::EPSILON);
    assert!(config.training_enabled);
    assert_eq!(config.max_search_steps, 10_000);
}

#[test]
fn config_rejects_invalid_values() {
    assert!(matches!(
        Config::from_toml_str("tolerance = 0.0"),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        Config::from_toml_str("alpha = 1.5"),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        Config::from_toml_str("learn_rate = 2.0"),
        Err(Error::Config(_))
    ));
}

#[test]
fn config_rejects_malformed_toml() {
    assert!(matches!(Config::from_toml_str("learn_rate = ["), Err(Error::Toml(_))));
}

#[test]
fn config_load_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("missing.toml"));
    assert_eq!(config.max_rounds, 20);
}

#[test]
fn config_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aika.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "max_search_steps = 42\nalpha = 0.1").unwrap();
    let config = Config::load(&path);
    assert_eq!(config.max_search_steps, 42);
    assert_eq!(config.alpha, Some(0.1));
}

#[test]
fn config_load_broken_file_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aika.toml");
    std::fs::write(&path, "max_search_steps = \"many\"").unwrap();
    let config = Config::load(&path);
    assert_eq!(config.max_search_steps, 10_000);
}

#[test]
fn config_toml_roundtrip() {
    let config = Config::default().with_training(true);
    let text = config.to_toml();
    let back = Config::from_toml_str(&text).unwrap();
    assert!(back.training_enabled);
    assert_eq!(back.max_rid, config.max_rid);
}

#[test]
fn config_default_label() {
    let config = Config::default();
    let ctx = LabelContext {
        neuron_label: "ab",
        range: Some(TextRange::new(0, 3)),
        text: Some("a b"),
    };
    assert_eq!(config.label(&ctx), "ab[0..3]");
}

#[test]
fn config_custom_label_fn() {
    let config = Config::default()
        .with_label_fn(|ctx| format!("{}:{}", ctx.neuron_label, ctx.text.unwrap_or("?")));
    let ctx = LabelContext {
        neuron_label: "ab",
        range: None,
        text: Some("a b"),
    };
    assert_eq!(config.label(&ctx), "ab:a b");
    assert!(format!("{:?}", config).contains("<fn>"));
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn error_display_messages() {
    assert_eq!(
        Error::uninitialized("net").to_string(),
        "field not initialized: net"
    );
    assert_eq!(
        Error::invalid_argument("mul", 2).to_string(),
        "invalid argument 2 for field mul"
    );
    assert_eq!(
        Error::RidOutOfRange { rid: 30, max: 20 }.to_string(),
        "relative position 30 exceeds maximum 20"
    );
}

#[test]
fn only_rid_out_of_range_is_recoverable() {
    assert!(Error::RidOutOfRange { rid: 1, max: 0 }.is_recoverable());
    assert!(!Error::uninitialized("x").is_recoverable());
    assert!(!Error::DocumentDisconnected.is_recoverable());
}
