//! Config Validation Tests
//!
//! Typo detection for unknown keys and range validation of `todloop.toml`,
//! exercised through the public config API.

use todloop::config::validation::{
    known_config_keys, suggest_correction, validate_ranges, validate_unknown_keys,
};
use todloop::config::{ConfigError, RunConfig};
use todloop::events::TrailingPeak;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_filter_key_warns_with_suggestion() {
    let toml_str = r#"
[events.filters]
max_pixles = 40
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("max_pixles"));
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("events.filters.max_pixels")
    );
}

#[test]
fn typo_in_run_section_warns() {
    let toml_str = r#"
[run]
wrokers = 4
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].suggestion.as_deref(), Some("run.workers"));
}

#[test]
fn full_config_produces_zero_warnings() {
    let toml_str = r#"
[run]
unit_list = "units.txt"
abspath = false
start = 0
end = 100
skip = [3, 17]
workers = 2
done_list = "done.txt"
error_list = "errors.txt"

[input]
cuts_dir = "outputs/cuts"
cuts_key = "cuts"
compressed = true

[geometry]
pixel_map = "pixels.toml"

[cleaning]
trim_edges = true
edge_threshold = 100
remove_dir = "outputs/glitches"
remove_buffer = 5

[coincidence]
strict = true
polarized = false
save = true
output_dir = "outputs/cosigs"

[events]
trailing_peak = "drop"

[events.filters]
min_pixels = 2
max_pixels = 50
min_duration = 1
max_duration = 80
max_events = 25

[output]
dir = "outputs/events"
compress = false
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.is_empty(), "Unexpected warnings: {warnings:?}");

    let config = RunConfig::from_toml_str(toml_str, "inline.toml".as_ref()).unwrap();
    assert_eq!(config.run.skip, vec![3, 17]);
    assert!(config.input.compressed);
    assert_eq!(config.events.trailing_peak, TrailingPeak::Drop);
    assert_eq!(config.events.filters.max_events, 25);
    assert!(config.outcome_lists().is_some());
}

#[test]
fn unknown_section_warns_without_suggestion() {
    let toml_str = r#"
[dashboard]
port = 8080
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.iter().any(|w| w.field == "dashboard"));
    assert!(warnings.iter().all(|w| w.suggestion.is_none()));
}

#[test]
fn multiple_typos_all_warned() {
    let toml_str = r#"
[coincidence]
strickt = true
polarised = true
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 2);
    let suggestions: Vec<_> = warnings.iter().filter_map(|w| w.suggestion.as_deref()).collect();
    assert!(suggestions.contains(&"coincidence.strict"));
    assert!(suggestions.contains(&"coincidence.polarized"));
}

#[test]
fn empty_toml_produces_zero_warnings_and_defaults() {
    assert!(validate_unknown_keys("").is_empty());
    let config = RunConfig::from_toml_str("", "empty.toml".as_ref()).unwrap();
    assert_eq!(config, RunConfig::default());
    assert_eq!(config.events.filters.min_pixels, 0);
    assert_eq!(config.events.filters.max_pixels, 100);
    assert_eq!(config.events.filters.min_duration, 1);
    assert_eq!(config.events.filters.max_duration, 100);
    assert_eq!(config.events.trailing_peak, TrailingPeak::Close);
}

#[test]
fn suggestion_needs_close_match() {
    let known = known_config_keys();
    assert_eq!(suggest_correction("run.start", &known), Some("run.start".to_string()));
    assert_eq!(suggest_correction("completely.unrelated.key", &known), None);
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn inverted_duration_bounds_rejected() {
    let toml_str = r#"
[events.filters]
min_duration = 50
max_duration = 10
"#;
    let err = RunConfig::from_toml_str(toml_str, "bad.toml".as_ref()).unwrap_err();
    match err {
        ConfigError::Validation(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(errors[0].contains("min_duration"));
        }
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn zero_workers_rejected() {
    let err = RunConfig::from_toml_str("[run]\nworkers = 0\n", "bad.toml".as_ref()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn wrong_type_is_a_parse_error() {
    let err = RunConfig::from_toml_str("[run]\nworkers = \"four\"\n", "bad.toml".as_ref())
        .unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

#[test]
fn half_configured_outcome_lists_warn() {
    let mut config = RunConfig::default();
    config.run.done_list = Some("done.txt".into());

    let (errors, warnings) = validate_ranges(&config);
    assert!(errors.is_empty());
    assert!(warnings.iter().any(|w| w.field == "run.done_list"));
    assert!(config.outcome_lists().is_none());
}

#[test]
fn config_round_trips_through_toml() {
    let mut config = RunConfig::default();
    config.run.unit_list = Some("units.txt".into());
    config.coincidence.polarized = true;
    config.events.trailing_peak = TrailingPeak::Drop;

    let text = config.to_toml().unwrap();
    assert!(validate_unknown_keys(&text).is_empty());
    let back = RunConfig::from_toml_str(&text, "round.toml".as_ref()).unwrap();
    assert_eq!(back, config);
}

#[test]
fn missing_explicit_config_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let err = RunConfig::load(Some(&tmp.path().join("nope.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}
