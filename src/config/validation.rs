//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse: the raw TOML is first walked as a `toml::Value` tree and
//! every dotted key is compared against the known field names, producing
//! "did you mean?" warnings. Typed deserialization happens afterwards.
//! Unknown keys never fail a config.

use super::RunConfig;
use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of [`RunConfig`].
///
/// Kept by hand in step with run_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [run]
        "run",
        "run.unit_list",
        "run.abspath",
        "run.start",
        "run.end",
        "run.skip",
        "run.workers",
        "run.done_list",
        "run.error_list",
        // [input]
        "input",
        "input.cuts_dir",
        "input.cuts_key",
        "input.compressed",
        // [geometry]
        "geometry",
        "geometry.pixel_map",
        // [cleaning]
        "cleaning",
        "cleaning.trim_edges",
        "cleaning.edge_threshold",
        "cleaning.remove_dir",
        "cleaning.remove_buffer",
        // [coincidence]
        "coincidence",
        "coincidence.strict",
        "coincidence.polarized",
        "coincidence.save",
        "coincidence.output_dir",
        // [events]
        "events",
        "events.trailing_peak",
        "events.filters",
        "events.filters.min_pixels",
        "events.filters.max_pixels",
        "events.filters.min_duration",
        "events.filters.max_duration",
        "events.filters.max_events",
        // [output]
        "output",
        "output.dir",
        "output.compress",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Collect the dotted path of every key in a TOML tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest known key within edit distance 3. Ties go to the
/// lexicographically smallest key.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|&(dist, _)| dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

/// Warnings for every unknown key in a raw TOML string.
///
/// Unparseable TOML yields no warnings; the typed parse reports it.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Returns (errors, warnings). Errors make the config unusable.
pub fn validate_ranges(config: &RunConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let run = &config.run;
    if run.workers == 0 {
        errors.push("run.workers = 0 must be >= 1".to_string());
    }
    if let Some(end) = run.end {
        if run.start > end {
            errors.push(format!("run.start ({}) must be <= run.end ({end})", run.start));
        }
        if let Some(&beyond) = run.skip.iter().find(|&&i| i >= end || i < run.start) {
            warnings.push(ValidationWarning {
                field: "run.skip".to_string(),
                message: format!("run.skip contains {beyond}, outside [{}, {end})", run.start),
                suggestion: None,
            });
        }
    }
    if run.done_list.is_some() != run.error_list.is_some() {
        warnings.push(ValidationWarning {
            field: "run.done_list".to_string(),
            message: "run.done_list and run.error_list must both be set; outcome lists disabled"
                .to_string(),
            suggestion: None,
        });
    }
    if let Ok(cpus) = std::thread::available_parallelism() {
        if run.workers > cpus.get() {
            warnings.push(ValidationWarning {
                field: "run.workers".to_string(),
                message: format!(
                    "run.workers = {} exceeds available parallelism ({cpus})",
                    run.workers
                ),
                suggestion: None,
            });
        }
    }

    let f = &config.events.filters;
    check_bounds("events.filters.min_pixels", f.min_pixels, f.max_pixels, &mut errors);
    check_bounds("events.filters.min_duration", f.min_duration, f.max_duration, &mut errors);

    if config.input.cuts_key.trim().is_empty() {
        errors.push("input.cuts_key must not be empty".to_string());
    }
    if config.coincidence.save && config.coincidence.output_dir == config.output.dir {
        warnings.push(ValidationWarning {
            field: "coincidence.output_dir".to_string(),
            message: "coincidence.output_dir equals output.dir; coincidence artifacts will be overwritten by events"
                .to_string(),
            suggestion: None,
        });
    }

    (errors, warnings)
}

fn check_bounds(name: &str, min: usize, max: usize, errors: &mut Vec<String>) {
    if min >= max {
        errors.push(format!("{name}: min ({min}) must be < max ({max})"));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("workers", "workers"), 0);
        assert_eq!(levenshtein("wokers", "workers"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [events]
            [events.filters]
            max_pixels = 10
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert_eq!(keys, vec!["events", "events.filters", "events.filters.max_pixels"]);
    }

    #[test]
    fn test_unknown_key_with_suggestion() {
        let warnings = validate_unknown_keys("[run]\nwokers = 2\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "run.wokers");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("run.workers"));
    }

    #[test]
    fn test_unknown_section_without_suggestion() {
        let warnings = validate_unknown_keys("[dashboard]\nport = 8080\n");
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.suggestion.is_none()));
    }

    #[test]
    fn test_known_keys_produce_no_warnings() {
        let raw = RunConfig::default().to_toml().unwrap();
        assert!(validate_unknown_keys(&raw).is_empty());
    }

    #[test]
    fn test_range_errors() {
        let mut config = RunConfig::default();
        config.run.workers = 0;
        config.run.start = 10;
        config.run.end = Some(5);
        config.events.filters.min_pixels = 50;
        config.events.filters.max_pixels = 50;

        let (errors, _) = validate_ranges(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("run.workers")));
        assert!(errors.iter().any(|e| e.contains("run.start")));
        assert!(errors.iter().any(|e| e.contains("min_pixels")));
    }

    #[test]
    fn test_default_config_is_valid() {
        let (errors, _) = validate_ranges(&RunConfig::default());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_skip_outside_range_warns() {
        let mut config = RunConfig::default();
        config.run.end = Some(10);
        config.run.skip = vec![2, 12];
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.field == "run.skip"));
    }
}
