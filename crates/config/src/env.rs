//! Environment variable overrides
//!
//! Deployments configure autom4b through plain environment variables
//! (`INBOX_FOLDER`, `SLEEP_TIME`, ...), optionally seeded from a `.env`
//! file. Overrides are applied on top of the TOML file and below CLI flags.
//!
//! Lookups go through a caller-supplied function so the mapping can be
//! exercised without touching the process environment.

use crate::{Config, ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Every variable consulted by [`apply_env_overrides`]
pub const ENV_VARS: &[&str] = &[
    "INBOX_FOLDER",
    "CONVERTED_FOLDER",
    "ARCHIVE_FOLDER",
    "BACKUP_FOLDER",
    "WORKING_FOLDER",
    "SLEEP_TIME",
    "WAIT_TIME",
    "AUDIO_EXTS",
    "FLATTEN_MULTI_DISC_BOOKS",
    "CONVERT_SERIES",
    "MATCH_FILTER",
    "OVERWRITE_MODE",
    "ON_COMPLETE",
    "MAKE_BACKUP",
    "CPU_CORES",
    "MAX_CHAPTER_LENGTH",
    "USE_FILENAMES_AS_CHAPTERS",
    "M4B_TOOL",
    "DEBUG",
    "TEST",
    "MAX_LOOPS",
];

/// Parses the yes/no spellings used in env files
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "y" | "yes" | "true" | "1" | "on" => Some(true),
        "n" | "no" | "false" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Loads a `.env` file into the process environment
///
/// Variables already set in the environment win over the file.
pub fn load_env_file(path: &Path) -> ConfigResult<()> {
    dotenvy::from_path(path).map_err(|e| ConfigError::EnvFileError {
        path: path.to_path_buf(),
        source: e,
    })?;
    log::debug!("Loaded environment from {}", path.display());
    Ok(())
}

/// Applies environment overrides to `config`
///
/// Returns the names of the variables that were applied. Empty values are
/// treated as unset. A value that cannot be parsed is an error rather than
/// being silently ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> ConfigResult<Vec<&'static str>>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
    let mut applied = Vec::new();

    let paths = [
        ("INBOX_FOLDER", &mut config.paths.inbox_dir),
        ("CONVERTED_FOLDER", &mut config.paths.converted_dir),
        ("ARCHIVE_FOLDER", &mut config.paths.archive_dir),
        ("BACKUP_FOLDER", &mut config.paths.backup_dir),
        ("WORKING_FOLDER", &mut config.paths.working_dir),
    ];
    for (var, slot) in paths {
        if let Some(value) = get(var) {
            *slot = PathBuf::from(value.trim());
            applied.push(var);
        }
    }

    if let Some(value) = get("SLEEP_TIME") {
        config.app.sleep_time_secs = parse_seconds("SLEEP_TIME", &value)?;
        applied.push("SLEEP_TIME");
    }
    if let Some(value) = get("WAIT_TIME") {
        config.app.wait_time_secs = parse_seconds("WAIT_TIME", &value)?;
        applied.push("WAIT_TIME");
    }
    if let Some(value) = get("MAX_LOOPS") {
        // -1 is the conventional "forever"
        let loops: i64 = parse_value("MAX_LOOPS", &value)?;
        config.app.max_loops = if loops < 0 {
            None
        } else {
            Some(u32::try_from(loops).map_err(|_| {
                ConfigError::invalid_env("MAX_LOOPS", &value, "too large")
            })?)
        };
        applied.push("MAX_LOOPS");
    }

    let flags = [
        ("DEBUG", &mut config.app.debug),
        ("TEST", &mut config.app.test),
        (
            "FLATTEN_MULTI_DISC_BOOKS",
            &mut config.conversion.flatten_multi_disc_books,
        ),
        ("CONVERT_SERIES", &mut config.conversion.convert_series),
        ("MAKE_BACKUP", &mut config.conversion.backup),
        (
            "USE_FILENAMES_AS_CHAPTERS",
            &mut config.conversion.use_filenames_as_chapters,
        ),
    ];
    for (var, slot) in flags {
        if let Some(value) = get(var) {
            *slot = parse_bool(&value)
                .ok_or_else(|| ConfigError::invalid_env(var, &value, "expected Y or N"))?;
            applied.push(var);
        }
    }

    if let Some(value) = get("AUDIO_EXTS") {
        config.conversion.audio_extensions = value
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        applied.push("AUDIO_EXTS");
    }
    if let Some(value) = get("MATCH_FILTER") {
        config.conversion.match_filter = Some(value.trim().to_string());
        applied.push("MATCH_FILTER");
    }
    if let Some(value) = get("OVERWRITE_MODE") {
        config.conversion.overwrite_mode = parse_value("OVERWRITE_MODE", &value)?;
        applied.push("OVERWRITE_MODE");
    }
    if let Some(value) = get("ON_COMPLETE") {
        config.conversion.on_complete = parse_value("ON_COMPLETE", &value)?;
        applied.push("ON_COMPLETE");
    }
    if let Some(value) = get("CPU_CORES") {
        config.conversion.cpu_cores = parse_value("CPU_CORES", &value)?;
        applied.push("CPU_CORES");
    }
    if let Some(value) = get("MAX_CHAPTER_LENGTH") {
        config.conversion.max_chapter_length = value.trim().to_string();
        applied.push("MAX_CHAPTER_LENGTH");
    }
    if let Some(value) = get("M4B_TOOL") {
        config.conversion.m4b_tool = value.trim().to_string();
        applied.push("M4B_TOOL");
    }

    if !applied.is_empty() {
        log::debug!("Applied environment overrides: {}", applied.join(", "));
    }
    Ok(applied)
}

fn parse_value<T>(var: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid_env(var, value, e.to_string()))
}

/// Accepts plain seconds or a trailing `s`/`m` unit
fn parse_seconds(var: &str, value: &str) -> ConfigResult<u64> {
    let trimmed = value.trim().to_lowercase();
    if let Some(minutes) = trimmed.strip_suffix('m') {
        return parse_value::<u64>(var, minutes).map(|m| m * 60);
    }
    parse_value(var, trimmed.strip_suffix('s').unwrap_or(&trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OnComplete, OverwriteMode};
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Y"), Some(true));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("N"), Some(false));
        assert_eq!(parse_bool(" false "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_no_overrides_leaves_config_untouched() {
        let mut config = Config::default();
        let applied = apply_env_overrides(&mut config, |_| None).unwrap();
        assert!(applied.is_empty());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_folder_overrides() {
        let mut config = Config::default();
        let lookup = lookup_from(&[
            ("INBOX_FOLDER", "/media/inbox"),
            ("CONVERTED_FOLDER", "/media/converted"),
        ]);
        let applied = apply_env_overrides(&mut config, lookup).unwrap();

        assert_eq!(config.paths.inbox_dir, PathBuf::from("/media/inbox"));
        assert_eq!(config.paths.converted_dir, PathBuf::from("/media/converted"));
        assert_eq!(applied, vec!["INBOX_FOLDER", "CONVERTED_FOLDER"]);
    }

    #[test]
    fn test_policy_overrides() {
        let mut config = Config::default();
        let lookup = lookup_from(&[
            ("FLATTEN_MULTI_DISC_BOOKS", "Y"),
            ("CONVERT_SERIES", "n"),
            ("MATCH_FILTER", "Tolkien"),
            ("OVERWRITE_MODE", "overwrite-silent"),
            ("ON_COMPLETE", "test-do-nothing"),
            ("AUDIO_EXTS", ".mp3, .M4A"),
            ("CPU_CORES", "8"),
        ]);
        apply_env_overrides(&mut config, lookup).unwrap();

        assert!(config.conversion.flatten_multi_disc_books);
        assert!(!config.conversion.convert_series);
        assert_eq!(config.conversion.match_filter.as_deref(), Some("Tolkien"));
        assert_eq!(
            config.conversion.overwrite_mode,
            OverwriteMode::OverwriteSilent
        );
        assert_eq!(config.conversion.on_complete, OnComplete::TestDoNothing);
        assert_eq!(config.conversion.audio_extensions, vec!["mp3", "m4a"]);
        assert_eq!(config.conversion.cpu_cores, 8);
    }

    #[test]
    fn test_timing_overrides() {
        let mut config = Config::default();
        let lookup = lookup_from(&[("SLEEP_TIME", "2m"), ("WAIT_TIME", "3s"), ("MAX_LOOPS", "-1")]);
        apply_env_overrides(&mut config, lookup).unwrap();

        assert_eq!(config.app.sleep_time_secs, 120);
        assert_eq!(config.app.wait_time_secs, 3);
        assert_eq!(config.app.max_loops, None);
    }

    #[test]
    fn test_max_loops_override() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, lookup_from(&[("MAX_LOOPS", "3")])).unwrap();
        assert_eq!(config.app.max_loops, Some(3));
    }

    #[test]
    fn test_empty_value_is_unset() {
        let mut config = Config::default();
        let applied =
            apply_env_overrides(&mut config, lookup_from(&[("SLEEP_TIME", "  ")])).unwrap();
        assert!(applied.is_empty());
        assert_eq!(config.app.sleep_time_secs, 10);
    }

    #[test]
    fn test_unparseable_value_is_error() {
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config, lookup_from(&[("DEBUG", "perhaps")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvValue { ref var, .. } if var == "DEBUG"));

        let err = apply_env_overrides(&mut config, lookup_from(&[("CPU_CORES", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("CPU_CORES"));
    }

    #[test]
    fn test_load_env_file_missing() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let result = load_env_file(&temp_dir.path().join("missing.env"));
        assert!(matches!(result, Err(ConfigError::EnvFileError { .. })));
    }
}
