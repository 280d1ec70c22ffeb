//! The external merge tool
//!
//! Conversion is synchronous and opaque: the tool gets a working copy of a
//! book and writes one `.m4b`. Its exit status and output decide success.

use crate::error::{InboxError, Result};
use crate::metadata::BookMetadata;
use autom4b_core::BookKey;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

/// Everything the converter needs for one book
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub key: BookKey,
    /// Working copy of the book's audio
    pub source_dir: PathBuf,
    pub output_file: PathBuf,
    pub metadata: BookMetadata,
    pub cpu_cores: usize,
    pub max_chapter_length: String,
    pub use_filenames_as_chapters: bool,
}

/// Raw result of running the tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionOutput {
    /// `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ConversionOutput {
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            ..Default::default()
        }
    }
}

/// Synchronous converter collaborator
pub trait Converter: Send + Sync {
    /// Fails with [`InboxError::ConverterMissing`] if the tool cannot run
    fn check_available(&self) -> Result<()>;

    fn convert(&self, job: &ConversionJob) -> Result<ConversionOutput>;
}

// Noise the tool prints on successful runs
static IGNORABLE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)mp4v2.*(could not|unable to) (find|load)",
        r"(?i)failed to save key",
        r"(?i)deprecated",
        r"(?i)^\s*PHP Warning:.*",
        r"(?i)ffmpeg version .* may not be fully supported",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static FATAL: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\berror\b",
        r"(?i)\bexception\b",
        r"(?i)could not (find|open|read)",
        r"(?i)no such file",
        r"(?i)permission denied",
        r"(?i)invalid data found",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

fn is_ignorable(line: &str) -> bool {
    IGNORABLE.iter().any(|re| re.is_match(line))
}

fn is_fatal(line: &str) -> bool {
    FATAL.iter().any(|re| re.is_match(line))
}

/// Decides whether a run succeeded
///
/// A non-zero or missing exit code fails. A zero exit still fails if stderr
/// carries an error line that is not known noise. The error carries the
/// most relevant output line.
pub fn classify_output(output: &ConversionOutput) -> std::result::Result<(), String> {
    let relevant: Vec<&str> = output
        .stderr
        .lines()
        .chain(output.stdout.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_ignorable(line))
        .collect();
    let fatal_line = relevant.iter().find(|line| is_fatal(line)).copied();

    match output.exit_code {
        Some(0) => match fatal_line {
            Some(line) => Err(line.to_string()),
            None => Ok(()),
        },
        code => {
            let detail = fatal_line
                .or_else(|| relevant.last().copied())
                .unwrap_or("no output");
            let status = code
                .map(|c| format!("exit code {}", c))
                .unwrap_or_else(|| "killed by signal".to_string());
            Err(format!("{}: {}", status, detail))
        }
    }
}

/// Drives `m4b-tool merge`
#[derive(Debug, Clone)]
pub struct M4bToolConverter {
    program: String,
}

impl M4bToolConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn build_args(&self, job: &ConversionJob) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["merge".into(), job.source_dir.clone().into()];
        let mut opt = |name: &str, value: &str| {
            args.push(format!("--{}={}", name, value).into());
        };

        opt("output-file", &job.output_file.to_string_lossy());
        opt("name", &job.metadata.title);
        opt("album", &job.metadata.title);
        if let Some(author) = job.metadata.author() {
            opt("artist", author);
            opt("albumartist", author);
        }
        if let Some(narrator) = &job.metadata.narrator {
            opt("writer", narrator);
        }
        if let Some(year) = &job.metadata.year {
            opt("year", year);
        }
        if let Some(comment) = &job.metadata.comment {
            opt("comment", comment);
        }
        if let Some(bitrate) = job.metadata.bitrate {
            opt("audio-bitrate", &format!("{}k", bitrate));
        }
        if let Some(rate) = job.metadata.sample_rate {
            opt("audio-samplerate", &rate.to_string());
        }
        opt("jobs", &job.cpu_cores.to_string());
        opt("max-chapter-length", &job.max_chapter_length);

        if job.use_filenames_as_chapters {
            args.push("--use-filenames-as-chapters".into());
        }
        args.push("--no-interaction".into());
        args
    }
}

impl Converter for M4bToolConverter {
    fn check_available(&self) -> Result<()> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .map_err(|e| InboxError::ConverterMissing {
                tool: self.program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(InboxError::ConverterMissing {
                tool: self.program.clone(),
                reason: format!("'--version' exited with {}", output.status),
            });
        }
        debug!(
            "Using {}: {}",
            self.program,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    fn convert(&self, job: &ConversionJob) -> Result<ConversionOutput> {
        let args = self.build_args(job);
        debug!("Running {} {:?}", self.program, args);

        let output = Command::new(&self.program).args(&args).output().map_err(|e| {
            warn!("Could not start {}: {}", self.program, e);
            InboxError::ConverterMissing {
                tool: self.program.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(ConversionOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ConversionJob {
        let mut metadata = BookMetadata::titled("Dune");
        metadata.artist = Some("Frank Herbert".to_string());
        metadata.narrator = Some("Scott Brick".to_string());
        metadata.bitrate = Some(64);
        ConversionJob {
            key: BookKey::new("Dune").unwrap(),
            source_dir: PathBuf::from("/work/merge/Dune"),
            output_file: PathBuf::from("/work/build/Dune/Dune.m4b"),
            metadata,
            cpu_cores: 4,
            max_chapter_length: "15,30".to_string(),
            use_filenames_as_chapters: true,
        }
    }

    fn output(code: Option<i32>, stderr: &str) -> ConversionOutput {
        ConversionOutput {
            exit_code: code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_build_args() {
        let args = M4bToolConverter::new("m4b-tool").build_args(&job());
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[0], "merge");
        assert_eq!(args[1], "/work/merge/Dune");
        assert!(args.contains(&"--output-file=/work/build/Dune/Dune.m4b".to_string()));
        assert!(args.contains(&"--name=Dune".to_string()));
        assert!(args.contains(&"--artist=Frank Herbert".to_string()));
        assert!(args.contains(&"--writer=Scott Brick".to_string()));
        assert!(args.contains(&"--audio-bitrate=64k".to_string()));
        assert!(args.contains(&"--jobs=4".to_string()));
        assert!(args.contains(&"--use-filenames-as-chapters".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--year")));
    }

    #[test]
    fn test_clean_run_succeeds() {
        assert!(classify_output(&ConversionOutput::success()).is_ok());
    }

    #[test]
    fn test_ignorable_noise() {
        let out = output(Some(0), "PHP Warning: something deprecated\nfailed to save key\n");
        assert!(classify_output(&out).is_ok());
    }

    #[test]
    fn test_error_text_with_zero_exit() {
        let out = output(Some(0), "Error: could not open input file\n");
        let err = classify_output(&out).unwrap_err();
        assert!(err.contains("could not open"));
    }

    #[test]
    fn test_non_zero_exit() {
        let err = classify_output(&output(Some(1), "something went wrong\n")).unwrap_err();
        assert_eq!(err, "exit code 1: something went wrong");

        let err = classify_output(&output(None, "")).unwrap_err();
        assert_eq!(err, "killed by signal: no output");
    }

    #[test]
    fn test_missing_program() {
        let converter = M4bToolConverter::new("autom4b-definitely-not-installed");
        let err = converter.check_available().unwrap_err();
        assert!(matches!(err, InboxError::ConverterMissing { .. }));
    }
}
