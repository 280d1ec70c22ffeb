//! Book structure classification
//!
//! Rules are checked in priority order and the first match wins:
//! standalone file, flat, flat-nested, multi-disc, multi-book/series,
//! mixed, unknown. Classification is pure; flattening is a separate
//! operation callers invoke only after [`flatten_order_check`] passes.

use crate::probe::{audio_files, is_hidden, AudioExtensions};
use autom4b_core::BookStructure;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

static DISC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:disc|disk|cd)[\s._-]*(\d+)(?:[\s._-]*(?:of|/)[\s._-]*\d+)?")
        .unwrap_or_else(|e| unreachable!("disc pattern: {e}"))
});

static ROMAN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[MDCLXVI]+\b").unwrap_or_else(|e| unreachable!("roman pattern: {e}"))
});

/// Disc number named by a folder such as `Disc 2 of 3` or `CD02`
pub fn disc_number(name: &str) -> Option<u32> {
    DISC_PATTERN
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// An immediate subdirectory that holds audio somewhere below it
#[derive(Debug, Clone)]
pub struct SubdirGroup {
    pub name: String,
    pub path: PathBuf,
    /// Audio files directly inside the subdirectory
    pub direct_audio: usize,
    /// All audio files below the subdirectory, in traversal order
    pub files: Vec<PathBuf>,
}

/// Where the audio files of a book directory live
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub root_files: Vec<PathBuf>,
    pub groups: Vec<SubdirGroup>,
}

impl Layout {
    pub fn analyze(dir: &Path, extensions: &AudioExtensions) -> Self {
        let mut layout = Layout::default();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return layout,
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| !is_hidden(path))
            .collect();
        paths.sort();

        for path in paths {
            if path.is_file() {
                if extensions.matches(&path) {
                    layout.root_files.push(path);
                }
            } else if path.is_dir() {
                let files: Vec<PathBuf> = audio_files(&path, extensions)
                    .into_iter()
                    .map(|f| f.path)
                    .collect();
                if files.is_empty() {
                    continue;
                }
                let direct_audio = files
                    .iter()
                    .filter(|file| file.parent() == Some(path.as_path()))
                    .count();
                layout.groups.push(SubdirGroup {
                    name: file_name(&path),
                    path,
                    direct_audio,
                    files,
                });
            }
        }

        layout
    }

    pub fn audio_count(&self) -> usize {
        self.root_files.len() + self.groups.iter().map(|g| g.files.len()).sum::<usize>()
    }

    fn all_disc_named(&self) -> bool {
        self.groups.iter().all(|g| disc_number(&g.name).is_some())
    }

    fn none_disc_named(&self) -> bool {
        self.groups.iter().all(|g| disc_number(&g.name).is_none())
    }

    /// Files in the order a listener would play them before flattening:
    /// disc folders by disc number, then each folder's files in traversal order
    pub fn traversal_order(&self) -> Vec<PathBuf> {
        let mut groups: Vec<&SubdirGroup> = self.groups.iter().collect();
        groups.sort_by(|a, b| compare_groups(a, b));

        self.root_files
            .iter()
            .cloned()
            .chain(groups.into_iter().flat_map(|g| g.files.iter().cloned()))
            .collect()
    }
}

fn compare_groups(a: &SubdirGroup, b: &SubdirGroup) -> Ordering {
    match (disc_number(&a.name), disc_number(&b.name)) {
        (Some(x), Some(y)) if x != y => x.cmp(&y),
        _ => collation_key(&a.name).cmp(&collation_key(&b.name)),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn collation_key(name: &str) -> String {
    name.to_lowercase()
}

/// Options that change how a structure is judged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifyOptions {
    pub flatten_multi_disc: bool,
    pub convert_series: bool,
}

/// What the caller should do with a book
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    /// Safe to flatten, order is preserved
    Flatten,
    /// Each subdirectory is an independent book
    SplitSeries,
    Reject(String),
}

impl Verdict {
    pub fn is_reject(&self) -> bool {
        matches!(self, Verdict::Reject(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub structure: BookStructure,
    pub verdict: Verdict,
}

/// Classifies the layout of `path` into a [`BookStructure`]
pub fn classify(path: &Path, extensions: &AudioExtensions, convert_series: bool) -> BookStructure {
    if path.is_file() {
        return BookStructure::Standalone;
    }
    classify_layout(&Layout::analyze(path, extensions), convert_series)
}

pub fn classify_layout(layout: &Layout, convert_series: bool) -> BookStructure {
    let root = layout.root_files.len();
    let groups = layout.groups.len();

    if root > 0 && groups == 0 {
        BookStructure::Flat
    } else if root == 0 && groups == 1 {
        BookStructure::FlatNested
    } else if root == 0 && groups >= 2 && layout.all_disc_named() {
        BookStructure::MultiDisc
    } else if root == 0
        && groups >= 2
        && layout.none_disc_named()
        && layout.groups.iter().all(|g| g.direct_audio > 0)
    {
        if convert_series {
            BookStructure::Series
        } else {
            BookStructure::MultiBook
        }
    } else if root > 0 && groups > 0 {
        BookStructure::Mixed
    } else {
        BookStructure::Unknown
    }
}

/// Checks that flattening keeps the play order
///
/// After flattening, files are processed alphabetically by name. This must
/// equal the nested traversal order, and names must stay unique.
pub fn flatten_order_check(layout: &Layout) -> Result<(), String> {
    let traversal: Vec<String> = layout.traversal_order().iter().map(|p| file_name(p)).collect();

    let mut seen = HashSet::new();
    for name in &traversal {
        if !seen.insert(collation_key(name)) {
            return Err(format!(
                "flattening would overwrite '{}', file names are not unique across folders",
                name
            ));
        }
    }

    let mut flattened = traversal.clone();
    flattened.sort_by_key(|name| collation_key(name));

    if flattened != traversal {
        let position = traversal
            .iter()
            .zip(flattened.iter())
            .position(|(a, b)| a != b)
            .unwrap_or(0);
        return Err(format!(
            "flattening would reorder chapters ('{}' would sort before '{}'), rename the files so they sort in play order",
            flattened[position], traversal[position]
        ));
    }

    Ok(())
}

/// Classifies `path` and decides what to do with it
pub fn assess(path: &Path, extensions: &AudioExtensions, options: ClassifyOptions) -> Classification {
    if path.is_file() {
        return Classification {
            structure: BookStructure::Standalone,
            verdict: Verdict::Reject(
                "standalone audio file, it must be moved into its own folder".to_string(),
            ),
        };
    }

    let layout = Layout::analyze(path, extensions);
    let structure = classify_layout(&layout, options.convert_series);

    let verdict = match structure {
        BookStructure::Flat => Verdict::Accept,
        BookStructure::FlatNested => match flatten_order_check(&layout) {
            Ok(()) => Verdict::Flatten,
            Err(reason) => Verdict::Reject(format!("nested book cannot be flattened: {}", reason)),
        },
        BookStructure::MultiDisc if !options.flatten_multi_disc => Verdict::Reject(
            "multi-disc book, reorganize it into a single folder or enable multi-disc flattening"
                .to_string(),
        ),
        BookStructure::MultiDisc => match flatten_order_check(&layout) {
            Ok(()) => Verdict::Flatten,
            Err(reason) => Verdict::Reject(format!(
                "multi-disc book cannot be flattened automatically: {}, reorganize it manually",
                reason
            )),
        },
        BookStructure::Series => Verdict::SplitSeries,
        BookStructure::MultiBook => Verdict::Reject(
            "folder contains multiple books, split them up or enable series conversion"
                .to_string(),
        ),
        BookStructure::Mixed => Verdict::Reject(
            "audio files found both in the book folder and in subfolders, reorganize them manually"
                .to_string(),
        ),
        BookStructure::Standalone | BookStructure::Unknown => {
            if layout.audio_count() == 0 {
                Verdict::Reject("no audio files found".to_string())
            } else {
                Verdict::Reject("unrecognized folder structure".to_string())
            }
        }
    };

    let verdict = match verdict {
        Verdict::Accept | Verdict::Flatten => match roman_numeral_check(&layout) {
            Ok(()) => verdict,
            Err(reason) => Verdict::Reject(reason),
        },
        other => other,
    };

    Classification { structure, verdict }
}

/// Value of a well-formed uppercase Roman numeral
pub fn roman_value(numeral: &str) -> Option<u32> {
    let digit = |c: char| match c {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    };

    let digits: Vec<u32> = numeral.chars().map(digit).collect::<Option<_>>()?;
    if digits.is_empty() {
        return None;
    }

    let mut total = 0;
    for (i, &value) in digits.iter().enumerate() {
        match digits.get(i + 1) {
            Some(&next) if next > value => total -= value as i64,
            _ => total += value as i64,
        }
    }
    let total = u32::try_from(total).ok().filter(|&t| t > 0)?;

    // Reject non-canonical forms such as IIII or VX
    (to_roman(total) == numeral).then_some(total)
}

fn to_roman(mut value: u32) -> String {
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (amount, symbol) in TABLE {
        while value >= amount {
            out.push_str(symbol);
            value -= amount;
        }
    }
    out
}

/// Distinct Roman numeral values appearing as words in `name`
fn roman_numerals(name: &str) -> Vec<u32> {
    ROMAN_PATTERN
        .find_iter(name)
        .filter_map(|m| roman_value(m.as_str()))
        .collect()
}

fn replace_numerals(name: &str) -> String {
    ROMAN_PATTERN
        .replace_all(name, |caps: &regex::Captures| {
            let word = &caps[0];
            match roman_value(word) {
                Some(value) => format!("{:04}", value),
                None => word.to_string(),
            }
        })
        .into_owned()
}

/// Rejects books whose chapter order depends on Roman numerals
///
/// Only applies when more than one distinct numeral value appears. The
/// alphabetical order of the names must equal their order with numerals
/// read as numbers.
pub fn roman_numeral_check(layout: &Layout) -> Result<(), String> {
    let names: Vec<String> = layout.traversal_order().iter().map(|p| file_name(p)).collect();

    let distinct: HashSet<u32> = names.iter().flat_map(|n| roman_numerals(n)).collect();
    if distinct.len() < 2 {
        return Ok(());
    }

    let mut alphabetical = names.clone();
    alphabetical.sort_by_key(|name| collation_key(name));

    let mut numeric = names;
    numeric.sort_by_key(|name| collation_key(&replace_numerals(name)));

    if alphabetical != numeric {
        return Err(
            "file names use Roman numerals that do not sort in play order, rename the files with decimal numbers"
                .to_string(),
        );
    }
    Ok(())
}
