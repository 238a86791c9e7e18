//! Classification of the entries found at one relative path.

use std::fmt;
use std::str::FromStr;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};
use tracing::warn;

use dirscan_core::{DifferenceTag, Entry, EntryRef, ScanError};

use crate::content_index::ContentIndex;
use crate::error::AnalyzeError;

/// Classification codes shown when scanning a single tree.
pub const COMPARE_TYPES_DEFAULT_SCAN: &str = "sd";

/// Classification codes shown when comparing two trees.
pub const COMPARE_TYPES_DEFAULT_COMPARE: &str = "rltcLRnm";

/// Relationship between the entries at one relative path.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Classification {
    Error,
    Excluded,
    RightOnly,
    LeftOnly,
    RightRenamed,
    LeftRenamed,
    DifferentType,
    Changed,
    LeftNewer,
    RightNewer,
    Equal,
    Scanned,
    Duplicated,
    Skipped,
}

impl Classification {
    /// Single letter used to filter classifications.
    pub fn code(self) -> char {
        match self {
            Self::Error => 'E',
            Self::Excluded => 'x',
            Self::RightOnly => 'r',
            Self::LeftOnly => 'l',
            Self::RightRenamed => 'm',
            Self::LeftRenamed => 'n',
            Self::DifferentType => 't',
            Self::Changed => 'c',
            Self::LeftNewer => 'L',
            Self::RightNewer => 'R',
            Self::Equal => 'e',
            Self::Scanned => 's',
            Self::Duplicated => 'd',
            Self::Skipped => 'i',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Self::iter().find(|c| c.code() == code)
    }

    /// Five character glyph for listings.
    pub fn arrow(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Excluded => "    x",
            Self::RightOnly => "   >>",
            Self::LeftOnly => "<<   ",
            Self::RightRenamed => "R-->>",
            Self::LeftRenamed => "<<--R",
            Self::DifferentType => "<~T~>",
            Self::Changed => "<--->",
            Self::LeftNewer => "<<-->",
            Self::RightNewer => "<-->>",
            Self::Equal | Self::Scanned => "     ",
            Self::Duplicated => "  DUP",
            Self::Skipped => "    -",
        }
    }

    /// Stable identifier, e.g. `right_only`.
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Whether producing this classification requires a content compare.
    pub fn needs_compare(self) -> bool {
        matches!(
            self,
            Self::Changed | Self::LeftNewer | Self::RightNewer | Self::Equal
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All classification codes, in declaration order.
pub fn all_compare_types() -> String {
    Classification::iter().map(Classification::code).collect()
}

/// Parse a set of classification codes.
///
/// An empty string selects `default` and `all` selects everything. A
/// leading `^` removes the given codes from `default`; anything else is
/// taken literally.
pub fn parse_compare_types(text: &str, default: &str) -> Result<Vec<Classification>, AnalyzeError> {
    let (invert, codes) = match text {
        "" => return Ok(default.chars().filter_map(Classification::from_code).collect()),
        t if t.eq_ignore_ascii_case("all") => return Ok(Classification::iter().collect()),
        t => match t.strip_prefix('^') {
            Some(rest) => (true, rest),
            None => (false, t),
        },
    };

    let foreign: String = codes
        .chars()
        .filter(|&c| Classification::from_code(c).is_none())
        .collect();
    if !foreign.is_empty() {
        let mut valid: Vec<char> = all_compare_types().chars().collect();
        valid.sort_unstable();
        return Err(AnalyzeError::UnknownCompareType {
            found: foreign,
            valid: valid.into_iter().collect(),
        });
    }

    let selected = |c: &Classification| codes.contains(c.code());
    Ok(if invert {
        default
            .chars()
            .filter_map(Classification::from_code)
            .filter(|c| !selected(c))
            .collect()
    } else {
        Classification::iter().filter(selected).collect()
    })
}

/// Differences to leave out of a comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ignores {
    #[serde(default)]
    pub uid: bool,
    #[serde(default)]
    pub gid: bool,
    #[serde(default)]
    pub permissions: bool,
    #[serde(default)]
    pub time: bool,
}

impl Ignores {
    /// Whether `tag` should be dropped.
    pub fn ignores(&self, tag: DifferenceTag) -> bool {
        match tag {
            DifferenceTag::UidDiffers => self.uid,
            DifferenceTag::GidDiffers => self.gid,
            DifferenceTag::PermissionsDiffer => self.permissions,
            DifferenceTag::Newer | DifferenceTag::Older => self.time,
            _ => false,
        }
    }
}

impl FromStr for Ignores {
    type Err = AnalyzeError;

    /// Parse letters out of `ugpt`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut ignores = Self::default();
        for letter in text.chars() {
            match letter {
                'u' => ignores.uid = true,
                'g' => ignores.gid = true,
                'p' => ignores.permissions = true,
                't' => ignores.time = true,
                other => return Err(AnalyzeError::UnknownIgnore(other)),
            }
        }
        Ok(ignores)
    }
}

/// Options for pairwise comparison.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
pub struct CompareConfig {
    #[builder(default)]
    #[serde(default)]
    pub ignores: Ignores,

    /// Classify entries of the same type as skipped without comparing them.
    #[builder(default = "false")]
    #[serde(default)]
    pub no_compare: bool,

    /// Drop a time difference when it is the only difference.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub ignore_time: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            ignores: Ignores::default(),
            no_compare: false,
            ignore_time: true,
        }
    }
}

impl CompareConfig {
    pub fn builder() -> CompareConfigBuilder {
        CompareConfigBuilder::default()
    }
}

/// Outcome of classifying one relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub classification: Classification,
    /// Human oriented description.
    pub text: String,
}

impl Comparison {
    pub fn new(classification: Classification, text: impl Into<String>) -> Self {
        Self {
            classification,
            text: text.into(),
        }
    }

    fn failed(err: &ScanError) -> Self {
        warn!(error = %err, "Compare failed");
        Self::new(Classification::Error, format!("Compare failed: {err}"))
    }
}

/// Classify the entries of one walk item.
///
/// One entry is scanned, two are compared; any other count is skipped.
pub fn compare_entries(
    entries: &[EntryRef],
    config: &CompareConfig,
    index: Option<&ContentIndex>,
) -> Comparison {
    match entries {
        [entry] => compare_single(entry, index),
        [left, right] => compare_pair(left, right, config, index),
        _ => Comparison::new(Classification::Skipped, "compare skipped"),
    }
}

/// Classify a lone entry.
///
/// With an index, files whose contents occur more than once are reported
/// as duplicated.
pub fn compare_single(entry: &Entry, index: Option<&ContentIndex>) -> Comparison {
    single(entry, index).unwrap_or_else(|err| Comparison::failed(&err))
}

fn single(entry: &Entry, index: Option<&ContentIndex>) -> Result<Comparison, ScanError> {
    if entry.is_excluded() {
        return Ok(Comparison::new(Classification::Excluded, "excluded"));
    }
    if let Some(index) = index.filter(|i| !i.is_empty() && entry.is_file()) {
        if let Some(hash) = entry.content_hash()? {
            if index.is_duplicated(&hash) {
                return Ok(Comparison::new(Classification::Duplicated, "Duplicated entry"));
            }
        }
    }
    Ok(Comparison::new(Classification::Scanned, "scan"))
}

/// Classify a left/right pair.
///
/// Comparison failures, such as an unreadable file, produce an
/// [`Classification::Error`] outcome instead of an error.
pub fn compare_pair(
    left: &Entry,
    right: &Entry,
    config: &CompareConfig,
    index: Option<&ContentIndex>,
) -> Comparison {
    pair(left, right, config, index).unwrap_or_else(|err| Comparison::failed(&err))
}

fn pair(
    left: &Entry,
    right: &Entry,
    config: &CompareConfig,
    index: Option<&ContentIndex>,
) -> Result<Comparison, ScanError> {
    use Classification::*;

    if left.is_excluded() && right.is_excluded() {
        let text = if left.is_missing() {
            "Right excluded, not present in left"
        } else if right.is_missing() {
            "Left excluded, not present in right"
        } else {
            "excluded"
        };
        return Ok(Comparison::new(Excluded, text));
    }

    if left.is_excluded() && right.is_missing() {
        return Ok(Comparison::new(Excluded, "excluded, only in left"));
    }
    if right.is_excluded() && left.is_missing() {
        return Ok(Comparison::new(Excluded, "excluded, only in right"));
    }

    if left.is_missing() || left.is_excluded() {
        if left.is_excluded() {
            let text = format!("{} only in right, left is excluded", describe(right));
            return Ok(Comparison::new(RightOnly, text));
        }
        if let Some(other) = renamed_from(right, 0, index)? {
            let text = format!("renamed, in left {}", other.full_path().display());
            return Ok(Comparison::new(RightRenamed, text));
        }
        return Ok(Comparison::new(RightOnly, format!("{} only in right", describe(right))));
    }

    if right.is_missing() || right.is_excluded() {
        if right.is_excluded() {
            let text = format!("{} only in left, right is excluded", describe(left));
            return Ok(Comparison::new(LeftOnly, text));
        }
        if let Some(other) = renamed_from(left, 1, index)? {
            let text = format!("renamed, in right {}", other.full_path().display());
            return Ok(Comparison::new(LeftRenamed, text));
        }
        return Ok(Comparison::new(LeftOnly, format!("{} only in left", describe(left))));
    }

    if left.entry_type() != right.entry_type() {
        let text = format!(
            "Different type, {} in left and {} in right",
            describe(left),
            describe(right)
        );
        return Ok(Comparison::new(DifferentType, text));
    }

    if config.no_compare {
        return Ok(Comparison::new(Skipped, "compare skipped"));
    }

    let differences = left.compare(right)?;
    let lone = differences.len() == 1;
    let kept: Vec<DifferenceTag> = differences
        .into_iter()
        .filter(|tag| !(tag.is_time() && lone && config.ignore_time))
        .filter(|tag| !config.ignores.ignores(*tag))
        .collect();

    let classification = match kept.as_slice() {
        [] => return Ok(Comparison::new(Equal, "equal")),
        [DifferenceTag::Newer] => LeftNewer,
        [DifferenceTag::Older] => RightNewer,
        _ => Changed,
    };
    let changes: Vec<String> = kept.iter().map(|tag| describe_tag(*tag)).collect();
    let text = format!("{} changed: {}", describe(left), changes.join(", "));
    Ok(Comparison::new(classification, text))
}

/// A file from tree `tree` with the same content as `entry`.
fn renamed_from(
    entry: &Entry,
    tree: usize,
    index: Option<&ContentIndex>,
) -> Result<Option<EntryRef>, ScanError> {
    let Some(index) = index.filter(|i| !i.is_empty() && entry.is_file()) else {
        return Ok(None);
    };
    let Some(hash) = entry.content_hash()? else {
        return Ok(None);
    };
    Ok(index.find_in_tree(&hash, tree).map(|file| file.entry.clone()))
}

fn describe(entry: &Entry) -> &'static str {
    entry.entry_type().description()
}

fn describe_tag(tag: DifferenceTag) -> String {
    match tag {
        DifferenceTag::Newer => "left is newer".to_string(),
        DifferenceTag::Older => "right is newer".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirscan_core::{Children, EntryType, RecordFields};

    fn record(entry_type: EntryType, mode: u32, mtime: f64, payload: &str) -> RecordFields {
        RecordFields {
            entry_type,
            size: if payload.is_empty() { 0 } else { 6 },
            mode,
            uid: 1000,
            gid: 1000,
            mtime,
            payload: payload.into(),
        }
    }

    fn file(name: &str, mode: u32, mtime: f64, content: &[u8]) -> EntryRef {
        let hash = dirscan_core::ContentHash::of_bytes(content).to_hex();
        Entry::from_record(name, "t", &record(EntryType::File, mode, mtime, &hash), Children::new())
            .unwrap()
    }

    fn dir(name: &str) -> EntryRef {
        Entry::from_record(name, "t", &record(EntryType::Directory, 0o755, 0.0, ""), Children::new())
            .unwrap()
    }

    fn pair(left: &Entry, right: &Entry) -> Comparison {
        compare_pair(left, right, &CompareConfig::default(), None)
    }

    #[test]
    fn test_codes_are_unique() {
        let codes = all_compare_types();
        assert_eq!(codes.len(), 14);
        for c in Classification::iter() {
            assert_eq!(Classification::from_code(c.code()), Some(c));
            assert_eq!(c.arrow().len(), 5);
        }
        assert_eq!(Classification::RightOnly.as_str(), "right_only");
        assert_eq!(Classification::Scanned.to_string(), "scanned");
    }

    #[test]
    fn test_parse_compare_types() {
        let types = parse_compare_types("rl", COMPARE_TYPES_DEFAULT_COMPARE).unwrap();
        assert_eq!(types, vec![Classification::RightOnly, Classification::LeftOnly]);

        assert_eq!(parse_compare_types("all", "").unwrap().len(), 14);
        assert_eq!(
            parse_compare_types("", COMPARE_TYPES_DEFAULT_SCAN).unwrap(),
            vec![Classification::Scanned, Classification::Duplicated]
        );

        let types = parse_compare_types("^LR", COMPARE_TYPES_DEFAULT_COMPARE).unwrap();
        assert_eq!(types.len(), 6);
        assert!(!types.contains(&Classification::LeftNewer));

        let err = parse_compare_types("rz", "").unwrap_err();
        assert!(matches!(err, AnalyzeError::UnknownCompareType { ref found, .. } if found == "z"));
    }

    #[test]
    fn test_ignores_from_str() {
        let ignores: Ignores = "ugt".parse().unwrap();
        assert!(ignores.uid && ignores.gid && ignores.time);
        assert!(!ignores.permissions);
        assert_eq!("q".parse::<Ignores>(), Err(AnalyzeError::UnknownIgnore('q')));
    }

    #[test]
    fn test_same_entry_is_equal() {
        let a = file("a", 0o644, 10.0, b"foobar");
        assert_eq!(pair(&a, &a), Comparison::new(Classification::Equal, "equal"));
        let d = dir("d");
        assert_eq!(pair(&d, &d).classification, Classification::Equal);
    }

    #[test]
    fn test_one_sided() {
        let a = file("a", 0o644, 0.0, b"foobar");
        let gone = Entry::missing("a", "t");
        assert_eq!(
            pair(&a, &gone),
            Comparison::new(Classification::LeftOnly, "file only in left")
        );
        assert_eq!(
            pair(&gone, &dir("a")),
            Comparison::new(Classification::RightOnly, "directory only in right")
        );
    }

    #[test]
    fn test_excluded_matrix() {
        let a = file("a", 0o644, 0.0, b"foobar");
        let b = file("a", 0o644, 0.0, b"foobar");
        let gone = Entry::missing("a", "t");
        a.set_excluded();

        assert_eq!(pair(&a, &gone).text, "excluded, only in left");
        assert_eq!(pair(&a, &b).text, "file only in right, left is excluded");
        assert_eq!(pair(&b, &a).text, "file only in left, right is excluded");
        assert_eq!(pair(&b, &a).classification, Classification::LeftOnly);

        gone.set_excluded();
        assert_eq!(pair(&a, &gone).text, "Left excluded, not present in right");
        assert_eq!(pair(&gone, &a).text, "Right excluded, not present in left");
        b.set_excluded();
        assert_eq!(pair(&a, &b), Comparison::new(Classification::Excluded, "excluded"));
    }

    #[test]
    fn test_different_type() {
        let result = pair(&file("a", 0o644, 0.0, b"x"), &dir("a"));
        assert_eq!(result.classification, Classification::DifferentType);
        assert_eq!(result.text, "Different type, file in left and directory in right");
    }

    #[test]
    fn test_time_only_difference() {
        let old = file("a", 0o644, 100.0, b"foobar");
        let new = file("a", 0o644, 200.0, b"foobar");
        assert_eq!(pair(&new, &old).classification, Classification::Equal);

        let config = CompareConfig::builder().ignore_time(false).build().unwrap();
        let result = compare_pair(&new, &old, &config, None);
        assert_eq!(result, Comparison::new(Classification::LeftNewer, "file changed: left is newer"));
        let result = compare_pair(&old, &new, &config, None);
        assert_eq!(result.classification, Classification::RightNewer);

        let config = CompareConfig::builder()
            .ignore_time(false)
            .ignores(Ignores { time: true, ..Ignores::default() })
            .build()
            .unwrap();
        assert_eq!(compare_pair(&new, &old, &config, None).classification, Classification::Equal);
    }

    #[test]
    fn test_time_with_other_changes() {
        let old = file("a", 0o644, 100.0, b"foobar");
        let new = file("a", 0o600, 200.0, b"barfoo");
        let result = pair(&new, &old);
        assert_eq!(result.classification, Classification::Changed);
        assert_eq!(
            result.text,
            "file changed: left is newer, permissions differ, contents differ"
        );
    }

    #[test]
    fn test_ignored_permissions() {
        let a = file("a", 0o644, 0.0, b"foobar");
        let b = file("a", 0o600, 0.0, b"foobar");
        assert_eq!(pair(&a, &b).classification, Classification::Changed);

        let config = CompareConfig::builder()
            .ignores("p".parse::<Ignores>().unwrap())
            .build()
            .unwrap();
        assert_eq!(compare_pair(&a, &b, &config, None).classification, Classification::Equal);
    }

    #[test]
    fn test_missing_stored_hash_is_changed() {
        let unhashed = |name: &str| {
            let fields = RecordFields {
                size: 6,
                ..record(EntryType::File, 0o644, 0.0, "")
            };
            Entry::from_record(name, "t", &fields, Children::new()).unwrap()
        };
        let hashed = file("a", 0o644, 0.0, b"foobar");

        let result = pair(&hashed, &unhashed("a"));
        assert_eq!(
            result,
            Comparison::new(Classification::Changed, "file changed: cannot compare contents")
        );
        assert_eq!(pair(&unhashed("a"), &unhashed("a")).classification, Classification::Equal);
    }

    #[test]
    fn test_no_compare() {
        let config = CompareConfig::builder().no_compare(true).build().unwrap();
        let a = file("a", 0o644, 0.0, b"foobar");
        let b = file("a", 0o600, 0.0, b"barfoo");
        assert_eq!(
            compare_pair(&a, &b, &config, None),
            Comparison::new(Classification::Skipped, "compare skipped")
        );
    }

    #[test]
    fn test_compare_entries_dispatch() {
        let a = file("a", 0o644, 0.0, b"foobar");
        let config = CompareConfig::default();
        assert_eq!(compare_entries(&[a.clone()], &config, None).classification, Classification::Scanned);
        assert_eq!(
            compare_entries(&[a.clone(), a.clone()], &config, None).classification,
            Classification::Equal
        );
        assert_eq!(
            compare_entries(&[a.clone(), a.clone(), a], &config, None).classification,
            Classification::Skipped
        );
        assert_eq!(compare_entries(&[], &config, None).classification, Classification::Skipped);
    }

    #[test]
    fn test_single_excluded() {
        let a = file("a", 0o644, 0.0, b"foobar");
        a.set_excluded();
        assert_eq!(
            compare_single(&a, None),
            Comparison::new(Classification::Excluded, "excluded")
        );
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: CompareConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CompareConfig::default());
        assert!(config.ignore_time);
    }
}
