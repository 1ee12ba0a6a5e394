use std::sync::LazyLock;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::NaiveDate;
use rand::{Rng, distr::Alphanumeric};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::{
    error::{Error, Result},
    types::BackupMetadata,
};

pub fn generate_code_verifier() -> String {
    random_alphanumeric(128)
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

pub fn generate_state_token() -> String {
    random_alphanumeric(32)
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Appends `name` to a `/`-joined folder path.
pub fn join_folder_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternPart {
    Year,
    ShortYear,
    Month,
    Day,
    Literal(String),
}

impl PatternPart {
    fn is_date_field(&self) -> bool {
        !matches!(self, PatternPart::Literal(_))
    }
}

// `yyyy` is tried before `yy` so a four digit year never splits in two.
fn tokenize_date_pattern(pattern: &str) -> Vec<PatternPart> {
    let mut parts: Vec<PatternPart> = Vec::new();
    let mut rest = pattern;

    while let Some(c) = rest.chars().next() {
        let (part, len) = if rest.starts_with("yyyy") {
            (PatternPart::Year, 4)
        } else if rest.starts_with("yy") {
            (PatternPart::ShortYear, 2)
        } else if rest.starts_with("MM") {
            (PatternPart::Month, 2)
        } else if rest.starts_with("dd") {
            (PatternPart::Day, 2)
        } else {
            if let Some(PatternPart::Literal(literal)) = parts.last_mut() {
                literal.push(c);
            } else {
                parts.push(PatternPart::Literal(c.to_string()));
            }
            rest = &rest[c.len_utf8()..];
            continue;
        };

        parts.push(part);
        rest = &rest[len..];
    }

    parts
}

/// Translates a `yyyy`/`yy`/`MM`/`dd` pattern into a chrono format string.
///
/// ```text
/// yyyy-MM-dd  ->  %Y-%m-%d
/// dd.MM.yy    ->  %d.%m.%y
/// ```
pub fn translate_date_pattern(pattern: &str) -> String {
    tokenize_date_pattern(pattern)
        .iter()
        .map(|part| match part {
            PatternPart::Year => "%Y".to_string(),
            PatternPart::ShortYear => "%y".to_string(),
            PatternPart::Month => "%m".to_string(),
            PatternPart::Day => "%d".to_string(),
            PatternPart::Literal(literal) => literal.replace('%', "%%"),
        })
        .collect()
}

/// Strict matcher for date-named folders.
///
/// A name matches only if it is an exact, total match of the pattern
/// (fixed-width digits for every field, literals verbatim) and the fields
/// form a real calendar date. Fields missing from the pattern default to
/// year 0, January, day 1.
#[derive(Debug, Clone)]
pub struct DatePattern {
    pattern: String,
    parts: Vec<PatternPart>,
    matcher: Regex,
    format: String,
}

impl DatePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let parts = tokenize_date_pattern(pattern);
        if !parts.iter().any(PatternPart::is_date_field) {
            return Err(Error::InvalidDatePattern(pattern.to_string()));
        }

        let body: String = parts
            .iter()
            .map(|part| match part {
                PatternPart::Year => "([0-9]{4})".to_string(),
                PatternPart::ShortYear | PatternPart::Month | PatternPart::Day => {
                    "([0-9]{2})".to_string()
                }
                PatternPart::Literal(literal) => regex::escape(literal),
            })
            .collect();

        let matcher = Regex::new(&format!("^{}$", body))
            .map_err(|_| Error::InvalidDatePattern(pattern.to_string()))?;

        Ok(DatePattern {
            pattern: pattern.to_string(),
            parts,
            matcher,
            format: translate_date_pattern(pattern),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// The parsed date when `name` is a date under this pattern.
    pub fn matches(&self, name: &str) -> Option<NaiveDate> {
        let captures = self.matcher.captures(name)?;

        let mut year = 0;
        let mut month = 1;
        let mut day = 1;

        let fields = self.parts.iter().filter(|part| part.is_date_field());
        for (index, part) in fields.enumerate() {
            let value: u32 = captures.get(index + 1)?.as_str().parse().ok()?;
            match part {
                PatternPart::Year => year = value as i32,
                PatternPart::ShortYear => year = expand_short_year(value),
                PatternPart::Month => month = value,
                PatternPart::Day => day = value,
                PatternPart::Literal(_) => {}
            }
        }

        NaiveDate::from_ymd_opt(year, month, day)
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.matches(name).is_some()
    }

    pub fn format(&self, date: NaiveDate) -> String {
        date.format(&self.format).to_string()
    }
}

// Two digit years 69-99 are 1969-1999, 00-68 are 2000-2068.
fn expand_short_year(value: u32) -> i32 {
    let value = value as i32;
    if value >= 69 { 1900 + value } else { 2000 + value }
}

static BACKUP_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]+)_backup_([0-9]{8}|[0-9]{4}-[0-9]{2}-[0-9]{2})_.*")
        .expect("backup filename pattern is valid")
});

/// Extracts service and date from `<service>_backup_<date>_<rest>`.
///
/// `oauth_backup_20251102_040000.sql.gz` yields service `OAUTH` and date
/// `2025-11-02`.
pub fn parse_backup_filename(filename: &str) -> Result<BackupMetadata> {
    let captures = BACKUP_FILENAME
        .captures(filename)
        .ok_or_else(|| Error::PatternMismatch(filename.to_string()))?;

    let service = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let date = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

    Ok(BackupMetadata {
        service: camel_to_upper_snake(service),
        date: normalize_date(date),
    })
}

/// `myAppService` -> `MY_APP_SERVICE`.
///
/// Every interior uppercase letter gets its own separator, so runs of
/// capitals split letter by letter: `APIClient` -> `A_P_I_CLIENT`.
pub fn camel_to_upper_snake(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.char_indices() {
        if i > 0 && c.is_ascii_uppercase() {
            result.push('_');
        }
        result.push(c);
    }
    result.to_uppercase()
}

/// `YYYYMMDD` becomes `YYYY-MM-DD`; anything else is returned unchanged.
pub fn normalize_date(date: &str) -> String {
    if date.contains('-') {
        return date.to_string();
    }

    if date.len() == 8 && date.is_ascii() {
        return format!("{}-{}-{}", &date[0..4], &date[4..6], &date[6..8]);
    }

    date.to_string()
}
