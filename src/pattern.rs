//! Timestamp patterns
//!
//! Filenames (and optionally their parent directories) encode the
//! acquisition time of a data file, e.g. `T3250605_%Y%m%d_%H%M%S.nc`.
//! A [TimestampPattern] extracts those fields and renders them into a
//! canonical [Stamp] used for cutoff comparison.

use std::fmt;

use chrono::NaiveDateTime;

use crate::error::SelectError;

/// Date/time field a pattern directive refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// `%Y`, year with century, 4 digits
    Year,
    /// `%y`, year without century, 2 digits (interpreted as 2000-2099)
    YearShort,
    /// `%m`, month, 2 digits
    Month,
    /// `%d`, day, 2 digits
    Day,
    /// `%H`, hour, 2 digits
    Hour,
    /// `%M`, minute, 2 digits
    Minute,
    /// `%S`, second, 2 digits
    Second,
}

impl Field {
    /// Every directive matches a fixed number of digits.
    /// Fixed width plus zero padding is what makes lexical stamp
    /// comparison equivalent to chronological comparison.
    fn width(self) -> usize {
        match self {
            Self::Year => 4,
            _ => 2,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Year | Self::YearShort => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
        };
        write!(f, "{name}")
    }
}

/// Why a string failed to yield a [Stamp].
///
/// [MatchError::NoMatch] is the expected outcome for unrelated files
/// and is skipped silently; the other variants are worth a warning.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("text does not match the pattern")]
    NoMatch,
    #[error("{field} value {value} is out of calendar range")]
    OutOfRange { field: Field, value: u32 },
    #[error("{field} appears twice with different values")]
    Inconsistent { field: Field },
}

#[derive(Debug, Clone, Copy)]
enum Token {
    Literal(char),
    Directive(Field),
}

/// Compiled filename template mixing literal text and date directives.
#[derive(Debug, Clone)]
pub struct TimestampPattern {
    tokens: Vec<Token>,
}

impl TimestampPattern {
    /// Compile `mask`, rejecting unknown directives.
    pub fn new(mask: &str) -> Result<Self, SelectError> {
        let mut tokens = Vec::new();
        let mut chars = mask.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                tokens.push(Token::Literal(c));
                continue;
            }
            let directive = chars.next().ok_or_else(|| {
                SelectError::Configuration(format!("pattern '{mask}' ends with a dangling '%'"))
            })?;
            let field = match directive {
                'Y' => Field::Year,
                'y' => Field::YearShort,
                'm' => Field::Month,
                'd' => Field::Day,
                'H' => Field::Hour,
                'M' => Field::Minute,
                'S' => Field::Second,
                '%' => {
                    tokens.push(Token::Literal('%'));
                    continue;
                }
                other => {
                    return Err(SelectError::Configuration(format!(
                        "unknown directive '%{other}' in pattern '{mask}'"
                    )));
                }
            };
            tokens.push(Token::Directive(field));
        }

        Ok(Self { tokens })
    }

    /// Try to extract a [Stamp] from `text`.
    ///
    /// The whole of `text` must match the pattern; fields absent from
    /// the pattern take their minimum value in the resulting stamp.
    pub fn parse(&self, text: &str) -> Result<Stamp, MatchError> {
        let mut fields = FieldValues::default();
        let mut rest = text;

        for token in &self.tokens {
            match token {
                Token::Literal(c) => {
                    rest = rest.strip_prefix(*c).ok_or(MatchError::NoMatch)?;
                }
                Token::Directive(field) => {
                    let width = field.width();
                    if rest.len() < width || !rest.is_char_boundary(width) {
                        return Err(MatchError::NoMatch);
                    }
                    let (digits, tail) = rest.split_at(width);
                    if !digits.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(MatchError::NoMatch);
                    }
                    let value = digits.parse().map_err(|_| MatchError::NoMatch)?;
                    fields.set(*field, value)?;
                    rest = tail;
                }
            }
        }

        if !rest.is_empty() {
            return Err(MatchError::NoMatch);
        }

        fields.into_stamp()
    }
}

/// Fields collected while matching a pattern against a string.
#[derive(Debug, Default)]
struct FieldValues {
    year: Option<u32>,
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
}

impl FieldValues {
    fn set(&mut self, field: Field, value: u32) -> Result<(), MatchError> {
        let (slot, value) = match field {
            Field::Year => (&mut self.year, value),
            Field::YearShort => (&mut self.year, 2000 + value),
            Field::Month => (&mut self.month, value),
            Field::Day => (&mut self.day, value),
            Field::Hour => (&mut self.hour, value),
            Field::Minute => (&mut self.minute, value),
            Field::Second => (&mut self.second, value),
        };
        // A field may legitimately appear twice, e.g. the year both in
        // a directory name and in the filename, but the values must agree.
        match slot {
            Some(existing) if *existing != value => Err(MatchError::Inconsistent { field }),
            _ => {
                *slot = Some(value);
                Ok(())
            }
        }
    }

    fn into_stamp(self) -> Result<Stamp, MatchError> {
        fn check(field: Field, value: u32, min: u32, max: u32) -> Result<u32, MatchError> {
            if (min..=max).contains(&value) {
                Ok(value)
            } else {
                Err(MatchError::OutOfRange { field, value })
            }
        }

        let year = self.year.unwrap_or(0);
        let month = check(Field::Month, self.month.unwrap_or(1), 1, 12)?;
        let day = check(Field::Day, self.day.unwrap_or(1), 1, 31)?;
        let hour = check(Field::Hour, self.hour.unwrap_or(0), 0, 23)?;
        let minute = check(Field::Minute, self.minute.unwrap_or(0), 0, 59)?;
        let second = check(Field::Second, self.second.unwrap_or(0), 0, 59)?;

        Ok(Stamp(format!(
            "{year:04}{month:02}{day:02}{hour:02}{minute:02}{second:02}"
        )))
    }
}

/// Canonical encoded timestamp, always `YYYYMMDDHHMMSS`.
///
/// Every field is fixed width and zero padded, so the derived lexical
/// ordering is the chronological ordering. Cutoff filtering relies on
/// this instead of full date arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(String);

impl Stamp {
    /// Render a date-time into its canonical stamp.
    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        Self(datetime.format("%Y%m%d%H%M%S").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
