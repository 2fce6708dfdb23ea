use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const HASH_SEED: u64 = 3_074_457_345_618_258_791;
const HASH_MULTIPLIER: u64 = 3_074_457_345_618_258_799;

/// Size of the compact id space. Ids live in `[0, ID_SPACE)`.
pub const ID_SPACE: u16 = i16::MAX as u16;

/// Stable 64-bit hash of a counter name.
///
/// Folds UTF-16 code units so ids computed here match rows written by
/// earlier writers of the same mapping table.
pub fn name_hash(name: &str) -> u64 {
    name.encode_utf16().fold(HASH_SEED, |hash, unit| {
        hash.wrapping_add(u64::from(unit))
            .wrapping_mul(HASH_MULTIPLIER)
    })
}

fn reduce(hash: u64) -> i16 {
    // ID_SPACE fits in i16, so the remainder does too
    (hash % u64::from(ID_SPACE)) as i16
}

/// Compact 16-bit identifier of a counter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterId(i16);

impl CounterId {
    /// Wrap a raw id read back from storage.
    pub fn from_raw(raw: i16) -> Self {
        Self(raw)
    }

    /// Hash-derived candidate id for a name. The mapping table is the
    /// authority; this is only the first slot tried on creation.
    pub fn candidate(name: &str) -> Self {
        Self(reduce(name_hash(name)))
    }

    /// Candidate for the given probe attempt (0 = the hash slot itself).
    pub fn probe(name: &str, attempt: u16) -> Self {
        let base = Self::candidate(name).0 as u32;
        let slot = (base + u32::from(attempt)) % u32::from(ID_SPACE);
        Self(slot as i16)
    }

    pub fn get(self) -> i16 {
        self.0
    }
}

impl fmt::Display for CounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application identifier stored with every sample.
///
/// Callers may supply an integer or a label. Numeric labels are taken
/// literally, anything else is reduced through the counter name hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawAppId", into = "i16")]
pub struct AppId(i16);

impl AppId {
    pub const UNSPECIFIED: AppId = AppId(0);

    pub fn new(raw: i16) -> Self {
        Self(raw)
    }

    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() {
            return Self::UNSPECIFIED;
        }
        match label.parse::<i16>() {
            Ok(raw) => Self(raw),
            Err(_) => Self(reduce(name_hash(label))),
        }
    }

    pub fn get(self) -> i16 {
        self.0
    }
}

impl From<i16> for AppId {
    fn from(raw: i16) -> Self {
        Self(raw)
    }
}

impl From<AppId> for i16 {
    fn from(app: AppId) -> Self {
        app.0
    }
}

impl FromStr for AppId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_label(s))
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAppId {
    Number(i64),
    Label(String),
}

impl TryFrom<RawAppId> for AppId {
    type Error = String;

    fn try_from(raw: RawAppId) -> Result<Self, Self::Error> {
        match raw {
            RawAppId::Number(n) => i16::try_from(n)
                .map(AppId)
                .map_err(|_| format!("app id {} out of range", n)),
            RawAppId::Label(label) => Ok(AppId::from_label(&label)),
        }
    }
}

/// One named sample handed in by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterInput {
    pub name: String,
    pub value: f32,
}

impl CounterInput {
    pub fn new(name: impl Into<String>, value: f32) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One sample read back by a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CounterValue {
    pub timestamp: NaiveDateTime,
    pub value: f32,
}

impl CounterValue {
    pub fn new(timestamp: NaiveDateTime, value: f32) -> Self {
        Self { timestamp, value }
    }
}

/// A fixed-width row of the samples table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRow {
    pub app_id: AppId,
    pub counter_id: CounterId,
    pub timestamp: NaiveDateTime,
    pub value: f32,
}
