//! Migration identities.
//!
//! Every migration is identified by a string of the form
//! `<yyyyMMddHHmmss>_<Name>`: a 14-digit UTC timestamp, an underscore and the
//! name the author chose. Identities sort chronologically as plain strings,
//! which is what the registry relies on to order migrations.
//!
//! ```rust
//! use tidal_migrate::id::{IdGenerator, extract_name, is_valid};
//!
//! let generator = IdGenerator::new();
//! let first = generator.generate("CreateUsers").unwrap();
//! let second = generator.generate("CreateUsers").unwrap();
//!
//! assert!(is_valid(first.as_str()));
//! assert!(first < second);
//! assert_eq!(extract_name(second.as_str()), Some("CreateUsers"));
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};

/// Separator between the timestamp and the name.
pub const SEPARATOR: char = '_';

/// Number of digits in the timestamp segment.
pub const TIMESTAMP_LEN: usize = 14;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Check whether a string is a well-formed migration identity.
///
/// Exactly 14 ASCII digits, the separator, then at least one more character.
pub fn is_valid(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() > TIMESTAMP_LEN + 1
        && bytes[..TIMESTAMP_LEN].iter().all(u8::is_ascii_digit)
        && bytes[TIMESTAMP_LEN] == SEPARATOR as u8
}

/// Return the name part of an identity, or `None` if `id` is malformed.
pub fn extract_name(id: &str) -> Option<&str> {
    is_valid(id).then(|| &id[TIMESTAMP_LEN + 1..])
}

/// A validated migration identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MigrationId(String);

impl MigrationId {
    /// Parse an identity, failing with [`MigrationError::InvalidIdentity`]
    /// when it is malformed.
    pub fn parse(value: impl Into<String>) -> MigrateResult<Self> {
        let value = value.into();
        if is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(MigrationError::invalid_identity(value))
        }
    }

    /// The full identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name chosen by the migration author.
    pub fn name(&self) -> &str {
        &self.0[TIMESTAMP_LEN + 1..]
    }

    /// The raw 14-digit timestamp segment.
    pub fn timestamp_digits(&self) -> &str {
        &self.0[..TIMESTAMP_LEN]
    }

    /// Decode the timestamp segment.
    ///
    /// Returns `None` for digit strings that are not a real calendar instant
    /// (for example a hand-written `99999999999999_Name`).
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(self.timestamp_digits(), TIMESTAMP_FORMAT)
            .ok()
            .map(|t| t.and_utc())
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MigrationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for MigrationId {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MigrationId {
    type Error = MigrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<MigrationId> for String {
    fn from(id: MigrationId) -> Self {
        id.0
    }
}

impl PartialEq<str> for MigrationId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for MigrationId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Source of the current UTC instant.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock to `now`, which may be in the past.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Move the clock forward.
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Generates strictly increasing migration identities.
///
/// The generator remembers the last timestamp it issued. If the clock has not
/// moved past it (coarse clocks, several calls within one second, or a clock
/// that stepped backwards) the next identity uses the last timestamp plus one
/// second instead.
#[derive(Debug)]
pub struct IdGenerator<C: Clock = SystemClock> {
    clock: C,
    last: Mutex<Option<NaiveDateTime>>,
}

impl IdGenerator<SystemClock> {
    /// Create a generator reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for IdGenerator<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> IdGenerator<C> {
    /// Create a generator reading `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            last: Mutex::new(None),
        }
    }

    /// Generate a new identity for `name`.
    pub fn generate(&self, name: &str) -> MigrateResult<MigrationId> {
        validate_name(name)?;

        let now = self.clock.now().naive_utc();
        let now = now.with_nanosecond(0).unwrap_or(now);

        let stamp = {
            let mut last = self.last.lock();
            let stamp = match *last {
                Some(prev) if now <= prev => prev + TimeDelta::seconds(1),
                _ => now,
            };
            *last = Some(stamp);
            stamp
        };

        Ok(MigrationId(format!(
            "{}{}{}",
            stamp.format(TIMESTAMP_FORMAT),
            SEPARATOR,
            name
        )))
    }
}

fn validate_name(name: &str) -> MigrateResult<()> {
    if name.is_empty() {
        return Err(MigrationError::invalid_name(name, "name must not be empty"));
    }
    if name.contains(SEPARATOR) {
        return Err(MigrationError::invalid_name(
            name,
            format!("name must not contain '{}'", SEPARATOR),
        ));
    }
    Ok(())
}
