// src/utils/id_generator.rs
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdType {
    Ride,
    Driver,
    Rider,
}

impl IdType {
    pub fn to_prefix(&self) -> &'static str {
        match self {
            IdType::Ride => "rid",
            IdType::Driver => "drv",
            IdType::Rider => "usr",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "rid" => Some(IdType::Ride),
            "drv" => Some(IdType::Driver),
            "usr" => Some(IdType::Rider),
            _ => None,
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefix())
    }
}

const SUFFIX_LEN: usize = 5;
const HEX_CHARS: &[u8] = b"0123456789abcdef";
const ALPHANUMERIC_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub struct IdGenerator;

impl IdGenerator {
    /// Generate a unique ID with format: {prefix}-{yymmdd}-{random_suffix}
    pub fn generate(id_type: IdType) -> String {
        Self::generate_with_timestamp(id_type, Utc::now())
    }

    /// Generate ID with a specific timestamp (useful for testing)
    pub fn generate_with_timestamp(id_type: IdType, timestamp: DateTime<Utc>) -> String {
        let date_part = timestamp.format("%y%m%d");
        format!("{}-{}-{}", id_type.to_prefix(), date_part, Self::random_suffix())
    }

    /// Three hex characters followed by two alphanumerics, or the reverse.
    fn random_suffix() -> String {
        let mut rng = rand::rng();
        let (first, second) = if rng.random::<bool>() {
            (HEX_CHARS, ALPHANUMERIC_CHARS)
        } else {
            (ALPHANUMERIC_CHARS, HEX_CHARS)
        };

        (0..SUFFIX_LEN)
            .map(|i| {
                let charset = if i < 3 { first } else { second };
                charset[rng.random_range(0..charset.len())] as char
            })
            .collect()
    }

    /// Parse an ID to extract its components
    pub fn parse_id(id: &str) -> Option<ParsedId> {
        let mut parts = id.split('-');
        let (prefix, date_part, random_suffix) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || date_part.len() != 6 || random_suffix.len() != SUFFIX_LEN {
            return None;
        }
        if !random_suffix.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }

        let id_type = IdType::from_prefix(prefix)?;
        let year = 2000 + date_part[0..2].parse::<i32>().ok()?;
        let month = date_part[2..4].parse::<u32>().ok()?;
        let day = date_part[4..6].parse::<u32>().ok()?;

        let parsed = ParsedId {
            id_type,
            year,
            month,
            day,
            random_suffix: random_suffix.to_string(),
        };
        parsed.to_datetime()?;
        Some(parsed)
    }

    /// Validate if an ID matches the expected format and type
    pub fn validate_id(id: &str, expected_type: Option<IdType>) -> bool {
        match Self::parse_id(id) {
            Some(parsed) => expected_type.is_none_or(|expected| parsed.id_type == expected),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedId {
    pub id_type: IdType,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub random_suffix: String,
}

impl ParsedId {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, 0, 0, 0).single()
    }
}
