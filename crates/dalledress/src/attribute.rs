//! Deterministic attribute derivation.
//!
//! An address seeds exactly fifteen attribute slots, each bound to one of
//! twelve logical databases. The walk takes 8 hex characters per step: a
//! primary 6-character window plus an overlapping secondary window four
//! characters in, until the slot table or the seed is exhausted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{DalleError, Result};

/// Number of attribute slots in a dress.
pub const SLOT_COUNT: usize = 15;

/// Canonical slot table: `(slot name, database name)`, order is part of
/// the wire contract.
pub const SLOT_TABLE: [(&str, &str); SLOT_COUNT] = [
    ("adverb", "adverbs"),
    ("adjective", "adjectives"),
    ("noun", "nouns"),
    ("emotion", "emotions"),
    ("occupation", "occupations"),
    ("action", "actions"),
    ("artStyle1", "artstyles"),
    ("artStyle2", "artstyles"),
    ("litStyle", "litstyles"),
    ("color1", "colors"),
    ("color2", "colors"),
    ("color3", "colors"),
    ("orientation", "orientations"),
    ("gaze", "gazes"),
    ("backStyle", "backstyles"),
];

/// The twelve logical database names, deduplicated, in first-use order.
pub const DATABASE_ORDER: [&str; 12] = [
    "adverbs",
    "adjectives",
    "nouns",
    "emotions",
    "occupations",
    "actions",
    "artstyles",
    "litstyles",
    "colors",
    "orientations",
    "gazes",
    "backstyles",
];

/// One derived attribute: a 6-hex-character window mapped through a
/// fixed-point fraction onto a database record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub database: String,
    pub name: String,
    pub bytes: String,
    pub number: u64,
    pub factor: f64,
    pub count: u64,
    pub selector: u64,
    pub value: String,
}

impl Attribute {
    /// Construct the attribute for slot `index` from a 6-hex-char window.
    pub fn new(
        databases: &HashMap<String, Vec<String>>,
        index: usize,
        window: &str,
    ) -> Result<Self> {
        let (name, database) = SLOT_TABLE[index];
        let number = u64::from_str_radix(window, 16)
            .map_err(|_| DalleError::invalid_input(format!("non-hex seed window {window:?}")))?;
        let factor = number as f64 / (1u64 << 24) as f64;
        let records = databases
            .get(database)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| DalleError::not_found(format!("database {database}")))?;
        let count = records.len() as u64;
        let selector = (count as f64 * factor) as u64;
        Ok(Self {
            database: database.to_string(),
            name: name.to_string(),
            bytes: window.to_string(),
            number,
            factor,
            count,
            selector,
            value: records[selector as usize].clone(),
        })
    }
}

/// Build the 64-character derivation seed from an address.
///
/// The hex body (any `0x` prefix stripped, lowercased) is concatenated
/// with its reverse; the result must be at least 66 characters before
/// being truncated to 64.
pub fn seed_from_address(address: &str) -> Result<String> {
    let base = address.split(',').next().unwrap_or_default().trim();
    let body = base.strip_prefix("0x").unwrap_or(base).to_lowercase();
    if !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DalleError::invalid_input(format!(
            "address {base:?} is not hexadecimal"
        )));
    }
    let reversed: String = body.chars().rev().collect();
    let seed = format!("{body}{reversed}");
    if seed.len() < 66 {
        return Err(DalleError::invalid_input("seed length is less than 66"));
    }
    Ok(seed[..64].to_string())
}

/// Walk the seed and derive the full ordered attribute list.
///
/// Bounds are guarded on both sides: the walk never reads past the seed
/// and never allocates more slots than the table defines.
pub fn derive_attributes(
    seed: &str,
    databases: &HashMap<String, Vec<String>>,
) -> Result<Vec<Attribute>> {
    let mut attribs = Vec::with_capacity(SLOT_COUNT);
    let mut slot = 0usize;
    let mut i = 0usize;
    while i + 6 <= seed.len() && slot < SLOT_COUNT {
        attribs.push(Attribute::new(databases, slot, &seed[i..i + 6])?);
        slot += 1;
        if slot < SLOT_COUNT && i + 4 + 6 <= seed.len() {
            attribs.push(Attribute::new(databases, slot, &seed[i + 4..i + 4 + 6])?);
            slot += 1;
        }
        i += 8;
    }
    Ok(attribs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dbs() -> HashMap<String, Vec<String>> {
        DATABASE_ORDER
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    vec![
                        "a".to_string(),
                        "b".to_string(),
                        "c".to_string(),
                        "d".to_string(),
                    ],
                )
            })
            .collect()
    }

    #[test]
    fn seed_law_holds_for_full_addresses() {
        let body = "0123456789abcdef".repeat(4);
        let addr = format!("0x{body}");
        let seed = seed_from_address(&addr).unwrap();
        let reversed: String = body.chars().rev().collect();
        let full = format!("{body}{reversed}");
        assert_eq!(seed, &full[..64]);
        assert_eq!(seed.len(), 64);
    }

    #[test]
    fn short_address_fails_with_seed_message() {
        let err = seed_from_address("0x1234").unwrap_err();
        assert!(matches!(err, DalleError::InvalidInput { .. }));
        assert!(err.to_string().contains("seed length is less than 66"));
    }

    #[test]
    fn non_hex_address_is_rejected() {
        let err = seed_from_address(&format!("0x{}", "zz".repeat(32))).unwrap_err();
        assert!(matches!(err, DalleError::InvalidInput { .. }));
    }

    #[test]
    fn zero_seed_selects_first_records() {
        let seed = "0".repeat(64);
        let attribs = derive_attributes(&seed, &dbs()).unwrap();
        assert_eq!(attribs.len(), SLOT_COUNT);
        assert_eq!(attribs[0].bytes, "000000");
        assert_eq!(attribs[0].number, 0);
        assert_eq!(attribs[0].factor, 0.0);
        assert_eq!(attribs[0].selector, 0);
        assert_eq!(attribs[0].value, "a");
    }

    #[test]
    fn slot_invariant_holds_for_arbitrary_seed() {
        let seed = "fedcba9876543210".repeat(4);
        let attribs = derive_attributes(&seed, &dbs()).unwrap();
        assert_eq!(attribs.len(), SLOT_COUNT);
        for (i, attr) in attribs.iter().enumerate() {
            assert_eq!(attr.name, SLOT_TABLE[i].0);
            assert_eq!(attr.database, SLOT_TABLE[i].1);
            assert!(attr.selector < attr.count);
        }
    }

    #[test]
    fn single_record_database_always_selected() {
        let mut databases = dbs();
        databases.insert("nouns".to_string(), vec!["none".to_string()]);
        for seed in ["f".repeat(64), "0".repeat(64), "a5".repeat(32)] {
            let attribs = derive_attributes(&seed, &databases).unwrap();
            assert_eq!(attribs[2].value, "none");
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let seed = "00112233445566778899aabbccddeeff".repeat(2);
        let a = derive_attributes(&seed, &dbs()).unwrap();
        let b = derive_attributes(&seed, &dbs()).unwrap();
        assert_eq!(a, b);
    }
}
