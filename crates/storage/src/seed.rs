//! Synthetic dataset for the memory store
//!
//! Generates rows shaped like the land-registry table the scenarios were
//! designed against: a handful of communes, sale dates spread over
//! 2017..=2019, strictly positive values. The first rows cover every commune
//! once, so the groups and postal codes the scenarios default to always exist
//! whenever at least that many rows are requested.
//!
//! Generation is deterministic for a given `(rows, seed)` pair.

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use txanomaly_core::NewRecord;

/// `(code_commune, nom_commune, code_postal)`
pub const COMMUNES: &[(&str, &str, &str)] = &[
    ("01053", "Bourg-en-Bresse", "01000.0"),
    ("01344", "Saint-Vulbas", "01150.0"),
    ("51230", "Epernay", "51200.0"),
    ("51454", "Reims", "51100.0"),
    ("75115", "Paris 15e Arrondissement", "75015.0"),
    ("69123", "Lyon", "69003.0"),
    ("33063", "Bordeaux", "33000.0"),
];

const PROPERTY_KINDS: &[&str] = &[
    "Maison",
    "Appartement",
    "Dependance",
    "Local industriel. commercial ou assimile",
];

/// Days covered by generated sale dates (2017-01-01 ..= 2019-12-31)
const DATE_SPAN_DAYS: u64 = 1095;

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 1, 1).unwrap_or_default()
}

/// Generate `rows` records from `seed`.
pub fn generate(rows: usize, seed: u64) -> Vec<NewRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = first_day();

    (0..rows)
        .map(|i| {
            let (code, name, postal) = if i < COMMUNES.len() {
                COMMUNES[i]
            } else {
                COMMUNES[rng.gen_range(0..COMMUNES.len())]
            };
            let date = start
                .checked_add_days(Days::new(rng.gen_range(0..DATE_SPAN_DAYS)))
                .unwrap_or(start);
            let value: f64 = rng.gen_range(15_000.0..950_000.0);
            let kind = PROPERTY_KINDS[rng.gen_range(0..PROPERTY_KINDS.len())];

            NewRecord {
                mutation_ref: format!("{}-{}", date.format("%Y"), i + 1),
                date,
                value: (value * 100.0).round() / 100.0,
                group_code: code.to_string(),
                group_name: name.to_string(),
                postal_code: postal.to_string(),
                property_kind: kind.to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(generate(50, 7), generate(50, 7));
        assert_ne!(generate(50, 7), generate(50, 8));
    }

    #[test]
    fn test_every_commune_present() {
        let rows = generate(COMMUNES.len(), 1);
        for (code, _, postal) in COMMUNES {
            assert!(rows.iter().any(|r| r.group_code == *code && r.postal_code == *postal));
        }
    }

    #[test]
    fn test_values_positive_and_dates_in_range() {
        let end = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        for row in generate(500, 42) {
            assert!(row.value > 0.0);
            assert!(row.date >= first_day() && row.date < end);
        }
    }

    #[test]
    fn test_commune_name_is_consistent_per_code() {
        let rows = generate(300, 3);
        for (code, name, _) in COMMUNES {
            assert!(rows
                .iter()
                .filter(|r| r.group_code == *code)
                .all(|r| r.group_name == *name));
        }
    }
}
