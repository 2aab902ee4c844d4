use std::collections::hash_map::Entry;
use std::collections::HashMap;

use itertools::Itertools;
use mysql::prelude::*;
use mysql::*;

use crate::importer::batch::BatchedUpsert;
use crate::names::{normalize_line_code, normalize_station_name};
use crate::types::{RowOutcome, StationIdentity};
use crate::FnResult;

/// In-memory station dictionary, keyed by the raw (station, line) spelling as
/// it appears in the source feeds. Canonical names, line codes and transfer
/// flags are derived here and persisted to the `station_dict` table.
///
/// Consumers are expected to load, upsert all observed pairs, recompute the
/// transfer flags and persist before resolving anything against it.
pub struct StationDictionary {
    entries: HashMap<(String, String), StationIdentity>,
}

impl StationDictionary {
    pub fn new() -> Self {
        StationDictionary {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Registers one observed (raw station, raw line) pair. An existing entry
    /// gets its canonical fields refreshed, so corrections to the
    /// normalization rules propagate on the next run. Pairs with an empty
    /// component can never be resolved and are skipped.
    pub fn upsert_identity(&mut self, station_name_raw: &str, line_name_raw: &str) -> RowOutcome {
        let station_raw = station_name_raw.trim();
        let line_raw = line_name_raw.trim();
        if station_raw.is_empty() || line_raw.is_empty() {
            eprintln!(
                "Skipping station identity with empty component (station: {:?}, line: {:?}).",
                station_name_raw, line_name_raw
            );
            return RowOutcome::SkippedMissingField;
        }

        let station_name_std = normalize_station_name(station_raw);
        let line_code = normalize_line_code(line_raw);

        match self
            .entries
            .entry((String::from(station_raw), String::from(line_raw)))
        {
            Entry::Occupied(mut occupied) => {
                let identity = occupied.get_mut();
                identity.station_name_std = station_name_std;
                identity.line_code = line_code;
                RowOutcome::Updated
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StationIdentity {
                    station_name_raw: String::from(station_raw),
                    line_name_raw: String::from(line_raw),
                    station_name_std,
                    line_code,
                    is_transfer: false,
                });
                RowOutcome::Added
            }
        }
    }

    /// Recomputes is_transfer for every entry: a station is a transfer station
    /// when its canonical name appears with two or more distinct line codes.
    pub fn recompute_transfer_flags(&mut self) {
        let lines_by_station: HashMap<String, Vec<String>> = self
            .entries
            .values()
            .map(|identity| (identity.station_name_std.clone(), identity.line_code.clone()))
            .into_group_map();

        for identity in self.entries.values_mut() {
            let lines = &lines_by_station[&identity.station_name_std];
            identity.is_transfer = lines.iter().unique().count() >= 2;
        }
    }

    /// Exact lookup by raw (station, line) pair.
    pub fn resolve(&self, station_name_raw: &str, line_name_raw: &str) -> Option<&StationIdentity> {
        self.entries.get(&(
            String::from(station_name_raw.trim()),
            String::from(line_name_raw.trim()),
        ))
    }

    pub fn load(conn: &mut PooledConn) -> FnResult<Self> {
        let identities: Vec<StationIdentity> = conn.query(
            r"SELECT `station_name_raw`, `line_name_raw`, `station_name_std`, `line_code`, `is_transfer`
            FROM `station_dict`;",
        )?;

        let mut dictionary = StationDictionary::new();
        for identity in identities {
            dictionary.entries.insert(
                (
                    identity.station_name_raw.clone(),
                    identity.line_name_raw.clone(),
                ),
                identity,
            );
        }
        Ok(dictionary)
    }

    /// Writes all entries in one transaction. Existing rows get their
    /// canonical fields rewritten, new rows are inserted.
    pub fn persist(&self, conn: PooledConn) -> FnResult<()> {
        let mut batch = BatchedUpsert::new(
            "station_dict",
            conn,
            &[
                r"UPDATE `station_dict`
                SET
                    `station_name_std` = :station_name_std,
                    `line_code` = :line_code,
                    `is_transfer` = :is_transfer
                WHERE
                    `station_name_raw` = :station_name_raw AND
                    `line_name_raw` = :line_name_raw;",
                r"INSERT IGNORE INTO `station_dict` (
                    `station_name_raw`,
                    `line_name_raw`,
                    `station_name_std`,
                    `line_code`,
                    `is_transfer`
                ) VALUES (
                    :station_name_raw,
                    :line_name_raw,
                    :station_name_std,
                    :line_code,
                    :is_transfer
                );",
            ],
        )?;

        for identity in self
            .entries
            .values()
            .sorted_by_key(|identity| (identity.station_name_raw.clone(), identity.line_name_raw.clone()))
        {
            batch.add_parameter_set(Params::from(params! {
                "station_name_raw" => &identity.station_name_raw,
                "line_name_raw" => &identity.line_name_raw,
                "station_name_std" => &identity.station_name_std,
                "line_code" => &identity.line_code,
                "is_transfer" => identity.is_transfer
            }));
        }
        batch.write_to_database()
    }
}
