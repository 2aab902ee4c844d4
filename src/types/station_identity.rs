use mysql::*;
use mysql::prelude::*;

/// One observed (raw station, raw line) spelling together with its canonical form.
#[derive(Clone, Debug, PartialEq)]
pub struct StationIdentity {
    pub station_name_raw: String,
    pub line_name_raw: String,
    pub station_name_std: String,
    pub line_code: String,
    pub is_transfer: bool,
}

impl FromRow for StationIdentity {
    fn from_row_opt(row: Row) -> std::result::Result<Self, FromRowError> {
        Ok(StationIdentity {
            station_name_raw: row.get::<String, _>(0).unwrap(),
            line_name_raw: row.get::<String, _>(1).unwrap(),
            station_name_std: row.get::<String, _>(2).unwrap(),
            line_code: row.get::<String, _>(3).unwrap(),
            is_transfer: row.get::<bool, _>(4).unwrap(),
        })
    }
}
