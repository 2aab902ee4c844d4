use chrono::NaiveDate;
use mysql::*;
use mysql::prelude::*;

/// Daily boarding and alighting sums for one canonical station on one line.
#[derive(Clone, Debug, PartialEq)]
pub struct RidershipRecord {
    pub date: NaiveDate,
    pub line_code: String,
    pub station_name_std: String,
    pub boardings: u32,
    pub alightings: u32,
    pub total: u32,
}

impl RidershipRecord {
    pub fn new(
        date: NaiveDate,
        line_code: String,
        station_name_std: String,
        boardings: u32,
        alightings: u32,
    ) -> Self {
        RidershipRecord {
            date,
            line_code,
            station_name_std,
            boardings,
            alightings,
            total: boardings + alightings,
        }
    }
}

impl FromRow for RidershipRecord {
    fn from_row_opt(row: Row) -> std::result::Result<Self, FromRowError> {
        // the date column is selected as a '%Y-%m-%d' string, see storage::all_ridership
        Ok(RidershipRecord {
            date: NaiveDate::parse_from_str(&row.get::<String, _>(0).unwrap(), "%Y-%m-%d")
                .unwrap(),
            line_code: row.get::<String, _>(1).unwrap(),
            station_name_std: row.get::<String, _>(2).unwrap(),
            boardings: row.get::<u32, _>(3).unwrap(),
            alightings: row.get::<u32, _>(4).unwrap(),
            total: row.get::<u32, _>(5).unwrap(),
        })
    }
}
