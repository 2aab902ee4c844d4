use chrono::NaiveDateTime;
use mysql::*;
use mysql::prelude::*;

/// Computed rain impact for one station on one line, or for a whole line
/// when `station_name_std` is `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct ImpactReport {
    pub line_code: String,
    pub station_name_std: Option<String>,
    pub rain_impact_index: f64,
    pub created_at: Option<NaiveDateTime>,
}

impl FromRow for ImpactReport {
    fn from_row_opt(row: Row) -> std::result::Result<Self, FromRowError> {
        Ok(ImpactReport {
            line_code: row.get::<String, _>(0).unwrap(),
            station_name_std: Some(row.get::<String, _>(1).unwrap()),
            rain_impact_index: row.get::<f64, _>(2).unwrap(),
            created_at: row.get_opt::<String, _>(3).unwrap().ok().map(|text| {
                NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S").unwrap()
            }),
        })
    }
}
