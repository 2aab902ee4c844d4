mod batch_summary;
mod day_kind;
mod impact_report;
mod lost_item;
mod ridership_record;
mod station_identity;
mod weather_day;

pub use batch_summary::{BatchSummary, RowOutcome};
pub use day_kind::{DayKind, DayKindPair};
pub use impact_report::ImpactReport;
pub use lost_item::{ItemStatus, LostItem};
pub use ridership_record::RidershipRecord;
pub use station_identity::StationIdentity;
pub use weather_day::WeatherDay;
