use std::fs::File;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use clap::ArgMatches;
use mysql::*;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_count, parse_count_text, Importer};
use crate::dictionary::StationDictionary;
use crate::fetch::{self, ApiRows};
use crate::importer::batch::BatchedUpsert;
use crate::types::{BatchSummary, ItemStatus, LostItem, RowOutcome};
use crate::{storage, ConfigError, FnResult};

const API_SERVICE: &str = "lostArticleInfo";
const API_PAGE_SIZE: u32 = 1000;

/// Bus operators whose depots show up as the pickup location of an item.
const BUS_COMPANIES: [&str; 11] = [
    "중부운수",
    "대진여객",
    "원버스",
    "상진운수",
    "성원여객",
    "보성운수",
    "동성교통",
    "도선여객",
    "선진운수",
    "남성교통",
    "삼양교통",
];

/// Taxi operators, same role as BUS_COMPANIES.
const TAXI_COMPANIES: [&str; 15] = [
    "삼이택시",
    "동화통운",
    "고려운수",
    "경일운수",
    "동도자동차",
    "안전한택시",
    "양평운수",
    "대진흥업",
    "승진통상",
    "백제운수",
    "삼익택시",
    "새한택시",
    "경서운수",
    "대하운수",
    "동성상운",
];

/// Placeholder values the upstream exports use for "no timestamp".
const JUNK_DATE_MARKERS: [&str; 5] = ["", "00:00.0", "0:00:00", "00:00", "0"];

const UPDATE_LOST_ITEM: &str = r"UPDATE `lost_items`
    SET
        `transport` = :transport,
        `line` = :line,
        `station` = :station,
        `category` = :category,
        `item_name` = :item_name,
        `status` = :status,
        `is_received` = :is_received,
        `registered_at` = :registered_at,
        `received_at` = :received_at,
        `description` = :description,
        `storage_location` = :storage_location,
        `registrar_id` = :registrar_id,
        `pickup_company_location` = :pickup_company_location,
        `views` = :views
    WHERE
        `item_id` = :item_id;";

const INSERT_LOST_ITEM: &str = r"INSERT IGNORE INTO `lost_items`
        (`item_id`, `transport`, `line`, `station`, `category`, `item_name`,
        `status`, `is_received`, `registered_at`, `received_at`, `description`,
        `storage_location`, `registrar_id`, `pickup_company_location`, `views`)
    VALUES
        (:item_id, :transport, :line, :station, :category, :item_name,
        :status, :is_received, :registered_at, :received_at, :description,
        :storage_location, :registrar_id, :pickup_company_location, :views);";

/// One raw row of the lost article service.
#[derive(Debug, Deserialize)]
struct RawLostItemRow {
    #[serde(default, rename = "LOST_MNG_NO")]
    item_id: String,
    #[serde(default, rename = "CSTD_PLC")]
    storage_place: String,
    #[serde(default, rename = "RCPL")]
    pickup_company: String,
    #[serde(default, rename = "LOST_KND")]
    category: String,
    #[serde(default, rename = "LOST_NM")]
    item_name: String,
    #[serde(default, rename = "LOST_STTS")]
    status: String,
    #[serde(default, rename = "REG_YMD")]
    registered_at: String,
    #[serde(default, rename = "RCV_YMD")]
    received_at: String,
    #[serde(default, rename = "LGS_DTL_CN")]
    description: String,
    #[serde(default, rename = "LOST_RGTR_ID")]
    registrar_id: String,
    #[serde(default, rename = "INQ_CNT")]
    views: Value,
}

/// One row of a CSV export. Either header generation may appear, and any
/// column other than item_id may be missing entirely.
#[derive(Debug, Deserialize)]
struct FileRow {
    #[serde(default, alias = "분실물SEQ")]
    item_id: Option<String>,
    #[serde(default, alias = "분실물상태")]
    status: Option<String>,
    #[serde(default, alias = "등록일자")]
    registered_at: Option<String>,
    #[serde(default, alias = "수령일자")]
    received_at: Option<String>,
    #[serde(default, alias = "유실물상세내용")]
    description: Option<String>,
    #[serde(default, alias = "보관장소")]
    storage_location: Option<String>,
    #[serde(default, alias = "분실물등록자ID")]
    registrar_id: Option<String>,
    #[serde(default, alias = "분실물명")]
    item_name: Option<String>,
    #[serde(default, alias = "분실물종류")]
    category: Option<String>,
    #[serde(default, alias = "수령위치(회사)")]
    pickup_company_location: Option<String>,
    #[serde(default, alias = "조회수")]
    views: Option<String>,
    #[serde(default)]
    transport: Option<String>,
    #[serde(default)]
    line: Option<String>,
    #[serde(default)]
    station: Option<String>,
}

pub struct LostItemImporter<'a> {
    importer: &'a Importer<'a>,
    args: &'a ArgMatches,
}

impl<'a> LostItemImporter<'a> {
    pub fn new(importer: &'a Importer<'a>, args: &'a ArgMatches) -> LostItemImporter<'a> {
        LostItemImporter { importer, args }
    }

    /// Imports the current page of the lost article service. The service
    /// sometimes answers with no rows at all, which is not an error.
    pub fn run_api(&self) -> FnResult<()> {
        let main = self.importer.main;
        let url = format!(
            "http://openapi.seoul.go.kr:8088/{}/json/{}/1/{}/",
            main.api_key, API_SERVICE, API_PAGE_SIZE
        );
        let body = fetch::fetch_json(&main.agent, &url, self.importer.verbose)?;
        let rows = match fetch::api_rows(&body, API_SERVICE) {
            ApiRows::Rows(rows) => rows,
            ApiRows::NoData(message) => {
                eprintln!("The lost article service sent no rows: {}", message);
                return Ok(());
            }
        };

        let mut summary = BatchSummary::new();
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: RawLostItemRow = match serde_json::from_value(row.clone()) {
                Ok(raw) => raw,
                Err(e) => {
                    eprintln!("Skipping unreadable lost item row: {}", e);
                    summary.record(RowOutcome::SkippedMissingField);
                    continue;
                }
            };
            match map_api_row(&raw) {
                Some(item) => items.push(item),
                None => summary.record(RowOutcome::SkippedMissingField),
            }
        }

        self.store_items(&items, &mut summary)?;
        println!("Lost items: {}.", summary);
        Ok(())
    }

    /// Imports a CSV export. Column headers may be the canonical English
    /// names or the Korean ones of the upstream export.
    pub fn run_file(&self) -> FnResult<()> {
        let path_text = self.args.get_one::<String>("file").unwrap(); // clap requires it
        let path = Path::new(path_text);
        if !path.exists() {
            return Err(Box::new(ConfigError::new(format!(
                "File not found: {}",
                path_text
            ))));
        }
        let mut reader = csv::Reader::from_reader(File::open(path)?);

        let headers = reader.headers()?.clone();
        if !headers
            .iter()
            .any(|header| header == "item_id" || header == "분실물SEQ")
        {
            return Err(Box::new(ConfigError::new(format!(
                "No item_id (분실물SEQ) column in {}. Found columns: {}",
                path_text,
                headers.iter().collect::<Vec<_>>().join(", ")
            ))));
        }

        let mut summary = BatchSummary::new();
        let mut items = Vec::new();
        for result in reader.deserialize() {
            let row: FileRow = match result {
                Ok(row) => row,
                Err(e) => {
                    eprintln!("Skipping unreadable line: {}", e);
                    summary.record(RowOutcome::SkippedMissingField);
                    continue;
                }
            };
            match map_file_row(&row) {
                Some(item) => items.push(item),
                None => summary.record(RowOutcome::SkippedMissingField),
            }
        }

        self.store_items(&items, &mut summary)?;
        println!("Lost items from {}: {}.", path_text, summary);
        Ok(())
    }

    /// Items that carry both a station and a line name feed the station
    /// dictionary, like ridership rows do. The dictionary pass commits on
    /// its own before the item batch.
    fn contribute_identities(&self, items: &[LostItem]) -> FnResult<()> {
        let pairs: Vec<(&str, &str)> = items
            .iter()
            .filter(|item| !item.station.is_empty() && !item.line.is_empty())
            .map(|item| (item.station.as_str(), item.line.as_str()))
            .collect();
        if pairs.is_empty() {
            return Ok(());
        }

        let main = self.importer.main;
        let mut conn = main.pool.get_conn()?;
        let mut dictionary = StationDictionary::load(&mut conn)?;
        for (station, line) in &pairs {
            dictionary.upsert_identity(station, line);
        }
        dictionary.recompute_transfer_flags();
        dictionary.persist(main.pool.get_conn()?)?;
        if self.importer.verbose {
            println!(
                "Station dictionary holds {} identities after the lost item pass.",
                dictionary.len()
            );
        }
        Ok(())
    }

    fn store_items(&self, items: &[LostItem], summary: &mut BatchSummary) -> FnResult<()> {
        self.contribute_identities(items)?;

        let main = self.importer.main;
        let mut conn = main.pool.get_conn()?;
        let known_ids = storage::lost_item_ids(&mut conn)?;
        let mut batch = BatchedUpsert::new(
            "lost_items",
            main.pool.get_conn()?,
            &[UPDATE_LOST_ITEM, INSERT_LOST_ITEM],
        )?;
        for item in items {
            summary.record(if known_ids.contains(&item.item_id) {
                RowOutcome::Updated
            } else {
                RowOutcome::Added
            });
            batch.add_parameter_set(Params::from(params! {
                "item_id" => item.item_id.clone(),
                "transport" => item.transport.clone(),
                "line" => item.line.clone(),
                "station" => item.station.clone(),
                "category" => item.category.clone(),
                "item_name" => item.item_name.clone(),
                "status" => item.status.as_str(),
                "is_received" => item.is_received,
                "registered_at" => item.registered_at.map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string()),
                "received_at" => item.received_at.map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string()),
                "description" => item.description.clone(),
                "storage_location" => item.storage_location.clone(),
                "registrar_id" => item.registrar_id.clone(),
                "pickup_company_location" => item.pickup_company_location.clone(),
                "views" => item.views
            }));
        }
        batch.write_to_database()?;
        Ok(())
    }
}

/// Decides which kind of transport an item came from. Subway items carry
/// their station in the storage place, bus and taxi items are recognized
/// by the operator that holds them.
fn classify_transport(storage_place: &str, pickup_company: &str) -> (&'static str, String) {
    if storage_place.ends_with('역') {
        return ("subway", storage_place.to_string());
    }
    if BUS_COMPANIES.contains(&pickup_company) {
        return ("bus", String::new());
    }
    if TAXI_COMPANIES.contains(&pickup_company) {
        return ("taxi", String::new());
    }
    ("etc", String::new())
}

/// Parses the loose timestamps of the upstream feeds. Placeholder values and
/// anything unparseable become None. Times of day are not preserved, the
/// exports are inconsistent about them anyway.
fn parse_loose_datetime(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if JUNK_DATE_MARKERS.contains(&trimmed) {
        return None;
    }
    let date_part = trimmed.split_whitespace().next()?.replace('/', "-");
    NaiveDate::parse_from_str(&date_part, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Maps one service row onto a LostItem. Rows without an id are unusable.
fn map_api_row(raw: &RawLostItemRow) -> Option<LostItem> {
    let item_id = raw.item_id.trim().to_string();
    if item_id.is_empty() {
        return None;
    }
    let storage_place = raw.storage_place.trim();
    let pickup_company = raw.pickup_company.trim();
    let (transport, station) = classify_transport(storage_place, pickup_company);
    let status = ItemStatus::from_raw(&raw.status);
    let registered_at = parse_loose_datetime(&raw.registered_at);
    let received_at = parse_loose_datetime(&raw.received_at);
    let storage_location = if storage_place.ends_with('역') {
        storage_place
    } else {
        pickup_company
    };

    Some(LostItem {
        item_id,
        transport: transport.to_string(),
        line: String::new(), // the article service does not carry line names
        station,
        category: raw.category.trim().to_string(),
        item_name: raw.item_name.trim().to_string(),
        status,
        is_received: LostItem::derive_is_received(status, received_at),
        registered_at,
        received_at,
        description: raw.description.trim().to_string(),
        storage_location: storage_location.to_string(),
        registrar_id: raw.registrar_id.trim().to_string(),
        pickup_company_location: pickup_company.to_string(),
        views: parse_count(&raw.views),
    })
}

/// Maps one CSV row onto a LostItem, filling the defaults the exports rely
/// on. Rows without an id are unusable.
fn map_file_row(row: &FileRow) -> Option<LostItem> {
    let item_id = field(&row.item_id);
    if item_id.is_empty() {
        return None;
    }
    let status = ItemStatus::from_raw(&field(&row.status));
    let registered_at = parse_loose_datetime(&field(&row.registered_at));
    let received_at = parse_loose_datetime(&field(&row.received_at));
    let transport = field_or(&row.transport, "subway");
    let category = field_or(&row.category, "기타");

    Some(LostItem {
        item_id,
        transport,
        line: field(&row.line),
        station: field(&row.station),
        category,
        item_name: field(&row.item_name),
        status,
        is_received: LostItem::derive_is_received(status, received_at),
        registered_at,
        received_at,
        description: field(&row.description),
        storage_location: field(&row.storage_location),
        registrar_id: field(&row.registrar_id),
        pickup_company_location: field(&row.pickup_company_location),
        views: parse_count_text(&field(&row.views)),
    })
}

fn field(value: &Option<String>) -> String {
    value.as_deref().unwrap_or("").trim().to_string()
}

fn field_or(value: &Option<String>, default: &str) -> String {
    let text = field(value);
    if text.is_empty() {
        default.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_transport() {
        assert_eq!(
            classify_transport("강남역", ""),
            ("subway", "강남역".to_string())
        );
        assert_eq!(
            classify_transport("차고지 보관소", "대진여객"),
            ("bus", String::new())
        );
        assert_eq!(classify_transport("", "삼이택시"), ("taxi", String::new()));
        assert_eq!(
            classify_transport("본부 창고", "무명회사"),
            ("etc", String::new())
        );
    }

    #[test]
    fn test_parse_loose_datetime() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_loose_datetime("2024-05-02"), Some(expected));
        assert_eq!(parse_loose_datetime("2024/05/02 14:30:00"), Some(expected));
        assert_eq!(parse_loose_datetime(" 2024-05-02 "), Some(expected));
        assert_eq!(parse_loose_datetime("00:00.0"), None);
        assert_eq!(parse_loose_datetime("0"), None);
        assert_eq!(parse_loose_datetime(""), None);
        assert_eq!(parse_loose_datetime("언젠가"), None);
    }

    #[test]
    fn test_map_api_row() {
        let raw: RawLostItemRow = serde_json::from_value(json!({
            "LOST_MNG_NO": "L2024-0001",
            "CSTD_PLC": "강남역",
            "RCPL": "동성교통",
            "LOST_KND": "지갑",
            "LOST_NM": "갈색 가죽지갑",
            "LOST_STTS": "수령",
            "REG_YMD": "2024/05/01",
            "RCV_YMD": "2024-05-02 09:10:00",
            "LGS_DTL_CN": "개찰구 앞에서 발견",
            "LOST_RGTR_ID": "staff01",
            "INQ_CNT": "17"
        }))
        .unwrap();
        let item = map_api_row(&raw).unwrap();

        assert_eq!(item.item_id, "L2024-0001");
        assert_eq!(item.transport, "subway");
        assert_eq!(item.station, "강남역");
        assert_eq!(item.line, "");
        assert_eq!(item.status, ItemStatus::Claimed);
        assert!(item.is_received);
        assert_eq!(item.storage_location, "강남역");
        assert_eq!(item.pickup_company_location, "동성교통");
        assert_eq!(item.views, 17);
        assert_eq!(
            item.registered_at,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(0, 0, 0)
        );
    }

    #[test]
    fn test_map_api_row_without_station() {
        let raw: RawLostItemRow = serde_json::from_value(json!({
            "LOST_MNG_NO": "L2024-0002",
            "CSTD_PLC": "본사 유실물센터",
            "RCPL": "삼이택시",
            "LOST_STTS": "보관중"
        }))
        .unwrap();
        let item = map_api_row(&raw).unwrap();

        assert_eq!(item.transport, "taxi");
        assert_eq!(item.station, "");
        assert_eq!(item.status, ItemStatus::Registered);
        assert!(!item.is_received);
        // not stored at a station, so the pickup company is the best location we have
        assert_eq!(item.storage_location, "삼이택시");
    }

    #[test]
    fn test_map_api_row_requires_an_id() {
        let raw: RawLostItemRow =
            serde_json::from_value(json!({ "CSTD_PLC": "강남역" })).unwrap();
        assert!(map_api_row(&raw).is_none());
    }

    #[test]
    fn test_map_file_row_defaults() {
        let mut reader = csv::Reader::from_reader("item_id\nL-1\n".as_bytes());
        let row: FileRow = reader.deserialize().next().unwrap().unwrap();
        let item = map_file_row(&row).unwrap();

        assert_eq!(item.item_id, "L-1");
        assert_eq!(item.transport, "subway");
        assert_eq!(item.category, "기타");
        assert_eq!(item.status, ItemStatus::Registered);
        assert!(!item.is_received);
        assert_eq!(item.views, 0);
        assert_eq!(item.registered_at, None);
    }

    #[test]
    fn test_file_rows_accept_korean_headers() {
        let csv_text = "분실물SEQ,분실물명,분실물상태,수령일자,조회수,station,line\n\
            7042,검정 우산,수령완료,2024-06-11,3,강남(2호선),2호선\n";
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let row: FileRow = reader.deserialize().next().unwrap().unwrap();
        let item = map_file_row(&row).unwrap();

        assert_eq!(item.item_id, "7042");
        assert_eq!(item.item_name, "검정 우산");
        assert_eq!(item.status, ItemStatus::Claimed);
        assert!(item.is_received);
        assert_eq!(item.views, 3);
        assert_eq!(item.station, "강남(2호선)");
        assert_eq!(item.line, "2호선");
    }
}
