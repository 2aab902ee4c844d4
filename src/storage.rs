use std::collections::HashSet;

use mysql::prelude::*;
use mysql::*;

use crate::types::{ImpactReport, RidershipRecord, WeatherDay};
use crate::FnResult;

/// Creates all tables this tool works with. Runs on every start, so a fresh
/// database is usable without manual setup.
pub fn ensure_schema(conn: &mut PooledConn) -> FnResult<()> {
    conn.query_drop(
        r"CREATE TABLE IF NOT EXISTS `lost_items` (
            `item_id` VARCHAR(50) NOT NULL,
            `transport` VARCHAR(20) NOT NULL DEFAULT 'subway',
            `line` VARCHAR(50) NOT NULL DEFAULT '',
            `station` VARCHAR(100) NOT NULL DEFAULT '',
            `category` VARCHAR(50) NOT NULL DEFAULT '',
            `item_name` VARCHAR(200) NOT NULL DEFAULT '',
            `status` VARCHAR(50) NOT NULL DEFAULT 'registered',
            `is_received` BOOLEAN NOT NULL DEFAULT FALSE,
            `registered_at` DATETIME NULL,
            `received_at` DATETIME NULL,
            `description` TEXT NOT NULL,
            `storage_location` VARCHAR(200) NOT NULL DEFAULT '',
            `registrar_id` VARCHAR(100) NOT NULL DEFAULT '',
            `pickup_company_location` VARCHAR(200) NOT NULL DEFAULT '',
            `views` INT UNSIGNED NOT NULL DEFAULT 0,
            PRIMARY KEY (`item_id`)
        ) DEFAULT CHARSET=utf8mb4;",
    )?;

    conn.query_drop(
        r"CREATE TABLE IF NOT EXISTS `station_dict` (
            `station_name_raw` VARCHAR(100) NOT NULL,
            `line_name_raw` VARCHAR(100) NOT NULL,
            `station_name_std` VARCHAR(100) NOT NULL,
            `line_code` VARCHAR(20) NOT NULL,
            `is_transfer` BOOLEAN NOT NULL DEFAULT FALSE,
            PRIMARY KEY (`station_name_raw`, `line_name_raw`),
            INDEX `station_name_std` (`station_name_std`)
        ) DEFAULT CHARSET=utf8mb4;",
    )?;

    conn.query_drop(
        r"CREATE TABLE IF NOT EXISTS `ridership_daily` (
            `date` DATE NOT NULL,
            `line_code` VARCHAR(20) NOT NULL,
            `station_name_std` VARCHAR(100) NOT NULL,
            `boardings` INT UNSIGNED NOT NULL DEFAULT 0,
            `alightings` INT UNSIGNED NOT NULL DEFAULT 0,
            `total` INT UNSIGNED NOT NULL DEFAULT 0,
            PRIMARY KEY (`date`, `line_code`, `station_name_std`)
        ) DEFAULT CHARSET=utf8mb4;",
    )?;

    conn.query_drop(
        r"CREATE TABLE IF NOT EXISTS `weather_daily` (
            `date` DATE NOT NULL,
            `city_code` VARCHAR(50) NOT NULL DEFAULT 'SEOUL',
            `is_rainy` BOOLEAN NOT NULL DEFAULT FALSE,
            `rain_mm` FLOAT NOT NULL DEFAULT 0,
            `avg_temp` FLOAT NULL,
            PRIMARY KEY (`date`, `city_code`)
        ) DEFAULT CHARSET=utf8mb4;",
    )?;

    conn.query_drop(
        r"CREATE TABLE IF NOT EXISTS `rain_impact_reports` (
            `line_code` VARCHAR(20) NOT NULL,
            `station_name_std` VARCHAR(100) NOT NULL,
            `rain_impact_index` DOUBLE NOT NULL,
            `created_at` DATETIME NOT NULL,
            PRIMARY KEY (`line_code`, `station_name_std`)
        ) DEFAULT CHARSET=utf8mb4;",
    )?;

    Ok(())
}

pub fn all_ridership(conn: &mut PooledConn) -> FnResult<Vec<RidershipRecord>> {
    let records = conn.query(
        r"SELECT
            DATE_FORMAT(`date`, '%Y-%m-%d'),
            `line_code`,
            `station_name_std`,
            `boardings`,
            `alightings`,
            `total`
        FROM `ridership_daily`
        ORDER BY `date`, `line_code`, `station_name_std`;",
    )?;
    Ok(records)
}

pub fn weather_for_city(conn: &mut PooledConn, city_code: &str) -> FnResult<Vec<WeatherDay>> {
    let days = conn.exec(
        r"SELECT
            DATE_FORMAT(`date`, '%Y-%m-%d'),
            `city_code`,
            `is_rainy`,
            `rain_mm`,
            `avg_temp`
        FROM `weather_daily`
        WHERE `city_code` = :city_code
        ORDER BY `date`;",
        params! { "city_code" => city_code },
    )?;
    Ok(days)
}

/// The primary keys already present, used to tell adds from updates before an
/// upsert batch runs.
pub fn lost_item_ids(conn: &mut PooledConn) -> FnResult<HashSet<String>> {
    let ids: Vec<String> = conn.query(r"SELECT `item_id` FROM `lost_items`;")?;
    Ok(ids.into_iter().collect())
}

pub fn ridership_keys_for_date(
    conn: &mut PooledConn,
    date_string: &str,
) -> FnResult<HashSet<(String, String)>> {
    let keys: Vec<(String, String)> = conn.exec(
        r"SELECT `line_code`, `station_name_std` FROM `ridership_daily` WHERE `date` = :date;",
        params! { "date" => date_string },
    )?;
    Ok(keys.into_iter().collect())
}

pub fn weather_dates(conn: &mut PooledConn, city_code: &str) -> FnResult<HashSet<String>> {
    let dates: Vec<String> = conn.exec(
        r"SELECT DATE_FORMAT(`date`, '%Y-%m-%d') FROM `weather_daily` WHERE `city_code` = :city_code;",
        params! { "city_code" => city_code },
    )?;
    Ok(dates.into_iter().collect())
}

/// Persisted per-station reports, most affected first.
pub fn list_reports(conn: &mut PooledConn, line_code: Option<&str>) -> FnResult<Vec<ImpactReport>> {
    let reports = match line_code {
        Some(line_code) => conn.exec(
            r"SELECT
                `line_code`,
                `station_name_std`,
                `rain_impact_index`,
                DATE_FORMAT(`created_at`, '%Y-%m-%d %H:%i:%s')
            FROM `rain_impact_reports`
            WHERE `line_code` = :line_code
            ORDER BY `rain_impact_index` DESC, `line_code`, `station_name_std`;",
            params! { "line_code" => line_code },
        )?,
        None => conn.query(
            r"SELECT
                `line_code`,
                `station_name_std`,
                `rain_impact_index`,
                DATE_FORMAT(`created_at`, '%Y-%m-%d %H:%i:%s')
            FROM `rain_impact_reports`
            ORDER BY `rain_impact_index` DESC, `line_code`, `station_name_std`;",
        )?,
    };
    Ok(reports)
}

/// Line-wide aggregates, averaged over the persisted per-station reports.
pub fn line_reports(conn: &mut PooledConn) -> FnResult<Vec<ImpactReport>> {
    let averages: Vec<(String, f64)> = conn.query(
        r"SELECT `line_code`, AVG(`rain_impact_index`)
        FROM `rain_impact_reports`
        GROUP BY `line_code`
        ORDER BY AVG(`rain_impact_index`) DESC, `line_code`;",
    )?;
    Ok(averages
        .into_iter()
        .map(|(line_code, average)| ImpactReport {
            line_code,
            station_name_std: None,
            rain_impact_index: (average * 100.0).round() / 100.0,
            created_at: None,
        })
        .collect())
}
