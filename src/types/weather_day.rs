use chrono::NaiveDate;
use mysql::*;
use mysql::prelude::*;

/// One day of observed weather for one city.
#[derive(Clone, Debug, PartialEq)]
pub struct WeatherDay {
    pub date: NaiveDate,
    pub city_code: String,
    pub is_rainy: bool,
    pub rain_mm: f32,
    pub avg_temp: Option<f32>,
}

impl WeatherDay {
    /// Builds a day from raw observations. A missing rain sum counts as 0 mm,
    /// and the average temperature is only defined when both extremes are known.
    pub fn from_observation(
        date: NaiveDate,
        city_code: &str,
        rain_sum: Option<f32>,
        temp_max: Option<f32>,
        temp_min: Option<f32>,
    ) -> Self {
        let rain_mm = rain_sum.unwrap_or(0.0);
        let avg_temp = match (temp_max, temp_min) {
            (Some(max), Some(min)) => Some((max + min) / 2.0),
            _ => None,
        };
        WeatherDay {
            date,
            city_code: String::from(city_code),
            is_rainy: rain_mm > 0.0,
            rain_mm,
            avg_temp,
        }
    }
}

impl FromRow for WeatherDay {
    fn from_row_opt(row: Row) -> std::result::Result<Self, FromRowError> {
        Ok(WeatherDay {
            date: NaiveDate::parse_from_str(&row.get::<String, _>(0).unwrap(), "%Y-%m-%d")
                .unwrap(),
            city_code: row.get::<String, _>(1).unwrap(),
            is_rainy: row.get::<bool, _>(2).unwrap(),
            rain_mm: row.get::<f32, _>(3).unwrap(),
            avg_temp: row.get_opt::<f32, _>(4).unwrap().ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rain_classification() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let wet = WeatherDay::from_observation(date, "SEOUL", Some(3.5), Some(28.0), Some(22.0));
        assert!(wet.is_rainy);
        assert_eq!(wet.rain_mm, 3.5);
        assert_eq!(wet.avg_temp, Some(25.0));

        let dry = WeatherDay::from_observation(date, "SEOUL", Some(0.0), Some(30.0), Some(20.0));
        assert!(!dry.is_rainy);

        // a missing rain sum is treated as no rain at all
        let unknown = WeatherDay::from_observation(date, "SEOUL", None, None, Some(20.0));
        assert!(!unknown.is_rainy);
        assert_eq!(unknown.rain_mm, 0.0);
        assert_eq!(unknown.avg_temp, None);
    }
}
