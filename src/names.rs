use regex::Regex;

lazy_static! {
    static ref LINE_NUMBER: Regex = Regex::new(r"(\d+)호선").unwrap(); // can't fail because our hard-coded regex is known to be ok
    static ref PAREN_GROUP: Regex = Regex::new(r"\(.*?\)").unwrap();
}

/// Maps a raw line label onto its canonical code: numbered lines like "2호선"
/// become "LINE2", everything else is uppercased with spaces and hyphens removed.
pub fn normalize_line_code(line_raw: &str) -> String {
    let trimmed = line_raw.trim();
    if let Some(captures) = LINE_NUMBER.captures(trimmed) {
        return format!("LINE{}", &captures[1]);
    }
    trimmed.to_uppercase().replace(' ', "").replace('-', "")
}

/// Strips every parenthesized group from a raw station name and trims the rest,
/// so "강남(2호선)" and "강남" resolve to the same canonical name.
pub fn normalize_station_name(name_raw: &str) -> String {
    PAREN_GROUP.replace_all(name_raw.trim(), "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_codes() {
        assert_eq!(normalize_line_code("2호선"), "LINE2");
        assert_eq!(normalize_line_code("9호선(연장)"), "LINE9");
        assert_eq!(normalize_line_code(" 14호선 "), "LINE14");
        assert_eq!(normalize_line_code("공항철도"), "공항철도");
        assert_eq!(normalize_line_code("gyeongui-jungang line"), "GYEONGUIJUNGANGLINE");
        assert_eq!(normalize_line_code(""), "");
    }

    #[test]
    fn test_station_names() {
        assert_eq!(normalize_station_name("강남(2호선)"), "강남");
        assert_eq!(normalize_station_name("서울역(1호선)(경부선)"), "서울역");
        assert_eq!(normalize_station_name("  역삼  "), "역삼");
        assert_eq!(normalize_station_name("강남"), "강남");
    }

    #[test]
    fn test_station_normalization_is_idempotent() {
        for raw in ["강남(2호선)", "서울역(1호선)(경부선)", " 역삼 ", "공덕", ""] {
            let once = normalize_station_name(raw);
            assert_eq!(normalize_station_name(&once), once);
        }
    }
}
