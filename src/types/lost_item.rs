use chrono::NaiveDateTime;

/// Canonical processing status of a lost item. The source feeds use many
/// spellings for the same state, so every ingestion path maps through here.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy)]
pub enum ItemStatus {
    Registered,
    Claimed,
    Discarded,
}

impl ItemStatus {
    /// Unknown raw values count as newly registered.
    pub fn from_raw(raw: &str) -> ItemStatus {
        match raw.trim() {
            "수령" | "수령완료" | "회수" | "claimed" | "returned" => ItemStatus::Claimed,
            "폐기" | "폐기/기타" | "discarded" => ItemStatus::Discarded,
            _ => ItemStatus::Registered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Registered => "registered",
            ItemStatus::Claimed => "claimed",
            ItemStatus::Discarded => "discarded",
        }
    }
}

/// One lost item as stored, fed either by the open API or by file import.
#[derive(Clone, Debug, PartialEq)]
pub struct LostItem {
    pub item_id: String,
    pub transport: String,
    pub line: String,
    pub station: String,
    pub category: String,
    pub item_name: String,
    pub status: ItemStatus,
    pub is_received: bool,
    pub registered_at: Option<NaiveDateTime>,
    pub received_at: Option<NaiveDateTime>,
    pub description: String,
    pub storage_location: String,
    pub registrar_id: String,
    pub pickup_company_location: String,
    pub views: u32,
}

impl LostItem {
    /// An item counts as received once it was claimed or a pickup time is known.
    pub fn derive_is_received(status: ItemStatus, received_at: Option<NaiveDateTime>) -> bool {
        status == ItemStatus::Claimed || received_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_status_from_raw() {
        assert_eq!(ItemStatus::from_raw("수령"), ItemStatus::Claimed);
        assert_eq!(ItemStatus::from_raw("수령완료"), ItemStatus::Claimed);
        assert_eq!(ItemStatus::from_raw("회수"), ItemStatus::Claimed);
        assert_eq!(ItemStatus::from_raw("returned"), ItemStatus::Claimed);
        assert_eq!(ItemStatus::from_raw("폐기"), ItemStatus::Discarded);
        assert_eq!(ItemStatus::from_raw("폐기/기타"), ItemStatus::Discarded);
        assert_eq!(ItemStatus::from_raw(" claimed "), ItemStatus::Claimed);
        assert_eq!(ItemStatus::from_raw("보관중"), ItemStatus::Registered);
        assert_eq!(ItemStatus::from_raw(""), ItemStatus::Registered);
    }

    #[test]
    fn test_derive_is_received() {
        let when = NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(LostItem::derive_is_received(ItemStatus::Claimed, None));
        assert!(LostItem::derive_is_received(ItemStatus::Registered, Some(when)));
        assert!(!LostItem::derive_is_received(ItemStatus::Registered, None));
        assert!(!LostItem::derive_is_received(ItemStatus::Discarded, None));
    }
}
