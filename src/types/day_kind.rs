use std::ops::{Index, IndexMut};

/// Whether a calendar day had measurable rain.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy)]
pub enum DayKind {
    Rainy,
    Dry,
}

impl DayKind {
    pub fn of(is_rainy: bool) -> DayKind {
        if is_rainy {
            DayKind::Rainy
        } else {
            DayKind::Dry
        }
    }
}

/// Holds one value of type T for rainy days and one for dry days.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Default)]
pub struct DayKindPair<T> {
    pub rainy: T,
    pub dry: T,
}

impl<T> Index<DayKind> for DayKindPair<T> {
    type Output = T;

    fn index(&self, day_kind: DayKind) -> &Self::Output {
        match day_kind {
            DayKind::Rainy => &self.rainy,
            DayKind::Dry => &self.dry,
        }
    }
}

impl<T> IndexMut<DayKind> for DayKindPair<T> {
    fn index_mut(&mut self, day_kind: DayKind) -> &mut Self::Output {
        match day_kind {
            DayKind::Rainy => &mut self.rainy,
            DayKind::Dry => &mut self.dry,
        }
    }
}
