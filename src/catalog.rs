use std::ops::Range;

use clap::ValueEnum;

/// Where a categorical column gets its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagSource {
    /// `alt` text of the image at this position in the popover.
    Image(usize),
    /// First matching rarity marker class.
    Rarity,
    /// First role candidate found in the popover text.
    Role,
}

#[derive(Debug, Clone, Copy)]
pub struct TagField {
    pub column: &'static str,
    pub source: TagSource,
}

/// Everything that differs between two tier-list catalogs. The pipeline
/// itself is shared; only this table changes when the page layout drifts.
#[derive(Debug)]
pub struct CatalogVariant {
    pub key: &'static str,
    pub title: &'static str,
    /// Storage table and export file stem.
    pub table: &'static str,
    pub source_url: &'static str,
    pub card_selector: &'static str,
    pub popover_selector: &'static str,
    pub name_position: usize,
    /// Popovers with fewer images are discarded. Zero means tolerant.
    pub min_images: usize,
    pub tags: &'static [TagField],
    /// (marker class, rarity label), scanned in order.
    pub rarity_markers: &'static [(&'static str, &'static str)],
    pub role_candidates: &'static [&'static str],
    pub rating_columns: &'static [&'static str],
    /// Rarity label → half-open range into the ordered rating elements.
    pub slot_ranges: &'static [(&'static str, Range<usize>)],
    pub default_slots: Range<usize>,
}

pub static ZZZ_AGENTS: CatalogVariant = CatalogVariant {
    key: "zzz",
    title: "Zenless Zone Zero agents",
    table: "agents",
    source_url: "https://www.prydwen.gg/zenless/characters/",
    card_selector: ".avatar-card",
    popover_selector: ".tippy-content",
    name_position: 1,
    min_images: 0,
    tags: &[
        TagField { column: "rank", source: TagSource::Rarity },
        TagField { column: "attribute", source: TagSource::Image(7) },
        TagField { column: "specialty", source: TagSource::Image(10) },
        TagField { column: "faction", source: TagSource::Image(13) },
        TagField { column: "role", source: TagSource::Role },
    ],
    rarity_markers: &[("rar-A", "A"), ("rar-S", "S")],
    role_candidates: &["DPS", "Stun", "Support"],
    rating_columns: &["sd_rating", "da_rating"],
    slot_ranges: &[("S", 0..2), ("A", 0..2)],
    default_slots: 0..2,
};

pub static HSR_CHARACTERS: CatalogVariant = CatalogVariant {
    key: "hsr",
    title: "Honkai: Star Rail characters",
    table: "characters",
    source_url: "https://www.prydwen.gg/star-rail/characters/",
    card_selector: ".avatar-card",
    popover_selector: ".tippy-content",
    name_position: 1,
    min_images: 8,
    tags: &[
        TagField { column: "rarity", source: TagSource::Rarity },
        TagField { column: "element", source: TagSource::Image(7) },
        TagField { column: "path", source: TagSource::Image(9) },
        TagField { column: "role", source: TagSource::Role },
    ],
    rarity_markers: &[("rar-5", "5★"), ("rar-4", "4★")],
    role_candidates: &["Sub-DPS", "DPS", "Amplifier", "Sustain"],
    rating_columns: &["moc_rating", "pf_rating", "as_rating"],
    slot_ranges: &[("5★", 0..3), ("4★", 3..6)],
    default_slots: 0..3,
};

/// Catalog selector for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Catalog {
    Zzz,
    Hsr,
}

impl Catalog {
    pub fn variant(self) -> &'static CatalogVariant {
        match self {
            Catalog::Zzz => &ZZZ_AGENTS,
            Catalog::Hsr => &HSR_CHARACTERS,
        }
    }
}

impl CatalogVariant {
    /// Which rating elements apply to a card of this rarity.
    pub fn rating_slot_range(&self, rarity: Option<&str>) -> Range<usize> {
        rarity
            .and_then(|r| self.slot_ranges.iter().find(|(label, _)| *label == r))
            .map(|(_, range)| range.clone())
            .unwrap_or_else(|| self.default_slots.clone())
    }

    /// Export/table column order: name, tags, ratings, average.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut cols = Vec::with_capacity(self.tags.len() + self.rating_columns.len() + 2);
        cols.push("name");
        cols.extend(self.tags.iter().map(|t| t.column));
        cols.extend(self.rating_columns.iter().copied());
        cols.push("average_rating");
        cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsr_slot_ranges_follow_rarity() {
        assert_eq!(HSR_CHARACTERS.rating_slot_range(Some("5★")), 0..3);
        assert_eq!(HSR_CHARACTERS.rating_slot_range(Some("4★")), 3..6);
        assert_eq!(HSR_CHARACTERS.rating_slot_range(None), 0..3);
        assert_eq!(HSR_CHARACTERS.rating_slot_range(Some("3★")), 0..3);
    }

    #[test]
    fn zzz_ranks_share_slots() {
        assert_eq!(ZZZ_AGENTS.rating_slot_range(Some("S")), 0..2);
        assert_eq!(ZZZ_AGENTS.rating_slot_range(Some("A")), 0..2);
        assert_eq!(ZZZ_AGENTS.rating_slot_range(None), 0..2);
    }

    #[test]
    fn slot_ranges_cover_every_rating_column() {
        for v in [&ZZZ_AGENTS, &HSR_CHARACTERS] {
            assert_eq!(v.default_slots.len(), v.rating_columns.len(), "{}", v.key);
            for (label, range) in v.slot_ranges {
                assert_eq!(range.len(), v.rating_columns.len(), "{} {}", v.key, label);
            }
            for (_, label) in v.rarity_markers {
                assert!(v.slot_ranges.iter().any(|(l, _)| l == label), "{} {}", v.key, label);
            }
        }
    }

    #[test]
    fn zzz_columns_match_export_layout() {
        assert_eq!(
            ZZZ_AGENTS.columns(),
            vec![
                "name", "rank", "attribute", "specialty", "faction", "role",
                "sd_rating", "da_rating", "average_rating",
            ]
        );
    }

    #[test]
    fn exactly_one_rarity_and_role_column() {
        for v in [&ZZZ_AGENTS, &HSR_CHARACTERS] {
            let rarity = v.tags.iter().filter(|t| t.source == TagSource::Rarity).count();
            let role = v.tags.iter().filter(|t| t.source == TagSource::Role).count();
            assert_eq!((rarity, role), (1, 1), "{}", v.key);
        }
    }
}
