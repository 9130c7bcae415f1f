pub mod card;
pub mod rating;

use crate::catalog::CatalogVariant;
use crate::db::CatalogEntry;
use crate::error::FragmentError;
use card::RawCard;

/// Two-step pipeline: popover markup → raw card → normalized entry.
pub fn process_fragment(
    variant: &CatalogVariant,
    markup: &str,
) -> Result<CatalogEntry, FragmentError> {
    let raw = card::extract(variant, markup)?;
    Ok(normalize(raw))
}

pub fn normalize(raw: RawCard) -> CatalogEntry {
    let ratings: Vec<Option<f64>> = raw
        .rating_texts
        .iter()
        .map(|t| t.as_deref().and_then(rating::parse_rating))
        .collect();
    let average_rating = rating::average(&ratings);

    CatalogEntry {
        name: raw.name,
        tags: raw.tags,
        ratings,
        average_rating,
    }
}
