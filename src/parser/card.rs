use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::catalog::{CatalogVariant, TagSource};
use crate::error::FragmentError;

static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static DIV: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").unwrap());
static RATING_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rating-hsr-\d+").unwrap());

/// Values read off one popover before any normalization. `None` marks a
/// lookup that could not be resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCard {
    pub name: String,
    pub rarity: Option<String>,
    /// One per `variant.tags`, in the same order.
    pub tags: Vec<Option<String>>,
    /// Text of the rating slots selected by rarity, one per rating column.
    pub rating_texts: Vec<Option<String>>,
}

/// Read one popover's inner markup using the variant's field-position table.
pub fn extract(variant: &CatalogVariant, markup: &str) -> Result<RawCard, FragmentError> {
    let fragment = Html::parse_fragment(markup);

    let alts: Vec<Option<String>> = fragment
        .select(&IMG)
        .map(|img| {
            img.value()
                .attr("alt")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
        })
        .collect();

    if alts.len() < variant.min_images {
        return Err(FragmentError::TooFewImages {
            found: alts.len(),
            required: variant.min_images,
        });
    }

    let name = image_alt(&alts, variant.name_position)
        .ok_or(FragmentError::MissingName(variant.name_position))?;

    let rarity = find_rarity(variant, &fragment);
    let role = find_role(variant, &fragment);

    let tags = variant
        .tags
        .iter()
        .map(|field| match field.source {
            TagSource::Image(pos) => {
                let value = image_alt(&alts, pos);
                if value.is_none() {
                    debug!(name = %name, column = field.column, pos, "no image at position");
                }
                value
            }
            TagSource::Rarity => rarity.clone(),
            TagSource::Role => role.clone(),
        })
        .collect();

    let slots = rating_texts(&fragment);
    let range = variant.rating_slot_range(rarity.as_deref());
    if range.start >= slots.len() && !slots.is_empty() {
        debug!(name = %name, ?range, available = slots.len(), "rating slots out of range");
    }
    let rating_texts = range.map(|i| slots.get(i).cloned()).collect();

    Ok(RawCard {
        name,
        rarity,
        tags,
        rating_texts,
    })
}

fn image_alt(alts: &[Option<String>], pos: usize) -> Option<String> {
    alts.get(pos).cloned().flatten()
}

/// First marker class present in the fragment, in the variant's priority order.
fn find_rarity(variant: &CatalogVariant, fragment: &Html) -> Option<String> {
    let classes: Vec<&str> = fragment
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .flat_map(|el| el.value().classes())
        .collect();

    variant
        .rarity_markers
        .iter()
        .find(|(marker, _)| classes.contains(marker))
        .map(|(_, label)| label.to_string())
}

/// First role candidate that occurs anywhere in the flattened text.
fn find_role(variant: &CatalogVariant, fragment: &Html) -> Option<String> {
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    variant
        .role_candidates
        .iter()
        .find(|role| text.contains(**role))
        .map(|role| role.to_string())
}

/// Text of every `rating-hsr-N` div, in document order. Each text node is
/// trimmed before joining, so `T <span>1.5</span>` reads as `T1.5`.
fn rating_texts(fragment: &Html) -> Vec<String> {
    fragment
        .select(&DIV)
        .filter(|div| div.value().classes().any(|c| RATING_CLASS_RE.is_match(c)))
        .map(|div| div.text().map(str::trim).collect::<String>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{HSR_CHARACTERS, ZZZ_AGENTS};

    fn imgs(alts: &[&str]) -> String {
        alts.iter()
            .map(|a| format!(r#"<img src="x.webp" alt="{a}">"#))
            .collect()
    }

    fn ratings(values: &[&str]) -> String {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| format!(r#"<div class="rating-hsr-{i} tier">{v}</div>"#))
            .collect()
    }

    fn aela_markup() -> String {
        format!(
            r#"<div class="popover rar-5">{}<p>Role: Sustain</p>{}</div>"#,
            imgs(&["x", "Aela", "x", "x", "x", "x", "x", "Fire", "x", "Preservation"]),
            ratings(&["T3", "T4"]),
        )
    }

    #[test]
    fn hsr_popover_by_position() {
        let card = extract(&HSR_CHARACTERS, &aela_markup()).unwrap();
        assert_eq!(card.name, "Aela");
        assert_eq!(card.rarity.as_deref(), Some("5★"));
        assert_eq!(
            card.tags,
            vec![
                Some("5★".to_string()),
                Some("Fire".to_string()),
                Some("Preservation".to_string()),
                Some("Sustain".to_string()),
            ]
        );
        assert_eq!(
            card.rating_texts,
            vec![Some("T3".to_string()), Some("T4".to_string()), None]
        );
    }

    #[test]
    fn hsr_four_star_reads_second_slot_block() {
        let markup = format!(
            r#"<div class="rar-4">{}<span>DPS</span>{}</div>"#,
            imgs(&["x", "Kit", "x", "x", "x", "x", "x", "Ice", "x", "Hunt"]),
            ratings(&["T0", "T0", "T0", "T1", "T2", "T3"]),
        );
        let card = extract(&HSR_CHARACTERS, &markup).unwrap();
        assert_eq!(card.rarity.as_deref(), Some("4★"));
        assert_eq!(
            card.rating_texts,
            vec![Some("T1".into()), Some("T2".into()), Some("T3".into())]
        );
    }

    #[test]
    fn slot_block_past_the_end_is_all_unknown() {
        let markup = format!(
            r#"<div class="rar-4">{}{}</div>"#,
            imgs(&["x", "Kit", "x", "x", "x", "x", "x", "Ice"]),
            ratings(&["T0", "T1"]),
        );
        let card = extract(&HSR_CHARACTERS, &markup).unwrap();
        assert_eq!(card.rating_texts, vec![None, None, None]);
    }

    #[test]
    fn hsr_discards_short_popovers() {
        let markup = format!(r#"<div class="rar-5">{}</div>"#, imgs(&["x", "Aela", "x"]));
        let err = extract(&HSR_CHARACTERS, &markup).unwrap_err();
        assert!(matches!(
            err,
            FragmentError::TooFewImages { found: 3, required: 8 }
        ));
    }

    #[test]
    fn hsr_missing_trailing_position_is_unknown() {
        let markup = format!(
            r#"<div class="rar-5">{}</div>"#,
            imgs(&["x", "Aela", "x", "x", "x", "x", "x", "Fire"]),
        );
        let card = extract(&HSR_CHARACTERS, &markup).unwrap();
        assert_eq!(card.tags[1].as_deref(), Some("Fire"));
        assert_eq!(card.tags[2], None);
        assert_eq!(card.tags[3], None);
    }

    #[test]
    fn zzz_tolerates_short_popovers() {
        let markup = format!(
            r#"<div class="rar-S">{}<p>Stun</p>{}</div>"#,
            imgs(&["x", "Lycaon"]),
            ratings(&["T1", "N/A"]),
        );
        let card = extract(&ZZZ_AGENTS, &markup).unwrap();
        assert_eq!(card.name, "Lycaon");
        assert_eq!(
            card.tags,
            vec![Some("S".into()), None, None, None, Some("Stun".into())]
        );
        assert_eq!(card.rating_texts, vec![Some("T1".into()), Some("N/A".into())]);
    }

    #[test]
    fn zzz_full_popover() {
        let alts = [
            "x", "Ellen", "x", "x", "x", "x", "x", "Ice", "x", "x", "Attack", "x", "x",
            "Victoria Housekeeping",
        ];
        let markup = format!(
            r#"<div><span class="rar-S">S</span>{}<p>Role: DPS</p>{}</div>"#,
            imgs(&alts),
            ratings(&["T0", "T0.5"]),
        );
        let card = extract(&ZZZ_AGENTS, &markup).unwrap();
        assert_eq!(
            card.tags,
            vec![
                Some("S".into()),
                Some("Ice".into()),
                Some("Attack".into()),
                Some("Victoria Housekeeping".into()),
                Some("DPS".into()),
            ]
        );
    }

    #[test]
    fn rarity_marker_priority() {
        // Both markers present: the first listed marker wins.
        let markup = format!(
            r#"<div class="rar-S"><i class="rar-A"></i>{}</div>"#,
            imgs(&["x", "Anby"])
        );
        let card = extract(&ZZZ_AGENTS, &markup).unwrap();
        assert_eq!(card.rarity.as_deref(), Some("A"));
    }

    #[test]
    fn no_marker_or_role_is_unknown() {
        let markup = format!(r#"<div>{}<p>Defense</p></div>"#, imgs(&["x", "Ben"]));
        let card = extract(&ZZZ_AGENTS, &markup).unwrap();
        assert_eq!(card.rarity, None);
        assert_eq!(card.tags[0], None);
        assert_eq!(card.tags[4], None);
        assert_eq!(card.rating_texts, vec![None, None]);
    }

    #[test]
    fn role_priority_prefers_sub_dps() {
        let markup = format!(
            r#"<div class="rar-5">{}<p>Sub-DPS</p></div>"#,
            imgs(&["x", "Aela", "x", "x", "x", "x", "x", "Fire"]),
        );
        let card = extract(&HSR_CHARACTERS, &markup).unwrap();
        assert_eq!(card.tags[3].as_deref(), Some("Sub-DPS"));
    }

    #[test]
    fn missing_name_rejects_fragment() {
        let markup = r#"<div><img alt="x"><img src="y.webp"></div>"#;
        let err = extract(&ZZZ_AGENTS, markup).unwrap_err();
        assert!(matches!(err, FragmentError::MissingName(1)));
    }

    #[test]
    fn ignores_divs_without_rating_class() {
        let markup = format!(
            r#"<div class="rar-S">{}<div class="rating">T9</div>{}</div>"#,
            imgs(&["x", "Ellen"]),
            ratings(&["T2"]),
        );
        let card = extract(&ZZZ_AGENTS, &markup).unwrap();
        assert_eq!(card.rating_texts, vec![Some("T2".into()), None]);
    }

    #[test]
    fn rating_text_joins_trimmed_nodes() {
        let markup = format!(
            "<div class=\"rar-S\">{}<div class=\"rating-hsr-0\">T <span>1.5</span></div>\
             <div class=\"rating-hsr-1\">\n T<span> 2 </span>\n</div></div>",
            imgs(&["x", "Ellen"]),
        );
        let card = extract(&ZZZ_AGENTS, &markup).unwrap();
        assert_eq!(
            card.rating_texts,
            vec![Some("T1.5".to_string()), Some("T2".to_string())]
        );

        let entry = crate::parser::process_fragment(&ZZZ_AGENTS, &markup).unwrap();
        assert_eq!(entry.ratings, vec![Some(1.5), Some(2.0)]);
        assert_eq!(entry.average_rating, Some(1.75));
    }
}
