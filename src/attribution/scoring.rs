// src/attribution/scoring.rs
//! Additive confidence signals between one revenue event and one content item.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::model::{ContentItem, RevenueEvent};

pub const TIME_WEEK: f64 = 0.4;
pub const TIME_FORTNIGHT: f64 = 0.25;
pub const TIME_MONTH: f64 = 0.15;
pub const TOKEN_STEP: f64 = 0.1;
pub const TOKEN_CAP: f64 = 0.3;
pub const HASHTAG: f64 = 0.15;
pub const TRACKING: f64 = 0.4;

/// Per-signal contributions; `total` is their sum capped at 1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub time: f64,
    pub tokens: f64,
    pub hashtag: f64,
    pub tracking: f64,
    pub total: f64,
}

pub fn time_proximity(
    order_date: Option<NaiveDate>,
    posted_at: Option<DateTime<Utc>>,
    require_sale_after_post: bool,
) -> f64 {
    let (Some(sold), Some(posted)) = (order_date, posted_at) else {
        return 0.0;
    };
    let diff = (sold - posted.date_naive()).num_days();
    if require_sale_after_post && diff < 0 {
        return 0.0;
    }
    match diff.abs() {
        0..=7 => TIME_WEEK,
        8..=14 => TIME_FORTNIGHT,
        15..=30 => TIME_MONTH,
        _ => 0.0,
    }
}

/// Product-name tokens found inside the caption, 0.1 each, capped.
pub fn token_overlap(product_name: Option<&str>, caption: Option<&str>) -> f64 {
    let (Some(name), Some(caption)) = (product_name, caption) else {
        return 0.0;
    };
    let caption = caption.to_lowercase();
    let hits = name
        .to_lowercase()
        .split_whitespace()
        .filter(|t| caption.contains(t))
        .count();
    (TOKEN_STEP * hits as f64).min(TOKEN_CAP)
}

pub fn hashtag_correlation(product_name: Option<&str>, hashtags: &[String]) -> f64 {
    let Some(name) = product_name.map(str::to_lowercase) else {
        return 0.0;
    };
    if name.trim().is_empty() {
        return 0.0;
    }
    let hit = hashtags.iter().any(|h| {
        let tag = h.trim().trim_start_matches('#').to_lowercase();
        !tag.is_empty() && (name.contains(&tag) || tag.contains(&name))
    });
    if hit {
        HASHTAG
    } else {
        0.0
    }
}

pub fn tracking_correlation(tracking_id: Option<&str>, url: Option<&str>) -> f64 {
    match (tracking_id.map(str::trim), url) {
        (Some(t), Some(u)) if !t.is_empty() && u.to_lowercase().contains(&t.to_lowercase()) => {
            TRACKING
        }
        _ => 0.0,
    }
}

pub fn score(
    event: &RevenueEvent,
    content: &ContentItem,
    require_sale_after_post: bool,
) -> ScoreBreakdown {
    let time = time_proximity(event.order_date, content.posted_at, require_sale_after_post);
    let tokens = token_overlap(event.product_name.as_deref(), content.caption.as_deref());
    let hashtag = hashtag_correlation(event.product_name.as_deref(), &content.hashtags);
    let tracking = tracking_correlation(event.tracking_id.as_deref(), content.url.as_deref());
    ScoreBreakdown {
        time,
        tokens,
        hashtag,
        tracking,
        total: (time + tokens + hashtag + tracking).clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn time_bands() {
        let post = Some(at(2024, 3, 1));
        assert_eq!(time_proximity(day(2024, 3, 8), post, false), 0.4);
        assert_eq!(time_proximity(day(2024, 3, 9), post, false), 0.25);
        assert_eq!(time_proximity(day(2024, 3, 31), post, false), 0.15);
        assert_eq!(time_proximity(day(2024, 4, 1), post, false), 0.0);
        assert_eq!(time_proximity(None, post, false), 0.0);
    }

    #[test]
    fn sale_before_post_is_symmetric_unless_restricted() {
        let post = Some(at(2024, 3, 10));
        assert_eq!(time_proximity(day(2024, 3, 5), post, false), 0.4);
        assert_eq!(time_proximity(day(2024, 3, 5), post, true), 0.0);
        assert_eq!(time_proximity(day(2024, 3, 10), post, true), 0.4);
    }

    #[test]
    fn token_overlap_caps_at_three_tokens() {
        let cap = Some("my new linen duvet cover set from the shop");
        assert!((token_overlap(Some("Linen Duvet"), cap) - 0.2).abs() < 1e-9);
        assert!((token_overlap(Some("linen duvet cover set"), cap) - 0.3).abs() < 1e-9);
        assert_eq!(token_overlap(Some("ceramic mug"), cap), 0.0);
        assert_eq!(token_overlap(None, cap), 0.0);
    }

    #[test]
    fn hashtags_ignore_hash_and_empties() {
        let tags = vec!["#Linen".to_string(), "".to_string(), "#".to_string()];
        assert_eq!(hashtag_correlation(Some("Linen Sheet Set"), &tags), 0.15);
        assert_eq!(hashtag_correlation(Some("Mug"), &tags), 0.0);
        assert_eq!(hashtag_correlation(Some(""), &tags), 0.0);
    }

    #[test]
    fn tracking_is_case_insensitive_substring() {
        assert_eq!(
            tracking_correlation(Some("ABC123"), Some("https://shop.test/p?tag=abc123")),
            0.4
        );
        assert_eq!(tracking_correlation(Some(""), Some("https://x")), 0.0);
        assert_eq!(tracking_correlation(Some("abc"), None), 0.0);
    }
}
