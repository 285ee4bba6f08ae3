// src/ingest/fields.rs
//! Tolerant field mapping from raw platform rows to [`RevenueEvent`].
//!
//! Export schemas are not contractually stable, so each logical field lists several raw
//! names in priority order. The first candidate that is present with a non-empty value wins.
//! Dotted candidates (`product.name`) walk into nested JSON objects.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::RowError;
use crate::ingest::normalize::{parse_currency, parse_date, parse_percentage, parse_quantity};
use crate::model::{Platform, RevenueEvent};

/// One raw row as retrieved (JSON object, CSV record or scraped cells).
pub type RawRecord = Map<String, Value>;

/// Candidate raw names per logical field, highest priority first.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    pub order_id: &'static [&'static str],
    pub product_name: &'static [&'static str],
    pub product_category: &'static [&'static str],
    pub quantity: &'static [&'static str],
    pub order_amount: &'static [&'static str],
    pub commission_amount: &'static [&'static str],
    pub commission_rate: &'static [&'static str],
    pub order_date: &'static [&'static str],
    pub tracking_id: &'static [&'static str],
    pub click_date: &'static [&'static str],
}

/// What to do with a row that carries no order id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingIdPolicy {
    /// The id is optional in this source; a row without one cannot be deduplicated, drop it.
    Drop,
    /// The source never has ids (DOM scrape); mint `{platform}_{millis}_{position}`.
    /// Such rows are duplicated by every re-scrape.
    Synthesize,
}

/// Context shared by every row of one retrieval.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    pub user_id: &'a str,
    pub platform: Platform,
    pub fields: &'a FieldMap,
    pub missing_id: MissingIdPolicy,
    /// Timestamp used for synthetic ids, fixed per run.
    pub run_millis: i64,
}

/// Result of mapping one row.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedRow {
    Event(Box<RevenueEvent>, IdSource),
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    Natural,
    Synthetic,
}

fn lookup<'r>(record: &'r RawRecord, path: &str) -> Option<&'r Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut cur = record.get(first)?;
    for p in parts {
        cur = cur.as_object()?.get(p)?;
    }
    Some(cur)
}

fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First non-empty candidate, as text.
pub fn extract(record: &RawRecord, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find_map(|c| lookup(record, c).and_then(value_text))
}

/// Map one raw row. `Err` means the row is malformed and must be skipped.
pub fn map_row(
    ctx: &RowContext<'_>,
    position: usize,
    record: &RawRecord,
) -> Result<MappedRow, RowError> {
    let f = ctx.fields;

    let (order_id, id_source) = match extract(record, f.order_id) {
        Some(id) => (id, IdSource::Natural),
        None => match ctx.missing_id {
            MissingIdPolicy::Drop => return Ok(MappedRow::Dropped),
            MissingIdPolicy::Synthesize => (
                format!("{}_{}_{}", ctx.platform, ctx.run_millis, position),
                IdSource::Synthetic,
            ),
        },
    };

    let quantity_raw = extract(record, f.quantity);
    let quantity =
        parse_quantity(quantity_raw.as_deref()).ok_or_else(|| RowError::InvalidField {
            field: "quantity",
            value: quantity_raw.clone().unwrap_or_default(),
        })?;

    let event = RevenueEvent {
        id: Uuid::new_v4(),
        user_id: ctx.user_id.to_string(),
        platform: ctx.platform,
        order_id,
        product_name: extract(record, f.product_name),
        product_category: extract(record, f.product_category),
        quantity,
        order_amount: extract(record, f.order_amount)
            .map(|s| parse_currency(&s))
            .unwrap_or(0.0),
        commission_amount: extract(record, f.commission_amount)
            .map(|s| parse_currency(&s))
            .unwrap_or(0.0),
        commission_rate: extract(record, f.commission_rate).map(|s| parse_percentage(&s)),
        order_date: extract(record, f.order_date).and_then(|s| parse_date(&s)),
        tracking_id: extract(record, f.tracking_id),
        click_date: extract(record, f.click_date).and_then(|s| parse_date(&s)),
        raw_payload: Value::Object(record.clone()),
        attributed_content_id: None,
    };

    Ok(MappedRow::Event(Box::new(event), id_source))
}
