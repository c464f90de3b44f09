use serde::Serialize;
use tracing::{debug, info};

use super::embedded::RawItem;
use super::fields;

/// Field names in source order, before column normalization.
pub const FIELD_NAMES: [&str; 6] = ["Title", "Price", "Description", "Weight", "Rating", "NumReviews"];

/// One normalized product row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ItemRecord {
    pub title: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub weight: Option<f64>,
    pub rating: Option<f64>,
    pub num_reviews: i64,
}

impl ItemRecord {
    pub fn from_raw(item: &RawItem) -> ItemRecord {
        let title = item
            .field(&["name"])
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let price = fields::price_value(item.field(&["priceInfo", "linePrice"]));
        let description = fields::clean_description(item.field(&["shortDescription"]));
        let weight = fields::extract_weight(description.as_deref());
        let rating = fields::rating_value(item.field(&["rating", "averageRating"]));
        let num_reviews = fields::review_count(item.field(&["rating", "numberOfReviews"]));

        ItemRecord {
            title,
            price,
            description,
            weight,
            rating,
            num_reviews,
        }
    }

    fn is_complete(&self) -> bool {
        self.title.is_some() && self.price.is_some()
    }
}

/// The normalized product table for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<ItemRecord>,
}

impl ResultTable {
    pub fn empty() -> ResultTable {
        ResultTable {
            columns: normalized_columns(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn head(&self, n: usize) -> &[ItemRecord] {
        &self.rows[..n.min(self.rows.len())]
    }
}

/// Upper-case a source field name; `NumReviews` becomes `NUM_REVIEWS`.
pub fn normalize_column(name: &str) -> String {
    match name.to_uppercase().as_str() {
        "NUMREVIEWS" => "NUM_REVIEWS".to_string(),
        upper => upper.to_string(),
    }
}

fn normalized_columns() -> Vec<String> {
    FIELD_NAMES.iter().map(|n| normalize_column(n)).collect()
}

/// Raw items → table. Rating override runs before the incomplete-row drop.
pub fn transform(items: &[RawItem]) -> ResultTable {
    let mut rows: Vec<ItemRecord> = items.iter().map(ItemRecord::from_raw).collect();

    for row in rows.iter_mut().filter(|r| r.num_reviews == 0) {
        row.rating = None;
    }

    let before = rows.len();
    rows.retain(ItemRecord::is_complete);
    if rows.len() < before {
        debug!("Dropped {} items without title or price", before - rows.len());
    }

    info!("Transformed {} items into {} rows", items.len(), rows.len());
    ResultTable {
        columns: normalized_columns(),
        rows,
    }
}
