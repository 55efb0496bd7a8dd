use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use shared::{inventory_item_ref, AlertRecord, FrequencyPolicy};

use crate::error::{StoreError, ValidationError};

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::alert_products)]
pub struct DbAlertProduct {
    pub id: i32,
    pub shop: String,
    pub product_id: String,
    pub variant_id: String,
    pub inventory_item: String,
    pub threshold: i32,
    pub alert_frequency: String,
    pub is_triggered: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::alert_products)]
pub struct NewAlertProduct {
    pub shop: String,
    pub product_id: String,
    pub variant_id: String,
    pub inventory_item: String,
    pub threshold: i32,
    pub alert_frequency: String,
    pub is_triggered: bool,
}

impl TryFrom<DbAlertProduct> for AlertRecord {
    type Error = StoreError;

    fn try_from(row: DbAlertProduct) -> Result<Self, Self::Error> {
        let frequency_policy = row
            .alert_frequency
            .parse::<FrequencyPolicy>()
            .map_err(|reason| StoreError::Corrupt { id: row.id, reason })?;

        if row.threshold < 0 {
            return Err(StoreError::Corrupt {
                id: row.id,
                reason: format!("negative threshold {}", row.threshold),
            });
        }

        Ok(Self {
            id: row.id,
            shop: row.shop,
            inventory_item_ref: row.inventory_item,
            threshold: row.threshold,
            frequency_policy,
            is_triggered: row.is_triggered,
        })
    }
}

/// A validated alert record that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlertRecord {
    pub shop: String,
    pub product_id: String,
    pub variant_id: String,
    pub inventory_item_ref: String,
    pub threshold: i32,
    pub frequency_policy: FrequencyPolicy,
}

impl From<NewAlertRecord> for NewAlertProduct {
    fn from(record: NewAlertRecord) -> Self {
        Self {
            shop: record.shop,
            product_id: record.product_id,
            variant_id: record.variant_id,
            inventory_item: record.inventory_item_ref,
            threshold: record.threshold,
            alert_frequency: record.frequency_policy.as_str().to_string(),
            is_triggered: false,
        }
    }
}

/// Alert record as submitted by the admin surface.
///
/// Unknown fields are rejected outright instead of being merged into the row.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AlertRecordDraft {
    pub shop: Option<String>,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub inventory_item: Option<String>,
    /// Form fields arrive as strings, API clients may send a number.
    pub threshold: Option<serde_json::Value>,
    pub alert_frequency: Option<String>,
}

impl AlertRecordDraft {
    pub fn validate(self) -> Result<NewAlertRecord, ValidationError> {
        let mut fields = BTreeMap::new();

        let threshold = match self.threshold.as_ref().map(threshold_text) {
            None | Some(None) => {
                fields.insert("threshold", "Threshold is required");
                None
            }
            Some(Some(text)) => match parse_threshold(&text) {
                Some(value) => Some(value),
                None => {
                    fields.insert("threshold", "Threshold must be a non-negative whole number");
                    None
                }
            },
        };

        let frequency_policy = match self.alert_frequency.as_deref().map(str::trim) {
            None | Some("") => {
                fields.insert("alertFrequency", "Alert frequency is required");
                None
            }
            Some(value) => match value.parse::<FrequencyPolicy>() {
                Ok(policy) => Some(policy),
                Err(_) => {
                    fields.insert("alertFrequency", "Invalid alert frequency");
                    None
                }
            },
        };

        let product_id = required(self.product_id, "productId", "Product is required", &mut fields);
        let inventory_item = required(
            self.inventory_item,
            "inventoryItem",
            "Inventory item is required",
            &mut fields,
        );
        let shop = required(self.shop, "shop", "Shop is required", &mut fields);

        match (shop, product_id, inventory_item, threshold, frequency_policy) {
            (Some(shop), Some(product_id), Some(inventory_item), Some(threshold), Some(frequency_policy))
                if fields.is_empty() =>
            {
                Ok(NewAlertRecord {
                    shop,
                    product_id,
                    variant_id: self.variant_id.unwrap_or_default(),
                    inventory_item_ref: inventory_item_ref(&inventory_item),
                    threshold,
                    frequency_policy,
                })
            }
            _ => Err(ValidationError { fields }),
        }
    }
}

fn required(
    value: Option<String>,
    field: &'static str,
    message: &'static str,
    fields: &mut BTreeMap<&'static str, &'static str>,
) -> Option<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            fields.insert(field, message);
            None
        }
    }
}

fn threshold_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts `0` or a whole number without leading zeros.
fn parse_threshold(text: &str) -> Option<i32> {
    let well_formed = text == "0"
        || (text.starts_with(|c: char| ('1'..='9').contains(&c))
            && text.chars().all(|c| c.is_ascii_digit()));
    if well_formed {
        text.parse().ok()
    } else {
        None
    }
}
