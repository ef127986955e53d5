//! WooCommerce orders ↔ local `orders` table.
//!
//! Import carries the whole order summary over. Export pushes the local
//! status and customer note, which are the fields the local side owns once
//! an order exists in both places.

use serde_json::Value;

use crate::remote::remote_id_of;
use crate::sync::mapper::RecordMapper;
use crate::sync::types::{MappingResult, RecordMap, SyncError, SyncResult};

/// Remote status → local status.
const STATUS_MAP: &[(&str, &str)] = &[
    ("pending", "new"),
    ("processing", "in_progress"),
    ("on-hold", "on_hold"),
    ("completed", "completed"),
    ("cancelled", "cancelled"),
    ("refunded", "refunded"),
    ("failed", "failed"),
];

/// Local status for a WooCommerce status.
#[must_use]
pub fn local_status(remote: &str) -> Option<&'static str> {
    STATUS_MAP
        .iter()
        .find(|(r, _)| *r == remote)
        .map(|(_, l)| *l)
}

/// WooCommerce status for a local status.
#[must_use]
pub fn remote_status(local: &str) -> Option<&'static str> {
    STATUS_MAP
        .iter()
        .find(|(_, l)| *l == local)
        .map(|(r, _)| *r)
}

/// Mapper for the `orders` entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderMapper;

impl OrderMapper {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn billing_name(billing: &Value) -> Option<String> {
    let name = [billing.get("first_name"), billing.get("last_name")]
        .into_iter()
        .filter_map(text)
        .collect::<Vec<_>>()
        .join(" ");
    (!name.is_empty()).then_some(name)
}

fn billing_address(billing: &Value) -> Option<String> {
    let address = ["address_1", "address_2", "postcode", "city", "country"]
        .into_iter()
        .filter_map(|field| text(billing.get(field)))
        .collect::<Vec<_>>()
        .join(", ");
    (!address.is_empty()).then_some(address)
}

impl RecordMapper for OrderMapper {
    fn entity(&self) -> &str {
        "orders"
    }

    fn label(&self) -> &str {
        "order"
    }

    fn remote_resource(&self) -> &str {
        "orders"
    }

    fn remote_id_field(&self) -> &str {
        "woocommerce_id"
    }

    fn local_fields(&self) -> &[&str] {
        &["woocommerce_id", "status", "note", "modified_at"]
    }

    fn to_local(&self, remote: &RecordMap) -> SyncResult<MappingResult> {
        let id = remote_id_of(remote)
            .ok_or_else(|| SyncError::Mapping("order has no id".to_string()))?;
        let Some(status) = remote
            .get("status")
            .and_then(Value::as_str)
            .and_then(local_status)
        else {
            return Ok(MappingResult::Empty);
        };

        let mut local = RecordMap::new();
        local.insert("woocommerce_id".into(), Value::from(id));
        local.insert("status".into(), Value::from(status));

        let mut put = |column: &str, value: Option<String>| {
            if let Some(value) = value {
                local.insert(column.to_string(), Value::String(value));
            }
        };
        put("number", text(remote.get("number")));
        put("currency", text(remote.get("currency")));
        put("total", text(remote.get("total")));
        put("note", text(remote.get("customer_note")));
        if let Some(billing) = remote.get("billing") {
            put("customer_name", billing_name(billing));
            put("customer_email", text(billing.get("email")));
            put("billing_address", billing_address(billing));
        }

        Ok(MappingResult::from_record(local))
    }

    fn to_remote(&self, local: &RecordMap) -> SyncResult<MappingResult> {
        let Some(status) = local
            .get("status")
            .and_then(Value::as_str)
            .and_then(remote_status)
        else {
            return Ok(MappingResult::Empty);
        };

        let mut remote = RecordMap::new();
        remote.insert("status".into(), Value::from(status));
        if let Some(note) = text(local.get("note")) {
            remote.insert("customer_note".into(), Value::String(note));
        }
        Ok(MappingResult::from_record(remote))
    }
}
