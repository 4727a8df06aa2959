//! The collection roster: which collections exist, where they live on
//! disk, which ones sync, and what an empty one looks like.

use serde_json::{json, Value};

/// Collections that participate in item-level sync, in the fixed order a
/// cycle walks them.
pub const SYNC_COLLECTIONS: [&str; 6] = [
    "products",
    "customers",
    "orders",
    "motoboys",
    "cashSessions",
    "settings",
];

/// Collections eligible for the first-device-wins bootstrap push when the
/// remote is empty. `settings` is excluded: a fresh remote keeps its own.
pub const BOOTSTRAP_COLLECTIONS: [&str; 5] =
    ["products", "customers", "orders", "motoboys", "cashSessions"];

/// File name for a collection, or `None` for unmapped names.
pub fn file_name(collection: &str) -> Option<&'static str> {
    match collection {
        "products" => Some("products.json"),
        "customers" => Some("customers.json"),
        "orders" => Some("orders.json"),
        "motoboys" => Some("motoboys.json"),
        "cashSessions" => Some("cashSessions.json"),
        "settings" => Some("settings.json"),
        "dashboard" => Some("dashboard.json"),
        _ => None,
    }
}

pub fn is_synced(collection: &str) -> bool {
    SYNC_COLLECTIONS.contains(&collection)
}

pub fn is_bootstrap(collection: &str) -> bool {
    BOOTSTRAP_COLLECTIONS.contains(&collection)
}

/// The default document written when a collection file is missing or
/// quarantined.
pub fn default_document(collection: &str) -> Value {
    match collection {
        "products" | "customers" | "orders" | "motoboys" | "cashSessions" => {
            json!({ "items": [], "meta": { "deleted": [] } })
        }
        "settings" => json!({
            "items": [
                { "id": "default", "storeName": "Main Counter" }
            ],
            "meta": { "deleted": [] }
        }),
        "dashboard" => json!({
            "stats": {
                "lastUpdate": null,
                "today": null,
                "topProducts": []
            }
        }),
        _ => json!({}),
    }
}
