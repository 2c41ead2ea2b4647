//! Flattens a [`Snapshot`] into the named readings a dashboard or home
//! automation bridge shows: one entity per reading, each with a stable id.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::snapshot::{CoverState, Snapshot, Supply, Tray};

const UNKNOWN_MODEL: &str = "Unknown Printer";

const MANUFACTURERS: &[(&str, &str)] = &[
    ("HP", "HP"),
    ("Hewlett-Packard", "HP"),
    ("Canon", "Canon"),
    ("Epson", "Epson"),
    ("Brother", "Brother"),
    ("Lexmark", "Lexmark"),
    ("Samsung", "Samsung"),
    ("Xerox", "Xerox"),
];

const SUPPLY_COLORS: &[(&str, [u8; 3])] = &[
    ("Black", [0, 0, 0]),
    ("Cyan", [0, 255, 255]),
    ("Magenta", [255, 0, 255]),
    ("Yellow", [255, 255, 0]),
    ("Gray", [128, 128, 128]),
    ("Grey", [128, 128, 128]),
    ("Light Cyan", [128, 255, 255]),
    ("Light Magenta", [255, 128, 255]),
    ("Photo", [128, 128, 255]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub unique_id: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub configuration_url: Option<String>,
}

impl DeviceIdentity {
    pub fn from_snapshot(snapshot: &Snapshot, host: &str) -> Self {
        let data = snapshot.data();
        let description = data.info.description.as_deref().unwrap_or_default();

        let model = model_from(description, data.info.location.as_deref());
        let name = if model == UNKNOWN_MODEL {
            host.to_string()
        } else {
            model.clone()
        };

        Self {
            unique_id: unique_id(snapshot, host),
            name,
            manufacturer: manufacturer_from(description).to_string(),
            model,
            serial_number: data.info.serial_number.clone(),
            configuration_url: data
                .web_interface_available
                .then(|| format!("http://{host}")),
        }
    }
}

fn model_from(description: &str, location: Option<&str>) -> String {
    if let Some((_, rest)) = description.split_once("PID:") {
        let end = rest.find([',', ';']).unwrap_or(rest.len());
        return rest[..end].trim().to_string();
    }
    match location {
        Some(location) if !location.is_empty() => location.to_string(),
        _ => UNKNOWN_MODEL.to_string(),
    }
}

fn manufacturer_from(description: &str) -> &'static str {
    MANUFACTURERS
        .iter()
        .find(|(keyword, _)| description.contains(keyword))
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

fn unique_id(snapshot: &Snapshot, host: &str) -> String {
    snapshot
        .data()
        .info
        .serial_number
        .clone()
        .unwrap_or_else(|| host.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub unique_id: String,
    /// Translation key, e.g. `status`, `black`, `tray_2`.
    pub key: String,
    /// Set only when no translation key describes the reading.
    pub name: Option<String>,
    pub icon: &'static str,
    pub value: Value,
    pub unit: Option<&'static str>,
    pub enabled_by_default: bool,
    pub diagnostic: bool,
    pub attributes: Map<String, Value>,
}

impl Entity {
    fn new(unique_id: String, key: impl Into<String>, icon: &'static str, value: Value) -> Self {
        Self {
            unique_id,
            key: key.into(),
            name: None,
            icon,
            value,
            unit: None,
            enabled_by_default: true,
            diagnostic: false,
            attributes: Map::new(),
        }
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }
}

/// Every entity for one device, in display order: status, cover, page
/// count, errors, display text, then one per supply and one per tray.
pub fn entities(snapshot: &Snapshot, host: &str) -> Vec<Entity> {
    let id = unique_id(snapshot, host);
    let mut out = vec![
        status_entity(snapshot, &id),
        cover_entity(snapshot, &id),
        page_count_entity(snapshot, &id),
        errors_entity(snapshot, &id),
        display_entity(snapshot, &id),
    ];
    out.extend(snapshot.data().supplies.iter().map(|s| supply_entity(snapshot, &id, s)));
    out.extend(snapshot.data().input_trays.iter().map(|t| tray_entity(snapshot, &id, t)));
    out
}

fn status_entity(snapshot: &Snapshot, id: &str) -> Entity {
    let data = snapshot.data();
    let value = if snapshot.is_online() {
        data.status.state.as_str()
    } else {
        "offline"
    };

    let mut entity = Entity::new(format!("{id}_status"), "status", "mdi:printer", json!(value));
    let info = &data.info;
    insert_some(&mut entity.attributes, "uptime", info.uptime);
    insert_some(&mut entity.attributes, "contact", info.contact.as_deref());
    insert_some(&mut entity.attributes, "location", info.location.as_deref());
    insert_some(&mut entity.attributes, "serial_number", info.serial_number.as_deref());
    insert_some(&mut entity.attributes, "description", info.description.as_deref());
    if !snapshot.is_online() {
        entity.attributes.insert("using_cached_data".into(), json!(true));
        insert_some(
            &mut entity.attributes,
            "offline_since",
            snapshot.offline_since().map(|t| t.to_rfc3339()),
        );
    }
    entity
}

fn cover_entity(snapshot: &Snapshot, id: &str) -> Entity {
    let state = snapshot.data().cover_status.state;
    let mut entity = Entity::new(
        format!("{id}_cover_status"),
        "cover_status",
        "mdi:printer-3d-nozzle-alert",
        json!(state.as_str()),
    );
    entity.enabled_by_default = state != CoverState::Unknown;
    entity
}

fn page_count_entity(snapshot: &Snapshot, id: &str) -> Entity {
    let pages = &snapshot.data().page_count;
    let mut entity = Entity::new(format!("{id}_page_count"), "page_count", "mdi:counter", json!(pages.total));
    entity.unit = Some("pages");
    insert_some(&mut entity.attributes, "color_pages", pages.color);
    insert_some(&mut entity.attributes, "black_and_white_pages", pages.black_and_white);
    mark_cached(snapshot, &mut entity.attributes);
    entity
}

fn errors_entity(snapshot: &Snapshot, id: &str) -> Entity {
    let value = snapshot.data().errors.as_deref().unwrap_or("none");
    let mut entity = Entity::new(format!("{id}_errors"), "errors", "mdi:alert", json!(value));
    entity.diagnostic = true;
    entity
}

fn display_entity(snapshot: &Snapshot, id: &str) -> Entity {
    let text = snapshot.data().display_text.as_deref().filter(|t| !t.is_empty());
    let mut entity = Entity::new(
        format!("{id}_display"),
        "display",
        "mdi:text-box",
        json!(text.unwrap_or("unknown")),
    );
    entity.diagnostic = true;
    entity.enabled_by_default = text.is_some();
    entity
}

fn supply_entity(snapshot: &Snapshot, id: &str, supply: &Supply) -> Entity {
    let mut entity = Entity::new(
        format!("{id}_supply_{}", supply.index),
        "supply",
        supply_icon(supply),
        json!(supply.percentage),
    );
    if supply.color.is_empty() || supply.color == "Unknown" {
        entity.name = Some(if supply.description.is_empty() {
            "Supply".to_string()
        } else {
            supply.description.clone()
        });
    } else {
        entity.key = supply.color.to_lowercase().replace(' ', "_");
    }
    entity.unit = Some("%");

    let attrs = &mut entity.attributes;
    attrs.insert("type".into(), json!(supply.kind));
    attrs.insert("color".into(), json!(supply.color));
    attrs.insert("description".into(), json!(supply.description));
    mark_cached(snapshot, attrs);
    if let Some((_, rgb)) = SUPPLY_COLORS.iter().find(|(name, _)| *name == supply.color) {
        attrs.insert("rgb_color".into(), json!(rgb));
    }
    entity
}

fn supply_icon(supply: &Supply) -> &'static str {
    if SUPPLY_COLORS.iter().any(|(name, _)| *name == supply.color) {
        return "mdi:water";
    }
    let kind = supply.kind.to_lowercase();
    if kind.contains("toner") || kind.contains("ink") {
        "mdi:water"
    } else if kind.contains("drum") || kind.contains("image") {
        "mdi:circle-outline"
    } else {
        "mdi:package-variant"
    }
}

fn tray_entity(snapshot: &Snapshot, id: &str, tray: &Tray) -> Entity {
    let tray_name = if tray.description.is_empty() {
        format!("Tray {}", tray.index)
    } else {
        tray.description.clone()
    };

    let mut entity = Entity::new(
        format!("{id}_tray_{}", tray.index),
        "tray",
        "mdi:tray",
        json!(tray.percentage),
    );
    let digits: String = tray_name.chars().filter(char::is_ascii_digit).collect();
    if tray_name.contains("Tray") && !digits.is_empty() {
        entity.key = format!("tray_{digits}");
    } else {
        entity.name = Some(tray_name);
    }
    entity.unit = Some("%");
    entity.enabled_by_default = tray.percentage.is_some();

    let attrs = &mut entity.attributes;
    attrs.insert("status".into(), json!(tray.status));
    attrs.insert("media_name".into(), json!(tray.media_name));
    attrs.insert("max_capacity".into(), json!(tray.max_capacity));
    attrs.insert("current_level".into(), json!(tray.current_level));
    mark_cached(snapshot, attrs);
    entity
}

fn mark_cached(snapshot: &Snapshot, attrs: &mut Map<String, Value>) {
    if snapshot.is_online() {
        return;
    }
    attrs.insert("using_cached_data".into(), json!(true));
    insert_some(attrs, "last_updated", snapshot.offline_since().map(|t| t.to_rfc3339()));
}

fn insert_some<T: Serialize>(attrs: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        attrs.insert(key.to_string(), json!(value));
    }
}
