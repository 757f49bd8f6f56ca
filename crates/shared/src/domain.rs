use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Identifier of one site record. The backend accepts it either as text or
/// as a number, so it is carried as its display text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub String);

impl SiteId {
    /// Trims the raw input; `None` when nothing is left.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single scalar cell of a site record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Text shown in a read-only display slot.
    pub fn display_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(value) => value.to_string(),
            FieldValue::Number(number) => number_text(number),
            FieldValue::Text(text) => text.clone(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(FieldValue::Number)
            .unwrap_or(FieldValue::Null)
    }
}

/// Integers print as integers, floats in their shortest round-trip form
/// (`1200.0` prints as `1200`).
pub fn number_text(number: &serde_json::Number) -> String {
    if let Some(value) = number.as_i64() {
        return value.to_string();
    }
    if let Some(value) = number.as_u64() {
        return value.to_string();
    }
    match number.as_f64() {
        Some(value) => value.to_string(),
        None => number.to_string(),
    }
}

/// One site's rental/lease data: a flat field -> scalar mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteRecord(BTreeMap<String, FieldValue>);

impl SiteRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// Display text of a field, empty when the field is absent or null.
    pub fn text(&self, field: &str) -> String {
        self.get(field).map(FieldValue::display_text).unwrap_or_default()
    }

    pub fn site_id(&self) -> Option<SiteId> {
        SiteId::parse(&self.text(SITE_KEY))
    }
}

pub const SITE_KEY: &str = "site";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Identifier,
    Text,
    Number,
    Percentage,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Record key the slot reads from.
    pub field: &'static str,
    /// Slot name; differs from `field` only for the legacy `site_id` slot.
    pub slot: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn is_editable(&self) -> bool {
        self.kind != FieldKind::Identifier
    }
}

const fn def(
    field: &'static str,
    slot: &'static str,
    label: &'static str,
    kind: FieldKind,
) -> FieldDef {
    FieldDef {
        field,
        slot,
        label,
        kind,
    }
}

/// Display slots in render order.
pub const SITE_FIELDS: &[FieldDef] = &[
    def("site", "site", "Site", FieldKind::Identifier),
    def("site", "site_id", "Site ID", FieldKind::Identifier),
    def("store_name", "store_name", "Store Name", FieldKind::Text),
    def("region", "region", "Region", FieldKind::Text),
    def("div", "div", "Division", FieldKind::Text),
    def("manager", "manager", "Manager", FieldKind::Text),
    def("asst_manager", "asst_manager", "Asst. Manager", FieldKind::Text),
    def("executive", "executive", "Executive", FieldKind::Text),
    def("doo", "doo", "Date of Opening", FieldKind::Date),
    def("sqft", "sqft", "Sq. Ft.", FieldKind::Number),
    def("agreement_date", "agreement_date", "Agreement Date", FieldKind::Date),
    def(
        "rent_position_date",
        "rent_position_date",
        "Rent Position Date",
        FieldKind::Date,
    ),
    def(
        "rent_effective_date",
        "rent_effective_date",
        "Rent Effective Date",
        FieldKind::Date,
    ),
    def(
        "agreement_valid_upto",
        "agreement_valid_upto",
        "Agreement Valid Upto",
        FieldKind::Text,
    ),
    def("current_date", "current_date", "Current Date", FieldKind::Date),
    def("lease_period", "lease_period", "Lease Period", FieldKind::Number),
    def(
        "rent_free_period_days",
        "rent_free_period_days",
        "Rent Free Period (Days)",
        FieldKind::Number,
    ),
    def(
        "rent_effective_amount",
        "rent_effective_amount",
        "Rent Effective Amount",
        FieldKind::Number,
    ),
    def("present_rent", "present_rent", "Present Rent", FieldKind::Number),
    def("hike_percentage", "hike_percentage", "Hike %", FieldKind::Percentage),
    def("hike_year", "hike_year", "Hike Year", FieldKind::Number),
    def("rent_deposit", "rent_deposit", "Rent Deposit", FieldKind::Number),
    def("owner_name1", "owner_name1", "Owner Name 1", FieldKind::Text),
    def("owner_name2", "owner_name2", "Owner Name 2", FieldKind::Text),
    def("owner_name3", "owner_name3", "Owner Name 3", FieldKind::Text),
    def("owner_name4", "owner_name4", "Owner Name 4", FieldKind::Text),
    def("owner_name5", "owner_name5", "Owner Name 5", FieldKind::Text),
    def("owner_name6", "owner_name6", "Owner Name 6", FieldKind::Text),
    def("owner_mobile", "owner_mobile", "Owner Mobile", FieldKind::Text),
    def("current_date1", "current_date1", "Current Date 1", FieldKind::Date),
    def("validity_date", "validity_date", "Validity Date", FieldKind::Date),
    def("gst_number", "gst_number", "GST Number", FieldKind::Text),
    def("pan_number", "pan_number", "PAN Number", FieldKind::Text),
    def("tds_percentage", "tds_percentage", "TDS %", FieldKind::Number),
    def("mature", "mature", "Mature", FieldKind::Text),
    def("status", "status", "Status", FieldKind::Text),
    def("remarks", "remarks", "Remarks", FieldKind::Text),
];

/// Date-typed fields are recognised by name: anything containing `date`,
/// plus the date-of-opening column `doo`.
pub fn is_date_field(field: &str) -> bool {
    field.contains("date") || field == "doo"
}

/// Looks up the editable slot for a field name.
pub fn editable_field(field: &str) -> Result<&'static FieldDef, CatalogError> {
    SITE_FIELDS
        .iter()
        .find(|def| def.slot == field)
        .ok_or_else(|| CatalogError::UnknownField(field.to_string()))
        .and_then(|def| {
            if def.is_editable() {
                Ok(def)
            } else {
                Err(CatalogError::ReadOnlyField(field.to_string()))
            }
        })
}
