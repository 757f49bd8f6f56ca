use shared::domain::{number_text, FieldKind, FieldValue, SiteId, SiteRecord, SITE_FIELDS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySlot {
    pub slot: &'static str,
    pub field: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub text: String,
}

/// Read-only rendering of one site record, one slot per catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordView {
    pub slots: Vec<DisplaySlot>,
}

impl RecordView {
    pub fn slot(&self, slot: &str) -> Option<&DisplaySlot> {
        self.slots.iter().find(|candidate| candidate.slot == slot)
    }

    pub fn text(&self, slot: &str) -> Option<&str> {
        self.slot(slot).map(|slot| slot.text.as_str())
    }

    /// The record key as shown on screen: the primary identifier slot, or
    /// the legacy one when the primary is blank.
    pub fn site_id(&self) -> Option<SiteId> {
        ["site", "site_id"]
            .into_iter()
            .filter_map(|slot| self.text(slot))
            .find_map(SiteId::parse)
    }
}

pub fn render_record(record: &SiteRecord) -> RecordView {
    let slots = SITE_FIELDS
        .iter()
        .map(|def| {
            let value = record.get(def.field);
            let text = match def.kind {
                FieldKind::Percentage => format_percentage(value),
                _ => value.map(FieldValue::display_text).unwrap_or_default(),
            };
            DisplaySlot {
                slot: def.slot,
                field: def.field,
                label: def.label,
                kind: def.kind,
                text,
            }
        })
        .collect();
    RecordView { slots }
}

/// `12.5` and `"12.5"` display as `12.5%`; text that is not a number is
/// shown as-is; null shows nothing.
pub fn format_percentage(value: Option<&FieldValue>) -> String {
    match value {
        None | Some(FieldValue::Null) => String::new(),
        Some(FieldValue::Number(number)) => format!("{}%", number_text(number)),
        Some(FieldValue::Text(text)) => match text.trim().parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => format!("{parsed}%"),
            _ => text.clone(),
        },
        Some(other) => other.display_text(),
    }
}

/// Rewrites `yyyy-mm-dd` as `dd-mm-yyyy`. Purely textual: anything that is
/// not three dash-separated parts led by a four-character year is returned
/// unchanged, and calendar validity is not checked.
pub fn normalize_date_input(value: &str) -> String {
    let parts: Vec<&str> = value.split('-').collect();
    match parts.as_slice() {
        [year, month, day] if year.len() == 4 => format!("{day}-{month}-{year}"),
        _ => value.to_string(),
    }
}
