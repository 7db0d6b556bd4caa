use once_cell::sync::Lazy;
use prettytable::format::{FormatBuilder, LinePosition, LineSeparator, TableFormat};
use prettytable::{Cell, Row, Table};
use serde::Serialize;
use serde::ser::SerializeMap;

/// Boxed two-column layout for label/value summaries.
static TABLE_FORMAT: Lazy<TableFormat> = Lazy::new(|| {
    FormatBuilder::new()
        .column_separator('│')
        .borders('│')
        .separators(&[LinePosition::Top], LineSeparator::new('─', '┬', '┌', '┐'))
        .separators(
            &[LinePosition::Bottom],
            LineSeparator::new('─', '┴', '└', '┘'),
        )
        .padding(1, 1)
        .build()
});

/// Borderless layout used to put tables next to each other.
pub static CLEAN_FORMAT: Lazy<TableFormat> =
    Lazy::new(|| FormatBuilder::new().padding(0, 2).build());

#[derive(Debug)]
pub struct Entry {
    pub label: &'static str,
    pub value: String,
    pub json_label: &'static str,
    pub json_value: serde_json::Value,
}

/// Labeled values rendered as a terminal table or serialized as a JSON
/// object keyed by `json_label`.
#[derive(Debug)]
pub struct Metrics(pub Vec<Entry>);

impl Metrics {
    pub fn build_table(&self) -> String {
        let mut table = Table::new();
        table.set_format(*TABLE_FORMAT);
        for entry in &self.0 {
            table.add_row(Row::new(vec![
                Cell::new(entry.label),
                Cell::new(&entry.value),
            ]));
        }
        table.to_string()
    }
}

impl Serialize for Metrics {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in &self.0 {
            map.serialize_entry(entry.json_label, &entry.json_value)?;
        }
        map.end()
    }
}
