// Delimited-text import/export
//
// Thin adapters between the store and delimited text: everything routes
// through dispatch/state, no grid logic lives here.

use tallygrid_engine::addr::cell_id;
use tallygrid_engine::cell::{used_extent, CellData, CellMap, Value};
use tallygrid_engine::store::{Action, SheetState, SpreadsheetStore};

/// Display form of one cell, honoring the style bag's "format" key
/// (currency/percent) the way the grid shows it.
pub fn format_cell_value(cell: Option<&CellData>) -> String {
    let Some(cell) = cell else {
        return String::new();
    };
    let Some(value) = &cell.computed else {
        return String::new();
    };
    match value {
        Value::Number(n) => match cell.style.get("format").and_then(|v| v.as_str()) {
            Some("currency") => format!("${:.2}", n),
            Some("percent") => format!("{:.1}%", n * 100.0),
            _ => value.to_text(),
        },
        Value::Text(s) => s.clone(),
    }
}

/// Export the populated rectangle of computed values as comma-delimited
/// text, quoting only where needed.
pub fn export(state: &SheetState) -> Result<String, String> {
    let (max_c, max_r) = used_extent(&state.cells);

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    for r in 0..=max_r {
        let record: Vec<String> = (0..=max_c)
            .map(|c| format_cell_value(state.cells.get(&cell_id(c, r))))
            .collect();
        writer.write_record(&record).map_err(|e| e.to_string())?;
    }

    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    let text = String::from_utf8(bytes).map_err(|e| e.to_string())?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

/// Parse delimited text into a LOAD_DATA payload. Row/column positions
/// come from the grid layout of the text; empty fields stay empty cells.
pub fn import(text: &str) -> Result<CellMap, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut cells = CellMap::default();
    for (r, record) in reader.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        for (c, field) in record.iter().enumerate() {
            if !field.is_empty() {
                cells.insert(cell_id(c, r), CellData::from_value(field));
            }
        }
    }
    Ok(cells)
}

/// Import delimited text and load it into the store.
pub fn load(store: &mut SpreadsheetStore, text: &str) -> Result<(), String> {
    let cells = import(text)?;
    store.dispatch(Action::LoadData(cells));
    Ok(())
}

/// Set a single cell's raw value through the store.
pub fn set_cell(store: &mut SpreadsheetStore, id: &str, value: &str) {
    store.dispatch(Action::SetCell {
        id: id.to_string(),
        value: value.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_positions_and_formulas() {
        let mut store = SpreadsheetStore::default();
        load(&mut store, "1,=A1*2\n,3").unwrap();

        let cells = &store.state().cells;
        assert_eq!(cells["A1"].value, "1");
        assert_eq!(cells["B1"].value, "=A1*2");
        assert_eq!(cells["B1"].computed, Some(Value::Number(2.0)));
        // Empty field stays an empty cell
        assert!(!cells.contains_key("A2"));
        assert_eq!(cells["B2"].value, "3");
    }

    #[test]
    fn test_import_quoted_fields() {
        let cells = import("\"a,b\",\"say \"\"hi\"\"\"").unwrap();
        assert_eq!(cells["A1"].value, "a,b");
        assert_eq!(cells["B1"].value, "say \"hi\"");
    }

    #[test]
    fn test_export_computed_rectangle() {
        let mut store = SpreadsheetStore::default();
        set_cell(&mut store, "A1", "1");
        set_cell(&mut store, "B1", "=A1*2");
        set_cell(&mut store, "A2", "note");

        // Rectangle is the full used extent, including the empty B2
        assert_eq!(export(store.state()).unwrap(), "1,2\nnote,");
    }

    #[test]
    fn test_export_quotes_only_when_needed() {
        let mut store = SpreadsheetStore::default();
        set_cell(&mut store, "A1", "a,b");
        set_cell(&mut store, "B1", "plain");
        assert_eq!(export(store.state()).unwrap(), "\"a,b\",plain");
    }

    #[test]
    fn test_export_honors_format_styles() {
        let mut store = SpreadsheetStore::default();
        set_cell(&mut store, "A1", "1234.5");
        set_cell(&mut store, "B1", "0.25");
        let mut updates = tallygrid_engine::cell::StyleMap::new();
        updates.insert("format".to_string(), serde_json::json!("currency"));
        store.dispatch(Action::Select {
            start: tallygrid_engine::addr::CellPos::new(0, 0),
            end: None,
        });
        store.dispatch(Action::Format { styles: updates });

        let mut percent = tallygrid_engine::cell::StyleMap::new();
        percent.insert("format".to_string(), serde_json::json!("percent"));
        store.dispatch(Action::Select {
            start: tallygrid_engine::addr::CellPos::new(1, 0),
            end: None,
        });
        store.dispatch(Action::Format { styles: percent });

        assert_eq!(export(store.state()).unwrap(), "$1234.50,25.0%");
    }

    #[test]
    fn test_round_trip_preserves_computed_values() {
        let mut store = SpreadsheetStore::default();
        load(&mut store, "1,=A1*2").unwrap();
        let text = export(store.state()).unwrap();
        assert_eq!(text, "1,2");

        // Re-importing the export yields the computed values as literals
        let mut second = SpreadsheetStore::default();
        load(&mut second, &text).unwrap();
        assert_eq!(second.state().cells["B1"].computed, Some(Value::Number(2.0)));
    }

    #[test]
    fn test_set_cell_adapter() {
        let mut store = SpreadsheetStore::default();
        set_cell(&mut store, "C3", "=PI()");
        assert_eq!(
            store.state().cells["C3"].computed,
            Some(Value::Number(std::f64::consts::PI))
        );
    }

    #[test]
    fn test_export_empty_sheet_is_single_empty_cell() {
        // The rectangle never degenerates below 1x1; a lone empty field
        // is written quoted so the record is not an empty line
        let store = SpreadsheetStore::default();
        assert_eq!(export(store.state()).unwrap(), "\"\"");
    }
}
