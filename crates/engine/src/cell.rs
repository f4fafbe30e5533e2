use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::addr::parse_cell_id;

/// Opaque style bag. The core only merges and deletes keys; meaning is
/// assigned by the host layers.
pub type StyleMap = serde_json::Map<String, serde_json::Value>;

/// Sparse cell storage keyed by cell id; an absent key is an empty cell.
pub type CellMap = FxHashMap<String, CellData>;

/// A derived cell value: number or text.
///
/// The error sentinels ("#ERROR", "#REF!") are stored as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    /// Numeric view with the non-numeric→0 coercion rule.
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Text(s) => coerce_number(s),
        }
    }

    /// Display form: whole numbers print without a decimal point.
    pub fn to_text(&self) -> String {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Text(s) => s.clone(),
        }
    }
}

/// Parse a string as a number; non-numeric text coerces to 0.
pub fn coerce_number(s: &str) -> f64 {
    s.trim().parse().unwrap_or(0.0)
}

/// One cell: the raw entered text, its derived value, and styling.
///
/// `computed` is derived from `value` by the reevaluator and is never set
/// independently; `None` means the cell has not been through a sweep yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellData {
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed: Option<Value>,
    #[serde(default, skip_serializing_if = "StyleMap::is_empty")]
    pub style: StyleMap,
}

impl CellData {
    pub fn from_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }
}

/// Largest populated (column, row) over all well-formed keys.
///
/// Returns (0, 0) for an empty map, so the exported rectangle is never
/// degenerate.
pub fn used_extent(cells: &CellMap) -> (usize, usize) {
    let mut max_c = 0;
    let mut max_r = 0;
    for key in cells.keys() {
        if let Some(pos) = parse_cell_id(key) {
            max_c = max_c.max(pos.c);
            max_r = max_r.max(pos.r);
        }
    }
    (max_c, max_r)
}
