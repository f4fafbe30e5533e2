//! Textual reference rewriting across structural edits.
//!
//! Keeps formula text valid as whole rows/columns are inserted or
//! deleted. Only the text changes here; grid-key remapping and
//! re-evaluation happen afterward in the store.

use regex::Regex;

use crate::addr::col_label;
use crate::cell::CellMap;

/// A whole-row/column insertion or deletion pivoting at a 0-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralEdit {
    InsertRow,
    DeleteRow,
    InsertCol,
    DeleteCol,
}

/// Rewrite every formula cell's reference tokens for a structural edit.
///
/// Each `$COL$ROW`-shaped token is adjusted independently, with the `$`
/// markers pinning their own axis:
/// - insert: non-absolute coordinates at or past the pivot shift away;
/// - delete: non-absolute coordinates past the pivot shift back, and a
///   reference *at* the pivot becomes `#REF!` regardless of its markers.
///
/// Non-formula cells pass through untouched.
pub fn rewrite_references(
    cells: &CellMap,
    edit: StructuralEdit,
    index: usize,
    count: usize,
) -> CellMap {
    let re = Regex::new(r"(\$?)([A-Z]+)(\$?)([0-9]+)").unwrap();

    let mut next = CellMap::default();
    for (id, cell) in cells {
        if !cell.value.starts_with('=') {
            next.insert(id.clone(), cell.clone());
            continue;
        }

        let rewritten = re
            .replace_all(&cell.value, |caps: &regex::Captures| {
                let col_abs = &caps[1] == "$";
                let row_abs = &caps[3] == "$";
                let row_num: usize = match caps[4].parse() {
                    Ok(n) if n >= 1 => n,
                    // Row 0 (or overflow) is not a real reference
                    _ => return caps[0].to_string(),
                };
                let col = caps[2]
                    .chars()
                    .fold(0usize, |acc, c| acc * 26 + (c as usize - 'A' as usize + 1))
                    - 1;
                let row = row_num - 1;

                let mut new_col = col;
                let mut new_row = row;
                match edit {
                    StructuralEdit::InsertRow if !row_abs && row >= index => new_row += count,
                    StructuralEdit::DeleteRow if !row_abs && row > index => {
                        new_row = row.saturating_sub(count)
                    }
                    StructuralEdit::InsertCol if !col_abs && col >= index => new_col += count,
                    StructuralEdit::DeleteCol if !col_abs && col > index => {
                        new_col = col.saturating_sub(count)
                    }
                    _ => {}
                }

                // Deletion at the pivot invalidates the reference even when
                // the axis is absolute
                if edit == StructuralEdit::DeleteRow && row == index {
                    return "#REF!".to_string();
                }
                if edit == StructuralEdit::DeleteCol && col == index {
                    return "#REF!".to_string();
                }

                format!(
                    "{}{}{}{}",
                    &caps[1],
                    col_label(new_col),
                    &caps[3],
                    new_row + 1
                )
            })
            .into_owned();

        let mut cell = cell.clone();
        cell.value = rewritten;
        next.insert(id.clone(), cell);
    }

    next
}
