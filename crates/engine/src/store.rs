//! Action-dispatch store.
//!
//! Owns one `SheetState`, applies actions one at a time, keeps undo
//! history and the replayable debug log, and notifies subscribers with
//! the full new state after every dispatch. There is no ambient
//! singleton: hosts construct a store and pass it by handle.

use chrono::Local;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::addr::{cell_id, parse_cell_id, CellPos};
use crate::cell::{CellMap, StyleMap};
use crate::formula::refs::{rewrite_references, StructuralEdit};
use crate::recalc::reevaluate;

pub const DEFAULT_ROWS: usize = 50;
pub const DEFAULT_COLS: usize = 26;

/// Selected rectangle. Corner order is whatever the host handed over;
/// `bounds()` normalizes on use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: CellPos,
    pub end: CellPos,
}

impl Selection {
    /// Normalized bounds: (min_c, max_c, min_r, max_r).
    pub fn bounds(&self) -> (usize, usize, usize, usize) {
        (
            self.start.c.min(self.end.c),
            self.start.c.max(self.end.c),
            self.start.r.min(self.end.r),
            self.start.r.max(self.end.r),
        )
    }

    pub fn is_single_cell(&self) -> bool {
        self.start.c == self.end.c && self.start.r == self.end.r
    }
}

/// Undo history entry: content and grid extent before a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub cells: CellMap,
    pub row_count: usize,
    pub col_count: usize,
}

/// The whole sheet: cells plus selection, sizing overrides, and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetState {
    pub cells: CellMap,
    pub selected: Option<Selection>,
    /// Active cell id; tracked separately from the selection bounds
    pub active_cell: Option<String>,
    pub col_widths: FxHashMap<usize, f64>,
    pub row_heights: FxHashMap<usize, f64>,
    pub row_count: usize,
    pub col_count: usize,
    pub history: Vec<Snapshot>,
    /// Index of the snapshot the next UNDO restores; −1 = floor
    pub history_index: isize,
}

impl SheetState {
    fn new(cells: CellMap) -> Self {
        Self {
            cells: reevaluate(&cells),
            selected: None,
            active_cell: None,
            col_widths: FxHashMap::default(),
            row_heights: FxHashMap::default(),
            row_count: DEFAULT_ROWS,
            col_count: DEFAULT_COLS,
            history: Vec::new(),
            history_index: -1,
        }
    }
}

/// Partial cell update for BULK_UPDATE; present fields replace the
/// existing ones wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleMap>,
}

/// Everything the store can be asked to do. Serializes as
/// `{"type": "...", "payload": ...}` so logged actions replay from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    SetCell {
        id: String,
        value: String,
    },
    /// Per-id patches; a `null` entry deletes the cell
    BulkUpdate {
        updates: FxHashMap<String, Option<CellPatch>>,
    },
    LoadData(CellMap),
    Select {
        start: CellPos,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<CellPos>,
    },
    NavigateTab {
        #[serde(default)]
        shift: bool,
    },
    NavigateEnter {
        #[serde(default)]
        shift: bool,
    },
    /// Merge styles over the selection; a `null` property deletes that key
    Format {
        styles: StyleMap,
    },
    ResizeCol {
        index: usize,
        width: f64,
    },
    ResizeRow {
        index: usize,
        height: f64,
    },
    InsertRow {
        index: usize,
    },
    DeleteRow {
        index: usize,
    },
    InsertCol {
        index: usize,
    },
    DeleteCol {
        index: usize,
    },
    Undo,
}

impl Action {
    /// Content and structural mutations enter undo history; selection,
    /// navigation, resize, and undo itself do not.
    fn records_history(&self) -> bool {
        !matches!(
            self,
            Action::Undo
                | Action::Select { .. }
                | Action::NavigateTab { .. }
                | Action::NavigateEnter { .. }
                | Action::ResizeCol { .. }
                | Action::ResizeRow { .. }
        )
    }
}

/// One dispatched action as recorded in the debug log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub time: String,
    #[serde(flatten)]
    pub action: Action,
}

/// Handle returned by `subscribe`; pass back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&SheetState)>;

pub struct SpreadsheetStore {
    state: SheetState,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    log: Vec<LogEntry>,
}

impl Default for SpreadsheetStore {
    fn default() -> Self {
        Self::new(CellMap::default())
    }
}

impl SpreadsheetStore {
    pub fn new(initial: CellMap) -> Self {
        Self {
            state: SheetState::new(initial),
            listeners: Vec::new(),
            next_subscription: 0,
            log: Vec::new(),
        }
    }

    /// Current state. Callers must treat the snapshot as read-only;
    /// all mutation goes through `dispatch`.
    pub fn state(&self) -> &SheetState {
        &self.state
    }

    /// Ordered debug log of every dispatch this session.
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Register a listener fired after every dispatch with the new state.
    pub fn subscribe(&mut self, listener: impl FnMut(&SheetState) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|(sid, _)| *sid != id);
    }

    /// Sole mutation entry point. Runs the transition to completion,
    /// then notifies every subscriber once with the new state.
    pub fn dispatch(&mut self, action: Action) {
        self.log.push(LogEntry {
            time: Local::now().format("%H:%M:%S").to_string(),
            action: action.clone(),
        });

        if action.records_history() {
            let keep = (self.state.history_index + 1) as usize;
            self.state.history.truncate(keep);
            self.state.history.push(Snapshot {
                cells: self.state.cells.clone(),
                row_count: self.state.row_count,
                col_count: self.state.col_count,
            });
            self.state.history_index = self.state.history.len() as isize - 1;
        }

        apply(&mut self.state, action);
        self.notify();
    }

    /// Rebuild state from a logged action sequence.
    ///
    /// Rejects non-array payloads up front. Otherwise: reset to a blank
    /// sheet, clear the log, detach subscribers, and replay each entry
    /// through normal dispatch. A malformed entry halts the replay and is
    /// reported, but subscribers are always reattached and notified with
    /// whatever state was reached; there is no rollback.
    pub fn replay_log(&mut self, entries: &serde_json::Value) -> Result<(), String> {
        let entries = entries
            .as_array()
            .ok_or_else(|| "replay log must be an array".to_string())?;

        self.state = SheetState::new(CellMap::default());
        self.log.clear();
        let detached = std::mem::take(&mut self.listeners);

        let mut result = Ok(());
        for (i, entry) in entries.iter().enumerate() {
            match serde_json::from_value::<Action>(entry.clone()) {
                Ok(action) => self.dispatch(action),
                Err(e) => {
                    result = Err(format!("invalid log entry {}: {}", i, e));
                    break;
                }
            }
        }

        self.listeners = detached;
        self.notify();
        result
    }

    fn notify(&mut self) {
        let state = &self.state;
        for (_, listener) in &mut self.listeners {
            listener(state);
        }
    }
}

fn apply(s: &mut SheetState, action: Action) {
    match action {
        Action::SetCell { id, value } => {
            let mut cell = s.cells.get(&id).cloned().unwrap_or_default();
            cell.value = value;
            s.cells.insert(id, cell);
            s.cells = reevaluate(&s.cells);
        }
        Action::BulkUpdate { updates } => {
            for (id, patch) in updates {
                match patch {
                    None => {
                        s.cells.remove(&id);
                    }
                    Some(patch) => {
                        let cell = s.cells.entry(id).or_default();
                        if let Some(value) = patch.value {
                            cell.value = value;
                        }
                        if let Some(style) = patch.style {
                            cell.style = style;
                        }
                    }
                }
            }
            s.cells = reevaluate(&s.cells);
        }
        Action::LoadData(cells) => {
            s.cells = reevaluate(&cells);
        }
        Action::Select { start, end } => {
            let end = end.unwrap_or(start);
            s.selected = Some(Selection { start, end });
            s.active_cell = Some(cell_id(start.c, start.r));
        }
        Action::NavigateTab { shift } => navigate_tab(s, shift),
        Action::NavigateEnter { shift } => navigate_enter(s, shift),
        Action::Format { styles } => {
            if let Some(sel) = s.selected {
                let (min_c, max_c, min_r, max_r) = sel.bounds();
                for r in min_r..=max_r {
                    for c in min_c..=max_c {
                        // Materialize so styling sticks to empty cells
                        let cell = s.cells.entry(cell_id(c, r)).or_default();
                        for (key, value) in &styles {
                            if value.is_null() {
                                cell.style.remove(key);
                            } else {
                                cell.style.insert(key.clone(), value.clone());
                            }
                        }
                    }
                }
            }
        }
        Action::ResizeCol { index, width } => {
            s.col_widths.insert(index, width);
        }
        Action::ResizeRow { index, height } => {
            s.row_heights.insert(index, height);
        }
        Action::InsertRow { index } => structural_edit(s, StructuralEdit::InsertRow, index),
        Action::DeleteRow { index } => structural_edit(s, StructuralEdit::DeleteRow, index),
        Action::InsertCol { index } => structural_edit(s, StructuralEdit::InsertCol, index),
        Action::DeleteCol { index } => structural_edit(s, StructuralEdit::DeleteCol, index),
        Action::Undo => {
            if s.history_index >= 0 {
                let snap = s.history[s.history_index as usize].clone();
                s.cells = snap.cells;
                s.row_count = snap.row_count;
                s.col_count = snap.col_count;
                s.history_index -= 1;
            }
        }
    }
}

/// TAB moves the active cell along the column axis. Inside a multi-cell
/// selection it wraps column-first to the next/previous row.
fn navigate_tab(s: &mut SheetState, shift: bool) {
    let (Some(active), Some(sel)) = (s.active_cell.as_deref(), s.selected) else {
        return;
    };
    let Some(current) = parse_cell_id(active) else {
        return;
    };

    if sel.is_single_cell() {
        let next_c = if shift {
            current.c.saturating_sub(1)
        } else {
            current.c + 1
        };
        if next_c >= s.col_count {
            s.col_count = next_c + 1;
        }
        s.active_cell = Some(cell_id(next_c, current.r));
        let pos = CellPos::new(next_c, current.r);
        s.selected = Some(Selection {
            start: pos,
            end: pos,
        });
    } else {
        let (min_c, max_c, min_r, max_r) = sel.bounds();
        let (min_c, max_c, min_r, max_r) =
            (min_c as isize, max_c as isize, min_r as isize, max_r as isize);
        let mut next_c = current.c as isize + if shift { -1 } else { 1 };
        let mut next_r = current.r as isize;
        if shift {
            if next_c < min_c {
                next_c = max_c;
                next_r -= 1;
                if next_r < min_r {
                    next_r = max_r;
                }
            }
        } else if next_c > max_c {
            next_c = min_c;
            next_r += 1;
            if next_r > max_r {
                next_r = min_r;
            }
        }
        s.active_cell = Some(cell_id(next_c as usize, next_r as usize));
    }
}

/// ENTER is TAB with the axes transposed: it moves along the row axis and
/// wraps row-first to the next/previous column.
fn navigate_enter(s: &mut SheetState, shift: bool) {
    let (Some(active), Some(sel)) = (s.active_cell.as_deref(), s.selected) else {
        return;
    };
    let Some(current) = parse_cell_id(active) else {
        return;
    };

    if sel.is_single_cell() {
        let next_r = current.r as isize + if shift { -1 } else { 1 };
        if next_r >= s.row_count as isize {
            s.row_count = (next_r + 3) as usize;
        }
        let next_r = next_r.max(0) as usize;
        s.active_cell = Some(cell_id(current.c, next_r));
        let pos = CellPos::new(current.c, next_r);
        s.selected = Some(Selection {
            start: pos,
            end: pos,
        });
    } else {
        let (min_c, max_c, min_r, max_r) = sel.bounds();
        let (min_c, max_c, min_r, max_r) =
            (min_c as isize, max_c as isize, min_r as isize, max_r as isize);
        let mut next_r = current.r as isize + if shift { -1 } else { 1 };
        let mut next_c = current.c as isize;
        if shift {
            if next_r < min_r {
                next_r = max_r;
                next_c -= 1;
                if next_c < min_c {
                    next_c = max_c;
                }
            }
        } else if next_r > max_r {
            next_r = min_r;
            next_c += 1;
            if next_c > max_c {
                next_c = min_c;
            }
        }
        s.active_cell = Some(cell_id(next_c as usize, next_r as usize));
    }
}

/// Structural edit pipeline: rewrite formula text, remap grid keys by the
/// shift rule (cells on a deleted row/column are dropped; unparseable
/// keys too), reevaluate, then adjust the grid extent (floored at 1).
fn structural_edit(s: &mut SheetState, edit: StructuralEdit, index: usize) {
    let rewritten = rewrite_references(&s.cells, edit, index, 1);

    let mut remapped = CellMap::default();
    for (id, cell) in rewritten {
        let Some(pos) = parse_cell_id(&id) else {
            continue;
        };
        let new_pos = match edit {
            StructuralEdit::InsertRow if pos.r >= index => Some(CellPos::new(pos.c, pos.r + 1)),
            StructuralEdit::DeleteRow if pos.r == index => None,
            StructuralEdit::DeleteRow if pos.r > index => Some(CellPos::new(pos.c, pos.r - 1)),
            StructuralEdit::InsertCol if pos.c >= index => Some(CellPos::new(pos.c + 1, pos.r)),
            StructuralEdit::DeleteCol if pos.c == index => None,
            StructuralEdit::DeleteCol if pos.c > index => Some(CellPos::new(pos.c - 1, pos.r)),
            _ => Some(pos),
        };
        if let Some(pos) = new_pos {
            remapped.insert(cell_id(pos.c, pos.r), cell);
        }
    }

    s.cells = reevaluate(&remapped);
    match edit {
        StructuralEdit::InsertRow => s.row_count += 1,
        StructuralEdit::DeleteRow => s.row_count = s.row_count.saturating_sub(1).max(1),
        StructuralEdit::InsertCol => s.col_count += 1,
        StructuralEdit::DeleteCol => s.col_count = s.col_count.saturating_sub(1).max(1),
    }
}
