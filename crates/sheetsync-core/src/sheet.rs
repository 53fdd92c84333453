//! The per-sheet cell/undo/selection state and its transactional lock.

use crate::formula::{circular_depend, valid_formula};
use crate::cell::valid_cell_name;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, MutexGuard};

/// One client's claim on a cell: the display name it is editing under, and
/// its session id.
pub type Selector = (String, u64);

/// The mutable guts of a sheet. Every field is only ever touched while the
/// owning [`Sheet`]'s lock is held.
#[derive(Debug, Default)]
pub struct SheetState {
    cells: FxHashMap<String, Vec<String>>,
    undo_stack: Vec<(String, String)>,
    selections: FxHashMap<String, Vec<Selector>>,
}

impl SheetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cell's history, creating an empty (`[""]`) entry if the
    /// cell has never been touched.
    fn history_mut(&mut self, cell_name: &str) -> &mut Vec<String> {
        self.cells
            .entry(cell_name.to_string())
            .or_insert_with(|| vec![String::new()])
    }

    fn current_contents(&mut self, cell_name: &str) -> String {
        self.history_mut(cell_name).last().cloned().unwrap_or_default()
    }

    /// Current (tail) contents of a cell, or empty string for unknown
    /// cell names and invalid cell names alike.
    pub fn get_cell(&mut self, cell_name: &str) -> String {
        if !valid_cell_name(cell_name) {
            return String::new();
        }
        self.current_contents(cell_name)
    }

    /// Attempts to set a cell's contents. Refuses the edit (returns
    /// `false`, no state changes) if the cell name is invalid, `user_id`
    /// does not hold the selection on this cell, the contents are a
    /// malformed formula, or the assignment would create a circular
    /// dependency.
    pub fn set_cell(&mut self, cell_name: &str, contents: &str, user_id: u64) -> bool {
        if !valid_cell_name(cell_name) {
            return false;
        }

        let correct_user = self
            .selections
            .get(cell_name)
            .is_some_and(|sel| sel.iter().any(|(_, id)| *id == user_id));
        if !correct_user {
            return false;
        }

        if contents.starts_with('=') && !valid_formula(cell_name, contents) {
            return false;
        }

        if circular_depend(cell_name, contents, |name| self.current_contents(name)) {
            return false;
        }

        let prior = self.current_contents(cell_name);
        self.undo_stack.push((cell_name.to_string(), prior));
        self.history_mut(cell_name).push(contents.to_string());
        true
    }

    /// Pops the cell back to its previous value. Refuses (returns `None`)
    /// if the cell name is invalid, there is no prior value to revert to,
    /// or reverting would itself create a circular dependency (checked
    /// against the value the cell is reverting *to*).
    pub fn revert_cell(&mut self, cell_name: &str) -> Option<String> {
        if !valid_cell_name(cell_name) {
            return None;
        }

        let history = self.history_mut(cell_name);
        if history.len() <= 1 {
            return None;
        }
        let reverting_to = history[history.len() - 2].clone();

        if circular_depend(cell_name, &reverting_to, |name| self.current_contents(name)) {
            return None;
        }

        let history = self.history_mut(cell_name);
        let previous_content = history.pop().expect("checked len > 1 above");
        self.undo_stack.push((cell_name.to_string(), previous_content));

        Some(self.current_contents(cell_name))
    }

    /// Pops the most recent edit off the undo stack, reapplies its prior
    /// value onto the cell's history, and returns `(cell_name,
    /// restored_contents)`.
    ///
    /// The undo stack records prior values, not a redo journal, so undoing
    /// must push the prior value back onto `cells` for state to stay
    /// consistent with what clients are told happened.
    pub fn undo(&mut self) -> Option<(String, String)> {
        let (cell_name, prior) = self.undo_stack.pop()?;
        self.history_mut(&cell_name).push(prior.clone());
        Some((cell_name, prior))
    }

    /// Selects `cell_name` for `(client_name, client_id)`, clearing any
    /// previous selection this client held on `old_cell_name`.
    pub fn select_cell(
        &mut self,
        cell_name: &str,
        client_name: &str,
        client_id: u64,
        old_cell_name: Option<&str>,
    ) -> bool {
        if !valid_cell_name(cell_name) {
            return false;
        }

        if let Some(old) = old_cell_name {
            self.deselect_cell(old, client_id);
        }

        self.selections
            .entry(cell_name.to_string())
            .or_default()
            .push((client_name.to_string(), client_id));
        true
    }

    pub fn deselect_cell(&mut self, cell_name: &str, client_id: u64) {
        if let Some(sel) = self.selections.get_mut(cell_name) {
            sel.retain(|(_, id)| *id != client_id);
        }
    }

    /// Drops every selection held by `client_id`, across all cells.
    /// Needed on disconnect, since a departing client's `current_cell`
    /// only tracks its last selection, not a full history of prior ones.
    pub fn deselect_all(&mut self, client_id: u64) {
        for sel in self.selections.values_mut() {
            sel.retain(|(_, id)| *id != client_id);
        }
    }

    pub fn all_cells(&self) -> Vec<(String, String)> {
        self.cells
            .iter()
            .map(|(name, hist)| (name.clone(), hist.last().cloned().unwrap_or_default()))
            .collect()
    }

    pub fn all_selects(&self) -> Vec<(String, Selector)> {
        self.selections
            .iter()
            .flat_map(|(cell, sels)| sels.iter().map(move |s| (cell.clone(), s.clone())))
            .collect()
    }

    pub(crate) fn cells(&self) -> &FxHashMap<String, Vec<String>> {
        &self.cells
    }

    /// Seeds a cell's history with a single persisted value. Used only
    /// while loading a sheet from disk at boot, before any client can
    /// observe the registry.
    pub fn set_initial_contents(&mut self, cell_name: &str, contents: String) {
        self.cells.insert(cell_name.to_string(), vec![contents]);
    }
}

/// A named sheet and the single lock serializing every operation on it.
///
/// Collapses what the reference implementation splits across three
/// mutexes (cell history, undo history, selections) into one, since no
/// sheet operation here ever touches only one of those fields.
pub struct Sheet {
    pub name: String,
    state: Mutex<SheetState>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(SheetState::new()),
        }
    }

    pub fn with_state(name: impl Into<String>, state: SheetState) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(state),
        }
    }

    /// Acquires the sheet lock. Callers that must broadcast a change
    /// under the same critical section (spec's lock-ordering requirement)
    /// should hold the returned guard through the broadcast rather than
    /// re-acquiring it.
    pub async fn lock(&self) -> MutexGuard<'_, SheetState> {
        self.state.lock().await
    }

    /// Runs a synchronous closure against the sheet's state under lock.
    /// Convenient for simple reads/mutations that don't need to hold the
    /// lock across a broadcast.
    pub async fn with_lock<R>(&self, f: impl FnOnce(&mut SheetState) -> R) -> R {
        let mut guard = self.state.lock().await;
        f(&mut guard)
    }
}
