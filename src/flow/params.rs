use std::collections::BTreeSet;

use serde_json::{Map, Value};

/// Identifier of a parameter row; only meaningful inside one table.
pub type RowId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRow {
    pub key: String,
    pub value: String,
}

impl ParamRow {
    fn empty() -> Self {
        Self {
            key: String::new(),
            value: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.value.is_empty()
    }

    /// A value without a key is flagged. Advisory only.
    pub fn is_key_valid(&self) -> bool {
        !self.key.is_empty() || self.value.is_empty()
    }
}

/// Key/value argument editor for node and skill parameters.
///
/// Once [`ParameterTable::settle`] has run, exactly one empty row exists and
/// it is the last one. Clearing a row schedules a clean-up keyed by that row;
/// further edits of the same row reschedule it, and `settle` runs whatever is
/// pending.
#[derive(Debug, Clone)]
pub struct ParameterTable {
    rows: Vec<(RowId, ParamRow)>,
    next_id: RowId,
    /// Row ids in order of last edit, most recent last.
    touched: Vec<RowId>,
    pending: BTreeSet<RowId>,
}

impl Default for ParameterTable {
    fn default() -> Self {
        Self::from_arguments(&Map::new())
    }
}

impl ParameterTable {
    /// Build from stored arguments, plus the trailing empty row.
    pub fn from_arguments(args: &Map<String, Value>) -> Self {
        let mut table = Self {
            rows: Vec::new(),
            next_id: 0,
            touched: Vec::new(),
            pending: BTreeSet::new(),
        };
        for (key, value) in args {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            table.push_row(ParamRow {
                key: key.clone(),
                value,
            });
        }
        table.push_row(ParamRow::empty());
        table
    }

    fn push_row(&mut self, row: ParamRow) -> RowId {
        let id = self.next_id;
        self.next_id += 1;
        self.rows.push((id, row));
        id
    }

    fn row_mut(&mut self, id: RowId) -> Option<&mut ParamRow> {
        self.rows.iter_mut().find(|(i, _)| *i == id).map(|(_, r)| r)
    }

    pub fn row(&self, id: RowId) -> Option<&ParamRow> {
        self.rows.iter().find(|(i, _)| *i == id).map(|(_, r)| r)
    }

    /// Every row, empty ones included, in display order.
    pub fn values(&self) -> &[(RowId, ParamRow)] {
        &self.rows
    }

    /// Non-empty rows with a key, ready to persist.
    pub fn arguments(&self) -> Map<String, Value> {
        self.rows
            .iter()
            .filter(|(_, r)| !r.key.is_empty())
            .map(|(_, r)| (r.key.clone(), Value::String(r.value.clone())))
            .collect()
    }

    pub fn empty_rows(&self) -> usize {
        self.rows.iter().filter(|(_, r)| r.is_empty()).count()
    }

    /// Rows whose key is missing while a value is present.
    pub fn invalid_rows(&self) -> Vec<RowId> {
        self.rows
            .iter()
            .filter(|(_, r)| !r.is_key_valid())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Id of the row new input should go to.
    pub fn entry_row(&self) -> Option<RowId> {
        self.rows
            .iter()
            .rev()
            .find(|(_, r)| r.is_empty())
            .map(|(id, _)| *id)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn edit_key(&mut self, id: RowId, key: &str) -> bool {
        self.edit(id, |row| row.key = key.to_string())
    }

    pub fn edit_value(&mut self, id: RowId, value: &str) -> bool {
        self.edit(id, |row| row.value = value.to_string())
    }

    fn edit(&mut self, id: RowId, change: impl FnOnce(&mut ParamRow)) -> bool {
        let Some(row) = self.row_mut(id) else {
            return false;
        };
        let was_empty = row.is_empty();
        change(row);
        let now_empty = row.is_empty();

        self.touched.retain(|t| *t != id);
        self.touched.push(id);

        // rescheduled on every edit of the same row
        self.pending.remove(&id);
        if was_empty && !now_empty {
            self.push_row(ParamRow::empty());
        } else if now_empty {
            self.pending.insert(id);
        }
        true
    }

    /// Run pending clean-ups: keep a single empty row, the most recently
    /// edited one, and move it to the end.
    pub fn settle(&mut self) {
        self.pending.clear();
        if self.empty_rows() == 0 {
            self.push_row(ParamRow::empty());
            return;
        }

        let keep = self
            .touched
            .iter()
            .rev()
            .copied()
            .find(|id| self.row(*id).map(ParamRow::is_empty).unwrap_or(false))
            .or_else(|| self.entry_row());

        let mut kept = None;
        self.rows.retain(|(id, row)| {
            if !row.is_empty() {
                return true;
            }
            if Some(*id) == keep {
                kept = Some((*id, row.clone()));
            }
            false
        });
        if let Some(entry) = kept {
            self.rows.push(entry);
        }
        let live: BTreeSet<RowId> = self.rows.iter().map(|(id, _)| *id).collect();
        self.touched.retain(|id| live.contains(id));
    }
}
