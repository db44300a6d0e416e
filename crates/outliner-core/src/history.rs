use crate::store::{ChangeRecord, ChangeScope};

const DEFAULT_LIMIT: usize = 200;

#[derive(Clone, Debug, PartialEq)]
pub struct UndoGroup {
    pub scope: ChangeScope,
    pub records: Vec<ChangeRecord>,
}

/// Undo/redo stacks grouped by change scope.
///
/// Changes recorded while a group is open (see [`History::begin`]) land in
/// that group regardless of their own scope; the group takes the scope of
/// the outermost `begin`.
#[derive(Debug)]
pub struct History {
    undo: Vec<UndoGroup>,
    redo: Vec<UndoGroup>,
    open: Option<UndoGroup>,
    depth: usize,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }
}

impl History {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            open: None,
            depth: 0,
            limit: limit.max(1),
        }
    }

    pub fn begin(&mut self, scope: &ChangeScope) {
        if self.depth == 0 {
            self.open = Some(UndoGroup {
                scope: scope.clone(),
                records: Vec::new(),
            });
        }
        self.depth += 1;
    }

    pub fn end(&mut self) {
        if self.depth == 0 {
            return;
        }
        self.depth -= 1;
        if self.depth > 0 {
            return;
        }
        let Some(group) = self.open.take() else {
            return;
        };
        if group.records.is_empty() {
            return;
        }
        self.redo.retain(|pending| pending.scope != group.scope);
        self.undo.push(group);
        if self.undo.len() > self.limit {
            let overflow = self.undo.len() - self.limit;
            self.undo.drain(..overflow);
        }
    }

    pub fn record(&mut self, record: ChangeRecord) {
        if let Some(group) = self.open.as_mut() {
            group.records.push(record);
        }
    }

    pub fn take_undo(&mut self, scope: &ChangeScope) -> Option<UndoGroup> {
        let ix = self.undo.iter().rposition(|group| &group.scope == scope)?;
        Some(self.undo.remove(ix))
    }

    pub fn take_redo(&mut self, scope: &ChangeScope) -> Option<UndoGroup> {
        let ix = self.redo.iter().rposition(|group| &group.scope == scope)?;
        Some(self.redo.remove(ix))
    }

    pub fn push_redo(&mut self, group: UndoGroup) {
        self.redo.push(group);
    }

    pub fn push_undo(&mut self, group: UndoGroup) {
        self.undo.push(group);
    }

    pub fn can_undo(&self, scope: &ChangeScope) -> bool {
        self.undo.iter().any(|group| &group.scope == scope)
    }

    pub fn can_redo(&self, scope: &ChangeScope) -> bool {
        self.redo.iter().any(|group| &group.scope == scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BlockData, BlockId};

    fn record() -> ChangeRecord {
        ChangeRecord::Created {
            data: BlockData::new(BlockId::generate(), "tester", 0),
        }
    }

    #[test]
    fn nested_groups_collapse_into_outermost_scope() {
        let mut history = History::default();
        history.begin(&ChangeScope::DOCUMENT);
        history.record(record());
        history.begin(&ChangeScope::UI_STATE);
        history.record(record());
        history.end();
        history.end();

        assert!(!history.can_undo(&ChangeScope::UI_STATE));
        let group = history.take_undo(&ChangeScope::DOCUMENT).expect("group");
        assert_eq!(group.records.len(), 2);
    }

    #[test]
    fn empty_groups_are_discarded() {
        let mut history = History::default();
        history.begin(&ChangeScope::DOCUMENT);
        history.end();
        assert!(!history.can_undo(&ChangeScope::DOCUMENT));
    }

    #[test]
    fn new_group_clears_redo_of_same_scope_only() {
        let mut history = History::default();
        history.push_redo(UndoGroup {
            scope: ChangeScope::DOCUMENT,
            records: vec![record()],
        });
        history.push_redo(UndoGroup {
            scope: ChangeScope::UI_STATE,
            records: vec![record()],
        });
        history.begin(&ChangeScope::DOCUMENT);
        history.record(record());
        history.end();

        assert!(!history.can_redo(&ChangeScope::DOCUMENT));
        assert!(history.can_redo(&ChangeScope::UI_STATE));
    }

    #[test]
    fn limit_drops_oldest_groups() {
        let mut history = History::with_limit(2);
        for _ in 0..3 {
            history.begin(&ChangeScope::DOCUMENT);
            history.record(record());
            history.end();
        }
        assert!(history.take_undo(&ChangeScope::DOCUMENT).is_some());
        assert!(history.take_undo(&ChangeScope::DOCUMENT).is_some());
        assert!(history.take_undo(&ChangeScope::DOCUMENT).is_none());
    }
}
