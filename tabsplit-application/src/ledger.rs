use indexmap::{IndexMap, IndexSet};

use tabsplit_domain::{LineClassifier, Receipt};

/// Per-line assignment state of a split in progress.
///
/// Keys are the receipt's billable line ids in receipt order; every billable
/// line has an entry from construction on, possibly empty. Line ids that are
/// not billable are never keys, and mutations targeting them are silent
/// no-ops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentLedger<'a> {
    entries: IndexMap<&'a str, IndexSet<&'a str>>,
}

impl<'a> AssignmentLedger<'a> {
    pub fn for_receipt(receipt: &'a Receipt) -> Self {
        let entries = LineClassifier::billable_lines(receipt)
            .into_iter()
            .map(|line| (line.id.as_str(), IndexSet::new()))
            .collect();
        Self { entries }
    }

    /// Adds the participant to the line if absent, removes them otherwise.
    pub fn toggle(&mut self, line_id: &str, participant: &'a str) {
        let Some(assigned) = self.entries.get_mut(line_id) else {
            return;
        };
        if !assigned.shift_remove(participant) {
            assigned.insert(participant);
        }
    }

    /// Replaces the line's assignment with the full participant set.
    pub fn select_all(&mut self, line_id: &str, all_participants: &[&'a str]) {
        let Some(assigned) = self.entries.get_mut(line_id) else {
            return;
        };
        *assigned = all_participants.iter().copied().collect();
    }

    pub fn clear(&mut self, line_id: &str) {
        if let Some(assigned) = self.entries.get_mut(line_id) {
            assigned.clear();
        }
    }

    pub fn assigned(&self, line_id: &str) -> Option<&IndexSet<&'a str>> {
        self.entries.get(line_id)
    }

    pub fn assignments(&self) -> &IndexMap<&'a str, IndexSet<&'a str>> {
        &self.entries
    }

    /// True once every billable line has at least one assignee. Vacuously
    /// true for a receipt without billable lines.
    pub fn is_fully_covered(&self) -> bool {
        self.entries.values().all(|assigned| !assigned.is_empty())
    }

    pub fn unassigned_line_ids(&self) -> Vec<&'a str> {
        self.entries
            .iter()
            .filter(|(_, assigned)| assigned.is_empty())
            .map(|(&line_id, _)| line_id)
            .collect()
    }
}
