//! Filter and selection state for the UI that consumes a collection.
//!
//! Records are addressed by their positional id, which is only meaningful
//! within the collection they came from; loading a new collection resets
//! everything.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use crate::calendar::{CalendarExporter, ExportError, ExportSummary};
use crate::collector::{CollectResponse, Collection};
use crate::filter::{FilterOptions, FilterState};
use crate::portal::{LectureRecord, PageMetadata};

#[derive(Debug, thiserror::Error)]
pub enum PopupError {
    /// The collector never answered, as opposed to answering with an error.
    #[error("No response from the lecture page; reload it and try again")]
    Communication,
    #[error("Collection failed: {0}")]
    Collection(String),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// How the selection reacts to a filter change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionMode {
    /// Keep selected ids that are still visible.
    #[default]
    Preserve,
    /// Select everything that is visible.
    Reset,
}

#[derive(Debug, Default)]
pub struct PopupState {
    records: Vec<LectureRecord>,
    metadata: Option<PageMetadata>,
    filter: FilterState,
    filtered: BTreeSet<u32>,
    selected: BTreeSet<u32>,
}

impl PopupState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a collector reply. Returns the number of records loaded.
    pub fn receive(&mut self, response: Option<CollectResponse>) -> Result<usize, PopupError> {
        match response {
            None => Err(PopupError::Communication),
            Some(CollectResponse::Error { error }) => Err(PopupError::Collection(error)),
            Some(CollectResponse::Success(collection)) => {
                self.load(collection);
                Ok(self.records.len())
            }
        }
    }

    /// Replace the record set, clear the filter and select everything.
    pub fn load(&mut self, collection: Collection) {
        self.records = collection.lectures;
        self.metadata = Some(collection.metadata);
        self.filter = FilterState::default();
        self.filtered = self.records.iter().map(|r| r.id).collect();
        self.selected = self.filtered.clone();
        debug!(records = self.records.len(), "collection loaded");
    }

    pub fn records(&self) -> &[LectureRecord] {
        &self.records
    }

    pub fn metadata(&self) -> Option<&PageMetadata> {
        self.metadata.as_ref()
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn options(&self) -> FilterOptions {
        FilterOptions::from_records(&self.records)
    }

    /// Apply `filter` and recompute the selection. Returns the visible count.
    pub fn apply_filter(&mut self, filter: FilterState, mode: SelectionMode) -> usize {
        self.filtered = filter.apply(&self.records).iter().map(|r| r.id).collect();
        self.filter = filter;
        self.selected = match mode {
            SelectionMode::Preserve => self.selected.intersection(&self.filtered).copied().collect(),
            SelectionMode::Reset => self.filtered.clone(),
        };
        debug!(
            visible = self.filtered.len(),
            selected = self.selected.len(),
            ?mode,
            "filter applied"
        );
        self.filtered.len()
    }

    pub fn filtered_records(&self) -> Vec<&LectureRecord> {
        self.records
            .iter()
            .filter(|r| self.filtered.contains(&r.id))
            .collect()
    }

    pub fn is_selected(&self, id: u32) -> bool {
        self.selected.contains(&id)
    }

    /// Flip one visible record. Returns whether it is now selected; hidden ids are ignored.
    pub fn toggle(&mut self, id: u32) -> bool {
        if !self.filtered.contains(&id) {
            return false;
        }
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
        self.selected.contains(&id)
    }

    pub fn select_all(&mut self) {
        self.selected = self.filtered.clone();
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Selected records in collection order.
    pub fn selected_records(&self) -> Vec<&LectureRecord> {
        self.records
            .iter()
            .filter(|r| self.selected.contains(&r.id))
            .collect()
    }

    pub fn export_selected(
        &self,
        exporter: &CalendarExporter,
        path: &Path,
    ) -> Result<ExportSummary, PopupError> {
        Ok(exporter.export(self.selected_records(), path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::{CivilDateTime, FormDescriptor, HttpMethod};
    use indexmap::IndexMap;

    fn lecture(id: u32, topic: &str) -> LectureRecord {
        LectureRecord {
            id,
            topic: topic.to_string(),
            title: format!("Talk {id}"),
            credits: 1,
            time_text: "2024-05-01 10:00-11:00".to_string(),
            start: CivilDateTime::new(2024, 5, 1, 10, 0),
            end: CivilDateTime::new(2024, 5, 1, 11, 0),
            start_timestamp: None,
            end_timestamp: None,
            audience: String::new(),
            speaker: String::new(),
            department: String::new(),
            detail_url: None,
            description: None,
            main_venue: None,
            branch_venue: None,
        }
    }

    fn collection() -> Collection {
        Collection {
            lectures: vec![lecture(0, "AI"), lecture(1, "Math"), lecture(2, "AI")],
            metadata: PageMetadata {
                total_pages: 1,
                current_page: 1,
                total_items: Some(3),
                origin: "https://gs.example.edu/list".to_string(),
                form: FormDescriptor {
                    action: "https://gs.example.edu/list".to_string(),
                    method: HttpMethod::Get,
                    fields: IndexMap::new(),
                    page_field: "pageNo".to_string(),
                },
            },
        }
    }

    fn ai_only() -> FilterState {
        FilterState {
            topic: BTreeSet::from(["AI".to_string()]),
            ..Default::default()
        }
    }

    fn ids(records: Vec<&LectureRecord>) -> Vec<u32> {
        records.into_iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_receive_missing_response() {
        let mut state = PopupState::new();
        assert!(matches!(state.receive(None), Err(PopupError::Communication)));
    }

    #[test]
    fn test_receive_error_response() {
        let mut state = PopupState::new();
        let err = state
            .receive(Some(CollectResponse::Error {
                error: "Failed to fetch page 2 (HTTP 500)".to_string(),
            }))
            .unwrap_err();
        assert!(matches!(&err, PopupError::Collection(reason) if reason.contains("page 2")));
        assert!(state.records().is_empty());
    }

    #[test]
    fn test_load_selects_everything() {
        let mut state = PopupState::new();
        let loaded = state
            .receive(Some(CollectResponse::Success(collection())))
            .unwrap();
        assert_eq!(loaded, 3);
        assert_eq!(ids(state.selected_records()), vec![0, 1, 2]);
        assert!(state.metadata().is_some());
        assert_eq!(state.options().topic.len(), 2);
    }

    #[test]
    fn test_preserve_keeps_visible_selection() {
        let mut state = PopupState::new();
        state.load(collection());
        assert!(!state.toggle(0));

        assert_eq!(state.apply_filter(ai_only(), SelectionMode::Preserve), 2);
        assert_eq!(ids(state.filtered_records()), vec![0, 2]);
        assert_eq!(ids(state.selected_records()), vec![2]);

        // Widening again does not resurrect the hidden selection.
        state.apply_filter(FilterState::default(), SelectionMode::Preserve);
        assert_eq!(ids(state.selected_records()), vec![2]);
    }

    #[test]
    fn test_reset_selects_all_visible() {
        let mut state = PopupState::new();
        state.load(collection());
        state.clear_selection();
        state.apply_filter(ai_only(), SelectionMode::Reset);
        assert_eq!(ids(state.selected_records()), vec![0, 2]);
    }

    #[test]
    fn test_toggle_ignores_hidden_ids() {
        let mut state = PopupState::new();
        state.load(collection());
        state.apply_filter(ai_only(), SelectionMode::Preserve);
        assert!(!state.toggle(1));
        assert!(!state.is_selected(1));
        assert!(!state.toggle(2));
        assert!(state.toggle(2));
    }

    #[test]
    fn test_select_all_and_clear() {
        let mut state = PopupState::new();
        state.load(collection());
        state.apply_filter(ai_only(), SelectionMode::Preserve);
        state.clear_selection();
        assert!(state.selected_records().is_empty());
        state.select_all();
        assert_eq!(ids(state.selected_records()), vec![0, 2]);
    }

    #[test]
    fn test_export_empty_selection() {
        let mut state = PopupState::new();
        state.load(collection());
        state.clear_selection();
        let dir = tempfile::tempdir().unwrap();
        let err = state
            .export_selected(&CalendarExporter::new(), &dir.path().join("schedule.ics"))
            .unwrap_err();
        assert!(matches!(err, PopupError::Export(ExportError::EmptyInput)));
    }

    #[test]
    fn test_export_selected_writes_only_selection() {
        let mut state = PopupState::new();
        state.load(collection());
        state.apply_filter(ai_only(), SelectionMode::Reset);
        let dir = tempfile::tempdir().unwrap();
        let summary = state
            .export_selected(&CalendarExporter::new(), &dir.path().join("schedule.ics"))
            .unwrap();
        assert_eq!(summary.events, 2);
    }
}
