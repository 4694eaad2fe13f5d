//! Form State Store
//!
//! The wizard state is a plain value. Every change goes through
//! [`reduce`], one [`FormAction`] at a time; [`FormStore`] is a thin
//! owner around it for callers that prefer methods.

use chrono::{Local, NaiveDate};
use tracing::debug;

use super::validator::{validate_step, ValidationErrors};
use super::{Evidence, EvidenceFile, Field, IncidentRecord, TagGroup};

pub const FIRST_STEP: u8 = 1;
pub const LAST_STEP: u8 = 4;

/// Client-visible progress of a submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubmissionStatus {
    #[default]
    Idle,
    Uploading,
    Sending,
    Done,
    Failed,
}

impl SubmissionStatus {
    /// Upload or send currently running
    pub fn is_busy(&self) -> bool {
        matches!(self, SubmissionStatus::Uploading | SubmissionStatus::Sending)
    }
}

/// Everything the wizard knows during one session
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub record: IncidentRecord,
    pub current_step: u8,
    pub errors: ValidationErrors,
    pub status: SubmissionStatus,
    pub confirmation_id: Option<String>,
    pub last_error: Option<String>,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            record: IncidentRecord::default(),
            current_step: FIRST_STEP,
            errors: ValidationErrors::default(),
            status: SubmissionStatus::Idle,
            confirmation_id: None,
            last_error: None,
        }
    }
}

impl FormState {
    /// A submitted card is closed for edits
    pub fn is_closed(&self) -> bool {
        self.status == SubmissionStatus::Done
    }
}

/// A discrete user event or async boundary result
#[derive(Debug, Clone, PartialEq)]
pub enum FormAction {
    Update(Field, String),
    ToggleTag(TagGroup, String),
    AttachEvidence(EvidenceFile),
    ClearEvidence,
    SetStep(u8),
    /// Validate the active step against `today` and advance if clean
    Next { today: NaiveDate },
    Back,
    ShowErrors(ValidationErrors),
    UploadStarted,
    UploadCompleted { url: String },
    SendStarted,
    SubmitSucceeded { id: String },
    SubmitFailed { message: String },
}

pub fn reduce(mut state: FormState, action: FormAction) -> FormState {
    if state.is_closed() {
        debug!("Ignoring {:?} on a submitted card", action);
        return state;
    }

    match action {
        FormAction::Update(field, value) => {
            state.record.set_field(field, &value);
            state.errors = without(state.errors, field);
        }
        FormAction::ToggleTag(group, tag) => {
            if !group.is_known(&tag) {
                debug!("Unknown tag '{}' for {:?}", tag, group);
                return state;
            }
            if state.record.tags_mut(group).toggle(&tag) {
                state.errors = without(state.errors, group.field());
            }
        }
        FormAction::AttachEvidence(file) => {
            state.record.evidence = Some(Evidence::Local(file));
            state.errors = without(state.errors, Field::Evidence);
        }
        FormAction::ClearEvidence => {
            state.record.evidence = None;
            state.errors = without(state.errors, Field::Evidence);
        }
        FormAction::SetStep(step) => {
            state.current_step = step.clamp(FIRST_STEP, LAST_STEP);
        }
        FormAction::Next { today } => {
            state.errors = validate_step(state.current_step, &state.record, today);
            if state.errors.is_empty() && state.current_step < LAST_STEP {
                state.current_step += 1;
            }
        }
        FormAction::Back => {
            state.current_step = state.current_step.saturating_sub(1).max(FIRST_STEP);
        }
        FormAction::ShowErrors(errors) => {
            if let Some(step) = errors.first_step() {
                state.current_step = step;
            }
            state.errors = errors;
        }
        FormAction::UploadStarted => {
            state.status = SubmissionStatus::Uploading;
            state.last_error = None;
        }
        FormAction::UploadCompleted { url } => {
            if let Some(evidence) = state.record.evidence.take() {
                let name = evidence.name().to_string();
                state.record.evidence = Some(Evidence::Uploaded { name, url });
            }
        }
        FormAction::SendStarted => {
            state.status = SubmissionStatus::Sending;
            state.last_error = None;
        }
        FormAction::SubmitSucceeded { id } => {
            state.status = SubmissionStatus::Done;
            state.confirmation_id = Some(id);
            state.errors = ValidationErrors::default();
        }
        FormAction::SubmitFailed { message } => {
            state.status = SubmissionStatus::Failed;
            state.last_error = Some(message);
        }
    }
    state
}

fn without(errors: ValidationErrors, field: Field) -> ValidationErrors {
    if !errors.contains(field) {
        return errors;
    }
    let mut kept = ValidationErrors::default();
    for (f, message) in errors.iter().filter(|(f, _)| *f != field) {
        kept.insert(f, message);
    }
    kept
}

/// Owner of a [`FormState`] exposing the wizard operations as methods
#[derive(Debug, Default)]
pub struct FormStore {
    state: FormState,
}

impl FormStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn record(&self) -> &IncidentRecord {
        &self.state.record
    }

    pub fn apply(&mut self, action: FormAction) {
        let state = std::mem::take(&mut self.state);
        self.state = reduce(state, action);
    }

    pub fn update(&mut self, field: Field, value: impl Into<String>) {
        self.apply(FormAction::Update(field, value.into()));
    }

    pub fn toggle_tag(&mut self, group: TagGroup, tag: impl Into<String>) {
        self.apply(FormAction::ToggleTag(group, tag.into()));
    }

    pub fn attach_evidence(&mut self, file: EvidenceFile) {
        self.apply(FormAction::AttachEvidence(file));
    }

    pub fn set_step(&mut self, step: u8) {
        self.apply(FormAction::SetStep(step));
    }

    /// Returns true when the step was clean
    pub fn next(&mut self) -> bool {
        self.next_on(Local::now().date_naive())
    }

    pub fn next_on(&mut self, today: NaiveDate) -> bool {
        self.apply(FormAction::Next { today });
        self.state.errors.is_empty()
    }

    pub fn back(&mut self) {
        self.apply(FormAction::Back);
    }

    pub fn into_state(self) -> FormState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{TAG_NONE, TAG_OTHERS};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn test_next_blocked_until_step_is_clean() {
        let mut store = FormStore::new();
        assert!(!store.next_on(today()));
        assert_eq!(store.state().current_step, 1);
        assert!(store.state().errors.contains(Field::Location));

        store.update(Field::Unsafe, "act");
        store.update(Field::Location, "Warehouse 3");
        store.update(Field::ObserverName, "Ade Bello");
        store.update(Field::Company, "Dexter");
        store.update(Field::Position, "Supervisor");
        store.update(Field::Date, "2024-06-10");
        store.update(Field::Time, "08:45");
        assert!(store.state().errors.is_empty());

        assert!(store.next_on(today()));
        assert_eq!(store.state().current_step, 2);
    }

    #[test]
    fn test_step_stays_in_range() {
        let mut store = FormStore::new();
        store.back();
        assert_eq!(store.state().current_step, 1);
        store.set_step(9);
        assert_eq!(store.state().current_step, 4);
        store.set_step(0);
        assert_eq!(store.state().current_step, 1);
    }

    #[test]
    fn test_toggle_none_is_exclusive() {
        let mut store = FormStore::new();
        store.toggle_tag(TagGroup::CausalFactors, "Human Error");
        store.toggle_tag(TagGroup::CausalFactors, TAG_OTHERS);
        store.toggle_tag(TagGroup::CausalFactors, TAG_NONE);
        assert_eq!(store.record().causal_factors.as_slice(), &[TAG_NONE.to_string()]);

        store.toggle_tag(TagGroup::CausalFactors, "Line of Fire");
        assert_eq!(store.record().causal_factors.len(), 1);

        // The other group is untouched
        store.toggle_tag(TagGroup::LifeSavingRules, "Confined Space");
        assert!(store.record().life_saving_rules.contains("Confined Space"));
    }

    #[test]
    fn test_unknown_tag_ignored() {
        let mut store = FormStore::new();
        store.toggle_tag(TagGroup::LifeSavingRules, "Juggling");
        assert!(store.record().life_saving_rules.is_empty());
    }

    #[test]
    fn test_done_state_is_immutable() {
        let mut store = FormStore::new();
        store.update(Field::Location, "Yard");
        store.apply(FormAction::SendStarted);
        store.apply(FormAction::SubmitSucceeded { id: "abc".to_string() });

        store.update(Field::Location, "Elsewhere");
        store.set_step(3);
        assert_eq!(store.record().location, "Yard");
        assert_eq!(store.state().current_step, 1);
        assert_eq!(store.state().confirmation_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_failed_submission_stays_editable() {
        let mut store = FormStore::new();
        store.apply(FormAction::SendStarted);
        store.apply(FormAction::SubmitFailed { message: "provider down".to_string() });
        assert_eq!(store.state().status, SubmissionStatus::Failed);

        store.update(Field::Company, "Dexter");
        assert_eq!(store.record().company, "Dexter");
    }

    #[test]
    fn test_upload_completed_keeps_name() {
        let mut store = FormStore::new();
        store.attach_evidence(EvidenceFile::new("leak.jpg", "image/jpeg", vec![1, 2, 3]));
        store.apply(FormAction::UploadCompleted { url: "https://blob.example/leak-x1.jpg".to_string() });
        assert_eq!(
            store.record().evidence,
            Some(Evidence::Uploaded {
                name: "leak.jpg".to_string(),
                url: "https://blob.example/leak-x1.jpg".to_string(),
            })
        );
    }
}
