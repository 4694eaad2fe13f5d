//! Step Validator
//!
//! Pure per-step checks over the incident record. An empty result means
//! the step may be left (or the card submitted).

use chrono::{Local, NaiveDate};
use std::collections::BTreeMap;

use super::{
    Evidence, Field, IncidentRecord, StopWorkAuthority, TagGroup, ACCEPTED_EVIDENCE_TYPES, MAX_EVIDENCE_BYTES,
    TAG_OTHERS,
};

/// Field-level validation messages, ordered by field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<Field, String>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(|m| m.as_str())
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn insert(&mut self, field: Field, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(f, m)| (*f, m.as_str()))
    }

    /// Lowest wizard step holding an error
    pub fn first_step(&self) -> Option<u8> {
        self.0.keys().map(|f| f.step()).min()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<&str> = self.0.values().map(|m| m.as_str()).collect();
        f.write_str(&messages.join(" "))
    }
}

/// Validate one step against today's local date
pub fn validate(step: u8, record: &IncidentRecord) -> ValidationErrors {
    validate_step(step, record, Local::now().date_naive())
}

/// Validate every step, as done right before submitting
pub fn validate_all(record: &IncidentRecord, today: NaiveDate) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    for step in 1..=4 {
        errors.extend(validate_step(step, record, today));
    }
    errors
}

pub fn validate_step(step: u8, record: &IncidentRecord, today: NaiveDate) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    match step {
        1 => check_details(record, today, &mut errors),
        2 => check_narrative(record, &mut errors),
        3 => {
            check_tags(record, TagGroup::LifeSavingRules, &mut errors);
            check_tags(record, TagGroup::CausalFactors, &mut errors);
        }
        4 => check_stop_work(record, &mut errors),
        _ => {}
    }
    errors
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn check_details(record: &IncidentRecord, today: NaiveDate, errors: &mut ValidationErrors) {
    if record.unsafe_kind.is_none() {
        errors.insert(Field::Unsafe, "Please select an unsafe act or condition.");
    }
    let required = [
        (Field::Location, &record.location, "Location is required."),
        (Field::ObserverName, &record.observer_name, "Observer name is required."),
        (Field::Company, &record.company, "Company is required."),
        (Field::Position, &record.position, "Position is required."),
    ];
    for (field, value, message) in required {
        if blank(value) {
            errors.insert(field, message);
        }
    }
    match record.date {
        None => errors.insert(Field::Date, "Date is required."),
        Some(date) if date > today => errors.insert(Field::Date, "Date cannot be in the future."),
        Some(_) => {}
    }
    if record.time.is_none() {
        errors.insert(Field::Time, "Time is required.");
    }
}

fn check_narrative(record: &IncidentRecord, errors: &mut ValidationErrors) {
    if blank(&record.incident_details) {
        errors.insert(Field::IncidentDetails, "Incident details are required.");
    }
    if blank(&record.corrective_actions) {
        errors.insert(Field::CorrectiveActions, "Corrective actions are required.");
    }
}

fn check_tags(record: &IncidentRecord, group: TagGroup, errors: &mut ValidationErrors) {
    let tags = record.tags(group);
    let (empty_message, others_message) = match group {
        TagGroup::LifeSavingRules => (
            "Please select at least one life-saving rule.",
            "Please specify other life-saving rules.",
        ),
        TagGroup::CausalFactors => (
            "Please select at least one causal factor.",
            "Please specify other causal factors.",
        ),
    };
    if tags.is_empty() {
        errors.insert(group.field(), empty_message);
    }
    if tags.contains(TAG_OTHERS) && blank(record.elaboration(group)) {
        errors.insert(group.elaboration_field(), others_message);
    }
}

fn check_stop_work(record: &IncidentRecord, errors: &mut ValidationErrors) {
    match record.stop_work {
        None => errors.insert(
            Field::StopWorkEnforced,
            "Please select if stop work authority was enforced.",
        ),
        Some(StopWorkAuthority::Yes) if blank(&record.stop_work_actions) => errors.insert(
            Field::StopWorkActions,
            "Please provide the actions taken for stop work authority.",
        ),
        Some(_) => {}
    }

    // Already-uploaded evidence passed these checks before it left the client
    if let Some(Evidence::Local(file)) = &record.evidence {
        if !ACCEPTED_EVIDENCE_TYPES.contains(&file.content_type.as_str()) {
            errors.insert(
                Field::Evidence,
                "Unsupported file type. Please upload a PNG, JPG, GIF, or SVG file.",
            );
        } else if file.size() > MAX_EVIDENCE_BYTES {
            errors.insert(Field::Evidence, "File size must be less than 5MB.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{EvidenceFile, UnsafeKind, TAG_NONE};
    use chrono::NaiveTime;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn complete_record() -> IncidentRecord {
        let mut record = IncidentRecord {
            unsafe_kind: Some(UnsafeKind::Condition),
            location: "Rig 7, deck B".to_string(),
            observer_name: "Sam Okafor".to_string(),
            company: "Dexter".to_string(),
            position: "HSE Officer".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 14),
            time: NaiveTime::from_hms_opt(9, 15, 0),
            incident_details: "Unsecured ladder".to_string(),
            corrective_actions: "Ladder tied off".to_string(),
            stop_work: Some(StopWorkAuthority::NotApplicable),
            ..Default::default()
        };
        record.life_saving_rules.toggle(TAG_NONE);
        record.causal_factors.toggle("Poor Housekeeping");
        record
    }

    #[test]
    fn test_complete_record_passes_every_step() {
        let record = complete_record();
        for step in 1..=4 {
            assert!(validate_step(step, &record, today()).is_empty(), "step {step}");
        }
        assert!(validate_all(&record, today()).is_empty());
    }

    #[test]
    fn test_step_one_requires_all_details() {
        let errors = validate_step(1, &IncidentRecord::default(), today());
        for field in [
            Field::Unsafe,
            Field::Location,
            Field::ObserverName,
            Field::Company,
            Field::Position,
            Field::Date,
            Field::Time,
        ] {
            assert!(errors.contains(field), "missing error for {field}");
        }
        assert_eq!(errors.get(Field::ObserverName), Some("Observer name is required."));
    }

    #[test]
    fn test_future_date_rejected() {
        let mut record = complete_record();
        record.date = today().succ_opt();
        let errors = validate_step(1, &record, today());
        assert_eq!(errors.get(Field::Date), Some("Date cannot be in the future."));

        record.date = Some(today());
        assert!(validate_step(1, &record, today()).is_empty());
    }

    #[test]
    fn test_whitespace_narrative_is_blank() {
        let mut record = complete_record();
        record.incident_details = "   \n\t".to_string();
        let errors = validate_step(2, &record, today());
        assert_eq!(errors.len(), 1);
        assert!(errors.contains(Field::IncidentDetails));
    }

    #[test]
    fn test_others_requires_elaboration() {
        let mut record = complete_record();
        record.causal_factors.toggle(TAG_OTHERS);
        record.life_saving_rules = Default::default();
        record.life_saving_rules.toggle(TAG_OTHERS);

        let errors = validate_step(3, &record, today());
        assert_eq!(errors.get(Field::OtherCausalFactors), Some("Please specify other causal factors."));
        assert!(errors.contains(Field::OtherLifeSavingRules));

        record.other_causal_factors = "Slippery grating".to_string();
        record.other_life_saving_rules = "Hot work".to_string();
        assert!(validate_step(3, &record, today()).is_empty());
    }

    #[test]
    fn test_stop_work_actions_only_required_for_yes() {
        let mut record = complete_record();
        record.stop_work = Some(StopWorkAuthority::Yes);
        let errors = validate_step(4, &record, today());
        assert!(errors.contains(Field::StopWorkActions));

        record.stop_work = Some(StopWorkAuthority::No);
        assert!(validate_step(4, &record, today()).is_empty());
    }

    #[test]
    fn test_evidence_type_and_size() {
        let mut record = complete_record();
        record.evidence = Some(Evidence::Local(EvidenceFile::new("notes.pdf", "application/pdf", vec![1])));
        assert!(validate_step(4, &record, today()).contains(Field::Evidence));

        let oversized = vec![0u8; (MAX_EVIDENCE_BYTES + 1) as usize];
        record.evidence = Some(Evidence::Local(EvidenceFile::new("big.png", "image/png", oversized)));
        assert_eq!(
            validate_step(4, &record, today()).get(Field::Evidence),
            Some("File size must be less than 5MB.")
        );

        let exact = vec![0u8; MAX_EVIDENCE_BYTES as usize];
        record.evidence = Some(Evidence::Local(EvidenceFile::new("ok.png", "image/png", exact)));
        assert!(validate_step(4, &record, today()).is_empty());
    }

    #[test]
    fn test_first_step_reports_lowest() {
        let mut record = complete_record();
        record.corrective_actions.clear();
        record.stop_work = None;
        assert_eq!(validate_all(&record, today()).first_step(), Some(2));
    }
}
