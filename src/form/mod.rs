//! Form Module
//!
//! The Hazard Observation Card record, its tag catalogs, and the
//! wizard state machine that edits and validates it step by step.

pub mod store;
pub mod validator;

pub use store::{reduce, FormAction, FormState, FormStore, SubmissionStatus};
pub use validator::{validate, validate_all, validate_step, ValidationErrors};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest evidence file accepted by the client (5 MiB)
pub const MAX_EVIDENCE_BYTES: u64 = 5 * 1024 * 1024;

/// MIME types the client accepts as evidence
pub const ACCEPTED_EVIDENCE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/svg+xml"];

/// Sentinel tag: nothing applies. Exclusive with every other tag.
pub const TAG_NONE: &str = "None";
/// Sentinel tag: something outside the catalog, described in free text.
pub const TAG_OTHERS: &str = "Others";

pub const LIFE_SAVING_RULES: &[&str] = &[
    "Work Permit",
    "Energized System",
    "Overriding Equipment Safety",
    "Working at Height",
    "Smoking, Drug, and Alcohol",
    "Lifting Operations",
    "Toxic Gases",
    "Confined Space",
    "Management of Change",
    "Suspended Load",
    "Driving Safety",
    "Journey Management",
];

pub const CAUSAL_FACTORS: &[&str] = &[
    "Human Error",
    "Poor Chemical Handling",
    "Fall Protection",
    "Defective Equipment",
    "Inadequate Planning",
    "Poor Housekeeping",
    "By-Passing Safety Features",
    "No/Poor Supervision",
    "Radiation Exposure",
    "Road Condition",
    "Line of Fire",
    "Poor Training",
    "Working Without PTW/JSA",
    "No/Inadequate PPE",
    "Poor Visibility",
    "Inadequate Guards",
    "Pressurized Vessel",
    "Procedure Not Followed",
    "Lack of Competence",
    "Weather Condition",
    "Inadequate Ventilation",
    "Explosive Atmosphere",
    "Noise Exposure",
    "Improper Loading",
];

/// Unsafe act or unsafe condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsafeKind {
    Act,
    Condition,
}

impl UnsafeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnsafeKind::Act => "act",
            UnsafeKind::Condition => "condition",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "act" => Some(UnsafeKind::Act),
            "condition" => Some(UnsafeKind::Condition),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UnsafeKind::Act => "Unsafe Act",
            UnsafeKind::Condition => "Unsafe Condition",
        }
    }
}

/// Whether Stop Work Authority was enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopWorkAuthority {
    #[serde(rename = "yes")]
    Yes,
    #[serde(rename = "no")]
    No,
    #[serde(rename = "n/a")]
    NotApplicable,
}

impl StopWorkAuthority {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopWorkAuthority::Yes => "yes",
            StopWorkAuthority::No => "no",
            StopWorkAuthority::NotApplicable => "n/a",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "yes" | "y" => Some(StopWorkAuthority::Yes),
            "no" | "n" => Some(StopWorkAuthority::No),
            "n/a" | "na" => Some(StopWorkAuthority::NotApplicable),
            _ => None,
        }
    }
}

/// The two checkbox groups of step 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagGroup {
    LifeSavingRules,
    CausalFactors,
}

impl TagGroup {
    /// Catalog tags plus the `None` and `Others` sentinels
    pub fn is_known(&self, tag: &str) -> bool {
        let catalog = match self {
            TagGroup::LifeSavingRules => LIFE_SAVING_RULES,
            TagGroup::CausalFactors => CAUSAL_FACTORS,
        };
        tag == TAG_NONE || tag == TAG_OTHERS || catalog.contains(&tag)
    }

    pub fn catalog(&self) -> &'static [&'static str] {
        match self {
            TagGroup::LifeSavingRules => LIFE_SAVING_RULES,
            TagGroup::CausalFactors => CAUSAL_FACTORS,
        }
    }

    /// Field holding this group's tags
    pub fn field(&self) -> Field {
        match self {
            TagGroup::LifeSavingRules => Field::LifeSavingRules,
            TagGroup::CausalFactors => Field::CausalFactors,
        }
    }

    /// Field holding the free-text elaboration for `Others`
    pub fn elaboration_field(&self) -> Field {
        match self {
            TagGroup::LifeSavingRules => Field::OtherLifeSavingRules,
            TagGroup::CausalFactors => Field::OtherCausalFactors,
        }
    }
}

/// Selected tags of one group, in the order they were checked
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Applies the checkbox toggle rules: a present tag is removed, `None`
    /// replaces everything, and nothing else may join while `None` is set.
    /// Returns false when the toggle was refused.
    pub fn toggle(&mut self, tag: &str) -> bool {
        if let Some(pos) = self.0.iter().position(|t| t == tag) {
            self.0.remove(pos);
            return true;
        }
        if tag == TAG_NONE {
            self.0.clear();
            self.0.push(tag.to_string());
            return true;
        }
        if self.contains(TAG_NONE) {
            return false;
        }
        self.0.push(tag.to_string());
        true
    }
}

impl From<Vec<String>> for TagSet {
    fn from(tags: Vec<String>) -> Self {
        Self(tags)
    }
}

/// Every addressable field of the record, keyed by its wire name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Unsafe,
    Location,
    ObserverName,
    Company,
    Position,
    Date,
    Time,
    IncidentDetails,
    CorrectiveActions,
    LifeSavingRules,
    OtherLifeSavingRules,
    CausalFactors,
    OtherCausalFactors,
    StopWorkEnforced,
    StopWorkActions,
    Evidence,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Unsafe => "unsafe",
            Field::Location => "location",
            Field::ObserverName => "observerName",
            Field::Company => "company",
            Field::Position => "position",
            Field::Date => "date",
            Field::Time => "time",
            Field::IncidentDetails => "incidentDetails",
            Field::CorrectiveActions => "correctiveActions",
            Field::LifeSavingRules => "lifeSavingRules",
            Field::OtherLifeSavingRules => "otherLifeSavingRules",
            Field::CausalFactors => "causalFactors",
            Field::OtherCausalFactors => "otherCausalFactors",
            Field::StopWorkEnforced => "stopWorkEnforced",
            Field::StopWorkActions => "stopWorkActions",
            Field::Evidence => "stopWorkEvidence",
        }
    }

    /// Wizard step (1-4) on which the field is edited
    pub fn step(&self) -> u8 {
        match self {
            Field::Unsafe
            | Field::Location
            | Field::ObserverName
            | Field::Company
            | Field::Position
            | Field::Date
            | Field::Time => 1,
            Field::IncidentDetails | Field::CorrectiveActions => 2,
            Field::LifeSavingRules
            | Field::OtherLifeSavingRules
            | Field::CausalFactors
            | Field::OtherCausalFactors => 3,
            Field::StopWorkEnforced | Field::StopWorkActions | Field::Evidence => 4,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file picked by the observer, not yet uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceFile {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl EvidenceFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Load a file from disk, inferring its MIME type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read evidence file {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "evidence".to_string());
        let content_type = mime_from_extension(&name).to_string();
        Ok(Self::new(name, content_type, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_accepted_type(&self) -> bool {
        ACCEPTED_EVIDENCE_TYPES.contains(&self.content_type.as_str())
    }
}

/// Best guess at an image MIME type from a file name
pub fn mime_from_extension(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, e)| e.to_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Evidence attached to the record: local before upload, a URL after
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    Local(EvidenceFile),
    Uploaded { name: String, url: String },
}

impl Evidence {
    pub fn name(&self) -> &str {
        match self {
            Evidence::Local(file) => &file.name,
            Evidence::Uploaded { name, .. } => name,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Evidence::Local(_) => None,
            Evidence::Uploaded { url, .. } => Some(url),
        }
    }
}

/// The Hazard Observation Card being filled in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentRecord {
    pub unsafe_kind: Option<UnsafeKind>,
    pub location: String,
    pub observer_name: String,
    pub company: String,
    pub position: String,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub incident_details: String,
    pub corrective_actions: String,
    pub life_saving_rules: TagSet,
    pub other_life_saving_rules: String,
    pub causal_factors: TagSet,
    pub other_causal_factors: String,
    pub stop_work: Option<StopWorkAuthority>,
    pub stop_work_actions: String,
    pub evidence: Option<Evidence>,
}

impl IncidentRecord {
    pub fn tags(&self, group: TagGroup) -> &TagSet {
        match group {
            TagGroup::LifeSavingRules => &self.life_saving_rules,
            TagGroup::CausalFactors => &self.causal_factors,
        }
    }

    pub fn tags_mut(&mut self, group: TagGroup) -> &mut TagSet {
        match group {
            TagGroup::LifeSavingRules => &mut self.life_saving_rules,
            TagGroup::CausalFactors => &mut self.causal_factors,
        }
    }

    pub fn elaboration(&self, group: TagGroup) -> &str {
        match group {
            TagGroup::LifeSavingRules => &self.other_life_saving_rules,
            TagGroup::CausalFactors => &self.other_causal_factors,
        }
    }

    /// Structural write of a single field from its textual form.
    /// Values that do not parse clear the field; tag groups and evidence
    /// are edited through their own actions and are ignored here.
    pub fn set_field(&mut self, field: Field, value: &str) {
        match field {
            Field::Unsafe => self.unsafe_kind = UnsafeKind::parse(value),
            Field::Location => self.location = value.to_string(),
            Field::ObserverName => self.observer_name = value.to_string(),
            Field::Company => self.company = value.to_string(),
            Field::Position => self.position = value.to_string(),
            Field::Date => self.date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok(),
            Field::Time => self.time = parse_time(value),
            Field::IncidentDetails => self.incident_details = value.to_string(),
            Field::CorrectiveActions => self.corrective_actions = value.to_string(),
            Field::OtherLifeSavingRules => self.other_life_saving_rules = value.to_string(),
            Field::OtherCausalFactors => self.other_causal_factors = value.to_string(),
            Field::StopWorkEnforced => self.stop_work = StopWorkAuthority::parse(value),
            Field::StopWorkActions => self.stop_work_actions = value.to_string(),
            Field::LifeSavingRules | Field::CausalFactors | Field::Evidence => {}
        }
    }
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}
