//! Patient-side inputs: EHR visits and coded clinical fields.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One EHR visit with plain code identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EhrVisit {
    /// Patient identifier.
    pub patient_id: String,
    /// Condition codes.
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Procedure codes.
    #[serde(default)]
    pub procedures: Vec<String>,
    /// Drug codes.
    #[serde(default)]
    pub drugs: Vec<String>,
    /// ISO date of the visit.
    #[serde(default)]
    pub visit_time: Option<String>,
}

/// A clinical code with its dictionary name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalCode {
    /// Raw code.
    pub code: String,
    /// Human-readable name (empty when the dictionary has no entry).
    #[serde(default)]
    pub name: String,
}

impl ClinicalCode {
    /// Creates a code with a name.
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }

    /// Returns the name, or the raw code when the name is unknown.
    #[must_use]
    pub fn display_name(&self) -> &str {
        let name = self.name.trim();
        if name.is_empty() { &self.code } else { name }
    }
}

/// Coded clinical fields of a patient, grouped per visit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientFields {
    /// Conditions per visit.
    #[serde(default)]
    pub conditions: Vec<Vec<ClinicalCode>>,
    /// Procedures per visit.
    #[serde(default)]
    pub procedures: Vec<Vec<ClinicalCode>>,
    /// Drugs per visit.
    #[serde(default)]
    pub drugs: Vec<Vec<ClinicalCode>>,
}

impl PatientFields {
    /// Returns `true` if no field holds any code.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [&self.conditions, &self.procedures, &self.drugs]
            .into_iter()
            .all(|field| field.iter().all(Vec::is_empty))
    }

    /// Distinct display names in first-seen order: conditions, procedures, drugs.
    #[must_use]
    pub fn concept_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        [&self.conditions, &self.procedures, &self.drugs]
            .into_iter()
            .flatten()
            .flatten()
            .map(ClinicalCode::display_name)
            .filter(|name| !name.is_empty() && seen.insert(name.to_string()))
            .map(str::to_string)
            .collect()
    }
}
