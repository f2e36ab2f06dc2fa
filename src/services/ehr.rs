//! EHR records as triples and prompt context.

use crate::models::{
    ClinicalCode, EhrVisit, EntityType, PatientFields, RelationType, Triple, TripleSource,
};

/// Converts EHR visits into `EHR`-sourced triples.
///
/// Per visit: conditions become `HAS_DISEASE`, drugs `USED_DRUG` and
/// procedures `RECEIVED_TREATMENT`, each stamped with the visit time.
#[must_use]
pub fn ehr_to_triples(visits: &[EhrVisit]) -> Vec<Triple> {
    let mut triples = Vec::new();
    for visit in visits {
        let groups = [
            (&visit.conditions, RelationType::HasDisease, EntityType::Disease),
            (&visit.drugs, RelationType::UsedDrug, EntityType::Drug),
            (&visit.procedures, RelationType::ReceivedTreatment, EntityType::Treatment),
        ];
        for (codes, relation, tail_type) in groups {
            triples.extend(codes.iter().map(|code| {
                Triple::typed(
                    visit.patient_id.as_str(),
                    EntityType::Patient,
                    relation,
                    code.as_str(),
                    tail_type,
                    TripleSource::Ehr,
                )
                .with_timestamp(visit.visit_time.clone())
            }));
        }
    }
    triples
}

/// Renders `PatientID: <id>; Conditions: [...]; Drugs: [...]; Procedures: [...]`.
///
/// Names fall back to the code when unknown.
#[must_use]
pub fn patient_context(patient_id: &str, fields: &PatientFields) -> String {
    format!(
        "PatientID: {patient_id}; Conditions: [{}]; Drugs: [{}]; Procedures: [{}]",
        render_names(&fields.conditions),
        render_names(&fields.drugs),
        render_names(&fields.procedures),
    )
}

fn render_names(visits: &[Vec<ClinicalCode>]) -> String {
    visits
        .iter()
        .flatten()
        .map(ClinicalCode::display_name)
        .collect::<Vec<_>>()
        .join(", ")
}
