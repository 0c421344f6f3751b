//! Compressors for the non-observation resource types.

use digest_core::{CompressedClause, ResourceKind};
use serde_json::Value;

use crate::extract::{
    any_coding, display_or, first_date, first_of, format_quantity, has_coding_code,
    resolve_display, resolve_display_opt, str_field, UNKNOWN,
};

/// `Pt: {name}[, {gender}][, DOB {dob}][, MRN {mrn}]`.
pub fn compress_patient(patient: &Value) -> CompressedClause {
    let mut parts = vec![patient_name(patient)];

    if let Some(initial) = str_field(patient, "gender").and_then(|gender| gender.chars().next()) {
        parts.push(initial.to_uppercase().collect());
    }
    if let Some(birth_date) = str_field(patient, "birthDate") {
        parts.push(format!("DOB {birth_date}"));
    }
    if let Some(mrn) = medical_record_number(patient) {
        parts.push(format!("MRN {mrn}"));
    }

    CompressedClause::new(ResourceKind::Patient, parts.join(", "))
}

/// Active conditions with their onset date.
pub fn compress_conditions(conditions: &[&Value]) -> Option<CompressedClause> {
    let items = conditions
        .iter()
        .filter(|condition| has_coding_code(condition.get("clinicalStatus"), "active"))
        .map(|condition| {
            with_date(
                resolve_display(condition.get("code")),
                condition_onset(condition),
            )
        })
        .collect();

    clause(ResourceKind::Condition, items)
}

/// Current medication orders with dose and frequency.
pub fn compress_medication_requests(
    requests: &[&Value],
    default_dose_unit: &str,
) -> Option<CompressedClause> {
    let items = requests
        .iter()
        .filter(|request| is_current_order(request))
        .map(|request| {
            let name = medication_name(request);
            let dosage = dosage_text(request, default_dose_unit);
            if dosage.is_empty() {
                name
            } else {
                format!("{name} {dosage}")
            }
        })
        .collect();

    clause(ResourceKind::MedicationRequest, items)
}

pub fn compress_allergies(allergies: &[&Value]) -> Option<CompressedClause> {
    let items = allergies
        .iter()
        .filter(|allergy| is_active_allergy(allergy))
        .map(|allergy| {
            let substance = display_or(allergy.get("code"), "Unknown Allergen");
            match first_manifestation(allergy) {
                Some(manifestation) => {
                    format!("{substance} ({})", resolve_display(Some(manifestation)))
                }
                None => substance,
            }
        })
        .collect();

    clause(ResourceKind::AllergyIntolerance, items)
}

pub fn compress_immunizations(immunizations: &[&Value]) -> Option<CompressedClause> {
    let items = immunizations
        .iter()
        .map(|immunization| {
            with_date(
                display_or(immunization.get("vaccineCode"), "Unknown Vaccine"),
                first_date(immunization, &["occurrenceDateTime"]),
            )
        })
        .collect();

    clause(ResourceKind::Immunization, items)
}

pub fn compress_procedures(procedures: &[&Value]) -> Option<CompressedClause> {
    let items = procedures
        .iter()
        .map(|procedure| {
            with_date(
                display_or(procedure.get("code"), "Unknown Procedure"),
                first_date(procedure, &["performedDateTime", "performedPeriod"]),
            )
        })
        .collect();

    clause(ResourceKind::Procedure, items)
}

pub fn compress_diagnostic_reports(reports: &[&Value]) -> Option<CompressedClause> {
    let items = reports
        .iter()
        .map(|report| {
            with_date(
                display_or(report.get("code"), "Unknown Report"),
                first_date(report, &["effectiveDateTime", "effectivePeriod", "issued"]),
            )
        })
        .collect();

    clause(ResourceKind::DiagnosticReport, items)
}

fn clause(kind: ResourceKind, items: Vec<String>) -> Option<CompressedClause> {
    if items.is_empty() {
        None
    } else {
        Some(CompressedClause::new(kind, items.join(", ")))
    }
}

fn with_date(label: String, date: Option<String>) -> String {
    match date {
        Some(date) => format!("{label} ({date})"),
        None => label,
    }
}

fn patient_name(patient: &Value) -> String {
    let Some(name) = first_of(patient, "name") else {
        return UNKNOWN.to_string();
    };

    let given = name
        .get("given")
        .and_then(Value::as_array)
        .map(|given| {
            given
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    let family = str_field(name, "family").unwrap_or("");

    let full = format!("{given} {family}").trim().to_string();
    if full.is_empty() {
        UNKNOWN.to_string()
    } else {
        full
    }
}

fn medical_record_number(patient: &Value) -> Option<&str> {
    patient
        .get("identifier")?
        .as_array()?
        .iter()
        .find(|identifier| any_coding(identifier.get("type"), is_mrn_coding))
        .and_then(|identifier| str_field(identifier, "value"))
}

fn is_mrn_coding(coding: &Value) -> bool {
    str_field(coding, "code") == Some("MR")
        || str_field(coding, "display") == Some("Medical record number")
}

fn condition_onset(condition: &Value) -> Option<String> {
    first_date(condition, &["onsetDateTime", "onsetPeriod"])
}

fn is_current_order(request: &Value) -> bool {
    match str_field(request, "status") {
        Some("active") => true,
        Some("unknown") => matches!(str_field(request, "intent"), None | Some("order")),
        _ => false,
    }
}

fn medication_name(request: &Value) -> String {
    resolve_display_opt(request.get("medicationCodeableConcept"))
        .or_else(|| {
            request
                .get("medicationReference")
                .and_then(|reference| str_field(reference, "display"))
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown Medication".to_string())
}

/// `"{dose}{unit} {frequency}"` from the first dosage instruction.
fn dosage_text(request: &Value, default_unit: &str) -> String {
    let Some(instruction) = first_of(request, "dosageInstruction") else {
        return String::new();
    };

    let mut parts = Vec::new();
    if let Some(dose) = first_of(instruction, "doseAndRate")
        .and_then(|dose_and_rate| dose_and_rate.get("doseQuantity"))
        .and_then(|quantity| format_quantity(quantity, default_unit))
    {
        parts.push(dose);
    }

    let frequency =
        resolve_display(instruction.get("timing").and_then(|timing| timing.get("code")));
    if frequency != UNKNOWN {
        parts.push(frequency);
    }

    parts.join(" ")
}

fn is_active_allergy(allergy: &Value) -> bool {
    match allergy.get("clinicalStatus").filter(|status| !status.is_null()) {
        None => true,
        Some(status) => has_coding_code(Some(status), "active"),
    }
}

fn first_manifestation(allergy: &Value) -> Option<&Value> {
    let manifestation = first_of(first_of(allergy, "reaction")?, "manifestation")?;
    // R5 wraps the concept in a CodeableReference.
    Some(manifestation.get("concept").unwrap_or(manifestation))
}
