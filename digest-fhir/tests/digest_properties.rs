use digest_core::{DigestConfig, DigestError, INVALID_BUNDLE};
use digest_fhir::{compress, digest_bundle_value};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn bundle(resources: Vec<Value>) -> Value {
    json!({
        "resourceType": "Bundle",
        "type": "searchset",
        "entry": resources
            .into_iter()
            .map(|resource| json!({ "resource": resource }))
            .collect::<Vec<_>>()
    })
}

fn condition(name: &str, status: &str) -> Value {
    json!({
        "resourceType": "Condition",
        "clinicalStatus": { "coding": [{ "code": status }] },
        "code": { "text": name }
    })
}

fn a1c(value: f64, date: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "code": { "coding": [{ "system": "http://loinc.org", "code": "4548-4", "display": "Hemoglobin A1c" }] },
        "valueQuantity": { "value": value, "unit": "%" },
        "effectiveDateTime": date
    })
}

#[test]
fn sentinels_distinguish_invalid_from_empty() {
    assert_eq!(compress(&Value::Null), INVALID_BUNDLE);
    assert_eq!(compress(&json!({})), INVALID_BUNDLE);
    assert_eq!(compress(&json!({ "entry": "not-a-list" })), INVALID_BUNDLE);
    assert_eq!(compress(&json!({ "entry": [] })), "");
}

#[test]
fn invalid_bundle_is_an_error_for_the_structured_digest() {
    assert_eq!(
        digest_bundle_value(&json!({}), &DigestConfig::default()),
        Err(DigestError::InvalidBundle)
    );
    let empty = digest_bundle_value(&json!({ "entry": [] }), &DigestConfig::default())
        .expect("empty entry list is valid");
    assert!(empty.is_empty());
}

#[test]
fn compressing_twice_gives_the_same_text() {
    let input = bundle(vec![
        a1c(7.4, "2024-03-01"),
        condition("Asthma", "active"),
        json!({ "resourceType": "Patient", "name": [{ "given": ["Li"], "family": "Wei" }] }),
    ]);
    assert_eq!(compress(&input), compress(&input));
}

#[test]
fn only_active_conditions_are_listed() {
    let input = bundle(vec![
        condition("diabetes", "active"),
        condition("hypertension", "inactive"),
    ]);
    assert_eq!(compress(&input), "Dx: diabetes");
}

#[test]
fn inactive_only_conditions_produce_no_clause() {
    let input = bundle(vec![condition("hypertension", "resolved")]);
    assert_eq!(compress(&input), "");
}

#[test]
fn observation_groups_are_capped_at_ten_newest() {
    let observations: Vec<Value> = (0..25)
        .map(|offset| {
            let month = offset % 12 + 1;
            let year = 2000 + offset / 12;
            a1c(7.0, &format!("{year}-{month:02}-15"))
        })
        .collect();
    let output = compress(&bundle(observations));

    assert_eq!(output.matches("A1c").count(), 10);
    assert!(output.starts_with("Labs: A1c 7% (2002-01-15), A1c 7% (2001-12-15)"));
    assert!(output.ends_with("A1c 7% (2001-04-15)"));
    assert!(!output.contains("2001-03-15"));
    assert!(!output.contains("2000-"));
}

#[test]
fn identical_readings_collapse() {
    let input = bundle(vec![a1c(8.2, "2024-06-01"), a1c(8.2, "2024-06-01T14:00:00Z")]);
    assert_eq!(compress(&input), "Labs: A1c 8.2% (2024-06-01)");
}

#[test]
fn blood_pressure_components_are_paired() {
    let input = bundle(vec![json!({
        "resourceType": "Observation",
        "code": { "coding": [{ "system": "http://loinc.org", "code": "85354-9", "display": "Blood pressure" }] },
        "component": [
            {
                "code": { "coding": [{ "system": "http://loinc.org", "code": "8480-6" }] },
                "valueQuantity": { "value": 142, "unit": "mmHg" }
            },
            {
                "code": { "coding": [{ "system": "http://loinc.org", "code": "8462-4" }] },
                "valueQuantity": { "value": 90, "unit": "mmHg" }
            }
        ],
        "effectiveDateTime": "2024-06-01"
    })]);
    assert!(compress(&input).contains("BP 142/90 (2024-06-01)"));
}

#[test]
fn missing_fields_degrade_to_fallbacks() {
    let input = bundle(vec![
        json!({ "resourceType": "Patient" }),
        json!({ "resourceType": "Condition", "clinicalStatus": { "coding": [{ "code": "active" }] } }),
        json!({ "resourceType": "MedicationRequest", "status": "active" }),
    ]);
    assert_eq!(
        compress(&input),
        "Pt: Unknown; Dx: Unknown; Rx: Unknown Medication"
    );
}

#[test]
fn only_the_first_patient_is_used() {
    let input = bundle(vec![
        json!({ "resourceType": "Patient", "name": [{ "family": "First" }] }),
        json!({ "resourceType": "Patient", "name": [{ "family": "Second" }] }),
    ]);
    assert_eq!(compress(&input), "Pt: First");
}

#[test]
fn untyped_and_unknown_entries_are_ignored() {
    let input = json!({
        "entry": [
            {},
            { "resource": null },
            { "resource": { "id": "no-type" } },
            { "resource": { "resourceType": "Encounter", "status": "finished" } },
            { "resource": { "resourceType": "Procedure", "code": { "text": "Appendectomy" }, "performedDateTime": "2015-07-04" } }
        ]
    });
    let digest = digest_bundle_value(&input, &DigestConfig::default()).expect("valid bundle");

    assert_eq!(digest.text(), "Proc: Appendectomy (2015-07-04)");
    assert_eq!(digest.skipped_entries, 3);
    assert_eq!(digest.resource_counts.get("Encounter"), Some(&1));
}

#[test]
fn clauses_follow_fixed_order_regardless_of_entry_order() {
    let input = bundle(vec![
        json!({ "resourceType": "DiagnosticReport", "code": { "text": "CBC" }, "effectiveDateTime": "2024-01-02" }),
        json!({ "resourceType": "Immunization", "vaccineCode": { "text": "Tdap" } }),
        json!({ "resourceType": "Patient", "gender": "male" }),
    ]);
    assert_eq!(
        compress(&input),
        "Pt: Unknown, M; Vax: Tdap; Reports: CBC (2024-01-02)"
    );
}
