//! Observation compressor.
//!
//! Observations are grouped by code, each group is ordered most recent first,
//! cut to the configured window and deduplicated on value and date before it
//! is rendered as `{display} {value} ({date})`.

use std::collections::{HashMap, HashSet};

use digest_core::{CompressedClause, DigestConfig, ResourceKind};
use serde_json::Value;
use tracing::trace;

use crate::extract::{
    any_coding, first_coding, first_date, format_number, format_quantity, resolve_display,
    str_field, UNKNOWN,
};

const SYSTOLIC_LOINC: &str = "8480-6";
const DIASTOLIC_LOINC: &str = "8462-4";

/// Short names for common lab and vital displays. Matching is exact.
const ABBREVIATIONS: [(&str, &str); 15] = [
    ("Hemoglobin A1c", "A1c"),
    ("Hemoglobin A1c/Hemoglobin.total in Blood", "A1c"),
    ("Blood pressure", "BP"),
    ("Blood pressure panel with all children optional", "BP"),
    ("Systolic blood pressure", "SBP"),
    ("Diastolic blood pressure", "DBP"),
    ("Low density lipoprotein", "LDL"),
    ("LDL Cholesterol", "LDL"),
    ("High density lipoprotein", "HDL"),
    ("HDL Cholesterol", "HDL"),
    ("Total cholesterol", "TC"),
    ("Triglycerides", "TG"),
    ("Heart rate", "HR"),
    ("Body mass index", "BMI"),
    ("Estimated glomerular filtration rate", "eGFR"),
];

/// One observation with everything needed to order and render it.
struct Reading {
    display: String,
    value: String,
    date: String,
}

impl Reading {
    fn from_observation(observation: &Value) -> Self {
        Self {
            display: abbreviate(resolve_display(observation.get("code"))),
            value: observation_value(observation),
            date: observation_date(observation).unwrap_or_default(),
        }
    }

    fn dedup_key(&self) -> String {
        format!("{}|{}", self.value, self.date)
    }

    fn render(&self) -> Option<String> {
        if self.value.is_empty() || self.date.is_empty() {
            return None;
        }
        Some(format!("{} {} ({})", self.display, self.value, self.date))
    }
}

/// `Labs: ...` clause, `None` when no observation has both a value and a date.
pub fn compress_observations(
    observations: &[&Value],
    config: &DigestConfig,
) -> Option<CompressedClause> {
    let mut items = Vec::new();

    for (key, group) in group_by_code(observations) {
        let mut readings: Vec<Reading> = group
            .into_iter()
            .map(Reading::from_observation)
            .collect();

        // Stable sort; undated readings carry an empty key and land last.
        readings.sort_by(|a, b| b.date.cmp(&a.date));
        if readings.len() > config.max_observations_per_type {
            trace!(
                code = %key,
                dropped = readings.len() - config.max_observations_per_type,
                "truncating observation group"
            );
            readings.truncate(config.max_observations_per_type);
        }

        let mut seen = HashSet::new();
        for reading in readings {
            if !seen.insert(reading.dedup_key()) {
                continue;
            }
            match reading.render() {
                Some(text) => items.push(text),
                None => trace!(code = %key, "observation lacks value or date"),
            }
        }
    }

    if items.is_empty() {
        None
    } else {
        Some(CompressedClause::new(
            ResourceKind::Observation,
            items.join(", "),
        ))
    }
}

/// Groups in order of first appearance.
fn group_by_code<'a>(observations: &[&'a Value]) -> Vec<(String, Vec<&'a Value>)> {
    let mut groups: Vec<(String, Vec<&'a Value>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for &observation in observations {
        let key = group_key(observation);
        let slot = *positions.entry(key.clone()).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(observation);
    }

    groups
}

/// `coding[0].code`, else `coding[0].display`, else `text`, else `"Unknown"`.
fn group_key(observation: &Value) -> String {
    let code = observation.get("code");
    code.and_then(first_coding)
        .and_then(|coding| str_field(coding, "code").or_else(|| str_field(coding, "display")))
        .or_else(|| code.and_then(|code| str_field(code, "text")))
        .unwrap_or(UNKNOWN)
        .to_string()
}

fn observation_date(observation: &Value) -> Option<String> {
    first_date(
        observation,
        &["effectiveDateTime", "effectiveInstant", "effectivePeriod"],
    )
}

fn observation_value(observation: &Value) -> String {
    if let Some(quantity) = observation
        .get("valueQuantity")
        .and_then(|quantity| format_quantity(quantity, ""))
    {
        return quantity;
    }

    if let Some(concept) = observation
        .get("valueCodeableConcept")
        .filter(|concept| concept.is_object())
    {
        return resolve_display(Some(concept));
    }

    if let Some(text) = str_field(observation, "valueString") {
        return text.to_string();
    }

    observation
        .get("component")
        .and_then(Value::as_array)
        .and_then(|components| blood_pressure(components))
        .unwrap_or_default()
}

/// `"{systolic}/{diastolic}"` when both components carry a value.
fn blood_pressure(components: &[Value]) -> Option<String> {
    let systolic = component_value(components, SYSTOLIC_LOINC, "Systolic")?;
    let diastolic = component_value(components, DIASTOLIC_LOINC, "Diastolic")?;
    Some(format!("{systolic}/{diastolic}"))
}

fn component_value(components: &[Value], loinc: &str, label: &str) -> Option<String> {
    components
        .iter()
        .find(|component| {
            any_coding(component.get("code"), |coding| {
                str_field(coding, "code") == Some(loinc)
                    || str_field(coding, "display").is_some_and(|display| display.contains(label))
            })
        })
        .and_then(|component| component.get("valueQuantity"))
        .and_then(|quantity| quantity.get("value"))
        .and_then(format_number)
}

fn abbreviate(display: String) -> String {
    ABBREVIATIONS
        .iter()
        .find(|(full, _)| *full == display)
        .map(|(_, short)| short.to_string())
        .unwrap_or(display)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn a1c(value: f64, date: &str) -> Value {
        json!({
            "resourceType": "Observation",
            "code": {"coding": [{"system": "http://loinc.org", "code": "4548-4", "display": "Hemoglobin A1c"}]},
            "valueQuantity": {"value": value, "unit": "%"},
            "effectiveDateTime": date
        })
    }

    fn labs(observations: &[Value]) -> String {
        let refs: Vec<&Value> = observations.iter().collect();
        compress_observations(&refs, &DigestConfig::default())
            .map(|clause| clause.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn newest_reading_comes_first() {
        let observations = [a1c(7.1, "2023-01-10"), a1c(8.2, "2024-06-01")];
        assert_eq!(
            labs(&observations),
            "Labs: A1c 8.2% (2024-06-01), A1c 7.1% (2023-01-10)"
        );
    }

    #[test]
    fn groups_keep_first_appearance_order() {
        let glucose = json!({
            "code": {"text": "Glucose"},
            "valueQuantity": {"value": 98, "unit": "mg/dL"},
            "effectiveDateTime": "2024-01-01"
        });
        let observations = [a1c(6.5, "2022-01-01"), glucose, a1c(6.9, "2023-01-01")];
        assert_eq!(
            labs(&observations),
            "Labs: A1c 6.9% (2023-01-01), A1c 6.5% (2022-01-01), Glucose 98mg/dL (2024-01-01)"
        );
    }

    #[test]
    fn window_is_configurable() {
        let observations: Vec<Value> = (1..=5)
            .map(|day| a1c(7.0, &format!("2024-01-0{day}")))
            .collect();
        let refs: Vec<&Value> = observations.iter().collect();
        let config = DigestConfig {
            max_observations_per_type: 2,
            ..DigestConfig::default()
        };
        let clause = compress_observations(&refs, &config).unwrap();
        assert_eq!(clause.body, "A1c 7% (2024-01-05), A1c 7% (2024-01-04)");
    }

    #[test]
    fn undated_observations_are_not_rendered() {
        let undated = json!({"code": {"text": "Heart rate"}, "valueQuantity": {"value": 72, "unit": "/min"}});
        assert_eq!(labs(&[undated]), "");
    }

    #[test]
    fn coded_and_string_values() {
        let smoking = json!({
            "code": {"text": "Tobacco smoking status"},
            "valueCodeableConcept": {"coding": [{"display": "Never smoker"}]},
            "effectiveDateTime": "2024-02-02T09:00:00Z"
        });
        let note = json!({
            "code": {"coding": [{"display": "Urine color"}]},
            "valueString": "Amber",
            "effectivePeriod": {"start": "2024-02-03"}
        });
        assert_eq!(
            labs(&[smoking, note]),
            "Labs: Tobacco smoking status Never smoker (2024-02-02), Urine color Amber (2024-02-03)"
        );
    }

    #[test]
    fn blood_pressure_needs_both_components() {
        let partial = json!({
            "code": {"text": "Blood pressure"},
            "component": [{
                "code": {"coding": [{"code": SYSTOLIC_LOINC}]},
                "valueQuantity": {"value": 120, "unit": "mmHg"}
            }],
            "effectiveDateTime": "2024-06-01"
        });
        assert_eq!(labs(&[partial]), "");
    }

    #[test]
    fn blood_pressure_matches_component_display() {
        let reading = json!({
            "code": {"text": "Blood pressure"},
            "component": [
                {"code": {"coding": [{"display": "Diastolic blood pressure"}]}, "valueQuantity": {"value": 80}},
                {"code": {"coding": [{"display": "Systolic blood pressure"}]}, "valueQuantity": {"value": 125}}
            ],
            "effectiveDateTime": "2024-06-01"
        });
        assert_eq!(labs(&[reading]), "Labs: BP 125/80 (2024-06-01)");
    }

    #[test]
    fn group_key_falls_back_through_display_and_text() {
        assert_eq!(group_key(&json!({"code": {"coding": [{"display": "Weight"}]}})), "Weight");
        assert_eq!(group_key(&json!({"code": {"text": "Height"}})), "Height");
        assert_eq!(group_key(&json!({})), "Unknown");
    }

    #[test]
    fn unmatched_displays_pass_through() {
        assert_eq!(abbreviate("Hemoglobin A1c".to_string()), "A1c");
        assert_eq!(abbreviate("hemoglobin a1c".to_string()), "hemoglobin a1c");
    }
}
