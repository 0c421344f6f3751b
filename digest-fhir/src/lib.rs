//! FHIR R4 Bundle to compact clinical digest for LLM prompts.
//!
//! The digest is one line of labeled clauses (`Pt: ...; Dx: ...; Rx: ...`)
//! built from the resources in `Bundle.entry`. Malformed or partial resources
//! degrade to fallbacks; only a bundle without an `entry` array is rejected.

use std::collections::BTreeMap;

use digest_core::{BundleDigest, CompressedClause, DigestConfig, DigestError, ResourceKind};
use serde_json::Value;
use tracing::debug;

mod clinical;
mod extract;
mod observation;

pub use clinical::{
    compress_allergies, compress_conditions, compress_diagnostic_reports, compress_immunizations,
    compress_medication_requests, compress_patient, compress_procedures,
};
pub use observation::compress_observations;

/// Compress a bundle with the default configuration.
pub fn compress(bundle: &Value) -> String {
    compress_bundle_value(bundle, &DigestConfig::default())
}

/// Compress a bundle JSON string.
///
/// Only JSON syntax errors are reported; an unusable bundle still yields the
/// sentinel text.
pub fn compress_bundle_str(
    bundle_json: &str,
    config: &DigestConfig,
) -> Result<String, DigestError> {
    let value: Value =
        serde_json::from_str(bundle_json).map_err(|err| DigestError::Parse(err.to_string()))?;
    Ok(compress_bundle_value(&value, config))
}

/// Compress a `serde_json::Value` bundle.
///
/// Returns `"Invalid or empty FHIR Bundle"` when `entry` is missing or not an
/// array and `""` when it is an empty array.
pub fn compress_bundle_value(bundle: &Value, config: &DigestConfig) -> String {
    match digest_bundle_value(bundle, config) {
        Ok(digest) => digest.text(),
        Err(err) => err.to_string(),
    }
}

/// Build the structured digest behind [`compress_bundle_value`].
pub fn digest_bundle_value(
    bundle: &Value,
    config: &DigestConfig,
) -> Result<BundleDigest, DigestError> {
    let entries = bundle
        .get("entry")
        .and_then(Value::as_array)
        .ok_or(DigestError::InvalidBundle)?;

    let mut skipped_entries = 0;
    let mut groups: BTreeMap<ResourceKind, Vec<&Value>> = BTreeMap::new();

    for (index, entry) in entries.iter().enumerate() {
        let Some((kind, resource)) = typed_resource(entry) else {
            debug!(index, "skipping entry without a typed resource");
            skipped_entries += 1;
            continue;
        };
        groups.entry(kind).or_default().push(resource);
    }

    let resource_counts = groups
        .iter()
        .map(|(kind, resources)| (kind.type_name().to_string(), resources.len()))
        .collect();

    let clauses = groups
        .iter()
        .filter_map(|(kind, resources)| compress_group(kind, resources, config))
        .collect();

    Ok(BundleDigest::new(clauses, resource_counts, skipped_entries))
}

fn typed_resource(entry: &Value) -> Option<(ResourceKind, &Value)> {
    let resource = entry.get("resource")?;
    let resource_type = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())?;
    Some((ResourceKind::from_type_name(resource_type), resource))
}

fn compress_group(
    kind: &ResourceKind,
    resources: &[&Value],
    config: &DigestConfig,
) -> Option<CompressedClause> {
    let clause = match kind {
        ResourceKind::Patient => resources.first().map(|patient| compress_patient(patient)),
        ResourceKind::Condition => compress_conditions(resources),
        ResourceKind::MedicationRequest => {
            compress_medication_requests(resources, &config.default_dose_unit)
        }
        ResourceKind::Observation => compress_observations(resources, config),
        ResourceKind::AllergyIntolerance => compress_allergies(resources),
        ResourceKind::Immunization => compress_immunizations(resources),
        ResourceKind::Procedure => compress_procedures(resources),
        ResourceKind::DiagnosticReport => compress_diagnostic_reports(resources),
        ResourceKind::Unrecognized(name) => {
            debug!(
                resource_type = %name,
                count = resources.len(),
                "no compressor for resource type"
            );
            return None;
        }
    };

    match &clause {
        Some(clause) => debug!(kind = %kind, length = clause.body.len(), "compressed clause"),
        None => debug!(kind = %kind, count = resources.len(), "group produced no clause"),
    }

    clause
}
