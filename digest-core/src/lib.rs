//! Core types shared by the bundle digest crates.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Text returned in place of a digest when the bundle has no usable `entry` array.
pub const INVALID_BUNDLE: &str = "Invalid or empty FHIR Bundle";

/// Separator placed between clauses of a digest.
pub const CLAUSE_SEPARATOR: &str = "; ";

/// Tunables for the compressor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DigestConfig {
    /// Most recent observations kept per observation code.
    pub max_observations_per_type: usize,
    /// Unit appended to a dose quantity that carries neither `unit` nor `code`.
    pub default_dose_unit: String,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_observations_per_type: 10,
            default_dose_unit: "mg".to_string(),
        }
    }
}

impl DigestConfig {
    /// Reject settings that would silently empty a clause.
    pub fn validate(&self) -> Result<(), DigestError> {
        if self.max_observations_per_type == 0 {
            return Err(DigestError::Config(
                "max_observations_per_type must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// FHIR resource types the compressor knows about.
///
/// Variant order is the clause order of the digest. Types outside the
/// supported set are kept as `Unrecognized` so they can be grouped and
/// counted without ever producing output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    Patient,
    Condition,
    MedicationRequest,
    Observation,
    AllergyIntolerance,
    Immunization,
    Procedure,
    DiagnosticReport,
    Unrecognized(String),
}

impl ResourceKind {
    /// Supported kinds in clause order.
    pub const SUPPORTED: [ResourceKind; 8] = [
        ResourceKind::Patient,
        ResourceKind::Condition,
        ResourceKind::MedicationRequest,
        ResourceKind::Observation,
        ResourceKind::AllergyIntolerance,
        ResourceKind::Immunization,
        ResourceKind::Procedure,
        ResourceKind::DiagnosticReport,
    ];

    pub fn from_type_name(name: &str) -> Self {
        match name {
            "Patient" => Self::Patient,
            "Condition" => Self::Condition,
            "MedicationRequest" => Self::MedicationRequest,
            "Observation" => Self::Observation,
            "AllergyIntolerance" => Self::AllergyIntolerance,
            "Immunization" => Self::Immunization,
            "Procedure" => Self::Procedure,
            "DiagnosticReport" => Self::DiagnosticReport,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// The `resourceType` string this kind was parsed from.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Patient => "Patient",
            Self::Condition => "Condition",
            Self::MedicationRequest => "MedicationRequest",
            Self::Observation => "Observation",
            Self::AllergyIntolerance => "AllergyIntolerance",
            Self::Immunization => "Immunization",
            Self::Procedure => "Procedure",
            Self::DiagnosticReport => "DiagnosticReport",
            Self::Unrecognized(name) => name,
        }
    }

    /// Clause prefix, `None` for kinds that never produce a clause.
    pub fn clause_label(&self) -> Option<&'static str> {
        match self {
            Self::Patient => Some("Pt"),
            Self::Condition => Some("Dx"),
            Self::MedicationRequest => Some("Rx"),
            Self::Observation => Some("Labs"),
            Self::AllergyIntolerance => Some("Allergies"),
            Self::Immunization => Some("Vax"),
            Self::Procedure => Some("Proc"),
            Self::DiagnosticReport => Some("Reports"),
            Self::Unrecognized(_) => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for ResourceKind {
    fn from(name: String) -> Self {
        Self::from_type_name(&name)
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.type_name().to_string()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// One labeled segment of a digest, e.g. `Dx: Diabetes (2010-01-01)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompressedClause {
    pub kind: ResourceKind,
    pub body: String,
}

impl CompressedClause {
    pub fn new(kind: ResourceKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    pub fn label(&self) -> &str {
        self.kind
            .clause_label()
            .unwrap_or_else(|| self.kind.type_name())
    }
}

impl fmt::Display for CompressedClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label(), self.body)
    }
}

/// Structured result of compressing one bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BundleDigest {
    pub clauses: Vec<CompressedClause>,
    /// Resources seen per `resourceType`, unrecognized types included.
    pub resource_counts: BTreeMap<String, usize>,
    /// Entries dropped for lacking a resource or a `resourceType`.
    pub skipped_entries: usize,
}

impl BundleDigest {
    /// Build a digest, putting clauses into clause order.
    pub fn new(
        mut clauses: Vec<CompressedClause>,
        resource_counts: BTreeMap<String, usize>,
        skipped_entries: usize,
    ) -> Self {
        clauses.sort_by(|a, b| a.kind.cmp(&b.kind));
        Self {
            clauses,
            resource_counts,
            skipped_entries,
        }
    }

    /// The digest string handed to prompt construction.
    pub fn text(&self) -> String {
        self.clauses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(CLAUSE_SEPARATOR)
    }

    pub fn clause(&self, kind: &ResourceKind) -> Option<&CompressedClause> {
        self.clauses.iter().find(|clause| &clause.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for BundleDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Errors raised by the `Result`-returning entry points.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("Invalid or empty FHIR Bundle")]
    InvalidBundle,
    #[error("Could not parse bundle JSON: {0}")]
    Parse(String),
    #[error("Invalid digest configuration: {0}")]
    Config(String),
}
