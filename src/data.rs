//! Analysis records and report structures.
//!
//! Everything here serializes with camelCase field names, which is the
//! report format consumed by rendering and export collaborators.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::document::Paragraph;

pub mod schema;

/// Classification of one paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Fully meets a checklist requirement.
    Compliant,
    /// Meets a checklist requirement only in part.
    Partial,
    /// Contains a listed risk.
    Risk,
    /// Wording open to more than one reading.
    Ambiguous,
    /// Silent on a point the party needs covered.
    SilenceRisk,
    /// Defers to an external document or rule.
    ExternalReference,
    /// Nothing to report.
    #[default]
    None,
}

impl Category {
    /// All categories in report order.
    pub const ALL: [Category; 7] = [
        Self::Compliant,
        Self::Partial,
        Self::Risk,
        Self::Ambiguous,
        Self::SilenceRisk,
        Self::ExternalReference,
        Self::None,
    ];

    /// Parses a wire label.
    ///
    /// Accepts kebab, snake and camel spellings plus the legacy `checklist`,
    /// `missing` and `other` labels. An empty label is [`Category::None`];
    /// an unrecognised one is `None`.
    pub fn parse(label: &str) -> Option<Self> {
        let key: String = label
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        let category = match key.as_str() {
            "" | "none" | "null" => Self::None,
            "compliant" | "checklist" | "complies" => Self::Compliant,
            "partial" => Self::Partial,
            "risk" => Self::Risk,
            "ambiguous" | "other" => Self::Ambiguous,
            "silencerisk" | "silence" | "missing" => Self::SilenceRisk,
            "externalreference" | "external" | "reference" => Self::ExternalReference,
            _ => return None,
        };
        Some(category)
    }

    /// Returns the kebab-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::Partial => "partial",
            Self::Risk => "risk",
            Self::Ambiguous => "ambiguous",
            Self::SilenceRisk => "silence-risk",
            Self::ExternalReference => "external-reference",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Self::None),
            Some(label) => Self::parse(&label)
                .ok_or_else(|| D::Error::custom(format!("unknown category {label:?}"))),
        }
    }
}

/// Which party's interests the analysis protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    /// The purchasing party.
    #[default]
    Buyer,
    /// The supplying party.
    Supplier,
}

impl Perspective {
    /// Returns the party name used in prompts.
    pub fn party(self) -> &'static str {
        match self {
            Self::Buyer => "Buyer",
            Self::Supplier => "Supplier",
        }
    }

    /// Returns the other party's name.
    pub fn counterparty(self) -> &'static str {
        match self {
            Self::Buyer => "Supplier",
            Self::Supplier => "Buyer",
        }
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.party())
    }
}

/// Classification result attached to one paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Paragraph this finding belongs to.
    pub paragraph_id: String,
    /// Assigned category.
    pub category: Category,
    /// Assessment of the paragraph.
    pub comment: String,
    /// Suggested action.
    pub recommendation: String,
    /// Suggested replacement wording.
    pub improved_clause: String,
    /// Legal consequence for the protected party.
    pub legal_risk: String,
}

impl Finding {
    /// A finding with category `none` and no commentary.
    pub fn none(paragraph_id: impl Into<String>) -> Self {
        Self {
            paragraph_id: paragraph_id.into(),
            category: Category::None,
            comment: String::new(),
            recommendation: String::new(),
            improved_clause: String::new(),
            legal_risk: String::new(),
        }
    }

    /// Returns true if any commentary field is non-empty.
    pub fn has_commentary(&self) -> bool {
        [
            &self.comment,
            &self.recommendation,
            &self.improved_clause,
            &self.legal_risk,
        ]
        .iter()
        .any(|field| !field.trim().is_empty())
    }
}

/// A checklist requirement the contract does not satisfy anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingRequirement {
    /// `missing_<n>`.
    pub id: String,
    /// The requirement as stated in the checklist.
    pub requirement_text: String,
    /// Why its absence matters.
    pub comment: String,
    /// Suggested clause or action.
    pub recommendation: String,
}

/// Kind of conflicting values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContradictionType {
    /// Deadlines and durations.
    Temporal,
    /// Money amounts.
    Financial,
    /// Percentages and other quantities.
    Quantitative,
    /// Liability regimes.
    Legal,
}

/// Impact grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Needs action before signing.
    High,
    /// Should be clarified.
    Medium,
    /// Minor.
    Low,
}

impl Severity {
    /// Parses a wire label, accepting common synonyms.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "high" | "critical" | "severe" | "высокая" | "высокий" => Some(Self::High),
            "medium" | "moderate" | "средняя" | "средний" => Some(Self::Medium),
            "low" | "minor" | "низкая" | "низкий" => Some(Self::Low),
            _ => None,
        }
    }
}

/// A value found in a paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphValue {
    /// Paragraph the value appears in.
    pub paragraph_id: String,
    /// Value as written.
    pub value: String,
    /// Surrounding text.
    pub context: String,
}

/// Two paragraphs stating incompatible values for the same thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contradiction {
    /// `contradiction_<n>`.
    pub id: String,
    /// Kind of values in conflict.
    #[serde(rename = "type")]
    pub kind: ContradictionType,
    /// What conflicts and why.
    pub description: String,
    /// First paragraph and value.
    pub first: ParagraphValue,
    /// Second paragraph and value.
    pub second: ParagraphValue,
    /// Impact grade.
    pub severity: Severity,
    /// How to reconcile the two.
    pub recommendation: String,
}

/// Area in which rights are unevenly distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImbalanceType {
    /// Rights to terminate.
    Termination,
    /// Rights to change terms.
    Modification,
    /// Liability allocation.
    Liability,
    /// Inspection, approval and control rights.
    Control,
    /// Notice and procedural rights.
    Procedural,
    /// Overall weighted assessment.
    #[serde(alias = "weighted_analysis")]
    WeightedAnalysis,
    /// Rights not covered by another type.
    #[serde(alias = "general_rights")]
    GeneralRights,
    /// Anything else.
    #[serde(other)]
    Other,
}

impl ImbalanceType {
    /// Parses a wire label; unknown labels map to [`ImbalanceType::Other`].
    pub fn from_label(label: &str) -> Self {
        let key: String = label
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "termination" => Self::Termination,
            "modification" => Self::Modification,
            "liability" => Self::Liability,
            "control" => Self::Control,
            "procedural" => Self::Procedural,
            "weightedanalysis" => Self::WeightedAnalysis,
            "generalrights" | "general" => Self::GeneralRights,
            _ => Self::Other,
        }
    }

    /// Returns the kebab-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Termination => "termination",
            Self::Modification => "modification",
            Self::Liability => "liability",
            Self::Control => "control",
            Self::Procedural => "procedural",
            Self::WeightedAnalysis => "weighted-analysis",
            Self::GeneralRights => "general-rights",
            Self::Other => "other",
        }
    }
}

/// Uneven distribution of rights between the parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RightsImbalance {
    /// `imbalance_<n>`.
    pub id: String,
    /// Area of the imbalance.
    #[serde(rename = "type")]
    pub kind: ImbalanceType,
    /// What is unbalanced.
    pub description: String,
    /// Rights held by the buyer in this area.
    pub buyer_right_count: u32,
    /// Rights held by the supplier in this area.
    pub supplier_right_count: u32,
    /// Impact grade.
    pub severity: Severity,
    /// How to rebalance.
    pub recommendation: String,
}

/// Whole-contract assessment built last from bounded samples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StructuralSummary {
    /// Overall verdict.
    pub overall_assessment: String,
    /// Most important risks.
    pub top_risks: Vec<String>,
    /// Remarks on structure and completeness.
    pub structure_comments: String,
    /// Remarks on legal compliance.
    pub legal_compliance_note: String,
    /// Prioritized recommendations.
    pub recommendations: Vec<String>,
}

/// A pipeline stage that degraded to an empty result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFailure {
    /// Stage name.
    pub stage: String,
    /// Error that caused the degradation.
    pub error: String,
}

/// Local degradations recorded during one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDiagnostics {
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
    /// Number of chunks dispatched.
    pub chunk_count: usize,
    /// Number of sequential dispatch batches.
    pub batch_count: usize,
    /// Chunks whose output hit the ceiling and was recovered in part.
    pub truncated_chunks: Vec<usize>,
    /// Chunks whose output could not be parsed; their paragraphs are `none`.
    pub degraded_chunks: Vec<usize>,
    /// Stages that degraded to an empty result.
    pub stage_failures: Vec<StageFailure>,
}

impl RunDiagnostics {
    /// Creates empty diagnostics stamped with the current time.
    pub fn new() -> Self {
        Self {
            generated_at: Utc::now(),
            chunk_count: 0,
            batch_count: 0,
            truncated_chunks: Vec::new(),
            degraded_chunks: Vec::new(),
            stage_failures: Vec::new(),
        }
    }
}

impl Default for RunDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete result of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Segmented paragraphs in document order.
    pub paragraphs: Vec<Paragraph>,
    /// One finding per paragraph, index-aligned with `paragraphs`.
    pub findings: Vec<Finding>,
    /// Checklist requirements absent from the contract.
    pub missing_requirements: Vec<MissingRequirement>,
    /// Verified contradictions.
    pub contradictions: Vec<Contradiction>,
    /// Rights imbalances between the parties.
    pub rights_imbalance: Vec<RightsImbalance>,
    /// Whole-contract assessment.
    pub structural_summary: StructuralSummary,
    /// Local degradations.
    pub diagnostics: RunDiagnostics,
}

impl AnalysisReport {
    /// Counts findings per category.
    pub fn category_counts(&self) -> BTreeMap<Category, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.category).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the finding for a paragraph id.
    pub fn finding(&self, paragraph_id: &str) -> Option<&Finding> {
        self.findings.iter().find(|f| f.paragraph_id == paragraph_id)
    }
}
