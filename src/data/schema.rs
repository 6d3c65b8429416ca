//! Expected response records for each inference call type.
//!
//! Each schema is strict about its shape and lenient about scalar
//! spellings: `null` commentary reads as empty, numeric ids and counts may
//! arrive as strings. Shape violations fail validation and count as
//! malformed output.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{Category, Finding, StructuralSummary};
use crate::recovery::ResponseSchema;

/// Reads a string field that may be `null`, a number or a list of strings.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::trim))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
    })
}

/// Reads a string list that may be a single string or `null`.
fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    })
}

/// Reads a non-negative count that may arrive as a numeric string.
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid count {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid count {s:?}"))),
        Some(other) => Err(D::Error::custom(format!("invalid count {other}"))),
    }
}

fn records_from<T: for<'de> Deserialize<'de>>(fragments: Vec<Value>) -> Vec<T> {
    fragments
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

/// One paragraph classification as returned by a chunk call.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireFinding {
    /// Paragraph id; a bare number is read as `p<number>`.
    #[serde(alias = "paragraphId", deserialize_with = "lenient_text")]
    pub id: String,
    /// Category label.
    #[serde(default)]
    pub category: Category,
    /// Assessment.
    #[serde(default, deserialize_with = "lenient_text")]
    pub comment: String,
    /// Suggested action.
    #[serde(default, deserialize_with = "lenient_text")]
    pub recommendation: String,
    /// Suggested wording.
    #[serde(default, deserialize_with = "lenient_text")]
    pub improved_clause: String,
    /// Legal consequence.
    #[serde(default, deserialize_with = "lenient_text")]
    pub legal_risk: String,
}

impl WireFinding {
    /// Returns the normalized paragraph id.
    pub fn paragraph_id(&self) -> String {
        let id = self.id.trim();
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            format!("p{id}")
        } else {
            id.to_lowercase()
        }
    }

    /// Converts into a report finding.
    pub fn into_finding(self) -> Finding {
        Finding {
            paragraph_id: self.paragraph_id(),
            category: self.category,
            comment: self.comment,
            recommendation: self.recommendation,
            improved_clause: self.improved_clause,
            legal_risk: self.legal_risk,
        }
    }
}

/// Chunk classification response: `{"analysis": [...]}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChunkResponse {
    /// Findings for the chunk's paragraphs.
    #[serde(alias = "findings")]
    pub analysis: Vec<WireFinding>,
}

impl ResponseSchema for ChunkResponse {
    const FRAGMENT_KEYS: &'static [&'static str] = &["id", "category"];

    fn validate(&self) -> Result<(), String> {
        if self.analysis.iter().any(|f| f.id.trim().is_empty()) {
            return Err("finding without a paragraph id".to_string());
        }
        Ok(())
    }

    fn from_fragments(fragments: Vec<Value>) -> Option<Self> {
        let analysis: Vec<WireFinding> = records_from(fragments);
        (!analysis.is_empty()).then_some(Self { analysis })
    }
}

/// One missing requirement as returned by the gap call.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireMissingRequirement {
    /// Requirement text.
    #[serde(alias = "requirementText", deserialize_with = "lenient_text")]
    pub requirement: String,
    /// Why it matters.
    #[serde(default, deserialize_with = "lenient_text")]
    pub comment: String,
    /// Suggested clause.
    #[serde(default, deserialize_with = "lenient_text")]
    pub recommendation: String,
}

/// Gap detection response: `{"missingRequirements": [...]}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GapResponse {
    /// Requirements the contract does not satisfy.
    pub missing_requirements: Vec<WireMissingRequirement>,
}

impl ResponseSchema for GapResponse {
    const FRAGMENT_KEYS: &'static [&'static str] = &["requirement"];

    fn validate(&self) -> Result<(), String> {
        if self
            .missing_requirements
            .iter()
            .any(|r| r.requirement.is_empty())
        {
            return Err("missing requirement without text".to_string());
        }
        Ok(())
    }

    fn from_fragments(fragments: Vec<Value>) -> Option<Self> {
        let missing_requirements: Vec<WireMissingRequirement> = records_from(fragments);
        (!missing_requirements.is_empty()).then_some(Self {
            missing_requirements,
        })
    }
}

/// Verdict on one candidate contradiction.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationVerdict {
    /// Whether the two values really conflict.
    pub is_contradiction: bool,
    /// Severity label.
    #[serde(default, deserialize_with = "lenient_text")]
    pub severity: String,
    /// Explanation of the conflict.
    #[serde(default, alias = "explanation", deserialize_with = "lenient_text")]
    pub description: String,
    /// How to reconcile.
    #[serde(default, deserialize_with = "lenient_text")]
    pub recommendation: String,
}

impl ResponseSchema for VerificationVerdict {
    const FRAGMENT_KEYS: &'static [&'static str] = &["isContradiction"];

    fn from_fragments(fragments: Vec<Value>) -> Option<Self> {
        records_from(fragments).into_iter().next()
    }
}

/// One imbalance group as returned by the rights call.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireImbalance {
    /// Area label.
    #[serde(default, rename = "type", deserialize_with = "lenient_text")]
    pub kind: String,
    /// What is unbalanced.
    #[serde(deserialize_with = "lenient_text")]
    pub description: String,
    /// Buyer rights in the area.
    #[serde(default, deserialize_with = "lenient_count")]
    pub buyer_right_count: u32,
    /// Supplier rights in the area.
    #[serde(default, deserialize_with = "lenient_count")]
    pub supplier_right_count: u32,
    /// Severity label, derived from the counts when empty.
    #[serde(default, deserialize_with = "lenient_text")]
    pub severity: String,
    /// How to rebalance.
    #[serde(default, deserialize_with = "lenient_text")]
    pub recommendation: String,
}

/// Rights-imbalance response: `{"rightsImbalance": [...]}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RightsResponse {
    /// Imbalance groups.
    #[serde(alias = "imbalances")]
    pub rights_imbalance: Vec<WireImbalance>,
}

impl ResponseSchema for RightsResponse {
    const FRAGMENT_KEYS: &'static [&'static str] = &["buyerRightCount", "supplierRightCount"];

    fn validate(&self) -> Result<(), String> {
        if self.rights_imbalance.iter().any(|r| r.description.is_empty()) {
            return Err("imbalance without description".to_string());
        }
        Ok(())
    }

    fn from_fragments(fragments: Vec<Value>) -> Option<Self> {
        let rights_imbalance: Vec<WireImbalance> = records_from(fragments);
        (!rights_imbalance.is_empty()).then_some(Self { rights_imbalance })
    }
}

/// Final synthesis response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisResponse {
    /// Overall verdict.
    #[serde(deserialize_with = "lenient_text")]
    pub overall_assessment: String,
    /// Most important risks.
    #[serde(default, alias = "topRisks", deserialize_with = "lenient_list")]
    pub key_risks: Vec<String>,
    /// Structure remarks.
    #[serde(default, deserialize_with = "lenient_text")]
    pub structure_comments: String,
    /// Legal compliance remarks.
    #[serde(
        default,
        alias = "legalComplianceNote",
        deserialize_with = "lenient_text"
    )]
    pub legal_compliance: String,
    /// Prioritized recommendations.
    #[serde(default, deserialize_with = "lenient_list")]
    pub recommendations: Vec<String>,
}

impl SynthesisResponse {
    /// Converts into the report summary.
    pub fn into_summary(self) -> StructuralSummary {
        StructuralSummary {
            overall_assessment: self.overall_assessment,
            top_risks: self.key_risks,
            structure_comments: self.structure_comments,
            legal_compliance_note: self.legal_compliance,
            recommendations: self.recommendations,
        }
    }
}

impl ResponseSchema for SynthesisResponse {
    const FRAGMENT_KEYS: &'static [&'static str] = &["overallAssessment"];

    fn validate(&self) -> Result<(), String> {
        if self.overall_assessment.is_empty() {
            return Err("empty overall assessment".to_string());
        }
        Ok(())
    }

    fn from_fragments(fragments: Vec<Value>) -> Option<Self> {
        records_from(fragments).into_iter().next()
    }
}
