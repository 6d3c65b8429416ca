//! Rights-imbalance detection over a bounded sample of classified paragraphs.

use tracing::info;

use super::{prompts, request, HeuristicsConfig, StageConfig};
use crate::data::schema::RightsResponse;
use crate::data::{Category, Finding, ImbalanceType, Perspective, RightsImbalance, Severity};
use crate::dispatch::Dispatcher;
use crate::document::Paragraph;
use crate::error::StageError;
use crate::progress::Stage;

/// Grades an imbalance from the two right counts.
///
/// The ratio is `(max + 1) / (min + 1)`, so a side holding no rights at all
/// still yields a finite ratio.
pub fn severity_from_counts(buyer: u32, supplier: u32, heuristics: &HeuristicsConfig) -> Severity {
    let high = f64::from(buyer.max(supplier)) + 1.0;
    let low = f64::from(buyer.min(supplier)) + 1.0;
    let ratio = high / low;
    if ratio >= heuristics.severity_high_ratio {
        Severity::High
    } else if ratio >= heuristics.severity_medium_ratio {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Picks up to `size` paragraphs: risks first, then partial, then compliant,
/// each group in document order.
pub fn sample_paragraphs<'p>(
    paragraphs: &'p [Paragraph],
    findings: &[Finding],
    size: usize,
) -> Vec<(&'p Paragraph, Category)> {
    let mut sample = Vec::new();
    for wanted in [Category::Risk, Category::Partial, Category::Compliant] {
        sample.extend(
            paragraphs
                .iter()
                .zip(findings)
                .filter(|(_, f)| f.category == wanted)
                .map(|(p, f)| (p, f.category)),
        );
    }
    sample.truncate(size);
    sample
}

/// Asks where rights are unevenly distributed between the parties.
pub async fn detect_imbalance(
    dispatcher: &Dispatcher,
    paragraphs: &[Paragraph],
    findings: &[Finding],
    perspective: Perspective,
    stages: &StageConfig,
    heuristics: &HeuristicsConfig,
) -> Result<Vec<RightsImbalance>, StageError> {
    let sample = sample_paragraphs(paragraphs, findings, stages.rights_sample_size);
    if sample.is_empty() {
        return Ok(Vec::new());
    }

    let lines: Vec<(String, String, String)> = sample
        .iter()
        .map(|(p, category)| (p.id.clone(), category.to_string(), p.text.clone()))
        .collect();
    let response: RightsResponse = request(
        dispatcher,
        Stage::RightsImbalance,
        Stage::RightsImbalance.key(),
        &prompts::system_prompt(perspective),
        &prompts::rights_prompt(&lines, perspective),
        stages.stage_output_ceiling,
    )
    .await?;

    let imbalances: Vec<RightsImbalance> = response
        .rights_imbalance
        .into_iter()
        .enumerate()
        .map(|(i, wire)| RightsImbalance {
            id: format!("imbalance_{}", i + 1),
            kind: ImbalanceType::from_label(&wire.kind),
            severity: Severity::from_label(&wire.severity).unwrap_or_else(|| {
                severity_from_counts(wire.buyer_right_count, wire.supplier_right_count, heuristics)
            }),
            description: wire.description,
            buyer_right_count: wire.buyer_right_count,
            supplier_right_count: wire.supplier_right_count,
            recommendation: wire.recommendation,
        })
        .collect();

    info!(
        sampled = sample.len(),
        imbalances = imbalances.len(),
        "Rights imbalance assessed"
    );
    Ok(imbalances)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dispatch::DispatchConfig;
    use crate::inference::test_utils::{stop, ScriptedTransport};
    use crate::inference::{CredentialPool, InferenceClient, SafetyConfig};

    fn contract() -> (Vec<Paragraph>, Vec<Finding>) {
        let categories = [
            Category::Compliant,
            Category::Risk,
            Category::None,
            Category::Partial,
            Category::Risk,
        ];
        let paragraphs = (0..categories.len())
            .map(|i| Paragraph {
                id: format!("p{}", i + 1),
                text: format!("Clause {} text", i + 1),
                ordinal: i,
            })
            .collect();
        let findings = categories
            .iter()
            .enumerate()
            .map(|(i, c)| Finding {
                category: *c,
                comment: "x".into(),
                ..Finding::none(format!("p{}", i + 1))
            })
            .collect();
        (paragraphs, findings)
    }

    #[test]
    fn severity_follows_the_ratio() {
        let h = HeuristicsConfig::default();
        assert_eq!(severity_from_counts(0, 3, &h), Severity::High);
        assert_eq!(severity_from_counts(1, 2, &h), Severity::Medium);
        assert_eq!(severity_from_counts(2, 2, &h), Severity::Low);
        assert_eq!(severity_from_counts(0, 0, &h), Severity::Low);
    }

    #[test]
    fn sample_prefers_risks() {
        let (paragraphs, findings) = contract();
        let ids: Vec<_> = sample_paragraphs(&paragraphs, &findings, 4)
            .into_iter()
            .map(|(p, _)| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["p2", "p5", "p4", "p1"]);
        assert_eq!(sample_paragraphs(&paragraphs, &findings, 1).len(), 1);
    }

    #[tokio::test]
    async fn missing_severity_is_derived() {
        let transport = ScriptedTransport::queued(vec![stop(
            r#"{"rightsImbalance":[
                {"type":"termination","description":"Only the Supplier may terminate","buyerRightCount":0,"supplierRightCount":4},
                {"type":"payment","description":"Minor","buyerRightCount":1,"supplierRightCount":1,"severity":"low"}
            ]}"#,
        )]);
        let client = InferenceClient::new(Arc::new(transport), SafetyConfig::default());
        let pool = Arc::new(CredentialPool::new(["k1"]).unwrap());
        let d = Dispatcher::new(client, pool, DispatchConfig::default());
        let (paragraphs, findings) = contract();

        let found = detect_imbalance(
            &d,
            &paragraphs,
            &findings,
            Perspective::Buyer,
            &StageConfig::default(),
            &HeuristicsConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "imbalance_1");
        assert_eq!(found[0].kind, ImbalanceType::Termination);
        assert_eq!(found[0].severity, Severity::High);
        assert_eq!(found[1].kind, ImbalanceType::Other);
        assert_eq!(found[1].severity, Severity::Low);
    }
}
