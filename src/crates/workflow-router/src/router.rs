//! The [`MessageRouter`]: rule matching, specificity ranking, calibrated
//! confidence, fallback cascade, and decision explanation (§4.7).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use workflow_core::{HookEvent, HookManager, HookType};
use workflow_tooling::logging::sanitize_for_logging;

use crate::accuracy::AccuracyTracker;
use crate::calibration::Calibrator;
use crate::error::{Result, RoutingError};
use crate::rule::{MatchType, RoutingRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteMatchType {
    Exact,
    Regex,
    Keyword,
    Function,
    MetadataOnly,
}

impl From<MatchType> for RouteMatchType {
    fn from(value: MatchType) -> Self {
        match value {
            MatchType::Exact => RouteMatchType::Exact,
            MatchType::Regex => RouteMatchType::Regex,
            MatchType::Keyword => RouteMatchType::Keyword,
            MatchType::Function => RouteMatchType::Function,
            MatchType::MetadataOnly => RouteMatchType::MetadataOnly,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alternative {
    pub agent: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub winner: String,
    pub alternatives: Vec<Alternative>,
    pub concerns: Vec<String>,
    pub calibration_temperature: f64,
    pub historical_accuracy: Option<f64>,
    pub narrative: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub match_type: RouteMatchType,
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specificity: Option<i64>,
    pub confidence: f64,
    pub explanation: Explanation,
    /// Present when confidence is low and a gap between top alternatives is
    /// narrow — the executor may pause a run consuming this decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification_needed: Option<Value>,
}

const LOW_CONFIDENCE_THRESHOLD: f64 = 0.6;
const CLOSE_ALTERNATIVE_GAP: f64 = 0.10;

pub struct MessageRouter {
    rules: RwLock<Vec<RoutingRule>>,
    default_agent: Option<String>,
    rule_calibrator: Calibrator,
    intent_calibrator: Calibrator,
    accuracy: AccuracyTracker,
    hooks: Arc<HookManager>,
    debug: bool,
}

impl MessageRouter {
    pub fn new(hooks: Arc<HookManager>, default_agent: Option<String>) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            default_agent,
            rule_calibrator: Calibrator::new(),
            intent_calibrator: Calibrator::new(),
            accuracy: AccuracyTracker::new(),
            hooks,
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub async fn add_rule(&self, rule: RoutingRule) {
        self.rules.write().await.push(rule);
    }

    pub fn accuracy_tracker(&self) -> &AccuracyTracker {
        &self.accuracy
    }

    /// Calibrator for confidence scores produced outside rule matching
    /// (e.g. an intent classifier upstream of this router). Kept separate
    /// from `rule_calibrator` per source, per the calibration design.
    pub fn intent_calibrator(&self) -> &Calibrator {
        &self.intent_calibrator
    }

    pub async fn route(&self, message: &str, metadata: &HashMap<String, Value>, run_id: &str) -> Result<RoutingDecision> {
        self.hooks
            .execute(
                HookType::BeforeRouting,
                HookEvent { hook_type: HookType::BeforeRouting, data: Value::from(message), run_id: run_id.to_string(), pipeline_id: None, step_name: None },
            )
            .await;

        let decision = self.decide(message, metadata).await?;

        self.hooks
            .execute(
                HookType::AfterRouting,
                HookEvent {
                    hook_type: HookType::AfterRouting,
                    data: serde_json::to_value(&decision).unwrap_or(Value::Null),
                    run_id: run_id.to_string(),
                    pipeline_id: None,
                    step_name: None,
                },
            )
            .await;

        if !decision.explanation.concerns.is_empty() {
            self.hooks
                .execute(
                    HookType::AfterRoutingDecision,
                    HookEvent {
                        hook_type: HookType::AfterRoutingDecision,
                        data: serde_json::to_value(&decision).unwrap_or(Value::Null),
                        run_id: run_id.to_string(),
                        pipeline_id: None,
                        step_name: None,
                    },
                )
                .await;
        }

        Ok(decision)
    }

    /// Side-effect-free variant for introspection: no hooks fire.
    pub async fn test_route(&self, message: &str, metadata: &HashMap<String, Value>) -> Result<RoutingDecision> {
        self.decide(message, metadata).await
    }

    async fn decide(&self, message: &str, metadata: &HashMap<String, Value>) -> Result<RoutingDecision> {
        if self.debug {
            debug!(message = %sanitize_for_logging(message), "evaluating routing rules");
        }
        let rules = self.rules.read().await;
        let mut ordered: Vec<&RoutingRule> = rules.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut matches: Vec<(&RoutingRule, MatchType, i64, f64)> = Vec::new();
        for rule in &ordered {
            if let Some((match_type, matched_len)) = rule.try_match(message, metadata) {
                let specificity = rule.specificity(match_type, matched_len);
                let raw_confidence = match_type.raw_confidence();
                let calibrated = self.rule_calibrator.calibrate(raw_confidence);
                matches.push((rule, match_type, specificity, calibrated));
            }
        }

        if matches.is_empty() {
            return self.fallback_decision();
        }

        matches.sort_by(|a, b| b.2.cmp(&a.2));
        let (winner_rule, winner_type, winner_specificity, winner_confidence) = matches[0];

        let mut alternatives: Vec<Alternative> = matches[1..]
            .iter()
            .filter(|(_, _, _, confidence)| *confidence > 0.0)
            .map(|(rule, _, _, confidence)| Alternative { agent: rule.agent.clone(), confidence: *confidence })
            .collect();
        alternatives.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        alternatives.truncate(3);

        let mut concerns = Vec::new();
        if winner_confidence < LOW_CONFIDENCE_THRESHOLD {
            concerns.push("low-confidence".to_string());
        }
        if let Some(runner_up) = alternatives.first() {
            if winner_confidence - runner_up.confidence < CLOSE_ALTERNATIVE_GAP {
                concerns.push("close-alternatives".to_string());
            }
        }

        let historical_accuracy = self.accuracy.get_accuracy(&winner_rule.agent);
        let narrative = narrative_for(
            &winner_rule.agent,
            winner_confidence,
            winner_type.into(),
            self.rule_calibrator.temperature(),
            historical_accuracy,
            &alternatives,
        );

        let clarification_needed = if !concerns.is_empty() && (winner_confidence < LOW_CONFIDENCE_THRESHOLD || concerns.contains(&"close-alternatives".to_string())) {
            Some(serde_json::json!({
                "type": "pause_request",
                "pauseMetadata": {
                    "prompt": "Routing confidence is low; please clarify which agent should handle this.",
                    "resume_behavior": "continue",
                }
            }))
        } else {
            None
        };

        Ok(RoutingDecision {
            agent: winner_rule.agent.clone(),
            rule: Some(winner_rule.id.clone()),
            match_type: winner_type.into(),
            fallback: false,
            specificity: Some(winner_specificity),
            confidence: winner_confidence,
            explanation: Explanation {
                winner: winner_rule.agent.clone(),
                alternatives,
                concerns,
                calibration_temperature: self.rule_calibrator.temperature(),
                historical_accuracy,
                narrative,
            },
            clarification_needed,
        })
    }

    fn fallback_decision(&self) -> Result<RoutingDecision> {
        if let Some(agent) = &self.default_agent {
            return Ok(fallback_decision_for(agent.clone()));
        }
        Err(RoutingError::NoAgentsAvailable)
    }

    /// First registered agent with a warning — used only when no default
    /// agent is configured but at least one rule names a candidate agent.
    pub async fn fallback_to_first_registered(&self) -> Result<RoutingDecision> {
        let rules = self.rules.read().await;
        let mut seen = HashSet::new();
        for rule in rules.iter() {
            if seen.insert(rule.agent.clone()) {
                warn!(agent = %rule.agent, "no rule matched for a registered agent");
                return Ok(fallback_decision_for(rule.agent.clone()));
            }
        }
        Err(RoutingError::NoAgentsAvailable)
    }
}

fn fallback_decision_for(agent: String) -> RoutingDecision {
    RoutingDecision {
        agent: agent.clone(),
        rule: None,
        match_type: RouteMatchType::MetadataOnly,
        fallback: true,
        specificity: None,
        confidence: 0.0,
        explanation: Explanation {
            winner: agent,
            alternatives: Vec::new(),
            concerns: vec!["fallback".to_string()],
            calibration_temperature: 1.0,
            historical_accuracy: None,
            narrative: "no rule matched; used fallback agent".to_string(),
        },
        clarification_needed: None,
    }
}

fn narrative_for(
    agent: &str,
    confidence: f64,
    match_type: RouteMatchType,
    temperature: f64,
    historical_accuracy: Option<f64>,
    alternatives: &[Alternative],
) -> String {
    let mut narrative = format!(
        "routed to {agent} with confidence {confidence:.2} via {match_type:?} match (calibration temperature {temperature:.2})"
    );
    if let Some(accuracy) = historical_accuracy {
        narrative.push_str(&format!(", historical accuracy {accuracy:.2}"));
    }
    if !alternatives.is_empty() {
        let names: Vec<String> = alternatives.iter().map(|a| format!("{} ({:.2})", a.agent, a.confidence)).collect();
        narrative.push_str(&format!("; alternatives considered: {}", names.join(", ")));
    }
    narrative
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> MessageRouter {
        MessageRouter::new(Arc::new(HookManager::new()), None)
    }

    #[tokio::test]
    async fn no_match_with_default_agent_uses_fallback() {
        let router = MessageRouter::new(Arc::new(HookManager::new()), Some("default-agent".into()));
        let decision = router.test_route("anything", &HashMap::new()).await.unwrap();
        assert_eq!(decision.agent, "default-agent");
        assert!(decision.fallback);
    }

    #[tokio::test]
    async fn no_match_no_default_fails_with_no_agents_available() {
        let router = router();
        let err = router.test_route("anything", &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, RoutingError::NoAgentsAvailable));
    }

    #[tokio::test]
    async fn highest_specificity_wins_among_matches() {
        let router = router();
        router.add_rule(RoutingRule::new("keyword-rule", "agent-keyword").with_keywords(vec!["refund".into()])).await;
        router
            .add_rule(RoutingRule::new("exact-rule", "agent-exact").with_patterns(vec![regex::Regex::new("^refund$").unwrap()]))
            .await;

        let decision = router.test_route("refund", &HashMap::new()).await.unwrap();
        assert_eq!(decision.agent, "agent-exact");
    }

    #[tokio::test]
    async fn low_confidence_and_close_alternatives_are_flagged() {
        let router = router();
        router.add_rule(RoutingRule::new("r1", "agent-a").with_metadata(HashMap::from([("k".to_string(), Value::from("v"))]))).await;
        router.add_rule(RoutingRule::new("r2", "agent-b").with_metadata(HashMap::from([("k".to_string(), Value::from("v"))]))).await;

        let meta = HashMap::from([("k".to_string(), Value::from("v"))]);
        let decision = router.test_route("hi", &meta).await.unwrap();
        assert!(decision.explanation.concerns.contains(&"low-confidence".to_string()));
        assert!(decision.clarification_needed.is_some());
    }
}
