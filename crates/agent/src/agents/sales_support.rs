//! The sales-support specialized agent (§4.11), grounded in the original
//! sales agent's task taxonomy (customer analysis, talking points,
//! opportunity assessment, next-action recommendation) plus the discovery
//! workflow's direct calls into a sales agent for qualification and contact
//! planning (§4.12).

use async_trait::async_trait;
use crm_core::agent::{
    Agent, AgentCapability, AgentMessage, AgentResponse, Analysis, CollaborationType, TaskResult,
};
use crm_core::rag::RetrievalMode;
use crm_core::workflow::{ContactMethod, ContactStrategy, CustomerProfile, VisitPlan};
use crm_rag::RagEngine;
use std::sync::Arc;

const KNOWLEDGE_COLLECTION: &str = "sales_knowledge";

/// Thresholds the discovery workflow's qualification stage scores a
/// potential customer against (§4.12).
#[derive(Debug, Clone)]
pub struct QualificationCriteria {
    pub budget_threshold: f64,
    pub decision_timeline: String,
    pub authority_level: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualificationResult {
    pub qualified: bool,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct ContactOutcome {
    pub success: bool,
    pub message: String,
}

pub struct SalesSupportAgent {
    id: String,
    rag_engine: Arc<RagEngine>,
    capabilities: Vec<AgentCapability>,
}

impl SalesSupportAgent {
    pub fn new(id: impl Into<String>, rag_engine: Arc<RagEngine>) -> Self {
        Self {
            id: id.into(),
            rag_engine,
            capabilities: default_capabilities(),
        }
    }

    /// Score a potential customer against `criteria` (§4.12 qualification
    /// stage). Weighted on revenue headroom over the budget threshold (70%)
    /// and company size (30%); qualifies when both the score clears 0.4 and
    /// revenue reaches at least half the threshold.
    pub fn qualify_customer(&self, customer: &serde_json::Value, criteria: &QualificationCriteria) -> QualificationResult {
        let revenue = customer.get("annual_revenue").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let employee_count = customer.get("employee_count").and_then(|v| v.as_f64()).unwrap_or(0.0);

        let revenue_score = (revenue / criteria.budget_threshold.max(1.0)).min(1.0);
        let size_score = (employee_count / 500.0).min(1.0);
        let score = (0.7 * revenue_score + 0.3 * size_score).clamp(0.0, 1.0);
        let qualified = revenue >= criteria.budget_threshold * 0.5 && score >= 0.4;

        QualificationResult { qualified, score }
    }

    /// Derive a contact strategy for a qualified customer (§4.12 contact
    /// planning stage). Fixed, reasonable defaults rather than a model call
    /// — the same shape the workflow falls back to when agent reasoning is
    /// unavailable.
    pub fn generate_contact_strategy(&self, profile: &CustomerProfile) -> ContactStrategy {
        ContactStrategy {
            primary_method: ContactMethod::Email,
            backup_methods: vec![ContactMethod::PhoneCall],
            messaging: format!("Our CRM platform can help {} streamline its sales process", profile.company_name),
            value_proposition: "Increase sales conversion by up to 30%".to_string(),
            call_to_action: "Schedule a 15-minute product walkthrough".to_string(),
            timing_recommendations: "Weekday mornings, 9-11am local time".to_string(),
            personalization_points: vec![format!("Tailored for the {} industry", profile.industry)],
        }
    }

    /// Build a visit plan around a contact strategy (§4.12 contact planning
    /// stage).
    pub fn create_visit_plan(&self, profile: &CustomerProfile, strategy: &ContactStrategy) -> VisitPlan {
        let _ = strategy;
        VisitPlan {
            visit_id: format!("visit_{}_{}", profile.company_name.replace(' ', "_"), chrono::Utc::now().format("%Y%m%d")),
            customer_profile: profile.clone(),
            objectives: vec![
                "Understand the customer's needs".into(),
                "Demonstrate product value".into(),
                "Build trust".into(),
                "Determine next steps".into(),
            ],
            agenda: vec![
                "0-5 min: opening and introductions".into(),
                "5-15 min: current state and challenges".into(),
                "15-35 min: product demo and value walkthrough".into(),
                "35-50 min: discuss solution fit".into(),
                "50-60 min: summary and next steps".into(),
            ],
            preparation_checklist: vec![
                "Research company background".into(),
                "Prepare demo materials".into(),
                "Prepare case studies".into(),
                "Prepare pricing options".into(),
                "Confirm meeting time and location".into(),
            ],
            materials_needed: vec![
                "Product demo deck".into(),
                "Customer case studies".into(),
                "Product brochure".into(),
                "Pricing template".into(),
                "Business cards".into(),
            ],
            key_questions: vec![
                "What CRM do you currently use?".into(),
                "What are your main business challenges?".into(),
                "What does your decision process look like?".into(),
                "What is your budget range?".into(),
                "What is your expected implementation timeline?".into(),
            ],
            success_criteria: vec![
                "Customer shows clear interest".into(),
                "Obtained key decision-maker contact".into(),
                "Identified concrete requirements".into(),
                "Scheduled a follow-up meeting".into(),
            ],
            follow_up_actions: vec![
                "Send a thank-you email within 24 hours".into(),
                "Provide detailed product materials".into(),
                "Prepare a customized proposal".into(),
                "Arrange a technical demo".into(),
            ],
            scheduled_time: None,
            duration_minutes: VisitPlan::DEFAULT_DURATION_MINUTES,
            location: profile.location.clone(),
            attendees: Vec::new(),
        }
    }

    /// Execute the initial contact for a qualified customer (§4.12 initial
    /// contact stage).
    pub fn execute_customer_contact(&self, profile: &CustomerProfile, strategy: &ContactStrategy) -> ContactOutcome {
        ContactOutcome {
            success: true,
            message: format!(
                "Reached out to {} via {:?} with message: {}",
                profile.company_name, strategy.primary_method, strategy.messaging
            ),
        }
    }
}

fn default_capabilities() -> Vec<AgentCapability> {
    let schema = |fields: &[&str]| {
        serde_json::json!({
            "type": "object",
            "properties": fields.iter().map(|f| (f.to_string(), serde_json::json!({"type": "string"}))).collect::<serde_json::Map<_, _>>(),
        })
    };
    vec![
        AgentCapability {
            name: "customer_analysis".into(),
            description: "Analyze a customer's history and current state".into(),
            params_schema: schema(&["customer_id"]),
        },
        AgentCapability {
            name: "talking_points_generation".into(),
            description: "Generate talking points for an upcoming sales conversation".into(),
            params_schema: schema(&["context"]),
        },
        AgentCapability {
            name: "opportunity_assessment".into(),
            description: "Assess the health and probability of a sales opportunity".into(),
            params_schema: schema(&["opportunity_id"]),
        },
        AgentCapability {
            name: "action_recommendation".into(),
            description: "Recommend the next best action for a deal".into(),
            params_schema: schema(&["context"]),
        },
        AgentCapability {
            name: "general_sales_query".into(),
            description: "Answer a general sales-process question".into(),
            params_schema: schema(&["question"]),
        },
    ]
}

fn classify(content: &str) -> &'static str {
    let lower = content.to_lowercase();
    if lower.contains("opportunity") || lower.contains("deal") || lower.contains("probability") {
        "opportunity_assessment"
    } else if lower.contains("talking point") || lower.contains("what should i say") {
        "talking_points_generation"
    } else if lower.contains("next action") || lower.contains("recommend") {
        "action_recommendation"
    } else if lower.contains("customer") && (lower.contains("analy") || lower.contains("history")) {
        "customer_analysis"
    } else {
        "general_sales_query"
    }
}

#[async_trait]
impl Agent for SalesSupportAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Sales Support Agent"
    }

    fn specialty(&self) -> &str {
        "sales enablement, opportunity assessment, and customer outreach"
    }

    fn capabilities(&self) -> &[AgentCapability] {
        &self.capabilities
    }

    async fn analyze(&self, message: &AgentMessage) -> Analysis {
        Analysis {
            task_type: classify(&message.content).to_string(),
            needs_collaboration: false,
            required_agents: Vec::new(),
            collaboration_type: CollaborationType::Sequential,
            extracted_context: serde_json::Map::new(),
        }
    }

    async fn execute(&self, message: &AgentMessage, analysis: &Analysis) -> TaskResult {
        let rag_answer = self
            .rag_engine
            .query(&message.content, RetrievalMode::Hybrid, KNOWLEDGE_COLLECTION)
            .await;

        TaskResult::ok(
            analysis.task_type.clone(),
            serde_json::json!({
                "answer": rag_answer.answer,
                "confidence": rag_answer.confidence,
                "source_count": rag_answer.sources.len(),
            }),
        )
    }

    async fn respond(&self, task_result: &TaskResult, collaboration_result: Option<&AgentResponse>) -> AgentResponse {
        if !task_result.success {
            return AgentResponse {
                content: task_result
                    .fallback_response
                    .clone()
                    .unwrap_or_else(|| "I wasn't able to complete that sales request.".into()),
                confidence: 0.0,
                suggestions: Vec::new(),
                next_actions: Vec::new(),
                metadata: serde_json::Map::new(),
            };
        }

        let data = task_result.data.clone().unwrap_or_default();
        let mut content = data.get("answer").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let confidence = data.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.5);

        if let Some(collab) = collaboration_result {
            content.push_str(&format!("\n\nAdditional context: {}", collab.content));
        }

        AgentResponse {
            content,
            confidence,
            suggestions: vec!["Review the full customer profile before the next touchpoint".into()],
            next_actions: vec!["Log this interaction in the CRM".into()],
            metadata: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::workflow::Priority;

    fn test_agent() -> SalesSupportAgent {
        let engine = Arc::new(crate::test_support::in_memory_rag_engine());
        SalesSupportAgent::new("sales_agent", engine)
    }

    fn sample_profile() -> CustomerProfile {
        CustomerProfile {
            company_name: "Acme Manufacturing".into(),
            industry: "manufacturing".into(),
            company_size: "mid-market".into(),
            annual_revenue: Some(8_000_000.0),
            location: "Chicago".into(),
            website: "https://acme.example".into(),
            key_contacts: Vec::new(),
            pain_points: Vec::new(),
            current_solutions: Vec::new(),
            decision_makers: Vec::new(),
            budget_range: None,
            timeline: None,
            competitive_landscape: Vec::new(),
            qualification_score: 0.0,
        }
    }

    #[test]
    fn qualify_customer_passes_when_revenue_clears_threshold() {
        let agent = test_agent();
        let customer = serde_json::json!({ "annual_revenue": 8_000_000.0, "employee_count": 300 });
        let criteria = QualificationCriteria {
            budget_threshold: 5_000_000.0,
            decision_timeline: "6_months".into(),
            authority_level: "decision_maker".into(),
        };
        let result = agent.qualify_customer(&customer, &criteria);
        assert!(result.qualified);
        assert!(result.score > 0.4);
    }

    #[test]
    fn qualify_customer_fails_when_revenue_too_low() {
        let agent = test_agent();
        let customer = serde_json::json!({ "annual_revenue": 10_000.0, "employee_count": 5 });
        let criteria = QualificationCriteria {
            budget_threshold: 5_000_000.0,
            decision_timeline: "6_months".into(),
            authority_level: "decision_maker".into(),
        };
        let result = agent.qualify_customer(&customer, &criteria);
        assert!(!result.qualified);
    }

    #[test]
    fn generate_contact_strategy_mentions_company_and_industry() {
        let agent = test_agent();
        let profile = sample_profile();
        let strategy = agent.generate_contact_strategy(&profile);
        assert!(strategy.messaging.contains("Acme Manufacturing"));
        assert!(strategy.personalization_points[0].contains("manufacturing"));
    }

    #[test]
    fn create_visit_plan_carries_profile_location_and_default_duration() {
        let agent = test_agent();
        let profile = sample_profile();
        let strategy = agent.generate_contact_strategy(&profile);
        let plan = agent.create_visit_plan(&profile, &strategy);
        assert_eq!(plan.location, "Chicago");
        assert_eq!(plan.duration_minutes, VisitPlan::DEFAULT_DURATION_MINUTES);
        assert_eq!(plan.customer_profile.company_name, "Acme Manufacturing");
    }

    #[test]
    fn execute_customer_contact_reports_success() {
        let agent = test_agent();
        let profile = sample_profile();
        let strategy = agent.generate_contact_strategy(&profile);
        let outcome = agent.execute_customer_contact(&profile, &strategy);
        assert!(outcome.success);
        assert!(outcome.message.contains("Acme Manufacturing"));
    }

    #[test]
    fn classify_routes_opportunity_language_correctly() {
        assert_eq!(classify("what's the probability this deal closes?"), "opportunity_assessment");
        assert_eq!(classify("give me talking points for tomorrow's call"), "talking_points_generation");
    }

    #[test]
    fn capabilities_list_has_five_entries() {
        let agent = test_agent();
        assert_eq!(agent.capabilities().len(), 5);
    }

    #[tokio::test]
    async fn analyze_then_execute_then_respond_round_trips() {
        let agent = test_agent();
        let message = AgentMessage::new("chat", "user", "Can you analyze this customer's history?");
        let analysis = agent.analyze(&message).await;
        assert_eq!(analysis.task_type, "customer_analysis");
        let result = agent.execute(&message, &analysis).await;
        assert!(result.success);
        let response = agent.respond(&result, None).await;
        assert!(response.confidence >= 0.0);
        let _ = Priority::High;
    }
}
