//! The management-strategy specialized agent (§4.11), grounded in the
//! original management strategy agent's task taxonomy: business performance
//! analysis, trend forecasting, strategic planning, and decision support.

use async_trait::async_trait;
use crm_core::agent::{
    Agent, AgentCapability, AgentMessage, AgentResponse, Analysis, CollaborationType, TaskResult,
};
use crm_core::rag::RetrievalMode;
use crm_rag::RagEngine;
use std::sync::Arc;

const KNOWLEDGE_COLLECTION: &str = "management_knowledge";

pub struct ManagementStrategyAgent {
    id: String,
    rag_engine: Arc<RagEngine>,
    capabilities: Vec<AgentCapability>,
}

impl ManagementStrategyAgent {
    pub fn new(id: impl Into<String>, rag_engine: Arc<RagEngine>) -> Self {
        Self {
            id: id.into(),
            rag_engine,
            capabilities: default_capabilities(),
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
            name: "business_analysis".into(),
            description: "Analyze business performance across key metrics".into(),
            params_schema: schema(&["time_period"]),
        },
        AgentCapability {
            name: "trend_forecasting".into(),
            description: "Predict near-term trends from historical data".into(),
            params_schema: schema(&["metric"]),
        },
        AgentCapability {
            name: "strategy_planning".into(),
            description: "Develop strategic recommendations for a business goal".into(),
            params_schema: schema(&["goal"]),
        },
        AgentCapability {
            name: "decision_support".into(),
            description: "Provide a structured recommendation for a pending decision".into(),
            params_schema: schema(&["decision_context"]),
        },
        AgentCapability {
            name: "general_strategy_query".into(),
            description: "Answer a general management or strategy question".into(),
            params_schema: schema(&["question"]),
        },
    ]
}

fn classify(content: &str) -> &'static str {
    let lower = content.to_lowercase();
    if lower.contains("forecast") || lower.contains("predict") || lower.contains("trend") {
        "trend_forecasting"
    } else if lower.contains("strategy") || lower.contains("strategic plan") {
        "strategy_planning"
    } else if lower.contains("should we") || lower.contains("decide") || lower.contains("decision") {
        "decision_support"
    } else if lower.contains("performance") || lower.contains("revenue") || lower.contains("kpi") {
        "business_analysis"
    } else {
        "general_strategy_query"
    }
}

#[async_trait]
impl Agent for ManagementStrategyAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Management Strategy Agent"
    }

    fn specialty(&self) -> &str {
        "business performance analysis, forecasting, and strategic planning"
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
                    .unwrap_or_else(|| "I wasn't able to complete that analysis.".into()),
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
            content.push_str(&format!("\n\nCross-functional input: {}", collab.content));
        }

        AgentResponse {
            content,
            confidence,
            suggestions: vec!["Validate this recommendation against the latest quarterly figures".into()],
            next_actions: vec!["Share this analysis with the leadership team".into()],
            metadata: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_agent() -> ManagementStrategyAgent {
        let engine = Arc::new(crate::test_support::in_memory_rag_engine());
        ManagementStrategyAgent::new("management_agent", engine)
    }

    #[test]
    fn classify_routes_forecast_language_to_trend_forecasting() {
        assert_eq!(classify("can you forecast next quarter's revenue?"), "trend_forecasting");
    }

    #[test]
    fn classify_routes_decision_language_to_decision_support() {
        assert_eq!(classify("should we expand into a new region?"), "decision_support");
    }

    #[test]
    fn classify_defaults_to_general_strategy_query() {
        assert_eq!(classify("tell me something interesting"), "general_strategy_query");
    }

    #[test]
    fn capabilities_list_has_five_entries() {
        let agent = test_agent();
        assert_eq!(agent.capabilities().len(), 5);
    }

    #[tokio::test]
    async fn analyze_then_execute_then_respond_round_trips() {
        let agent = test_agent();
        let message = AgentMessage::new("chat", "user", "What's our revenue performance this quarter?");
        let analysis = agent.analyze(&message).await;
        assert_eq!(analysis.task_type, "business_analysis");
        let result = agent.execute(&message, &analysis).await;
        assert!(result.success);
        let response = agent.respond(&result, None).await;
        assert!(response.confidence >= 0.0);
    }

    #[tokio::test]
    async fn respond_appends_collaboration_content_when_present() {
        let agent = test_agent();
        let message = AgentMessage::new("chat", "user", "develop a strategy for market entry");
        let analysis = agent.analyze(&message).await;
        let result = agent.execute(&message, &analysis).await;
        let collab = AgentResponse {
            content: "the CRM expert agent flags a compliance concern".into(),
            confidence: 0.6,
            suggestions: Vec::new(),
            next_actions: Vec::new(),
            metadata: serde_json::Map::new(),
        };
        let response = agent.respond(&result, Some(&collab)).await;
        assert!(response.content.contains("compliance concern"));
    }
}
