//! The base agent runtime (§4.10): drives the uniform
//! `analyze → execute → respond` lifecycle for any `Agent`, and performs
//! collaboration dispatch when `Analysis::needs_collaboration` is set.
//!
//! Peer dispatch goes through `AgentCommunicator` rather than agents holding
//! references to each other directly (§3 ownership summary) — this avoids
//! an ownership cycle between specialized agents that collaborate with one
//! another.

use async_trait::async_trait;
use crm_core::agent::{
    Agent, AgentCommunicator, AgentMessage, AgentResponse, CollaborationType,
};
use crm_core::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// An `AgentCommunicator` backed by an in-process registry of agents, keyed
/// by `Agent::id`. Dispatch runs the target agent's full lifecycle
/// (`analyze` → `execute` → `respond`) and returns its response (§4.10).
#[derive(Default)]
pub struct InProcessCommunicator {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
}

impl InProcessCommunicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, agent: Arc<dyn Agent>) {
        self.agents.write().await.insert(agent.id().to_string(), agent);
    }
}

#[async_trait]
impl AgentCommunicator for InProcessCommunicator {
    async fn send(&self, target_agent_id: &str, message: AgentMessage) -> Result<AgentResponse> {
        let agent = {
            let agents = self.agents.read().await;
            agents
                .get(target_agent_id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("agent '{target_agent_id}'")))?
        };
        Ok(run_agent(agent.as_ref(), self, message).await)
    }
}

/// Run the full `analyze → execute → respond` lifecycle for `agent`,
/// dispatching to collaborators through `communicator` when the analysis
/// calls for it (§4.10 "Collaboration").
pub async fn run_agent(agent: &dyn Agent, communicator: &dyn AgentCommunicator, message: AgentMessage) -> AgentResponse {
    let analysis = agent.analyze(&message).await;
    let task_result = agent.execute(&message, &analysis).await;

    let collaboration_result = if analysis.needs_collaboration && !analysis.required_agents.is_empty() {
        collaborate(&analysis, communicator, &message).await
    } else {
        None
    };

    agent.respond(&task_result, collaboration_result.as_ref()).await
}

/// Dispatch to every agent named in `analysis.required_agents`, per
/// `analysis.collaboration_type`. A collaborator that errors or fails to
/// respond is skipped — partial failures never fail the primary response
/// (§4.10). Returns `None` only when every collaborator failed.
async fn collaborate(
    analysis: &crm_core::agent::Analysis,
    communicator: &dyn AgentCommunicator,
    original: &AgentMessage,
) -> Option<AgentResponse> {
    match analysis.collaboration_type {
        CollaborationType::Parallel => {
            let futures = analysis.required_agents.iter().map(|agent_id| {
                let msg = original.clone();
                async move { (agent_id.clone(), communicator.send(agent_id, msg).await) }
            });
            let results = futures::future::join_all(futures).await;
            merge_responses(results)
        }
        CollaborationType::Sequential => {
            let mut context = original.clone();
            let mut responses = Vec::new();
            for agent_id in &analysis.required_agents {
                match communicator.send(agent_id, context.clone()).await {
                    Ok(response) => {
                        context = AgentMessage::new(
                            original.message_type.clone(),
                            original.sender_id.clone(),
                            format!("{}\n\n[from {agent_id}]: {}", context.content, response.content),
                        );
                        responses.push((agent_id.clone(), Ok(response)));
                    }
                    Err(err) => responses.push((agent_id.clone(), Err(err))),
                }
            }
            merge_responses(responses)
        }
    }
}

fn merge_responses(results: Vec<(String, Result<AgentResponse>)>) -> Option<AgentResponse> {
    let mut contents = Vec::new();
    let mut confidences = Vec::new();
    let mut suggestions = Vec::new();
    let mut next_actions = Vec::new();

    for (agent_id, result) in results {
        match result {
            Ok(response) => {
                contents.push(format!("[{agent_id}] {}", response.content));
                confidences.push(response.confidence);
                suggestions.extend(response.suggestions);
                next_actions.extend(response.next_actions);
            }
            Err(err) => {
                warn!(%agent_id, error = %err, "collaborator failed, continuing with a degraded response");
            }
        }
    }

    if contents.is_empty() {
        return None;
    }

    let confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;
    Some(AgentResponse {
        content: contents.join("\n"),
        confidence,
        suggestions,
        next_actions,
        metadata: serde_json::Map::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::agent::{Analysis, AgentCapability, TaskResult};

    struct EchoAgent {
        id: String,
        capabilities: Vec<AgentCapability>,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            &self.id
        }
        fn specialty(&self) -> &str {
            "echo"
        }
        fn capabilities(&self) -> &[AgentCapability] {
            &self.capabilities
        }

        async fn analyze(&self, _message: &AgentMessage) -> Analysis {
            Analysis {
                task_type: "echo".into(),
                needs_collaboration: false,
                required_agents: Vec::new(),
                collaboration_type: CollaborationType::Sequential,
                extracted_context: serde_json::Map::new(),
            }
        }

        async fn execute(&self, message: &AgentMessage, _analysis: &Analysis) -> TaskResult {
            TaskResult::ok("echo", serde_json::json!({ "content": message.content }))
        }

        async fn respond(&self, task_result: &TaskResult, collaboration_result: Option<&AgentResponse>) -> AgentResponse {
            let mut content = task_result
                .data
                .as_ref()
                .and_then(|d| d.get("content"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            if let Some(collab) = collaboration_result {
                content.push_str(&format!(" + {}", collab.content));
            }
            AgentResponse {
                content,
                confidence: 1.0,
                suggestions: Vec::new(),
                next_actions: Vec::new(),
                metadata: serde_json::Map::new(),
            }
        }
    }

    struct CollaboratingAgent {
        required: Vec<String>,
        collaboration_type: CollaborationType,
    }

    #[async_trait]
    impl Agent for CollaboratingAgent {
        fn id(&self) -> &str {
            "coordinator"
        }
        fn name(&self) -> &str {
            "coordinator"
        }
        fn specialty(&self) -> &str {
            "coordination"
        }
        fn capabilities(&self) -> &[AgentCapability] {
            &[]
        }

        async fn analyze(&self, _message: &AgentMessage) -> Analysis {
            Analysis {
                task_type: "coordinate".into(),
                needs_collaboration: true,
                required_agents: self.required.clone(),
                collaboration_type: self.collaboration_type,
                extracted_context: serde_json::Map::new(),
            }
        }

        async fn execute(&self, _message: &AgentMessage, _analysis: &Analysis) -> TaskResult {
            TaskResult::ok("coordinate", serde_json::json!({}))
        }

        async fn respond(&self, _task_result: &TaskResult, collaboration_result: Option<&AgentResponse>) -> AgentResponse {
            AgentResponse {
                content: collaboration_result.map(|c| c.content.clone()).unwrap_or_else(|| "no collaborators responded".into()),
                confidence: collaboration_result.map(|c| c.confidence).unwrap_or(0.0),
                suggestions: Vec::new(),
                next_actions: Vec::new(),
                metadata: serde_json::Map::new(),
            }
        }
    }

    #[tokio::test]
    async fn run_agent_without_collaboration_returns_direct_response() {
        let agent = EchoAgent { id: "echo1".into(), capabilities: Vec::new() };
        let communicator = InProcessCommunicator::new();
        let message = AgentMessage::new("chat", "user", "hello");
        let response = run_agent(&agent, &communicator, message).await;
        assert_eq!(response.content, "hello");
    }

    #[tokio::test]
    async fn sequential_collaboration_dispatches_to_each_required_agent() {
        let communicator = InProcessCommunicator::new();
        communicator.register(Arc::new(EchoAgent { id: "a".into(), capabilities: Vec::new() })).await;
        communicator.register(Arc::new(EchoAgent { id: "b".into(), capabilities: Vec::new() })).await;

        let coordinator = CollaboratingAgent {
            required: vec!["a".into(), "b".into()],
            collaboration_type: CollaborationType::Sequential,
        };
        let message = AgentMessage::new("chat", "user", "hello");
        let response = run_agent(&coordinator, &communicator, message).await;
        assert!(response.content.contains("[a]"));
        assert!(response.content.contains("[b]"));
    }

    #[tokio::test]
    async fn parallel_collaboration_skips_unknown_agents_without_failing() {
        let communicator = InProcessCommunicator::new();
        communicator.register(Arc::new(EchoAgent { id: "a".into(), capabilities: Vec::new() })).await;

        let coordinator = CollaboratingAgent {
            required: vec!["a".into(), "missing".into()],
            collaboration_type: CollaborationType::Parallel,
        };
        let message = AgentMessage::new("chat", "user", "hello");
        let response = run_agent(&coordinator, &communicator, message).await;
        assert!(response.content.contains("[a]"));
        assert!(response.confidence > 0.0);
    }

    #[tokio::test]
    async fn collaboration_with_no_reachable_agents_yields_none() {
        let communicator = InProcessCommunicator::new();
        let coordinator = CollaboratingAgent {
            required: vec!["ghost".into()],
            collaboration_type: CollaborationType::Parallel,
        };
        let message = AgentMessage::new("chat", "user", "hello");
        let response = run_agent(&coordinator, &communicator, message).await;
        assert_eq!(response.content, "no collaborators responded");
    }
}
