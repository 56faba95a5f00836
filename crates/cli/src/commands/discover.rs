//! `crm discover` — Run the Discovery Workflow (C12) against a target
//! industry as a smoke test, proving the RAG engine, the model router, and
//! the specialized agents compose into the staged task engine end to end.

use std::collections::HashMap;
use std::sync::Arc;
use crm_agent::{ManagementStrategyAgent, SalesSupportAgent};
use crm_config::AppConfig;
use crm_core::provider::{Endpoint, ModelDescriptor, Provider};
use crm_core::tool::ToolRegistry;
use crm_providers::ModelRouter;
use crm_rag::gateway::{DeterministicEmbedRerank, InMemoryVectorStore};
use crm_rag::RagEngine;
use crm_workflow::{DiscoveryWorkflow, InMemoryCustomerService};

pub async fn run(industry: String, goal: String, timeline_days: i64) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_none() {
        return Err("No API key found. Set OPENROUTER_API_KEY, OPENAI_API_KEY, or CRM_API_KEY.".into());
    }

    let provider_router = crm_providers::router::build_from_config(&config);
    let provider: Arc<dyn Provider> = provider_router
        .default()
        .ok_or("No default provider configured")?;

    let endpoint_id = config.default_provider.clone();
    let endpoint = Endpoint {
        id: endpoint_id.clone(),
        base_url: String::new(),
        api_key: config.api_key.clone().unwrap_or_default(),
        model_prefix: None,
    };
    let model = ModelDescriptor {
        name: config.default_model.clone(),
        max_gen_tokens: config.default_max_tokens,
        context_window_tokens: config.rag.context_window_tokens,
        supports_tools: false,
        supports_chinese: false,
        chinese_optimized: false,
        cost_per_1k_tokens: 0.0,
        priority: 1,
        endpoint_id: endpoint_id.clone(),
    };
    let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
    providers.insert(endpoint_id.clone(), provider);

    let model_router = Arc::new(ModelRouter::new(
        vec![endpoint],
        providers,
        vec![model],
        &endpoint_id,
        Arc::new(ToolRegistry::new()),
    ));

    let rag_engine = Arc::new(RagEngine::new(
        Arc::new(InMemoryVectorStore::new()),
        Arc::new(DeterministicEmbedRerank::default()),
        model_router,
        (&config.rag).into(),
    ));

    let sales_agent = Arc::new(SalesSupportAgent::new("sales-support-1", rag_engine.clone()));
    let market_agent = Arc::new(ManagementStrategyAgent::new("management-strategy-1", rag_engine.clone()));
    let workflow = DiscoveryWorkflow::new(
        sales_agent,
        market_agent,
        rag_engine,
        Arc::new(InMemoryCustomerService::new()),
    );

    let mut criteria = serde_json::Map::new();
    criteria.insert("industry".into(), serde_json::json!(industry));

    println!("  Running Discovery Workflow for \"{industry}\"...");
    let task_id = workflow.start(criteria, vec![goal], timeline_days).await?;
    let task = workflow.get_task(&task_id).await.expect("task was just created");

    println!();
    println!("  Task:      {task_id}");
    println!("  Stage:     {:?}", task.stage);
    println!("  Progress:  {:.0}%", task.progress * 100.0);
    if let Some(customers) = task.results.get("potentialCustomers").and_then(|v| v.as_array()) {
        println!("  Potential customers: {}", customers.len());
    }
    if let Some(qualified) = task.results.get("qualifiedCustomers").and_then(|v| v.as_array()) {
        println!("  Qualified customers: {}", qualified.len());
    }
    if let Some(plans) = task.results.get("contactPlans").and_then(|v| v.as_array()) {
        println!("  Contact plans:       {}", plans.len());
    }

    Ok(())
}
