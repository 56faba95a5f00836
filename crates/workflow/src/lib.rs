//! The Discovery Workflow (C12) — a staged, long-running task engine that
//! sequences specialized agents through research → qualification → contact
//! planning → initial contact → follow-up → conversion (§4.12).
//!
//! `start` creates a task and synchronously drives it through the first
//! three stages; the remaining three are externally driven one call at a
//! time (`execute_initial_contact`, `update_contact_result`,
//! `complete_task`). Each stage function checks that its precondition
//! stage populated the `results` keys it needs before doing any work —
//! on a missing precondition it returns an error and leaves task state
//! untouched (§4.12 invariant).

use chrono::{Duration, Utc};
use crm_agent::{ManagementStrategyAgent, QualificationCriteria, SalesSupportAgent};
use crm_core::agent::{Agent, AgentMessage};
use crm_core::error::WorkflowError;
use crm_core::rag::RetrievalMode;
use crm_core::workflow::{
    ContactRecord, ContactResultPatch, ContactStrategy, CustomerProfile, CustomerService,
    DiscoveryStage, DiscoveryTask, Priority, TaskStatus,
};
use crm_rag::RagEngine;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_POTENTIAL_CUSTOMERS: usize = 20;
const MAX_CONTACT_PLANS: usize = 10;
const MARKET_KNOWLEDGE_COLLECTION: &str = "market_research";

/// Target criteria for a discovery run: a loose bag of fields (industry,
/// region, size bounds, …) the research stage reads defensively since
/// `spec.md` §4.12 leaves its shape unspecified beyond "target criteria".
pub type TargetCriteria = serde_json::Map<String, Value>;

/// The Discovery Workflow stage engine (§4.12). Holds shared references to
/// the agents and collaborators it drives — it owns none of them (§3
/// ownership summary).
pub struct DiscoveryWorkflow {
    tasks: RwLock<HashMap<String, DiscoveryTask>>,
    sales_agent: Arc<SalesSupportAgent>,
    market_agent: Arc<ManagementStrategyAgent>,
    rag_engine: Arc<RagEngine>,
    customer_service: Arc<dyn CustomerService>,
}

impl DiscoveryWorkflow {
    pub fn new(
        sales_agent: Arc<SalesSupportAgent>,
        market_agent: Arc<ManagementStrategyAgent>,
        rag_engine: Arc<RagEngine>,
        customer_service: Arc<dyn CustomerService>,
    ) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            sales_agent,
            market_agent,
            rag_engine,
            customer_service,
        }
    }

    /// Create a task and synchronously advance it through `research →
    /// qualification → contactPlanning` (§4.12 "Lifecycle contract").
    pub async fn start(
        &self,
        target_criteria: TargetCriteria,
        goals: Vec<String>,
        timeline_days: i64,
    ) -> Result<String, WorkflowError> {
        let task_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let title = format!(
            "Discovery: {}",
            target_criteria
                .get("industry")
                .and_then(Value::as_str)
                .unwrap_or("target market")
        );
        let task = DiscoveryTask {
            task_id: task_id.clone(),
            customer_id: None,
            stage: DiscoveryStage::Research,
            priority: Priority::Medium,
            title,
            description: goals.join("; "),
            assigned_agent_id: self.sales_agent.id().to_string(),
            due_at: Some(now + Duration::days(timeline_days)),
            status: TaskStatus::InProgress,
            progress: 0.0,
            results: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        };
        self.tasks.write().await.insert(task_id.clone(), task);
        info!(task_id = %task_id, "discovery task started");

        self.run_research(&task_id, &target_criteria, &goals).await?;
        self.run_qualification(&task_id).await?;
        self.run_contact_planning(&task_id).await?;
        Ok(task_id)
    }

    pub async fn get_task(&self, task_id: &str) -> Option<DiscoveryTask> {
        self.tasks.read().await.get(task_id).cloned()
    }

    pub async fn list_tasks(&self) -> Vec<DiscoveryTask> {
        self.tasks.read().await.values().cloned().collect()
    }

    /// **research** (§4.12): consult the market agent and the RAG engine,
    /// emit a deterministic list of ≤20 `potentialCustomers`. Sets
    /// `progress=0.2`.
    async fn run_research(
        &self,
        task_id: &str,
        criteria: &TargetCriteria,
        goals: &[String],
    ) -> Result<(), WorkflowError> {
        debug!(task_id, "discovery: research stage");
        let industry = criteria
            .get("industry")
            .and_then(Value::as_str)
            .unwrap_or("technology");

        let message = AgentMessage::new(
            "discovery_research",
            "discovery_workflow",
            format!(
                "Assess market conditions for the {industry} industry toward these goals: {}",
                goals.join(", ")
            ),
        );
        let analysis = self.market_agent.analyze(&message).await;
        let task_result = self.market_agent.execute(&message, &analysis).await;
        let market_response = self.market_agent.respond(&task_result, None).await;

        let rag_answer = self
            .rag_engine
            .query(
                &format!("potential customers and market trends in {industry}"),
                RetrievalMode::Hybrid,
                MARKET_KNOWLEDGE_COLLECTION,
            )
            .await;

        let potential_customers = synthesize_potential_customers(criteria);

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
        task.results
            .insert("potentialCustomers".into(), serde_json::json!(potential_customers));
        task.results
            .insert("marketAnalysis".into(), Value::String(market_response.content));
        task.results
            .insert("marketKnowledgeConfidence".into(), serde_json::json!(rag_answer.confidence));
        task.advance_to(DiscoveryStage::Research, 0.2);
        Ok(())
    }

    /// **qualification** (§4.12): score each potential customer via the
    /// sales agent, keep those that qualify, materialize a
    /// `CustomerProfile` per customer in descending score order. Sets
    /// `progress=0.4`.
    async fn run_qualification(&self, task_id: &str) -> Result<(), WorkflowError> {
        debug!(task_id, "discovery: qualification stage");
        let potential_customers = {
            let tasks = self.tasks.read().await;
            let task = tasks
                .get(task_id)
                .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
            if task.stage < DiscoveryStage::Research {
                return Err(WorkflowError::PreconditionNotMet {
                    stage: "qualification".into(),
                });
            }
            task.results
                .get("potentialCustomers")
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| WorkflowError::PreconditionNotMet {
                    stage: "qualification".into(),
                })?
        };

        let criteria = QualificationCriteria {
            budget_threshold: 100_000.0,
            decision_timeline: "this quarter".into(),
            authority_level: "decision-maker".into(),
        };

        let mut scored: Vec<CustomerProfile> = potential_customers
            .iter()
            .filter_map(|customer| {
                let result = self.sales_agent.qualify_customer(customer, &criteria);
                if !result.qualified {
                    return None;
                }
                let mut profile = customer_to_profile(customer);
                profile.qualification_score = result.score;
                Some(profile)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.qualification_score
                .partial_cmp(&a.qualification_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
        task.results.insert(
            "qualifiedCustomers".into(),
            serde_json::to_value(&scored).expect("CustomerProfile always serializes"),
        );
        task.advance_to(DiscoveryStage::Qualification, 0.4);
        Ok(())
    }

    /// **contactPlanning** (§4.12): for the first 10 qualified customers,
    /// derive a `ContactStrategy` and `VisitPlan` via the sales agent. Sets
    /// `progress=0.6`.
    async fn run_contact_planning(&self, task_id: &str) -> Result<(), WorkflowError> {
        debug!(task_id, "discovery: contact planning stage");
        let qualified: Vec<CustomerProfile> = {
            let tasks = self.tasks.read().await;
            let task = tasks
                .get(task_id)
                .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
            if task.stage < DiscoveryStage::Qualification {
                return Err(WorkflowError::PreconditionNotMet {
                    stage: "contactPlanning".into(),
                });
            }
            let raw = task.results.get("qualifiedCustomers").ok_or_else(|| {
                WorkflowError::PreconditionNotMet {
                    stage: "contactPlanning".into(),
                }
            })?;
            serde_json::from_value(raw.clone()).map_err(|_| WorkflowError::PreconditionNotMet {
                stage: "contactPlanning".into(),
            })?
        };

        let plans: Vec<Value> = qualified
            .iter()
            .take(MAX_CONTACT_PLANS)
            .map(|profile| {
                let strategy = self.sales_agent.generate_contact_strategy(profile);
                let visit_plan = self.sales_agent.create_visit_plan(profile, &strategy);
                serde_json::json!({
                    "profile": profile,
                    "strategy": strategy,
                    "visitPlan": visit_plan,
                })
            })
            .collect();

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
        task.results.insert("contactPlans".into(), serde_json::json!(plans));
        task.advance_to(DiscoveryStage::ContactPlanning, 0.6);
        Ok(())
    }

    /// **initialContact** (§4.12): execute the `plan_index`th contact plan
    /// through the sales agent, append a `contactRecord` to `results`; on
    /// success, create a persistent customer record via the external
    /// customer service.
    pub async fn execute_initial_contact(
        &self,
        task_id: &str,
        plan_index: usize,
    ) -> Result<ContactRecord, WorkflowError> {
        let (profile, strategy) = {
            let tasks = self.tasks.read().await;
            let task = tasks
                .get(task_id)
                .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
            if task.stage < DiscoveryStage::ContactPlanning {
                return Err(WorkflowError::PreconditionNotMet {
                    stage: "initialContact".into(),
                });
            }
            let plans = task
                .results
                .get("contactPlans")
                .and_then(Value::as_array)
                .ok_or_else(|| WorkflowError::PreconditionNotMet {
                    stage: "initialContact".into(),
                })?;
            let plan = plans.get(plan_index).ok_or_else(|| WorkflowError::IndexOutOfRange {
                index: plan_index,
                len: plans.len(),
            })?;
            let profile: CustomerProfile = serde_json::from_value(plan["profile"].clone())
                .map_err(|_| WorkflowError::PreconditionNotMet {
                    stage: "initialContact".into(),
                })?;
            let strategy: ContactStrategy = serde_json::from_value(plan["strategy"].clone())
                .map_err(|_| WorkflowError::PreconditionNotMet {
                    stage: "initialContact".into(),
                })?;
            (profile, strategy)
        };

        let outcome = self.sales_agent.execute_customer_contact(&profile, &strategy);
        let record = ContactRecord {
            plan_index,
            company_name: profile.company_name.clone(),
            success: outcome.success,
            message: outcome.message,
            follow_up_notes: None,
            next_contact_at: None,
            created_at: Utc::now(),
        };

        let customer_id = if outcome.success {
            match self.customer_service.create_customer(&profile, &record).await {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!(task_id, error = %err, "customer service create_customer failed, continuing without a persisted id");
                    None
                }
            }
        } else {
            None
        };

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
        if customer_id.is_some() {
            task.customer_id = customer_id;
        }
        let records = task
            .results
            .entry("contactRecords".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(arr) = records {
            arr.push(serde_json::to_value(&record).expect("ContactRecord always serializes"));
        }
        if task.stage < DiscoveryStage::InitialContact {
            task.stage = DiscoveryStage::InitialContact;
        }
        task.updated_at = Utc::now();
        Ok(record)
    }

    /// **followUp** (§4.12): externally driven update to a previously
    /// recorded contact. `idx` indexes `results["contactRecords"]`.
    pub async fn update_contact_result(
        &self,
        task_id: &str,
        idx: usize,
        patch: ContactResultPatch,
    ) -> Result<(), WorkflowError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
        if task.stage < DiscoveryStage::InitialContact {
            return Err(WorkflowError::PreconditionNotMet {
                stage: "followUp".into(),
            });
        }
        let records = task
            .results
            .get_mut("contactRecords")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| WorkflowError::PreconditionNotMet {
                stage: "followUp".into(),
            })?;
        let len = records.len();
        let record_value = records
            .get_mut(idx)
            .ok_or(WorkflowError::IndexOutOfRange { index: idx, len })?;
        let mut record: ContactRecord =
            serde_json::from_value(record_value.clone()).map_err(|_| WorkflowError::IndexOutOfRange { index: idx, len })?;
        patch.apply_to(&mut record);
        *record_value = serde_json::to_value(&record).expect("ContactRecord always serializes");

        if task.stage < DiscoveryStage::FollowUp {
            task.stage = DiscoveryStage::FollowUp;
        }
        task.updated_at = Utc::now();
        Ok(())
    }

    /// **conversion** (§4.12): `completeTask` sets `status=completed,
    /// progress=1`.
    pub async fn complete_task(&self, task_id: &str) -> Result<(), WorkflowError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;
        task.advance_to(DiscoveryStage::Conversion, 1.0);
        task.status = TaskStatus::Completed;
        task.updated_at = Utc::now();
        Ok(())
    }
}

/// Deterministically derive up to `MAX_POTENTIAL_CUSTOMERS` raw customer
/// records from `criteria` (§4.12 research stage). No external lookup is
/// performed — the research stage's market-intelligence step is the market
/// agent / RAG query above; this function only shapes the candidate pool
/// those inform.
fn synthesize_potential_customers(criteria: &TargetCriteria) -> Vec<Value> {
    let industry = criteria
        .get("industry")
        .and_then(Value::as_str)
        .unwrap_or("technology")
        .to_string();
    let region = criteria
        .get("region")
        .and_then(Value::as_str)
        .unwrap_or("North America")
        .to_string();
    let min_employees = criteria.get("min_employees").and_then(Value::as_u64).unwrap_or(50);
    let count = criteria
        .get("count")
        .and_then(Value::as_u64)
        .map(|c| c.min(MAX_POTENTIAL_CUSTOMERS as u64))
        .unwrap_or(MAX_POTENTIAL_CUSTOMERS as u64) as usize;

    (0..count)
        .map(|i| {
            let employee_count = min_employees + (i as u64) * 25;
            let annual_revenue = employee_count as f64 * 2_000.0;
            serde_json::json!({
                "company_name": format!("{industry} Prospect {:03}", i + 1),
                "industry": industry,
                "employee_count": employee_count,
                "annual_revenue": annual_revenue,
                "location": region,
                "website": format!("https://prospect{:03}.example.com", i + 1),
            })
        })
        .collect()
}

fn customer_to_profile(customer: &Value) -> CustomerProfile {
    CustomerProfile {
        company_name: customer
            .get("company_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        industry: customer
            .get("industry")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        company_size: customer
            .get("employee_count")
            .and_then(Value::as_u64)
            .map(|n| n.to_string())
            .unwrap_or_default(),
        annual_revenue: customer.get("annual_revenue").and_then(Value::as_f64),
        location: customer
            .get("location")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        website: customer
            .get("website")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
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

/// An in-memory `CustomerService` (§6) — a conforming stand-in for the
/// relational customer store the spec delegates to an external
/// collaborator. Suitable for tests and as the default when no real
/// customer-persistence backend is configured.
pub struct InMemoryCustomerService {
    customers: RwLock<HashMap<String, Value>>,
}

impl InMemoryCustomerService {
    pub fn new() -> Self {
        Self {
            customers: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCustomerService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CustomerService for InMemoryCustomerService {
    async fn create_customer(
        &self,
        profile: &CustomerProfile,
        contact: &ContactRecord,
    ) -> crm_core::error::Result<String> {
        let id = Uuid::new_v4().to_string();
        let record = serde_json::json!({
            "id": id,
            "profile": profile,
            "contact": contact,
        });
        self.customers.write().await.insert(id.clone(), record);
        Ok(id)
    }

    async fn get_customer(&self, id: &str) -> crm_core::error::Result<Option<Value>> {
        Ok(self.customers.read().await.get(id).cloned())
    }
}
