//! Shared data model for the Discovery Workflow (C12): the six-stage staged
//! task that takes a set of target criteria from research through
//! qualification, contact planning, initial contact, follow-up and
//! conversion. The stage engine itself lives in `crm-workflow`; this crate
//! only defines the shapes so `crm-agent` and `crm-workflow` can agree on
//! them without a circular dependency.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The six stages a discovery task progresses through, in order. Stage
/// order is total: a task's `stage` never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveryStage {
    Research,
    Qualification,
    ContactPlanning,
    InitialContact,
    FollowUp,
    Conversion,
}

impl DiscoveryStage {
    /// The task-level `progress` value a task reaches on completing this
    /// stage (§4.12): research=0.2, qualification=0.4, contactPlanning=0.6,
    /// conversion=1.0. `initialContact`/`followUp` are externally driven and
    /// don't have a fixed checkpoint value of their own.
    pub fn checkpoint_progress(self) -> Option<f64> {
        match self {
            DiscoveryStage::Research => Some(0.2),
            DiscoveryStage::Qualification => Some(0.4),
            DiscoveryStage::ContactPlanning => Some(0.6),
            DiscoveryStage::Conversion => Some(1.0),
            DiscoveryStage::InitialContact | DiscoveryStage::FollowUp => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMethod {
    PhoneCall,
    Email,
    SocialMedia,
    InPerson,
    Webinar,
    Referral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A prospective customer as characterized during research/qualification
/// (§4.12, field list taken from the original workflow's dataclass).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub company_name: String,
    pub industry: String,
    pub company_size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_revenue: Option<f64>,
    pub location: String,
    pub website: String,
    pub key_contacts: Vec<String>,
    pub pain_points: Vec<String>,
    pub current_solutions: Vec<String>,
    pub decision_makers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
    pub competitive_landscape: Vec<String>,
    /// Qualification score assigned during the qualification stage; higher
    /// ranks first when selecting the contact-planning cohort.
    #[serde(default)]
    pub qualification_score: f64,
}

/// How to approach a qualified customer (§4.12, contact-planning stage
/// output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactStrategy {
    pub primary_method: ContactMethod,
    pub backup_methods: Vec<ContactMethod>,
    pub messaging: String,
    pub value_proposition: String,
    pub call_to_action: String,
    pub timing_recommendations: String,
    pub personalization_points: Vec<String>,
}

/// A concrete plan for an in-person or scheduled visit (§4.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitPlan {
    pub visit_id: String,
    pub customer_profile: CustomerProfile,
    pub objectives: Vec<String>,
    pub agenda: Vec<String>,
    pub preparation_checklist: Vec<String>,
    pub materials_needed: Vec<String>,
    pub key_questions: Vec<String>,
    pub success_criteria: Vec<String>,
    pub follow_up_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub location: String,
    pub attendees: Vec<String>,
}

impl VisitPlan {
    pub const DEFAULT_DURATION_MINUTES: u32 = 60;
}

/// One run of the discovery workflow, tracked end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryTask {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub stage: DiscoveryStage,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub assigned_agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub progress: f64,
    #[serde(default)]
    pub results: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscoveryTask {
    /// Advance `stage` and `progress` together, enforcing the monotonic
    /// progress invariant (§4.12, §8): neither `stage` nor `progress` may
    /// move backward.
    pub fn advance_to(&mut self, stage: DiscoveryStage, progress: f64) {
        debug_assert!(stage >= self.stage, "discovery stage must not regress");
        debug_assert!(
            progress >= self.progress,
            "discovery progress must not regress"
        );
        if stage > self.stage {
            self.stage = stage;
        }
        if progress > self.progress {
            self.progress = progress;
        }
        self.updated_at = Utc::now();
    }
}

/// The outcome of one `initialContact` attempt (§4.12 "initialContact"),
/// appended to `DiscoveryTask::results["contactRecords"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub plan_index: usize,
    pub company_name: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_contact_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An explicit patch schema for `updateContactResult` (§4.12, §9 Open
/// Questions: the original API accepts arbitrary patch fields with
/// unspecified bounds; this reimplementation fixes the patchable field set
/// instead).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactResultPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_contact_at: Option<DateTime<Utc>>,
}

impl ContactResultPatch {
    pub fn apply_to(self, record: &mut ContactRecord) {
        if let Some(success) = self.success {
            record.success = success;
        }
        if let Some(message) = self.message {
            record.message = message;
        }
        if let Some(notes) = self.follow_up_notes {
            record.follow_up_notes = Some(notes);
        }
        if let Some(next) = self.next_contact_at {
            record.next_contact_at = Some(next);
        }
    }
}

/// The external persistence collaborator for business-entity customer
/// records (§6: "a way to create a customer record from a
/// `CustomerProfile + contactRecord` and a way to look up a customer by
/// id"). The relational schema and storage live outside the core; this
/// crate only defines the seam the Discovery Workflow calls through on a
/// successful `initialContact` (§4.12).
#[async_trait]
pub trait CustomerService: Send + Sync {
    /// Create a persistent customer record from a qualified profile and its
    /// successful contact record. Returns the new customer id.
    async fn create_customer(&self, profile: &CustomerProfile, contact: &ContactRecord) -> Result<String>;

    /// Look up a previously created customer record by id.
    async fn get_customer(&self, id: &str) -> Result<Option<serde_json::Value>>;
}
