//! The specialized agents (§4.11): sales support, management strategy, and
//! CRM best practices. Each layers a domain task-type classifier and the
//! RAG engine (§4.9) over the uniform `Agent` lifecycle (§4.10).

pub mod best_practices;
pub mod management_strategy;
pub mod sales_support;

pub use best_practices::CrmBestPracticesAgent;
pub use management_strategy::ManagementStrategyAgent;
pub use sales_support::{ContactOutcome, QualificationCriteria, QualificationResult, SalesSupportAgent};
