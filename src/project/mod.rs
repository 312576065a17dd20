//! Project forms
//!
//! - `model`: form targets and project field types
//! - `schema`: GitHub project fields to form controls and back
//! - `state`: page stages
//! - `store`: per-user project cache
//! - `service`: loading and submission against GitHub

mod model;
pub mod schema;
pub mod state;
mod store;
mod service;

pub use model::{Access, FieldOption, FieldType, Parameters, ProjectData, ProjectField, ProjectSummary};
pub use schema::{FormErrors, FormSchema, FormSubmission};
pub use service::{ProjectFormService, SubmitError, SubmittedIssue};
pub use state::{PageAction, PageState};
pub use store::ProjectStore;
