//! Repository layer
//!
//! Each domain has its own repository with CRUD and domain-specific
//! queries. All repositories use runtime-bound sqlx queries; writes that
//! span rows (grant/revoke plus their audit entries) run inside one
//! transaction so partial writes never occur.

mod alias;
mod audit;
mod change_request;
mod decision;
mod grant;

pub use alias::AliasRepo;
pub use audit::AuditRepo;
pub use change_request::ChangeRequestRepo;
pub use decision::DecisionRepo;
pub use grant::GrantRepo;
