pub mod anomaly;
pub mod dialect;
pub mod error;
pub mod governance;
pub mod issue;
pub mod paging;
pub mod ports;
pub mod project;
pub mod protection;
pub mod quality;
pub mod remediation;
pub mod scoring;

// Re-exports pratiques pour simplifier les imports ailleurs
pub use error::DomainError;
pub use paging::Page;
