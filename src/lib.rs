//! Strand - assemble linear AI-agent pipelines and run them

pub mod backend;
pub mod capability;
pub mod catalog;
pub mod compat;
pub mod credentials;
pub mod dispatch;
pub mod draft;
pub mod error;
pub mod mock;
pub mod pipeline;

pub use backend::{Backend, FileInput, HttpBackend};
pub use capability::{Capability, RunOptions, Strategy};
pub use catalog::{Agent, AgentCatalog, DataType};
pub use compat::CompatibilityFilter;
pub use credentials::{ApiKeyCatalog, CredentialBinder, CredentialSource, StoredKey};
pub use dispatch::{Dispatcher, DisplayKind, RunInput, RunOutcome};
pub use draft::Draft;
pub use error::{FixSuggestion, RunPhase, StrandError};
pub use mock::MockBackend;
pub use pipeline::{Pipeline, Step, TypeBreak};
