//! Deobfuscation engine and analysis model for the lurepot decoy service.
//! Pure logic only: no network I/O, no async.

pub mod config;
pub mod error;
pub mod expr;
pub mod record;
pub mod sink;
pub mod target;

pub use config::{Config, FetchOptions};
pub use error::{FetchError, Result};
pub use expr::{parse, DeobfuscationResult, ExprNode};
pub use record::{AnalysisRecord, RetrievedArtifact, Storage};
pub use sink::{Event, Header, Sink};
pub use target::{resolve, ResolvedTarget, Scheme};
