//! # gridgate - a stateful power-system simulation session gateway
//!
//! gridgate is a long-lived process that holds exactly one mutable
//! simulation case in memory and exposes a fixed, typed catalog of
//! remotely invokable tools against it: load a case, solve it, change
//! named elements, read marshaled results, and manage per-run output
//! artifacts. Backend failures surface as a closed error taxonomy, never
//! as raw faults.
//!
//! ## Core pieces
//!
//! - **Session**: the single mutable case handle and its lifecycle
//!   (Empty -> Loaded -> Solved/Failed), with a strict
//!   release-before-load replacement protocol
//! - **Tool catalog**: data-declared descriptors with argument validation
//! - **Marshaler**: matrices, phasors and tables become JSON-safe payloads
//! - **Artifact store**: append-only, timestamp-keyed run directories
//! - **Runtime**: one invocation in flight; concurrent calls are rejected
//!   with `SessionBusy`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gridgate::{Gateway, GatewayConfig, ToolRequest};
//!
//! let mut gateway = Gateway::new(&GatewayConfig::default())?;
//! let result = gateway.invoke(
//!     "load_case",
//!     &ToolRequest::new("load_case")
//!         .with_argument("source", "sample_case")
//!         .arguments,
//! );
//! assert!(result.is_success());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod ir;
pub mod marshal;
pub mod plot;
pub mod session;
pub mod value;

// Re-export primary types at crate root for convenience.
pub use artifact::{ArtifactStore, RunDirectory};
pub use catalog::{ParamKind, ParamSpec, SideEffect, ToolCatalog, ToolDescriptor};
pub use config::{GatewayConfig, SolverDefaults};
pub use engine::{CaseSummary, Engine, EngineCase, EngineFault, FeederEngine};
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use gateway::{Gateway, GatewayRuntime, InvocationHandle};
pub use ir::{InvocationResult, ToolRequest};
pub use session::{Session, SessionStatus};
pub use value::{FieldMap, Value};
