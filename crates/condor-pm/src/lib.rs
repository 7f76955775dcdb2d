//! Dependency resolution and transaction planning for conda-style
//! environments.
//!
//! A [`Database`] holds repository records and the installed set. A
//! [`Solver`] turns a [`Request`] into a [`Solution`], or an
//! [`Unsolvable`] verdict that can explain itself. The
//! [`TransactionCompiler`] orders a solution into link and unlink steps and
//! records it in the [`History`]. [`Session`] wires these together with
//! [`Config`] and pins.

pub mod acquisition;
pub mod config;
pub mod database;
pub mod error;
pub mod history;
pub mod pins;
pub mod problems;
pub mod repository;
pub mod request;
pub mod session;
pub mod solution;
pub mod solver;
pub mod transaction;

pub use acquisition::{Acquisition, AcquisitionError, AcquisitionOptions, FetchError, FetchTarget, HttpFetcher, RepodataFetcher};
pub use config::{Config, ConfigLoader, ConfigSource};
pub use database::{Database, PackageIndex, StoredRecord};
pub use error::{CondorError, ParseError, Result};
pub use history::{EntryKind, History, HistoryEntry};
pub use pins::{pin_config_specs, pin_file_specs, pin_python_spec, PinSet};
pub use problems::{ExplainFormat, ProblemsGraph};
pub use repository::{Priorities, RepoId, Repository};
pub use request::{Job, JobAction, Request};
pub use session::{Session, SessionBuilder};
pub use solution::{Action, ActionKind, Solution};
pub use solver::{Solver, SolverFlags, SolverKind, Unsolvable};
pub use transaction::{PlanStep, PythonChange, Transaction, TransactionCompiler, TransactionSummary};
