// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # labgraph
//!
//! A deterministic compiler and physics validator for lab protocols proposed
//! by AI agents. Protocols are DAGs of typed actions over containers of
//! matter; before anything is exported, every step is dry-run against a copy
//! of the laboratory state and checked for physical feasibility.
//!
//! ## Architecture
//!
//! - **Units** (`units`): dimension-typed quantities; volume can't be added to mass
//! - **Entities** (`entity`, `action`, `state`): matter, containers, actions, snapshots
//! - **Protocol graph** (`graph`): petgraph DAG with inferred container ordering
//! - **Rules** (`rules`): physical, ordering, compatibility and capability checks
//! - **IR** (`ir`): canonical JSON, SHA-256 content hash, versioned loading
//! - **Errors** (`error`): closed miette diagnostic taxonomy plus a wire `ErrorReport`
//! - **Agents** (`plan`, `compiler`, `correction`, `robustness`): plan documents,
//!   parallel proposals, the self-correction loop and seeded perturbation sweeps
//!
//! ## Library usage
//!
//! ```no_run
//! use labgraph::action::Action;
//! use labgraph::entity::{Container, Matter};
//! use labgraph::graph::ProtocolGraph;
//! use labgraph::units::{Mass, Temperature, Volume};
//!
//! let mut graph = ProtocolGraph::new("dilution");
//! let tube = |id: &str| {
//!     Container::new(id, Volume::microliters(500.0), Temperature::celsius(4.0), Temperature::celsius(100.0))
//! };
//! graph
//!     .add_container(tube("A").with_matter(Matter::liquid(
//!         "water",
//!         Mass::milligrams(150.0),
//!         Volume::microliters(150.0),
//!     )))
//!     .unwrap();
//! graph.add_container(tube("B")).unwrap();
//! graph.add_step(Action::transfer("A", "B", Volume::microliters(100.0))).unwrap();
//!
//! let ir = graph.dry_run(None).unwrap().export_json();
//! println!("{}", ir.content_hash);
//! ```

pub mod action;
pub mod compiler;
pub mod config;
pub mod correction;
pub mod entity;
pub mod error;
pub mod graph;
pub mod ir;
pub mod plan;
pub mod profile;
pub mod robustness;
pub mod rules;
pub mod state;
pub mod units;

pub use compiler::Compiler;
pub use error::{ErrorKind, ErrorReport, LabResult, PhysicsError};
pub use graph::{ProtocolGraph, ValidatedGraph};
pub use ir::IrPayload;
