//! reelforge - a deterministic, content-addressed pipeline orchestrator for
//! multi-stage media generation.
//!
//! A caller declares a blueprint: a graph of typed inputs, producers (external
//! model invocations), and artefacts (their outputs), optionally parameterised
//! by dimensions. Given concrete input values and provider configuration, the
//! engine expands the graph into canonical job instances, computes an
//! incremental execution plan, executes it layer by layer, and persists every
//! produced artefact in a content-addressed blob store behind an append-only
//! event log so runs are resumable and surgically re-runnable.
//!
//! This crate is a thin facade over the component crates; see
//! [`reelforge_engine`] for the orchestration entry point.

pub use reelforge_canon as canon;
pub use reelforge_condition as condition;
pub use reelforge_engine as engine;
pub use reelforge_error as error;
pub use reelforge_events as events;
pub use reelforge_expand as expand;
pub use reelforge_graph as graph;
pub use reelforge_hash as hash;
pub use reelforge_manifest as manifest;
pub use reelforge_plan as plan;
pub use reelforge_producer as producer;
pub use reelforge_run as run;
pub use reelforge_store as store;

pub use reelforge_blueprint as blueprint;

pub use engine::Engine;
pub use error::EngineError;
