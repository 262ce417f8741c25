//! Plan compiler, execution driver and engine factory.
//!
//! An [`Engine`] hands out [`Build`]s, either fresh from a plan or rebuilt
//! from stored metadata. A build compiles its plan into a step tree with the
//! [`Compiler`] and drives it to an outcome in [`Build::resume`].

pub mod build;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;

pub use build::{AbortReason, Build};
pub use compiler::Compiler;
pub use config::EngineConfig;
pub use engine::{Engine, ENGINE_NAME};
pub use error::EngineError;
pub use metadata::BuildMetadata;
