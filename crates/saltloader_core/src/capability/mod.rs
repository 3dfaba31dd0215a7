//! Capability registry: the explicit replacement for injected
//! `__salt__`/`__opts__`/`__grains__`/`__pillar__`/`__context__` globals.
//!
//! # Responsibility
//! - Build one frozen registry per execution context.
//! - Carry options, effective grains and the context scratch space.
//!
//! # Invariants
//! - Adapters receive the registry as an explicit parameter; nothing in this
//!   crate stores it in a global.
//! - Registries are never shared between execution contexts.

pub mod args;
pub mod builtins;
pub mod command;
pub mod grains;
pub mod names;
pub mod registry;
pub mod scratch;

pub use args::{CallArgs, CallError, CallResult};
pub use builtins::build;
pub use registry::{
    Capability, CapabilityBuildError, CapabilityFn, CapabilityRegistry,
    CapabilityRegistryBuilder, FrozenGrains, RegistryError,
};
pub use scratch::ScratchSpace;
