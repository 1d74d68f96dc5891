pub mod chain;
pub mod context;
pub mod hooks;
pub mod keys;
pub mod registry;
pub mod steps;

pub use chain::{CallbackChain, CallbackEntry, ChainBuilder, ResolvedCallback, StepFn};
pub use context::{OperationContext, Search, SharedTx, Target};
pub use hooks::ModelHooks;
pub use registry::{Callbacks, ChainKind};
