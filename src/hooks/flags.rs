//! Execution-control flags attached to a [`crate::hooks::hook_registry::Hook`].

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum HookFlag {
    /// If this hook fails, the registry runs the failure chain and aborts
    /// the remaining hooks for the current state.
    Fatal,
}
