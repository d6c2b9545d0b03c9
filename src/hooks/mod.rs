pub mod flags;
pub mod hook_registry;
pub mod packet_context;
pub mod state;
pub mod typemap;
