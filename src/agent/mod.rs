pub mod context;
pub mod delivery;
pub mod image_create;
#[path = "loop/mod.rs"]
pub mod agent_loop;
pub mod revocation;

pub use agent_loop::{AgentLoop, AgentLoopConfig};
pub use crate::utils::task_tracker::TaskTracker;
