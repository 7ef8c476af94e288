//! Agent-facing tool implementations.
//!
//! Each tool here wraps one daemon service (the Relay, the Mesh, or Pulse)
//! behind the [`tron_tools::TronTool`] trait so an agent session can invoke
//! it the same way it invokes any other tool.

#![deny(unsafe_code)]

pub mod create_schedule;
pub mod get_schedule_status;
pub mod mesh_discover;
pub mod mesh_register_agent;
pub mod publish_message;
pub mod read_inbox;
pub mod register_endpoint;
pub mod trigger_run;

pub use create_schedule::CreateScheduleTool;
pub use get_schedule_status::GetScheduleStatusTool;
pub use mesh_discover::MeshDiscoverTool;
pub use mesh_register_agent::MeshRegisterAgentTool;
pub use publish_message::PublishMessageTool;
pub use read_inbox::ReadInboxTool;
pub use register_endpoint::RegisterEndpointTool;
pub use trigger_run::TriggerRunTool;
