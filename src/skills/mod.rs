//! Self-Extending Skills System
//!
//! Skills are named callables with function-calling tool schemas. Static
//! skills ship in the binary; dynamic skills are Python files the agent
//! writes at runtime and hot-loads through a sandboxed interpreter.
//!
//! ```text
//! user request -> ReAct loop -> create_skill
//!                                   |
//!                         generator: clean / validate /
//!                         guard scan / syntax check
//!                                   |
//!                         write agent_skills/<name>.py
//!                                   |
//!                         dynamic host probes schema
//!                                   |
//!                         registry + keyword index
//! ```

pub mod builtin;
pub mod dynamic;
pub mod generator;
pub mod registry;
pub mod sandbox;
pub mod schema;

pub use dynamic::DynamicSkill;
pub use generator::SkillGenerator;
pub use registry::{InstalledSkill, Skill, SkillMatch, SkillRegistry, SkillSource};
pub use sandbox::{Sandbox, SandboxConfig, SandboxResult};
pub use schema::ToolSpec;
