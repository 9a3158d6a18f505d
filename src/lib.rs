//! Action dispatch for a grocery shopping assistant.
//!
//! The assistant embeds directives such as `[ACTION:ADD_TO_LIST] Milk, 2` in its
//! replies. [`parser::parse_actions_from_response`] pulls them out,
//! [`tools::ToolRegistry::execute_action`] runs each against a [`store::Store`],
//! and every outcome comes back as an [`actions::ActionResult`] whose message can
//! be shown to the user as-is.

pub mod actions;
pub mod config;
pub mod error;
pub mod parser;
pub mod store;
pub mod tools;

pub use actions::{ActionResult, ActionType};
pub use error::BodegaError;
pub use parser::{ParsedAction, parse_actions_from_response, strip_directives};
pub use tools::{ToolInfo, ToolRegistry};
