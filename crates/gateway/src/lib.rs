//! Boundary to the remote quest API.
//!
//! The rest of Questline talks to the server only through the
//! [`QuestGateway`] trait. [`HttpQuestGateway`] speaks the REST API;
//! [`MemoryGateway`] keeps everything in process.

#![warn(missing_docs)]

pub mod trait_;
pub mod http;
pub mod memory;

pub use trait_::{QuestGateway, GatewayError, Result};
pub use http::{HttpQuestGateway, HttpGatewayConfig};
pub use memory::{Endpoint, Failure, Gate, MemoryGateway};
