//! The call orchestrator and its control surfaces: wires the SIP dialog
//! engine and the RTP media engine into a single-call state machine, and
//! exposes it over a text control protocol carried on a WebSocket.

pub mod control;
pub mod error;
pub mod orchestrator;
pub mod state;
pub mod ws;

pub use control::{ControlEvent, ControlMessage};
pub use error::{Error, Result};
pub use orchestrator::{run_control_loop, Orchestrator, OrchestratorConfig};
pub use state::CallState;
