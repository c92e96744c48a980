//! Gateway: HTTP webhook endpoint for the WhatsApp Business Cloud API.
//!
//! One route serves the GET verification handshake and POST message events.
//! Events are answered by forwarding the text to the model and replying to the sender;
//! the POST is acknowledged with 200 whatever happens downstream.

mod server;

pub use server::{
    process_event, router, run_gateway, verify_handshake, EventOutcome, GatewayState,
    ProcessError, VerifyQuery,
};
