//! wabot core library: WhatsApp webhook gateway, Ollama client, and reply channel
//! used by the CLI.

pub mod agent;
pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod llm;
