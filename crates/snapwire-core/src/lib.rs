pub mod condition;
pub mod provider;
pub mod provider_protocol;
pub mod provider_transport;
pub mod session;
pub mod settings;
pub mod snap;
