pub mod inbound;

pub use inbound::consume_service_messages;
