// WhatsApp layer - webhook server, inbound routing and the outbound sender.
// Everything WhatsApp-specific stays here; the core only sees `Assistant`.

#[path = "cloud_api.rs"]
pub mod cloud_api;
#[path = "commands.rs"]
pub mod commands;
#[path = "dispatch.rs"]
pub mod dispatch;
#[path = "inbound.rs"]
pub mod inbound;
#[path = "webhook.rs"]
pub mod webhook;

pub use cloud_api::WhatsAppCloudClient;
pub use dispatch::SenderQueues;
pub use inbound::{MessageRouter, SenderAccess};
pub use webhook::{serve, webhook_router, WebhookState};
