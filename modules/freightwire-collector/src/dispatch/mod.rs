//! Real-time fan-out: in-process push subscribers and webhook deliveries.

mod dispatcher;
mod push;
mod webhook;

pub use dispatcher::Dispatcher;
pub use push::{PushFrame, PushHandle, PushRegistry};
pub use webhook::{sign_payload, WebhookJob, WebhookSender};
