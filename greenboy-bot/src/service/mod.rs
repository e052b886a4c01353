//! Service layer
//!
//! Services contain the bot's business logic. They work on the job
//! registry and talk to Slurm and the chat gateway only through the
//! repository traits, so they can be tested with in-memory fakes.

pub mod auth;
pub mod notification;
pub mod registry;
pub mod subscription;
pub mod webhook;

pub use auth::Authorizer;
pub use registry::JobRegistry;
pub use subscription::{RejectReason, SubscribeOutcome, SubscriptionService, UnsubscribeOutcome};
pub use webhook::{WebhookGateway, WebhookJanitor};
