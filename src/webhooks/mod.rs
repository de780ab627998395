pub mod dispatcher;
pub mod signer;
pub mod transport;

pub use dispatcher::{RetryPolicy, WebhookDispatcher};
pub use signer::{WebhookSigner, SIGNATURE_HEADER};
pub use transport::{OutgoingWebhook, ReqwestTransport, WebhookTransport};
