pub mod api;
pub mod channel;
pub mod client;
pub mod router;
pub mod transport;

pub use api::{ApiClient, ChatApi};
pub use channel::{ChannelSettings, Emitter, SessionChannel};
pub use router::{EventRouter, Subscription};
