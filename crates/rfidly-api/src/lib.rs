// rfidly-api: Async Rust clients for the inventory backend, RFID device hub, and scan push channel

pub mod backend;
pub mod error;
pub mod hub;
pub mod push;
pub mod transport;

pub use backend::{
    BackendClient, BatchResponse, FieldStyle, NewBatch, NewTransaction, Page, PageMeta,
    TagResponse, TransactionResponse,
};
pub use error::Error;
pub use hub::{HubConfig, HubConnection, HubEvent};
pub use push::{PushConfig, PushEvent, PushHandle, PushState, ReconnectConfig};
pub use transport::{TlsMode, TransportConfig};
