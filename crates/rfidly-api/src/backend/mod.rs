// Inventory backend REST surface: tags, transactions, batches.

mod batches;
mod client;
pub mod models;
mod tags;
mod transactions;

pub use client::BackendClient;
pub use models::{
    BatchResponse, FieldStyle, NewBatch, NewTransaction, Page, PageMeta, TagResponse,
    TransactionResponse,
};
