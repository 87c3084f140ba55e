//! Per-user items
//!
//! Item CRUD scoped to the authenticated caller, with ownership checks on
//! every single-item operation.

pub mod service;

pub use service::{
    CreateItemRequest, ItemAckResponse, ItemResponse, ItemService, UpdateItemRequest,
};
