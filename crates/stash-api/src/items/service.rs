//! Item service layer
//!
//! Every operation is scoped to the calling user. Single-item operations
//! look the item up first and then apply the ownership check, so a missing
//! item and a foreign item are told apart according to the configured
//! [`OwnershipPolicy`].

use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::auth::service::MessageResponse;
use crate::error::AppError;
use serde::{Deserialize, Deserializer, Serialize};
use stash_core::{
    ensure_owner, Item, ItemChanges, ItemId, ItemRepository, NewItem, OwnershipPolicy, StashError,
    UserId,
};
use std::sync::Arc;
use utoipa::ToSchema;

/// Item creation request
///
/// The owner is always the caller; there is no owner field to set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateItemRequest {
    pub name: Option<String>,
    /// Defaults to an empty string
    pub description: Option<String>,
}

/// Item update request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateItemRequest {
    /// Applied only when present and non-empty
    pub name: Option<String>,
    /// Applied whenever the key is present; `null` clears it
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

/// Distinguishes `"description": null` (`Some(None)`) from a missing key (`None`)
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Item as returned to its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemResponse {
    #[schema(value_type = i64)]
    pub id: ItemId,
    pub name: String,
    pub description: String,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            name: item.name,
            description: item.description,
        }
    }
}

/// Confirmation carrying the affected item id
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemAckResponse {
    pub message: String,
    #[schema(value_type = i64)]
    pub id: ItemId,
}

/// Item service
#[derive(Clone)]
pub struct ItemService {
    items: Arc<dyn ItemRepository>,
    policy: OwnershipPolicy,
}

impl ItemService {
    pub fn new(items: Arc<dyn ItemRepository>, policy: OwnershipPolicy) -> Self {
        Self { items, policy }
    }

    pub fn policy(&self) -> OwnershipPolicy {
        self.policy
    }

    /// Items owned by the caller
    pub async fn list(&self, caller: UserId) -> Result<Vec<ItemResponse>, AppError> {
        let items = self.items.list_items(caller).await?;
        Ok(items.into_iter().map(ItemResponse::from).collect())
    }

    /// Create an item owned by the caller
    pub async fn create(
        &self,
        caller: UserId,
        request: CreateItemRequest,
    ) -> Result<ItemAckResponse, AppError> {
        let name = request
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::BadRequest("Name is required".to_string()))?;

        let item = self
            .items
            .create_item(&NewItem {
                name,
                description: request.description.unwrap_or_default(),
                owner: caller,
            })
            .await?;

        tracing::debug!(item_id = %item.id, owner = %caller, "Item created");

        Ok(ItemAckResponse {
            message: "Item created".to_string(),
            id: item.id,
        })
    }

    /// Fetch one of the caller's items
    pub async fn get(
        &self,
        caller: UserId,
        id: ItemId,
        ctx: &AuditContext,
    ) -> Result<ItemResponse, AppError> {
        let item = self.owned_item(caller, id, ctx).await?;
        Ok(item.into())
    }

    /// Update one of the caller's items; the owner never changes
    pub async fn update(
        &self,
        caller: UserId,
        id: ItemId,
        request: UpdateItemRequest,
        ctx: &AuditContext,
    ) -> Result<ItemAckResponse, AppError> {
        self.owned_item(caller, id, ctx).await?;

        let changes = ItemChanges {
            name: request.name.filter(|n| !n.is_empty()),
            description: request.description.map(Option::unwrap_or_default),
        };

        let item = self
            .items
            .update_item(id, &changes)
            .await?
            .ok_or_else(|| AppError::NotFound("Item".to_string()))?;

        Ok(ItemAckResponse {
            message: "Item updated".to_string(),
            id: item.id,
        })
    }

    /// Delete one of the caller's items
    pub async fn delete(
        &self,
        caller: UserId,
        id: ItemId,
        ctx: &AuditContext,
    ) -> Result<MessageResponse, AppError> {
        self.owned_item(caller, id, ctx).await?;

        if !self.items.delete_item(id).await? {
            return Err(AppError::NotFound("Item".to_string()));
        }

        Ok(MessageResponse::new("Item deleted"))
    }

    async fn owned_item(
        &self,
        caller: UserId,
        id: ItemId,
        ctx: &AuditContext,
    ) -> Result<Item, AppError> {
        let found = self.items.get_item(id).await?;
        let foreign = found.as_ref().is_some_and(|item| item.owner != caller);

        ensure_owner(found, caller, self.policy).map_err(|e: StashError| {
            if foreign {
                audit_log(&AuditEvent::AccessDenied {
                    user_id: Some(caller),
                    resource: format!("item:{id}"),
                    ip_address: ctx.ip_address.clone(),
                    user_agent: ctx.user_agent.clone(),
                });
            }
            AppError::from(e)
        })
    }
}
