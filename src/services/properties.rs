use bigdecimal::{BigDecimal, Zero};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Property, PropertyStatus};
use crate::error::AppError;
use crate::ports::Store;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct NewProperty {
    pub title: String,
    pub location: String,
    pub price: BigDecimal,
}

#[derive(Clone)]
pub struct PropertyService {
    store: Arc<dyn Store>,
}

impl PropertyService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, developer_id: Uuid, req: NewProperty) -> Result<Property, AppError> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(AppError::ValidationError("Title is required".to_string()));
        }
        if req.price <= BigDecimal::zero() {
            return Err(AppError::ValidationError("Price must be positive".to_string()));
        }
        let property = Property::new(
            developer_id,
            title.to_string(),
            req.location.trim().to_string(),
            req.price,
        );
        let property = self.store.insert_property(&property).await?;
        tracing::info!(property_id = %property.id, developer_id = %developer_id, "Property listed");
        Ok(property)
    }

    pub async fn list(
        &self,
        status: Option<PropertyStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Property>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = offset.unwrap_or(0).max(0);
        Ok(self.store.list_properties(status, limit, offset).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Property, AppError> {
        self.store
            .find_property(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Property {} not found", id)))
    }
}
