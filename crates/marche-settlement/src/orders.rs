//! Order directory collaborator

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use marche_types::OrderId;
use tokio::sync::RwLock;

use crate::Result;

/// Answers whether an order exists upstream
#[async_trait]
pub trait OrderDirectory: Send + Sync {
    async fn exists(&self, order_id: &OrderId) -> Result<bool>;
}

/// Trusts the capture event: any order id on it exists
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureEventOrders;

#[async_trait]
impl OrderDirectory for CaptureEventOrders {
    async fn exists(&self, _order_id: &OrderId) -> Result<bool> {
        Ok(true)
    }
}

/// Fixed set of known orders
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderDirectory {
    orders: Arc<RwLock<HashSet<OrderId>>>,
}

impl InMemoryOrderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, order_id: OrderId) {
        self.orders.write().await.insert(order_id);
    }
}

#[async_trait]
impl OrderDirectory for InMemoryOrderDirectory {
    async fn exists(&self, order_id: &OrderId) -> Result<bool> {
        Ok(self.orders.read().await.contains(order_id))
    }
}
