use crate::error::GatewayError;
use crate::models::{Side, VenueKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderType {
    Market,
    /// Stop-market triggered at `trigger`
    Stop { trigger: f64 },
    /// Resting limit at `price`
    Limit { price: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub order_type: OrderType,
    pub reduce_only: bool,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity,
            order_type: OrderType::Market,
            reduce_only: false,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

/// Venue acknowledgment. Says nothing about fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: String,
    /// Fill price if the venue reported one in the ack
    pub fill_price: Option<f64>,
}

/// Venue-reported position for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VenuePosition {
    Flat,
    Open { size: f64, entry: f64, side: Side },
}

impl VenuePosition {
    pub fn is_flat(&self) -> bool {
        match self {
            VenuePosition::Flat => true,
            VenuePosition::Open { size, .. } => *size <= 0.0,
        }
    }

    pub fn size(&self) -> f64 {
        match self {
            VenuePosition::Flat => 0.0,
            VenuePosition::Open { size, .. } => *size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Filled { price: f64 },
    Cancelled,
    Unknown,
}

/// Venue order I/O. Every implementation classifies failures as transport,
/// rejection or mapping so the controller can react per kind.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Quantity capability of this venue
    fn venue(&self) -> VenueKind;

    fn name(&self) -> &str;

    async fn place(&self, order: &OrderRequest) -> Result<OrderHandle, GatewayError>;

    async fn query_position(&self, symbol: &str) -> Result<VenuePosition, GatewayError>;

    async fn cancel(&self, symbol: &str, order_id: &str) -> Result<(), GatewayError>;

    async fn order_status(&self, symbol: &str, order_id: &str) -> Result<OrderStatus, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_position_flat() {
        assert!(VenuePosition::Flat.is_flat());
        let open = VenuePosition::Open {
            size: 30.0,
            entry: 100.0,
            side: Side::Buy,
        };
        assert!(!open.is_flat());
        assert_eq!(open.size(), 30.0);
    }

    #[test]
    fn test_reduce_only_builder() {
        let order = OrderRequest::market("ADAUSDT", Side::Sell, 5.0).reduce_only();
        assert!(order.reduce_only);
        assert_eq!(order.order_type, OrderType::Market);
    }
}
