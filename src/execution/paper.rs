use super::gateway::{
    ExecutionGateway, OrderHandle, OrderRequest, OrderStatus, OrderType, VenuePosition,
};
use crate::error::GatewayError;
use crate::models::{Side, VenueKind};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

/// Gateway call categories for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaperCall {
    PlaceMarket,
    PlaceStop,
    PlaceLimit,
    Query,
    Cancel,
    Status,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    status: OrderStatus,
}

#[derive(Debug, Clone, Copy)]
struct Holding {
    side: Side,
    size: f64,
    entry: f64,
}

#[derive(Debug, Clone, Copy)]
struct PendingFill {
    side: Side,
    quantity: f64,
    price: f64,
    queries_left: u32,
}

#[derive(Debug, Default)]
struct PaperState {
    mark_price: f64,
    holding: Option<Holding>,
    orders: HashMap<String, PaperOrder>,
    order_log: Vec<OrderRequest>,
    next_id: u64,
    failures: HashMap<PaperCall, VecDeque<GatewayError>>,
    fill_delay_queries: u32,
    pending: Option<PendingFill>,
}

impl PaperState {
    fn take_failure(&mut self, call: PaperCall) -> Result<(), GatewayError> {
        match self.failures.get_mut(&call).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn apply_fill(&mut self, side: Side, quantity: f64, price: f64, reduce_only: bool) {
        match self.holding {
            Some(h) if h.side != side => {
                let remaining = h.size - quantity;
                self.holding = if remaining > 1e-12 {
                    Some(Holding { size: remaining, ..h })
                } else {
                    None
                };
            }
            Some(h) => {
                if !reduce_only {
                    let size = h.size + quantity;
                    let entry = (h.entry * h.size + price * quantity) / size;
                    self.holding = Some(Holding { side, size, entry });
                }
            }
            None => {
                if !reduce_only {
                    self.holding = Some(Holding {
                        side,
                        size: quantity,
                        entry: price,
                    });
                }
            }
        }
    }

    /// Fill resting stop/limit orders crossed by the mark price
    fn trigger_resting(&mut self) {
        let mark = self.mark_price;
        let mut fills = Vec::new();

        for (id, order) in self.orders.iter() {
            if order.status != OrderStatus::Open {
                continue;
            }
            let side = order.request.side;
            let trigger = match order.request.order_type {
                OrderType::Stop { trigger } => match side {
                    Side::Sell => (mark <= trigger).then_some(trigger),
                    Side::Buy => (mark >= trigger).then_some(trigger),
                },
                OrderType::Limit { price } => match side {
                    Side::Sell => (mark >= price).then_some(price),
                    Side::Buy => (mark <= price).then_some(price),
                },
                OrderType::Market => None,
            };
            if let Some(price) = trigger {
                fills.push((id.clone(), price));
            }
        }

        // Oldest first so a gap through both levels fills the stop
        fills.sort_by_key(|(id, _)| id.trim_start_matches("paper-").parse::<u64>().unwrap_or(0));

        for (id, price) in fills {
            if self.holding.is_none() {
                break;
            }
            let Some(order) = self.orders.get_mut(&id) else {
                continue;
            };
            order.status = OrderStatus::Filled { price };
            let (side, quantity, reduce_only) =
                (order.request.side, order.request.quantity, order.request.reduce_only);
            tracing::debug!(order_id = %id, price, "Paper resting order filled");
            self.apply_fill(side, quantity, price, reduce_only);
        }
    }
}

/// In-memory venue that honours the gateway contract.
///
/// Market orders fill at the mark price; stops and limits rest until the mark
/// crosses them. Failures can be scripted per call kind, and entry fills can be
/// hidden from position queries for a number of queries.
pub struct PaperGateway {
    venue: VenueKind,
    symbol: String,
    state: Mutex<PaperState>,
}

impl PaperGateway {
    pub fn new(venue: VenueKind, symbol: &str, mark_price: f64) -> Self {
        Self {
            venue,
            symbol: symbol.to_string(),
            state: Mutex::new(PaperState {
                mark_price,
                ..Default::default()
            }),
        }
    }

    /// Queue an error for the next call of `call` kind
    pub async fn fail_next(&self, call: PaperCall, error: GatewayError) {
        self.state
            .lock()
            .await
            .failures
            .entry(call)
            .or_default()
            .push_back(error);
    }

    /// Hide market fills from the next `queries` position queries
    pub async fn delay_fill_visibility(&self, queries: u32) {
        self.state.lock().await.fill_delay_queries = queries;
    }

    /// Move the mark price and trigger any crossed resting orders
    pub async fn set_mark_price(&self, price: f64) {
        let mut state = self.state.lock().await;
        state.mark_price = price;
        state.trigger_resting();
    }

    pub async fn mark_price(&self) -> f64 {
        self.state.lock().await.mark_price
    }

    /// Seed venue exposure directly (restart or untracked position scenarios)
    pub async fn set_position(&self, side: Side, size: f64, entry: f64) {
        self.state.lock().await.holding = Some(Holding { side, size, entry });
    }

    /// Drop the position without any order filling (liquidation, manual close on venue)
    pub async fn force_flat(&self) {
        self.state.lock().await.holding = None;
    }

    /// Every accepted order, in submission order
    pub async fn placed_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().await.order_log.clone()
    }

    pub async fn open_order_count(&self) -> usize {
        self.state
            .lock()
            .await
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .count()
    }

    fn validate(&self, order: &OrderRequest) -> Result<(), GatewayError> {
        if order.symbol != self.symbol {
            return Err(GatewayError::Mapping(format!(
                "no contract metadata for {}",
                order.symbol
            )));
        }
        if !(order.quantity > 0.0) {
            return Err(GatewayError::Rejected(format!(
                "quantity must be > 0, got {}",
                order.quantity
            )));
        }
        if self.venue == VenueKind::IntegerContract && order.quantity.fract() != 0.0 {
            return Err(GatewayError::Rejected(format!(
                "integer-contract venue requires whole contracts, got {}",
                order.quantity
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    fn venue(&self) -> VenueKind {
        self.venue
    }

    fn name(&self) -> &str {
        "paper"
    }

    async fn place(&self, order: &OrderRequest) -> Result<OrderHandle, GatewayError> {
        let call = match order.order_type {
            OrderType::Market => PaperCall::PlaceMarket,
            OrderType::Stop { .. } => PaperCall::PlaceStop,
            OrderType::Limit { .. } => PaperCall::PlaceLimit,
        };

        let mut state = self.state.lock().await;
        state.take_failure(call)?;
        self.validate(order)?;

        state.next_id += 1;
        let order_id = format!("paper-{}", state.next_id);
        state.order_log.push(order.clone());

        match order.order_type {
            OrderType::Market => {
                if order.reduce_only && state.holding.is_none() {
                    return Err(GatewayError::Rejected("reduce-only order with no position".into()));
                }
                let price = state.mark_price;
                if !order.reduce_only && state.fill_delay_queries > 0 {
                    state.pending = Some(PendingFill {
                        side: order.side,
                        quantity: order.quantity,
                        price,
                        queries_left: state.fill_delay_queries,
                    });
                } else {
                    state.apply_fill(order.side, order.quantity, price, order.reduce_only);
                }
                state.orders.insert(
                    order_id.clone(),
                    PaperOrder {
                        request: order.clone(),
                        status: OrderStatus::Filled { price },
                    },
                );
                tracing::debug!(%order_id, side = ?order.side, quantity = order.quantity, price, "Paper market order");
                Ok(OrderHandle {
                    order_id,
                    fill_price: Some(price),
                })
            }
            OrderType::Stop { .. } | OrderType::Limit { .. } => {
                state.orders.insert(
                    order_id.clone(),
                    PaperOrder {
                        request: order.clone(),
                        status: OrderStatus::Open,
                    },
                );
                state.trigger_resting();
                Ok(OrderHandle {
                    order_id,
                    fill_price: None,
                })
            }
        }
    }

    async fn query_position(&self, symbol: &str) -> Result<VenuePosition, GatewayError> {
        let mut state = self.state.lock().await;
        state.take_failure(PaperCall::Query)?;
        if symbol != self.symbol {
            return Err(GatewayError::Mapping(format!("no contract metadata for {}", symbol)));
        }

        if let Some(mut pending) = state.pending.take() {
            if pending.queries_left <= 1 {
                state.apply_fill(pending.side, pending.quantity, pending.price, false);
            } else {
                pending.queries_left -= 1;
                state.pending = Some(pending);
            }
            // Only the query after the countdown sees the fill
            if state.pending.is_some() || state.holding.is_none() {
                return Ok(VenuePosition::Flat);
            }
        }

        Ok(match state.holding {
            Some(h) => VenuePosition::Open {
                size: h.size,
                entry: h.entry,
                side: h.side,
            },
            None => VenuePosition::Flat,
        })
    }

    async fn cancel(&self, _symbol: &str, order_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        state.take_failure(PaperCall::Cancel)?;

        match state.orders.get_mut(order_id) {
            Some(order) if order.status == OrderStatus::Open => {
                order.status = OrderStatus::Cancelled;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(GatewayError::Rejected(format!("unknown order {}", order_id))),
        }
    }

    async fn order_status(&self, _symbol: &str, order_id: &str) -> Result<OrderStatus, GatewayError> {
        let mut state = self.state.lock().await;
        state.take_failure(PaperCall::Status)?;

        Ok(state
            .orders
            .get(order_id)
            .map(|o| o.status.clone())
            .unwrap_or(OrderStatus::Unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> PaperGateway {
        PaperGateway::new(VenueKind::IntegerContract, "ADAUSDT", 100.0)
    }

    #[tokio::test]
    async fn test_market_fill_and_query() {
        let gw = gateway();
        let handle = gw
            .place(&OrderRequest::market("ADAUSDT", Side::Buy, 30.0))
            .await
            .unwrap();

        assert_eq!(handle.fill_price, Some(100.0));
        let position = gw.query_position("ADAUSDT").await.unwrap();
        assert_eq!(
            position,
            VenuePosition::Open {
                size: 30.0,
                entry: 100.0,
                side: Side::Buy
            }
        );
    }

    #[tokio::test]
    async fn test_stop_triggers_on_mark() {
        let gw = gateway();
        gw.place(&OrderRequest::market("ADAUSDT", Side::Buy, 10.0)).await.unwrap();
        let stop = OrderRequest {
            order_type: OrderType::Stop { trigger: 98.0 },
            ..OrderRequest::market("ADAUSDT", Side::Sell, 10.0).reduce_only()
        };
        let handle = gw.place(&stop).await.unwrap();

        gw.set_mark_price(97.5).await;

        assert!(gw.query_position("ADAUSDT").await.unwrap().is_flat());
        assert_eq!(
            gw.order_status("ADAUSDT", &handle.order_id).await.unwrap(),
            OrderStatus::Filled { price: 98.0 }
        );
    }

    #[tokio::test]
    async fn test_failure_injection_is_one_shot() {
        let gw = gateway();
        gw.fail_next(PaperCall::Query, GatewayError::Transport("timeout".into()))
            .await;

        assert!(gw.query_position("ADAUSDT").await.is_err());
        assert!(gw.query_position("ADAUSDT").await.is_ok());
    }

    #[tokio::test]
    async fn test_delayed_fill_visibility() {
        let gw = gateway();
        gw.delay_fill_visibility(2).await;
        gw.place(&OrderRequest::market("ADAUSDT", Side::Buy, 5.0)).await.unwrap();

        assert!(gw.query_position("ADAUSDT").await.unwrap().is_flat());
        assert_eq!(gw.query_position("ADAUSDT").await.unwrap().size(), 5.0);
    }

    #[tokio::test]
    async fn test_mapping_and_rejection_errors() {
        let gw = gateway();
        let err = gw
            .place(&OrderRequest::market("BTCUSDT", Side::Buy, 1.0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "mapping");

        let err = gw
            .place(&OrderRequest::market("ADAUSDT", Side::Buy, 1.5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "rejection");
    }
}
