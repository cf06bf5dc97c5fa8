// Order execution: venue gateway contract, retry policy, position controller
pub mod controller;
pub mod gateway;
pub mod paper;
pub mod retry;

pub use controller::{
    ControllerSettings, ControllerState, OpenSlot, PositionController, ProtectiveOrders,
    StatusReport,
};
pub use gateway::{
    ExecutionGateway, OrderHandle, OrderRequest, OrderStatus, OrderType, VenuePosition,
};
pub use paper::{PaperCall, PaperGateway};
pub use retry::{RetryPolicy, RetryReport};
