//! Customer orders and the agent fulfillment state machine.

pub mod cart;
pub mod order;

pub use cart::{Cart, CartLine};
pub use order::{
    CancelActor, Order, OrderCommand, OrderEvent, OrderId, OrderItem, OrderStatus, PaymentStatus,
    PurchaseType,
};
