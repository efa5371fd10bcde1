pub mod cart;
pub mod checkout;
pub mod manager;
pub mod slip;
pub mod status;

#[cfg(test)]
mod test_support;

pub use cart::CartStore;
pub use checkout::{CheckoutOrchestrator, OrderSummary, SlipPolicy};
pub use manager::OrderManager;
pub use slip::SlipCoordinator;
pub use status::can_transition;
