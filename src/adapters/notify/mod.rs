pub mod broadcast;

pub use broadcast::{BroadcastNotifier, TicketEvent, TicketSubscription};
