pub mod connection;
pub mod delivery;
pub mod dispatcher;

pub use connection::handle_connection;
pub use delivery::{DeliveryError, deliver_message};
pub use dispatcher::Dispatcher;
