pub mod beacon;
pub mod connection;
pub mod transport;

pub use beacon::{BeaconError, BeaconQueue, SendBeaconResult};
pub use transport::{HttpTransport, NetworkTransport, ProbeRequest, ProbeResponse};
