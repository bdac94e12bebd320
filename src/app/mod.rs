//! Port traits between the runtime core and the outside world.
//!
//! Tasks only see storage, radios, the scanner, system metrics and the
//! peer transport through the traits in [`ports`], so the whole fabric
//! runs on the host against simulated adapters.

pub mod ports;
