//! Collaborator middleware
//!
//! Illustrative consumers of the handler/middleware contract: each is an
//! ordinary `Fn(ArcHandler) -> ArcHandler` that can be passed to
//! [`Mux::use_middleware`](crate::Mux::use_middleware) or composed into an
//! inline group.

mod get_head;
mod heartbeat;
mod real_ip;
mod recoverer;
mod strip;
mod throttle;

pub use get_head::get_head;
pub use heartbeat::heartbeat;
pub use real_ip::{real_ip, RealIp};
pub use recoverer::recoverer;
pub use strip::{redirect_slashes, strip_slashes};
pub use throttle::{throttle, throttle_backlog};
