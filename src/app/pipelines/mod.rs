pub mod dispatch;
pub mod egress;
pub mod ingress;

pub use dispatch::{split_message, DispatchLoop, DispatchSettings};
pub use egress::EgressDelivery;
pub use ingress::IngressListener;
