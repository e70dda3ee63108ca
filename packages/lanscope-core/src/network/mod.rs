//! Address ranges and the local vantage point.

mod interface;
pub mod range;

pub use interface::{list_interfaces, select_vantage_point, InterfaceInfo, VantagePoint};
pub use range::{is_in_range, is_private, PRIVATE_RANGES};
