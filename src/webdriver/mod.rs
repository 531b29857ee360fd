pub mod capabilities;
pub mod client;
pub mod types;
pub mod wait;

pub use capabilities::DeviceConfig;
pub use client::WebDriverSession;
pub use types::{Condition, DriverError, DriverResult, ElementId, Locator, Point, Rect, UiDriver};
pub use wait::Wait;
