pub mod connection;
pub mod constants;
pub mod events;
pub mod reader;
pub mod report;
pub mod types;
pub mod usb;
