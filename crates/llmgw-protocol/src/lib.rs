pub mod chat;
pub mod setting;
pub mod sse;
pub mod wire;

pub use setting::Setting;
