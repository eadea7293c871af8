pub mod gateway;
pub mod support;
