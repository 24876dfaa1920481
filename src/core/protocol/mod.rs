// src/core/protocol/mod.rs

pub mod message;
pub use message::{Method, ProtocolVersion, Request, RequestMeta, Response};
