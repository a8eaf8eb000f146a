// API处理器模块

pub mod session;

pub use session::*;
