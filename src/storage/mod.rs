// 对象存储客户端模块

pub mod client;
pub mod signer;

pub use client::{CompleteMultipartUpload, Part, StorageClient};
