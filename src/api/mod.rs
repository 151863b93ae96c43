//! 单次调用的开放接口封装
//!
//! 每个方法对应一个接口：组装请求体、经调度器发出、解析 data 字段。
//! 不含任何并发编排，复合流程见 `uploader` 与 `util`。

pub mod file;
pub mod link;
pub mod upload;
pub mod user;
