pub mod base;
pub mod feishu;
pub mod manager;
pub mod utils;
pub mod wechat;

pub use manager::ChannelManager;
