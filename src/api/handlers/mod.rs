pub mod auth;
pub mod tags;
pub mod tasks;
pub mod users;
pub mod wechat;
