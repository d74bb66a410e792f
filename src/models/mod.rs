pub mod otp;
pub mod todo;
pub mod user;
pub mod wechat;

pub use otp::*;
pub use todo::*;
pub use user::*;
pub use wechat::*;
