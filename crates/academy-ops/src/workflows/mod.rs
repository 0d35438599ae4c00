pub mod dispatch;
pub mod prospects;
pub mod sessions;
