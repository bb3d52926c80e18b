pub mod prelude;

pub mod upload_requests;
pub mod wallpapers;
