pub use super::upload_requests::Entity as UploadRequests;
pub use super::wallpapers::Entity as Wallpapers;
