pub mod migration;
pub mod moderation;
pub mod signer;
pub mod source;
pub mod storage;
pub mod wallpaper_service;
pub mod worker;
