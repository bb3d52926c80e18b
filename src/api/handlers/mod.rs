pub mod admin;
pub mod health;
pub mod uploads;
pub mod users;
pub mod wallpapers;
