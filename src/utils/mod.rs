pub mod auth;
pub mod hash;
pub mod keys;
pub mod validation;
