//! Request middleware.

pub mod auth;

pub use auth::{
    admin_middleware, AdminGuardState, AdminUser, HttpUserDirectory, UserDirectory, UserProfile,
    TOKEN_HEADER,
};
