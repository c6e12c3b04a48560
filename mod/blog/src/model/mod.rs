pub mod post;
pub mod user;

pub use post::{CreatePost, Post};
pub use user::{CreateUser, UpdateProfile, User};
