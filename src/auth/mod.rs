pub mod authorizor;

mod platform;
mod user;

pub use platform::Platform;
pub use user::User;
