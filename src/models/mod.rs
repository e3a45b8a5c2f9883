pub mod chat;
pub mod driver;
pub mod location;
pub mod notification;
pub mod trip;
