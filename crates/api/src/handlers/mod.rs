pub mod connections;
pub mod health;
pub mod users;
pub mod webhooks;
