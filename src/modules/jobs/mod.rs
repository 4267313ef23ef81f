pub mod acquire;
pub mod message;
pub mod producer;
pub mod source;
