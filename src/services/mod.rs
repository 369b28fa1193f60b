pub mod coordinator;
pub mod poller;
pub mod transfer;
