pub mod dependencies;
pub mod http_client;
pub mod metadata;
pub mod process;
pub mod queue;
pub mod subscriptions;
pub mod update_check;
pub mod ytdlp;
