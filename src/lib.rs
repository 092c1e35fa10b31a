pub mod block;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod constants;
pub mod extension;
pub mod governance;
pub mod pipeline;
pub mod slashing;
pub mod stats;
pub mod store;
pub mod summary;
pub mod validator;
