mod config;
mod init;
mod run;
mod status;

pub use config::ConfigCommand;
pub use init::InitArgs;
pub use run::RunArgs;

pub use config::handle_config;
pub use init::handle_init;
pub use run::handle_run;
pub use status::handle_status;
