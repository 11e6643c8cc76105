pub mod server;

use crate::{remember_me::RememberMeConfig, session::SessionConfig};

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        remember_me: RememberMeConfig,
        session: SessionConfig,
    },
}
