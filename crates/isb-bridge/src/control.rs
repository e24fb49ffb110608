//! Commands sent to the `root` peer

/// Name of the virtual peer that carries bridge diagnostics and commands
pub const ROOT: &str = "root";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Login(String),
    Logout,
    /// Manual heartbeat
    Poke,
    Unknown,
}

impl ControlCommand {
    pub fn parse(text: &str) -> Self {
        if let Some(token) = text.strip_prefix("login ") {
            return ControlCommand::Login(token.to_string());
        }
        match text {
            "logout" => ControlCommand::Logout,
            "slack.poke" => ControlCommand::Poke,
            _ => ControlCommand::Unknown,
        }
    }
}
