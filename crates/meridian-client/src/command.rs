//! Client command-line parsing.

/// Echo text sent when `echo` has no argument.
pub const DEFAULT_ECHO: &str = "TEST_ECHO";

/// Chat text sent when `chat` has no argument.
pub const DEFAULT_CHAT: &str = "Hello World!";

/// One parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Connect { host: String, port: u16 },
    Disconnect,
    Echo(String),
    Auth,
    Login,
    Move,
    Chat(String),
    Zone,
    Status,
    Help,
    Quit,
    Empty,
    /// A malformed or unrecognized line, with the reason.
    Invalid(String),
}

impl ClientCommand {
    /// Parse one line. Words are separated by whitespace; `echo` and `chat`
    /// take the rest of the line as their text.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        let text_or = |default: &str| {
            if rest.is_empty() {
                default.to_string()
            } else {
                rest.to_string()
            }
        };

        match command {
            "" => ClientCommand::Empty,
            "connect" => parse_connect(rest),
            "disconnect" => ClientCommand::Disconnect,
            "echo" => ClientCommand::Echo(text_or(DEFAULT_ECHO)),
            "auth" => ClientCommand::Auth,
            "login" => ClientCommand::Login,
            "move" => ClientCommand::Move,
            "chat" => ClientCommand::Chat(text_or(DEFAULT_CHAT)),
            "zone" => ClientCommand::Zone,
            "status" => ClientCommand::Status,
            "help" => ClientCommand::Help,
            "quit" | "exit" => ClientCommand::Quit,
            other => ClientCommand::Invalid(format!("Unknown command: {other}")),
        }
    }
}

fn parse_connect(args: &str) -> ClientCommand {
    let mut words = args.split_whitespace();
    let (Some(host), Some(port)) = (words.next(), words.next()) else {
        return ClientCommand::Invalid("Usage: connect <host> <port>".to_string());
    };
    match port.parse() {
        Ok(port) => ClientCommand::Connect {
            host: host.to_string(),
            port,
        },
        Err(_) => ClientCommand::Invalid(format!("Invalid port: {port}")),
    }
}
