//! Parsing of the interactive command line.

use std::fmt;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/login <client ID> <password> <server-IP> <server-port>`
    Login {
        user: String,
        password: String,
        host: String,
        port: u16,
    },
    /// `/logout`
    Logout,
    /// `/joinsession <session ID>`
    JoinSession(String),
    /// `/leavesession`
    LeaveSession,
    /// `/createsession <session ID>`
    CreateSession(String),
    /// `/list`
    List,
    /// `/quit`
    Quit,
    /// Any line not starting with `/`, sent as-is to the current session.
    Chat(String),
}

/// Why a line could not be turned into a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// A known command with missing or bad arguments.
    Usage(&'static str),
    /// A `/word` that is not a command.
    Unknown,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(usage) => write!(f, "Usage: {usage}"),
            Self::Unknown => f.write_str(
                "Use one of the following commands:\n\
                 /login <client ID> <password> <server-IP> <server-port>\n\
                 /logout\n\
                 /joinsession <session ID>\n\
                 /leavesession\n\
                 /createsession <session ID>\n\
                 /list\n\
                 /quit",
            ),
        }
    }
}

const LOGIN_USAGE: &str = "/login <client ID> <password> <server-IP> <server-port>";
const JOIN_USAGE: &str = "/joinsession <session ID>";
const CREATE_USAGE: &str = "/createsession <session ID>";

impl Command {
    /// Parses one input line (without its line terminator).
    ///
    /// Returns `Ok(None)` for an empty line. Arguments are separated by
    /// whitespace; extra arguments are ignored. Chat lines are kept
    /// verbatim.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        if line.is_empty() {
            return Ok(None);
        }
        if !line.starts_with('/') {
            return Ok(Some(Self::Chat(line.to_string())));
        }

        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or_default();
        let command = match name {
            "/login" => {
                let (Some(user), Some(password), Some(host), Some(port)) =
                    (words.next(), words.next(), words.next(), words.next())
                else {
                    return Err(CommandError::Usage(LOGIN_USAGE));
                };
                let port = port
                    .parse()
                    .map_err(|_| CommandError::Usage(LOGIN_USAGE))?;
                Self::Login {
                    user: user.to_string(),
                    password: password.to_string(),
                    host: host.to_string(),
                    port,
                }
            }
            "/logout" => Self::Logout,
            "/joinsession" => Self::JoinSession(
                words
                    .next()
                    .ok_or(CommandError::Usage(JOIN_USAGE))?
                    .to_string(),
            ),
            "/leavesession" => Self::LeaveSession,
            "/createsession" => Self::CreateSession(
                words
                    .next()
                    .ok_or(CommandError::Usage(CREATE_USAGE))?
                    .to_string(),
            ),
            "/list" => Self::List,
            "/quit" => Self::Quit,
            _ => return Err(CommandError::Unknown),
        };
        Ok(Some(command))
    }
}
