//! Line protocol shared by the balda server and the text client.
//!
//! Every request is one text line. The first whitespace-separated token names
//! a [`Command`]; statistics commands take further tokens of the form
//! `mode limit [offset]`. Anything that does not name a command is passed on
//! as free text, which is how the steps of a `put` (row, column, letter, word)
//! reach the game.

use thiserror::Error;

/// Port the server listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 8888;

/// Line terminator used for everything the server writes.
pub const LINE_ENDING: &str = "\r\n";

/// Every command understood by the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Area,
    Words,
    Step,
    Score,
    Help,
    Skip,
    Put,
    TopUsers,
    TopWords,
    WordTopUsers,
    UserGames,
}

/// Static description of a command, used for lookup and for `help`.
#[derive(Debug)]
pub struct CommandInfo {
    pub command: Command,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
}

/// The command table. Order here is the order of the `help` listing.
pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        command: Command::Area,
        name: "area",
        aliases: &[],
        description: "Shows game area",
    },
    CommandInfo {
        command: Command::Words,
        name: "words",
        aliases: &[],
        description: "Shows used words",
    },
    CommandInfo {
        command: Command::Step,
        name: "step",
        aliases: &["whoseturn"],
        description: "Shows name of user who's step is now",
    },
    CommandInfo {
        command: Command::Score,
        name: "score",
        aliases: &[],
        description: "Shows score of every user in game",
    },
    CommandInfo {
        command: Command::Help,
        name: "help",
        aliases: &[],
        description: "Help for you",
    },
    CommandInfo {
        command: Command::Skip,
        name: "skip",
        aliases: &[],
        description: "Command to skip (if your step is now)",
    },
    CommandInfo {
        command: Command::Put,
        name: "put",
        aliases: &[],
        description: "Command to put letter and tell word (if your step is now)",
    },
    CommandInfo {
        command: Command::TopUsers,
        name: "stat_topusers",
        aliases: &[],
        description: "Shows top of users. Parameters: mode(score, games, wins), limit, [offset]",
    },
    CommandInfo {
        command: Command::TopWords,
        name: "stat_topwords",
        aliases: &[],
        description: "Shows top of words. Parameters: limit, [offset]",
    },
    CommandInfo {
        command: Command::WordTopUsers,
        name: "stat_wordtopusers",
        aliases: &[],
        description: "Shows top of users used this word. Parameters: word, limit, [offset]",
    },
    CommandInfo {
        command: Command::UserGames,
        name: "stat_user",
        aliases: &[],
        description: "Shows games of a user. Parameters: username, limit, [offset]",
    },
];

impl Command {
    /// Finds a command by its name or one of its aliases.
    pub fn lookup(token: &str) -> Option<Command> {
        COMMANDS
            .iter()
            .find(|info| info.name == token || info.aliases.contains(&token))
            .map(|info| info.command)
    }

    pub fn info(self) -> &'static CommandInfo {
        COMMANDS
            .iter()
            .find(|info| info.command == self)
            .unwrap_or(&COMMANDS[0])
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Read-only commands: any player may use them at any time and they
    /// never consume a turn.
    pub fn is_informational(self) -> bool {
        !matches!(self, Command::Skip | Command::Put)
    }

    pub fn is_statistics(self) -> bool {
        matches!(
            self,
            Command::TopUsers | Command::TopWords | Command::WordTopUsers | Command::UserGames
        )
    }
}

/// Renders the `help` listing from the command table.
pub fn help_text() -> String {
    let mut lines = vec!["Game balda".to_string()];
    for info in COMMANDS {
        lines.push(format!("{}\t{}", info.name, info.description));
    }
    lines.join(LINE_ENDING)
}

/// Ranking used by `stat_topusers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    Score,
    Games,
    Wins,
}

impl RankOrder {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "score" => Some(RankOrder::Score),
            "games" => Some(RankOrder::Games),
            "wins" => Some(RankOrder::Wins),
            _ => None,
        }
    }
}

/// Limit/offset window of a statistics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

/// A parsed statistics query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatQuery {
    TopUsers { order: RankOrder, page: Page },
    TopWords { page: Page },
    WordTopUsers { word: String, page: Page },
    UserGames { name: String, page: Page },
}

/// One line of client input after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// A command without arguments.
    Command(Command),
    /// A statistics query with its arguments.
    Stats(StatQuery),
    /// Free text, such as one step of a `put`.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Not correct command, missing {argument} for {command}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("Not correct command, not integer in {argument}")]
    InvalidNumber { argument: &'static str },
    #[error("Not correct command, bad mode. You must use one of: score, games, wins.")]
    UnknownOrder,
}

/// Parses one line (already stripped of its line ending).
pub fn parse_request(line: &str) -> Result<Request, ParseError> {
    let trimmed = line.trim();
    let mut tokens = trimmed.split_whitespace();
    let Some(first) = tokens.next() else {
        return Ok(Request::Text(String::new()));
    };

    let Some(command) = Command::lookup(first) else {
        return Ok(Request::Text(trimmed.to_string()));
    };

    if !command.is_statistics() {
        // "put 1 2" and the like are not commands; let the game reject them.
        if tokens.next().is_some() {
            return Ok(Request::Text(trimmed.to_string()));
        }
        return Ok(Request::Command(command));
    }

    let name = command.name();
    let query = match command {
        Command::TopUsers => {
            let mode = require(tokens.next(), name, "mode")?;
            let order = RankOrder::parse(mode).ok_or(ParseError::UnknownOrder)?;
            StatQuery::TopUsers {
                order,
                page: parse_page(&mut tokens, name)?,
            }
        }
        Command::TopWords => StatQuery::TopWords {
            page: parse_page(&mut tokens, name)?,
        },
        Command::WordTopUsers => {
            let word = require(tokens.next(), name, "word")?.to_lowercase();
            StatQuery::WordTopUsers {
                word,
                page: parse_page(&mut tokens, name)?,
            }
        }
        _ => {
            let user = require(tokens.next(), name, "username")?.to_string();
            StatQuery::UserGames {
                name: user,
                page: parse_page(&mut tokens, name)?,
            }
        }
    };

    Ok(Request::Stats(query))
}

fn require<'a>(
    token: Option<&'a str>,
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, ParseError> {
    token.ok_or(ParseError::MissingArgument { command, argument })
}

fn parse_page<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
) -> Result<Page, ParseError> {
    let limit = require(tokens.next(), command, "limit")?
        .parse::<u32>()
        .map_err(|_| ParseError::InvalidNumber { argument: "limit" })?;
    let offset = match tokens.next() {
        Some(token) => token
            .parse::<u32>()
            .map_err(|_| ParseError::InvalidNumber { argument: "offset" })?,
        None => 0,
    };
    Ok(Page { limit, offset })
}

/// Removes a trailing `\n`, `\r\n` or stray `\r` characters.
pub fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(&['\r', '\n'][..])
}

/// Terminates a message for the wire, normalising embedded newlines.
pub fn frame_line(text: &str) -> String {
    let mut framed = text
        .split('\n')
        .map(|part| part.trim_end_matches('\r'))
        .collect::<Vec<_>>()
        .join(LINE_ENDING);
    framed.push_str(LINE_ENDING);
    framed
}
