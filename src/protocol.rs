//! Text protocol spoken with the game server: keyword-prefixed UTF-8 frames, case-sensitive.
//!
//! Inbound frames parse into [`ServerMessage`]; unknown keywords yield `Ok(None)` and are dropped by
//! the caller. Outbound frames are built from [`ClientMessage`] via `Display`.

use crate::highscores::ScoreEntry;
use crate::leaderboard::Player;
use crate::piece::Piece;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Largest `BOARD` payload accepted: a 20x20 grid, the biggest the client can play.
pub const MAX_BOARD_CELLS: usize = 20 * 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("bad PIECE payload: {0:?}")]
    BadPiece(String),
    #[error("bad BOARD payload: {0}")]
    BadBoard(String),
    #[error("bad record: {0}")]
    BadRecord(String),
}

/// Frames the server sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `PIECE <n>`: the next piece in the shared sequence, `n` is catalogue index + 1.
    Piece(Piece),
    /// `SCORES` followed by one `name:score:lives|DEAD` record per line.
    Scores(Vec<Player>),
    /// `MSG <text>`: chat.
    Msg(String),
    /// `BOARD <player>:<v0> <v1> ...`: another player's grid, row-major.
    Board { player: String, values: Vec<i32> },
    /// `START`: the channel's game begins.
    Start,
    /// `ERROR <text>`.
    Error(String),
    /// `HISCORES` followed by one `name:score` record per line.
    HiScores(Vec<ScoreEntry>),
    /// `NICK <name>`: our own nickname was set.
    Nick(String),
    /// `NICK <old>:<new>`: someone else renamed.
    Renamed { old: String, new: String },
    /// `JOIN <channel>`: we joined a channel.
    Join(String),
    /// `HOST`: we host our channel and may start it.
    Host,
    /// `PARTED`: we left our channel.
    Parted,
    /// `USERS` followed by one member name per line.
    Users(Vec<String>),
    /// `CHANNELS` followed by one open channel per line.
    Channels(Vec<String>),
}

impl ServerMessage {
    /// Parses one frame. `Ok(None)` for keywords this client does not handle.
    pub fn parse(frame: &str) -> Result<Option<Self>, ProtocolError> {
        let frame = frame.trim_end_matches(['\r', '\n']);
        let (keyword, payload) = match frame.find([' ', '\n']) {
            Some(i) => (&frame[..i], &frame[i + 1..]),
            None => (frame, ""),
        };
        let msg = match keyword {
            "PIECE" => {
                let n = payload
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ProtocolError::BadPiece(payload.to_string()))?;
                let piece = n
                    .checked_sub(1)
                    .and_then(Piece::create)
                    .ok_or_else(|| ProtocolError::BadPiece(payload.to_string()))?;
                Self::Piece(piece)
            }
            "SCORES" => Self::Scores(parse_records(payload)),
            "HISCORES" => Self::HiScores(parse_records(payload)),
            "MSG" => Self::Msg(payload.to_string()),
            "BOARD" => {
                let (player, values) = parse_board(payload)?;
                Self::Board { player, values }
            }
            "START" if payload.is_empty() => Self::Start,
            "ERROR" => Self::Error(payload.to_string()),
            "NICK" => match payload.split_once(':') {
                Some((old, new)) => Self::Renamed {
                    old: old.to_string(),
                    new: new.to_string(),
                },
                None => Self::Nick(payload.to_string()),
            },
            "JOIN" => Self::Join(payload.to_string()),
            "HOST" => Self::Host,
            "PARTED" => Self::Parted,
            "USERS" => Self::Users(parse_names(payload)),
            "CHANNELS" => Self::Channels(parse_names(payload)),
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }
}

/// Parses newline-separated records, skipping blank lines and logging (then dropping) bad ones.
fn parse_records<T>(payload: &str) -> Vec<T>
where
    T: std::str::FromStr<Err = String>,
{
    payload
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match line.parse::<T>() {
            Ok(record) => Some(record),
            Err(reason) => {
                warn!(error = %ProtocolError::BadRecord(reason), "dropping record");
                None
            }
        })
        .collect()
}

fn parse_names(payload: &str) -> Vec<String> {
    payload
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_board(payload: &str) -> Result<(String, Vec<i32>), ProtocolError> {
    let (player, rest) = payload
        .split_once(':')
        .ok_or_else(|| ProtocolError::BadBoard(format!("missing ':' in {payload:?}")))?;
    let values = rest
        .split_whitespace()
        .take(MAX_BOARD_CELLS + 1)
        .map(|v| {
            v.parse::<i32>()
                .map_err(|_| ProtocolError::BadBoard(format!("bad value {v:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() > MAX_BOARD_CELLS {
        return Err(ProtocolError::BadBoard(format!(
            "more than {MAX_BOARD_CELLS} cells for {player:?}"
        )));
    }
    Ok((player.to_string(), values))
}

/// Frames this client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// `PIECE`: ask for one more piece.
    RequestPiece,
    /// `SCORES`: ask for a leaderboard refresh.
    RequestScores,
    /// `BOARD v0 v1 ...`: our grid, row-major.
    Board(Vec<i32>),
    Score(u32),
    Lives(u32),
    Msg(String),
    Start,
    Quit,
    Die,
    /// `HISCORES UNIQUE`: ask for the online high-score table.
    HiScoresUnique,
    HiScore(ScoreEntry),
    Create(String),
    Join(String),
    Part,
    Nick(String),
    /// `LIST`: ask for the open channels.
    List,
    /// `USERS`: ask for our channel's members.
    RequestUsers,
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestPiece => f.write_str("PIECE"),
            Self::RequestScores => f.write_str("SCORES"),
            Self::Board(values) => {
                f.write_str("BOARD")?;
                for v in values {
                    write!(f, " {v}")?;
                }
                Ok(())
            }
            Self::Score(score) => write!(f, "SCORE {score}"),
            Self::Lives(lives) => write!(f, "LIVES {lives}"),
            Self::Msg(text) => write!(f, "MSG {text}"),
            Self::Start => f.write_str("START"),
            Self::Quit => f.write_str("QUIT"),
            Self::Die => f.write_str("DIE"),
            Self::HiScoresUnique => f.write_str("HISCORES UNIQUE"),
            Self::HiScore(entry) => write!(f, "HISCORE {entry}"),
            Self::Create(channel) => write!(f, "CREATE {channel}"),
            Self::Join(channel) => write!(f, "JOIN {channel}"),
            Self::Part => f.write_str("PART"),
            Self::Nick(name) => write!(f, "NICK {name}"),
            Self::List => f.write_str("LIST"),
            Self::RequestUsers => f.write_str("USERS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::PieceKind;

    fn parse(frame: &str) -> Option<ServerMessage> {
        ServerMessage::parse(frame).unwrap()
    }

    #[test]
    fn test_parse_piece_is_one_based() {
        assert_eq!(parse("PIECE 1"), Some(ServerMessage::Piece(Piece::new(PieceKind::Line))));
        assert_eq!(parse("PIECE 15\n"), Some(ServerMessage::Piece(Piece::new(PieceKind::Triple))));
    }

    #[test]
    fn test_parse_piece_out_of_range() {
        assert!(matches!(ServerMessage::parse("PIECE 0"), Err(ProtocolError::BadPiece(_))));
        assert!(matches!(ServerMessage::parse("PIECE 16"), Err(ProtocolError::BadPiece(_))));
        assert!(matches!(ServerMessage::parse("PIECE x"), Err(ProtocolError::BadPiece(_))));
    }

    #[test]
    fn test_parse_scores_multiline() {
        let msg = parse("SCORES alice:500:3\nbob:900:DEAD\n").unwrap();
        let ServerMessage::Scores(players) = msg else {
            panic!("expected scores, got {msg:?}");
        };
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "alice");
        assert!(players[1].is_dead());
    }

    #[test]
    fn test_parse_scores_skips_bad_records() {
        let msg = parse("SCORES alice:500:3\ngarbage\ncarol:10:1").unwrap();
        assert!(matches!(msg, ServerMessage::Scores(ref p) if p.len() == 2));
    }

    #[test]
    fn test_parse_board() {
        assert_eq!(
            parse("BOARD bob:0 1 2 -1"),
            Some(ServerMessage::Board {
                player: "bob".to_string(),
                values: vec![0, 1, 2, -1],
            })
        );
        assert!(matches!(ServerMessage::parse("BOARD nobody"), Err(ProtocolError::BadBoard(_))));
        assert!(matches!(ServerMessage::parse("BOARD bob:1 x"), Err(ProtocolError::BadBoard(_))));
    }

    #[test]
    fn test_parse_board_rejects_oversized_grid() {
        let full = format!("BOARD bob:{}", vec!["1"; MAX_BOARD_CELLS].join(" "));
        assert!(matches!(parse(&full), Some(ServerMessage::Board { ref values, .. }) if values.len() == MAX_BOARD_CELLS));
        let huge = format!("BOARD bob:{}", vec!["1"; 327_670].join(" "));
        assert!(matches!(ServerMessage::parse(&huge), Err(ProtocolError::BadBoard(_))));
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse("MSG bob:hello there"), Some(ServerMessage::Msg("bob:hello there".into())));
        assert_eq!(parse("START"), Some(ServerMessage::Start));
        assert_eq!(parse("ERROR Name taken"), Some(ServerMessage::Error("Name taken".into())));
        assert_eq!(parse("NICK ana"), Some(ServerMessage::Nick("ana".into())));
        assert_eq!(
            parse("NICK old:new"),
            Some(ServerMessage::Renamed {
                old: "old".into(),
                new: "new".into(),
            })
        );
        assert_eq!(parse("JOIN lobby"), Some(ServerMessage::Join("lobby".into())));
        let hi = parse("HISCORES a:10\nb:5").unwrap();
        assert_eq!(
            hi,
            ServerMessage::HiScores(vec![ScoreEntry::new("a", 10), ScoreEntry::new("b", 5)])
        );
    }

    #[test]
    fn test_parse_lobby_frames() {
        assert_eq!(parse("HOST"), Some(ServerMessage::Host));
        assert_eq!(parse("PARTED"), Some(ServerMessage::Parted));
        assert_eq!(
            parse("USERS ana\nbob\n"),
            Some(ServerMessage::Users(vec!["ana".into(), "bob".into()]))
        );
        assert_eq!(
            parse("CHANNELS lobby\n\nfriday"),
            Some(ServerMessage::Channels(vec!["lobby".into(), "friday".into()]))
        );
        assert_eq!(parse("CHANNELS"), Some(ServerMessage::Channels(Vec::new())));
        assert_eq!(ClientMessage::List.to_string(), "LIST");
        assert_eq!(ClientMessage::RequestUsers.to_string(), "USERS");
    }

    #[test]
    fn test_unknown_and_wrong_case_are_ignored() {
        assert_eq!(parse("HELLO a\nb"), None);
        assert_eq!(parse("piece 3"), None);
        assert_eq!(parse("PIECES 3"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn test_format_outbound() {
        assert_eq!(ClientMessage::RequestPiece.to_string(), "PIECE");
        assert_eq!(ClientMessage::RequestScores.to_string(), "SCORES");
        assert_eq!(ClientMessage::Board(vec![0, 3, -1]).to_string(), "BOARD 0 3 -1");
        assert_eq!(ClientMessage::Score(120).to_string(), "SCORE 120");
        assert_eq!(ClientMessage::Lives(2).to_string(), "LIVES 2");
        assert_eq!(ClientMessage::HiScoresUnique.to_string(), "HISCORES UNIQUE");
        assert_eq!(
            ClientMessage::HiScore(ScoreEntry::new("ana", 4200)).to_string(),
            "HISCORE ana:4200"
        );
        assert_eq!(ClientMessage::Die.to_string(), "DIE");
    }
}
