//! Multiplayer players as reported by `SCORES`, and the leaderboard built from them.

use std::fmt;
use std::str::FromStr;

/// Prefix put in front of a dead player's display name.
pub const DEAD_PREFIX: char = ':';

/// One record of a `SCORES` update: `name:score:lives` or `name:score:DEAD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub score: u32,
    /// `None` once the server reports the player dead.
    pub lives: Option<u32>,
}

impl Player {
    pub fn is_dead(&self) -> bool {
        self.lives.is_none()
    }
}

impl FromStr for Player {
    type Err = String;

    /// Parsed right to left, so the name keeps any colons it contains.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (rest, lives) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("missing lives in {s:?}"))?;
        let (name, score) = rest
            .rsplit_once(':')
            .ok_or_else(|| format!("missing score in {s:?}"))?;
        let score = score
            .parse::<u32>()
            .map_err(|e| format!("bad score {score:?}: {e}"))?;
        let lives = match lives {
            "DEAD" => None,
            n => Some(
                n.parse::<u32>()
                    .map_err(|e| format!("bad lives {n:?}: {e}"))?,
            ),
        };
        Ok(Self {
            name: name.to_string(),
            score,
            lives,
        })
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lives {
            Some(lives) => write!(f, "{}:{}:{}", self.name, self.score, lives),
            None => write!(f, "{}:{}:DEAD", self.name, self.score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: u32,
    pub dead: bool,
}

impl LeaderboardEntry {
    /// Name as shown: dead players get a leading `:`.
    pub fn display_name(&self) -> String {
        if self.dead {
            format!("{DEAD_PREFIX}{}", self.name)
        } else {
            self.name.clone()
        }
    }
}

impl From<&Player> for LeaderboardEntry {
    fn from(player: &Player) -> Self {
        Self {
            name: player.name.clone(),
            score: player.score,
            dead: player.is_dead(),
        }
    }
}

/// Entries sorted by score, highest first; ties keep arrival order.
pub fn build_leaderboard(players: &[Player]) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = players.iter().map(LeaderboardEntry::from).collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries
}
