//! Matchgrid: clear rows and columns on a small grid before the turn timer runs out.

mod app;
mod input;
mod ui;

use anyhow::{Context, Result, bail};
use app::{App, MultiOptions};
use clap::{Parser, Subcommand};
use matchgrid::GameConfig;
use matchgrid::highscores::{self, ScoreEntry, ScoreStore};
use matchgrid::net::{self, NetworkEvent};
use matchgrid::protocol::{ClientMessage, ServerMessage};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "matchgrid=info";
/// How long `scores --online` waits for the server's table.
const ONLINE_SCORES_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Play(args.play));
    init_logging(args.log_file.as_deref(), matches!(command, Command::Scores(_)))?;

    let scores_path = args.scores_file.unwrap_or_else(highscores::config_path);
    let scores = ScoreStore::open_or_default(&scores_path);

    match command {
        Command::Play(play) => {
            let config = GameConfig {
                cols: usize::from(play.board.cols),
                rows: usize::from(play.board.rows),
                starting_lives: play.lives,
                starting_score: play.start_score,
                ..GameConfig::default()
            };
            let mut app = App::single(config, play.seed, scores, play.board.no_animation);
            app.run()?;
        }
        Command::Multi(multi) => {
            let config = GameConfig::multiplayer(usize::from(multi.board.cols), usize::from(multi.board.rows));
            let options = MultiOptions {
                server: multi.server,
                channel: multi.channel,
                name: multi.name,
                host: multi.host,
            };
            let mut app = App::multi(config, &options, scores, multi.board.no_animation)
                .with_context(|| format!("could not join {}", options.server))?;
            app.run()?;
        }
        Command::Scores(list) => {
            print_scores("High scores", scores.entries());
            if list.online {
                let Some(server) = list.server else {
                    bail!("--online needs --server or MATCHGRID_SERVER");
                };
                let online = fetch_online_scores(&server)?;
                println!();
                print_scores("Online", &online);
            }
        }
    }
    Ok(())
}

/// Logs go to `--log-file` when given. Otherwise they are dropped while the TUI owns the terminal
/// and sent to stderr for plain commands.
fn init_logging(log_file: Option<&Path>, to_stderr: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log_file {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("could not create log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None if to_stderr => builder.with_writer(std::io::stderr).init(),
        None => builder.with_writer(std::io::sink).init(),
    }
    Ok(())
}

fn print_scores(title: &str, entries: &[ScoreEntry]) {
    println!("{title}");
    for (i, entry) in entries.iter().enumerate() {
        println!("{:>2}. {:<20}{:>8}", i + 1, entry.name, entry.score);
    }
}

/// Asks the server for `HISCORES UNIQUE` and waits for the reply.
fn fetch_online_scores(server: &str) -> Result<Vec<ScoreEntry>> {
    let handle = net::connect(server)?;
    handle.send(&ClientMessage::HiScoresUnique)?;
    let deadline = Instant::now() + ONLINE_SCORES_TIMEOUT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let event = handle
            .rx
            .recv_timeout(left)
            .context("no high scores from server")?;
        match event {
            NetworkEvent::Message(text) => match ServerMessage::parse(&text) {
                Ok(Some(ServerMessage::HiScores(entries))) => {
                    info!(count = entries.len(), "online scores received");
                    // Best effort goodbye; the process exits right after.
                    let _ = handle.send(&ClientMessage::Quit);
                    return Ok(entries);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "ignoring bad frame"),
            },
            NetworkEvent::Connected => {}
            NetworkEvent::Disconnected(reason) => bail!("server closed the connection: {reason}"),
        }
    }
}

/// Place pieces on a small grid and clear full rows and columns before the timer runs out.
#[derive(Debug, Parser)]
#[command(
    name = "matchgrid",
    version,
    about = "Place 3x3 pieces on a small grid; clear full rows and columns before the turn timer runs out.",
    long_about = "Matchgrid is a terminal puzzle game. Each turn you get a piece; place it anywhere \
        it fits. Completing a row or column clears it and scores blocks x lines x 10 x multiplier. \
        If the turn timer runs out you lose a life and the piece.\n\n\
        CONTROLS:\n  Arrows/WASD  Move cursor   Enter/X  Place   Q/E/]  Rotate left   Z/C/[  Rotate right\n  \
        Space/R      Swap pieces   T        Chat (multiplayer)         Esc    Quit\n\n\
        Without a subcommand, starts a single-player game.",
    args_conflicts_with_subcommands = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub play: PlayArgs,

    /// Score file (one name:score per line). Defaults to $XDG_CONFIG_HOME/matchgrid/scores.
    #[arg(long, global = true, value_name = "FILE")]
    pub scores_file: Option<PathBuf>,

    /// Write logs here (RUST_LOG filters them; default matchgrid=info).
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Single player with local random pieces.
    Play(PlayArgs),
    /// Multiplayer over a WebSocket game server.
    Multi(MultiArgs),
    /// Print the local (and optionally online) high scores.
    Scores(ScoresArgs),
}

#[derive(Debug, clap::Args)]
pub struct BoardArgs {
    /// Grid width in squares.
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u16).range(1..=20), value_name = "COLS")]
    pub cols: u16,

    /// Grid height in squares.
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u16).range(1..=20), value_name = "ROWS")]
    pub rows: u16,

    /// Disable the clear-out fade (cleared squares empty immediately).
    #[arg(long)]
    pub no_animation: bool,
}

#[derive(Debug, clap::Args)]
pub struct PlayArgs {
    #[command(flatten)]
    pub board: BoardArgs,

    /// Lives at the start.
    #[arg(long, default_value_t = 3, value_name = "N")]
    pub lives: u32,

    /// Score at the start (for demos and practice).
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub start_score: u32,

    /// Seed for the piece sequence.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

#[derive(Debug, clap::Args)]
pub struct MultiArgs {
    #[command(flatten)]
    pub board: BoardArgs,

    /// Game server URL.
    #[arg(long, env = "MATCHGRID_SERVER", value_name = "URL")]
    pub server: String,

    /// Channel to join (or create with --host). Without it the lobby lists open channels.
    #[arg(long, value_name = "NAME")]
    pub channel: Option<String>,

    /// Nickname to use on the server.
    #[arg(long, env = "MATCHGRID_NAME", value_name = "NICK")]
    pub name: Option<String>,

    /// Create the channel instead of joining it.
    #[arg(long, requires = "channel")]
    pub host: bool,
}

#[derive(Debug, clap::Args)]
pub struct ScoresArgs {
    /// Also fetch the server's high-score table.
    #[arg(long)]
    pub online: bool,

    /// Game server URL for --online.
    #[arg(long, env = "MATCHGRID_SERVER", value_name = "URL")]
    pub server: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_plays_with_defaults() {
        let args = Args::try_parse_from(["matchgrid"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.play.board.cols, 5);
        assert_eq!(args.play.lives, 3);
        assert_eq!(args.play.start_score, 0);
    }

    #[test]
    fn test_play_flags() {
        let args = Args::try_parse_from([
            "matchgrid", "play", "--cols", "7", "--start-score", "5600", "--lives", "0", "--seed", "9",
        ])
        .unwrap();
        let Some(Command::Play(play)) = args.command else {
            panic!("expected play");
        };
        assert_eq!(play.board.cols, 7);
        assert_eq!(play.start_score, 5600);
        assert_eq!(play.lives, 0);
        assert_eq!(play.seed, Some(9));
    }

    #[test]
    fn test_multi_and_scores() {
        let args = Args::try_parse_from([
            "matchgrid", "multi", "--server", "ws://localhost:9700", "--host", "--channel", "friday", "--name",
            "ana",
        ])
        .unwrap();
        let Some(Command::Multi(multi)) = args.command else {
            panic!("expected multi");
        };
        assert!(multi.host);
        assert_eq!(multi.channel.as_deref(), Some("friday"));
        assert_eq!(multi.name.as_deref(), Some("ana"));

        let args = Args::try_parse_from(["matchgrid", "scores", "--scores-file", "/tmp/s"]).unwrap();
        assert!(matches!(args.command, Some(Command::Scores(ScoresArgs { online: false, .. }))));
        assert_eq!(args.scores_file, Some(PathBuf::from("/tmp/s")));
    }

    #[test]
    fn test_host_needs_a_channel() {
        assert!(Args::try_parse_from(["matchgrid", "multi", "--server", "ws://x", "--host"]).is_err());
        let args = Args::try_parse_from(["matchgrid", "multi", "--server", "ws://x"]).unwrap();
        let Some(Command::Multi(multi)) = args.command else {
            panic!("expected multi");
        };
        assert_eq!(multi.channel, None);
    }

    #[test]
    fn test_board_size_is_bounded() {
        assert!(Args::try_parse_from(["matchgrid", "--cols", "0"]).is_err());
        assert!(Args::try_parse_from(["matchgrid", "--rows", "21"]).is_err());
    }
}
