//! blockbattle - falling-block battles with a look-ahead bot
//!
//! Two players share one room document on a realtime database. Each client
//! polls the room, mirrors the opponent's board and trades garbage lines.

mod bag;
mod battle;
mod board;
mod bot;
mod game;
mod input;
mod piece;
mod placement;
mod room;
mod score;
mod settings;
mod sync;
mod tetromino;
mod transport;
mod ui;
mod walker;
mod wire;

use anyhow::Context;
use battle::{BattleSession, JoinError, SessionEvent, join_room, unix_now};
use bot::Bot;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use game::{Game, GameEvent};
use input::{Command, InputHandler};
use ratatui::{Terminal, backend::CrosstermBackend};
use room::{RoomState, Slot};
use settings::Settings;
use std::{
    io::{self, stdout},
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};
use sync::{SyncClient, SyncEvent};
use tokio::runtime::{Handle, Runtime};
use tracing::{error, info, warn};
use transport::{HttpTransport, MemoryTransport, RoomTransport};

/// Target frame rate
const TARGET_FPS: u64 = 60;
const FRAME_DURATION: Duration = Duration::from_micros(1_000_000 / TARGET_FPS);

#[derive(Debug, Parser)]
#[command(name = "blockbattle", version, about = "Falling-block battles in the terminal")]
struct Cli {
    /// Room to join, both players must use the same name
    #[arg(long)]
    room: Option<String>,

    /// Base URL of the room database
    #[arg(long)]
    url: Option<String>,

    /// Play alone without a room
    #[arg(long)]
    solo: bool,

    /// Battle the bot in a room kept in this process
    #[arg(long, conflicts_with = "solo")]
    practice: bool,

    /// Start with the bot playing
    #[arg(long)]
    bot: bool,

    /// Seed for pieces, garbage and walkers
    #[arg(long)]
    seed: Option<u64>,

    /// Settings file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,
}

/// A joined room and the client that keeps it in sync
struct Battle<T: RoomTransport> {
    session: BattleSession,
    client: SyncClient<T>,
}

impl<T: RoomTransport> Battle<T> {
    fn new(slot: Slot, settings: &Settings, transport: Arc<T>, handle: Handle) -> Self {
        Self {
            session: BattleSession::new(slot, settings.session_config(), unix_now()),
            client: SyncClient::new(transport, handle, settings.request_timeout()),
        }
    }

    /// Trade garbage and game events with the session, then sync with the
    /// room. Returns true if a round started or ended and `game` was reset.
    fn step(&mut self, game: &mut Game, now: f64) -> bool {
        let garbage = self.session.take_pending_garbage();
        if garbage > 0 {
            info!("{} receiving {} garbage lines", self.session.slot(), garbage);
            game.apply_garbage(garbage);
        }

        for event in game.take_events() {
            match event {
                GameEvent::LinesCleared(lines) => self.session.on_lines_cleared(lines),
                GameEvent::Stomped => self.session.on_stomp(),
                GameEvent::Lost(cause) => {
                    info!("{} lost: {:?}", self.session.slot(), cause);
                    self.session.on_loss(now);
                }
            }
        }

        self.session.tick(now, game);
        for request in self.session.take_outbox() {
            self.client.dispatch(request);
        }

        for event in self.client.drain() {
            match event {
                SyncEvent::Room(Some(room)) => self.session.on_room(&room, now),
                SyncEvent::Room(None) => warn!("room document is gone"),
                SyncEvent::Written | SyncEvent::Failed { .. } => {}
            }
        }

        let mut reset = false;
        for event in self.session.take_events() {
            if matches!(event, SessionEvent::RoundStarted | SessionEvent::RoundEnded) {
                game.reset();
                reset = true;
            }
        }
        reset
    }
}

/// Bot opponent sharing an in-process room with the player
struct Rival {
    game: Game,
    bot: Bot,
    battle: Battle<MemoryTransport>,
}

impl Rival {
    fn step(&mut self, dt: Duration, now: f64) {
        let session = &mut self.battle.session;
        if session.phase() == RoomState::Waiting && !session.is_ready() {
            session.set_ready(true, now);
        }
        if session.phase() == RoomState::Playing {
            self.game.update(dt);
            self.bot.update(dt, &mut self.game);
        }
        if self.battle.step(&mut self.game, now) {
            self.bot.reset();
        }
    }
}

/// How this process plays
enum Mode {
    Solo,
    Online(Battle<HttpTransport>),
    Practice(Battle<MemoryTransport>, Box<Rival>),
}

fn new_bot(settings: &Settings) -> Bot {
    Bot::new(
        settings.bot.weights,
        Duration::from_millis(settings.bot.tick_ms),
    )
}

/// Claim a slot in the configured room. None if the room is full.
fn join_online(settings: &Settings, runtime: &Runtime) -> anyhow::Result<Option<Battle<HttpTransport>>> {
    let transport = HttpTransport::new(
        &settings.network.base_url,
        &settings.network.room,
        settings.request_timeout(),
    )?;
    match runtime.block_on(join_room(&transport, unix_now(), settings.stale_after())) {
        Ok(slot) => Ok(Some(Battle::new(
            slot,
            settings,
            Arc::new(transport),
            runtime.handle().clone(),
        ))),
        Err(JoinError::RoomFull) => {
            warn!("room {} is full", settings.network.room);
            Ok(None)
        }
        Err(e) => {
            error!("could not join room: {}", e);
            Err(e).context("could not join room")
        }
    }
}

/// Host an in-process room and seat the bot as the guest
fn start_practice(settings: &Settings, runtime: &Runtime, seed: u64) -> anyhow::Result<Mode> {
    let transport = Arc::new(MemoryTransport::new());
    let stale_after = settings.stale_after();
    let slot = runtime.block_on(join_room(transport.as_ref(), unix_now(), stale_after))?;
    let rival_slot = runtime.block_on(join_room(transport.as_ref(), unix_now(), stale_after))?;
    info!("practice room: you are {}, the bot is {}", slot, rival_slot);

    let handle = runtime.handle().clone();
    let rival = Rival {
        game: Game::new(seed.wrapping_add(1), settings.game_config()),
        bot: new_bot(settings),
        battle: Battle::new(rival_slot, settings, Arc::clone(&transport), handle.clone()),
    };
    Ok(Mode::Practice(
        Battle::new(slot, settings, transport, handle),
        Box::new(rival),
    ))
}

/// Get the blockbattle temp directory, creating it if needed
fn blockbattle_temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join("blockbattle");
    let _ = std::fs::create_dir_all(&dir);
    dir
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Generate session ID for this instance
    let session_id: u32 = rand::random();

    // Logs go to a file, the terminal belongs to the UI
    let log_dir = blockbattle_temp_dir();
    let log_file = format!("{:08x}.log", session_id);
    let file_appender = tracing_appender::rolling::never(&log_dir, &log_file);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blockbattle=debug".parse()?),
        )
        .with_ansi(false)
        .init();

    info!(
        "blockbattle starting up, session={:08x}, log={}",
        session_id,
        log_dir.join(&log_file).display()
    );

    let mut settings = Settings::load_or_init(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("using default settings: {}", e);
        Settings::default()
    });
    if let Some(room) = cli.room {
        settings.network.room = room;
    }
    if let Some(url) = cli.url {
        settings.network.base_url = url;
    }
    let seed = cli.seed.unwrap_or_else(rand::random);
    info!("seed {}", seed);

    // Network requests run here, never on the game loop
    let runtime = Runtime::new().context("failed to create async runtime")?;

    let mode = if cli.solo {
        Mode::Solo
    } else if cli.practice {
        start_practice(&settings, &runtime, seed)?
    } else {
        match join_online(&settings, &runtime)? {
            Some(battle) => Mode::Online(battle),
            None => {
                eprintln!(
                    "Room '{}' already has two players. Pick another with --room.",
                    settings.network.room
                );
                return Ok(());
            }
        }
    };

    // Setup terminal
    enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = match mode {
        Mode::Solo => run_app::<HttpTransport>(&mut terminal, &settings, None, None, seed, cli.bot),
        Mode::Online(battle) => {
            run_app(&mut terminal, &settings, Some(battle), None, seed, cli.bot)
        }
        Mode::Practice(battle, rival) => {
            run_app(&mut terminal, &settings, Some(battle), Some(*rival), seed, cli.bot)
        }
    };

    // Restore terminal
    disable_raw_mode()?;
    execute!(stdout(), LeaveAlternateScreen)?;

    let (game, wins) = result?;
    println!("\nThanks for playing blockbattle!");
    println!(
        "Score: {} | Lines: {} | Stomps: {}",
        game.score.points, game.score.lines, game.score.stomps
    );
    if let Some(wins) = wins {
        println!("Rounds won: {}", wins);
    }

    Ok(())
}

/// Run the game loop until the player quits. Returns the last game and the
/// number of rounds won if a room was joined.
fn run_app<T: RoomTransport>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    settings: &Settings,
    mut battle: Option<Battle<T>>,
    mut rival: Option<Rival>,
    seed: u64,
    bot_on: bool,
) -> io::Result<(Game, Option<u32>)> {
    let mut game = Game::new(seed, settings.game_config());
    let mut input = InputHandler::from_settings(settings);
    let mut bot = new_bot(settings);
    let mut bot_on = bot_on;
    let help = ui::help_line(input.bindings());
    let mut last_frame = Instant::now();

    loop {
        let now = unix_now();
        terminal.draw(|frame| match &battle {
            Some(battle) => {
                ui::render_battle(frame, &game, &battle.session, settings, bot_on, now, &help)
            }
            None => ui::render_game(frame, &game, settings, bot_on),
        })?;

        let mut actions = Vec::new();
        if event::poll(FRAME_DURATION)? {
            if let Event::Key(key) = event::read()? {
                match key.kind {
                    KeyEventKind::Press => {
                        for command in input.key_down(key) {
                            match command {
                                Command::Quit => {
                                    let wins = battle.as_ref().map(|b| b.session.match_wins());
                                    return Ok((game, wins));
                                }
                                Command::ToggleBot => {
                                    bot_on = !bot_on;
                                    bot.reset();
                                    input.clear();
                                    info!("bot {}", if bot_on { "on" } else { "off" });
                                }
                                Command::Ready => {
                                    if let Some(battle) = &mut battle {
                                        let ready = !battle.session.is_ready();
                                        battle.session.set_ready(ready, unix_now());
                                    }
                                }
                                Command::Game(action) => actions.push(action),
                            }
                        }
                    }
                    KeyEventKind::Release => input.key_up(key),
                    _ => {}
                }
            }
        }
        actions.extend(input.update());

        let dt = last_frame.elapsed();
        last_frame = Instant::now();

        // In a room the board only moves while the round is on
        let playing = battle
            .as_ref()
            .is_none_or(|b| b.session.phase() == RoomState::Playing);
        if playing {
            if !bot_on {
                for action in actions {
                    game.process_action(action);
                }
            }
            game.update(dt);
            if bot_on {
                bot.update(dt, &mut game);
            }
        }

        let now = unix_now();
        match &mut battle {
            Some(battle) => {
                if battle.step(&mut game, now) {
                    bot.reset();
                    input.clear();
                }
            }
            None => {
                for event in game.take_events() {
                    if let GameEvent::Lost(cause) = event {
                        info!("game over: {:?}, score {}", cause, game.score.points);
                        game.reset();
                        bot.reset();
                    }
                }
            }
        }

        if let Some(rival) = &mut rival {
            rival.step(dt, now);
        }
    }
}
