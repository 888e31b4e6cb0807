//! Terminal UI rendering with ratatui

use crate::battle::{BattleSession, OpponentView};
use crate::board::{BOARD_HEIGHT, BOARD_WIDTH, Board, Cell};
use crate::game::{Game, GameState};
use crate::input::{KeyBindings, key_name};
use crate::room::RoomState;
use crate::settings::Settings;
use crate::tetromino::TetrominoType;
use crossterm::event::KeyCode;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

const EMPTY: &str = "  ";
const WALKER: &str = "oo";
const GARBAGE_COLOR: Color = Color::DarkGray;
const WALKER_COLOR: Color = Color::LightRed;

/// Total width needed: hold(12) + board(22) + next/stats(16) = 50
const GAME_WIDTH: u16 = 50;
/// Total height needed: board(20) + 2 buffer rows + 2 for borders = 24
const GAME_HEIGHT: u16 = 24;
/// Local game(50) + opponent board(22) + opponent stats(16)
const BATTLE_WIDTH: u16 = 88;
/// Game area plus status and help lines
const BATTLE_HEIGHT: u16 = GAME_HEIGHT + 2;
/// Number of rows to show above the visible board (spawn area)
const VISIBLE_BUFFER: usize = 2;

/// What one board cell shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Glyph {
    Empty,
    Block(Color),
    Ghost(Color),
    Walker,
}

fn cell_color(cell: Cell) -> Option<Color> {
    match cell {
        Cell::Empty => None,
        Cell::Filled(kind) => Some(kind.color()),
        Cell::Garbage => Some(GARBAGE_COLOR),
    }
}

/// Resolve the glyph at (x, y). The active piece wins over walkers, walkers
/// over the ghost, the ghost over the stack.
fn glyph_at(game: &Game, x: i32, y: i32, show_ghost: bool) -> Glyph {
    if let Some(piece) = game.current_piece() {
        if piece.cells().contains(&(x, y)) {
            return Glyph::Block(piece.kind.color());
        }
    }

    if game.walkers.walkers().iter().any(|w| w.cell() == (x, y)) {
        return Glyph::Walker;
    }

    if show_ghost && y >= 0 {
        if let Some(piece) = game.current_piece() {
            let ghost = piece.shape.at(piece.x, piece.ghost_y(&game.board));
            if ghost.contains(&(x, y)) {
                return Glyph::Ghost(piece.kind.color());
            }
        }
    }

    match game.board.get(x, y).and_then(cell_color) {
        Some(color) => Glyph::Block(color),
        None => Glyph::Empty,
    }
}

/// Whole countdown seconds to show, 0 means "GO!"
fn countdown_digit(remaining: f64) -> u8 {
    remaining.ceil().clamp(0.0, u8::MAX as f64) as u8
}

fn first_key(keys: &[KeyCode]) -> String {
    keys.first().map(key_name).unwrap_or_else(|| "-".to_string())
}

/// One-line key reference built from the active bindings
pub fn help_line(bindings: &KeyBindings) -> String {
    format!(
        "{}/{} Move  {} Rotate  {} Drop  {} Hold  {} Ready  {} Bot  {} Quit",
        first_key(&bindings.move_left),
        first_key(&bindings.move_right),
        first_key(&bindings.rotate),
        first_key(&bindings.hard_drop),
        first_key(&bindings.hold),
        first_key(&bindings.ready),
        first_key(&bindings.toggle_bot),
        first_key(&bindings.quit),
    )
}

/// Render a solo game
pub fn render_game(frame: &mut Frame, game: &Game, settings: &Settings, bot_on: bool) {
    let area = frame.area();
    let game_area = center_rect(area, GAME_WIDTH, GAME_HEIGHT);

    render_local(frame, game_area, game, settings, bot_on, &[]);

    if game.state == GameState::GameOver {
        render_overlay(frame, area, "GAME OVER", "Starting over");
    }
}

/// Render a battle: local game, opponent mirror and room status
pub fn render_battle(
    frame: &mut Frame,
    game: &Game,
    session: &BattleSession,
    settings: &Settings,
    bot_on: bool,
    now: f64,
    help: &str,
) {
    let area = frame.area();
    let battle_area = center_rect(area, BATTLE_WIDTH, BATTLE_HEIGHT);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(GAME_HEIGHT),
            Constraint::Length(1), // Status
            Constraint::Length(1), // Help
        ])
        .split(battle_area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(GAME_WIDTH),
            Constraint::Length(22), // Opponent board
            Constraint::Length(16), // Opponent stats
        ])
        .split(rows[0]);

    let battle_lines = battle_stats(session);
    render_local(frame, columns[0], game, settings, bot_on, &battle_lines);

    let (block_char, _) = settings.visual.block_chars();
    let opponent = session.opponent();
    render_opponent_board(frame, columns[1], opponent, block_char);
    render_opponent_stats(frame, columns[2], opponent);

    let status = Paragraph::new(status_line(session, now)).alignment(Alignment::Center);
    frame.render_widget(status, rows[1]);
    let help = Paragraph::new(Line::styled(help, Style::default().fg(Color::DarkGray)))
        .alignment(Alignment::Center);
    frame.render_widget(help, rows[2]);

    match session.phase() {
        RoomState::Waiting => render_lobby(frame, area, session),
        RoomState::Countdown => {
            if let Some(remaining) = session.countdown_remaining(now) {
                render_countdown(frame, area, countdown_digit(remaining));
            }
        }
        RoomState::Playing => {}
    }
}

/// Hold | board | next + stats
fn render_local(
    frame: &mut Frame,
    area: Rect,
    game: &Game,
    settings: &Settings,
    bot_on: bool,
    extra: &[Line<'static>],
) {
    let (block_char, _) = settings.visual.block_chars();

    let main_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(12), // Hold box
            Constraint::Length(22), // Board (10*2 + 2 for borders)
            Constraint::Length(16), // Next queue + stats
        ])
        .split(area);

    render_hold(frame, main_layout[0], game.hold_piece(), block_char);
    render_board(frame, main_layout[1], game, settings, bot_on);

    let right_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(8), // Next queue
            Constraint::Min(6),    // Stats
        ])
        .split(main_layout[2]);

    render_next_queue(frame, right_layout[0], &game.preview(2), block_char);
    render_stats(frame, right_layout[1], game, extra);
}

/// Center a rect within another rect
fn center_rect(area: Rect, width: u16, height: u16) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

/// Render the hold piece box
fn render_hold(frame: &mut Frame, area: Rect, hold: Option<TetrominoType>, block_char: &str) {
    let block = Block::default()
        .title(" HOLD ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if let Some(kind) = hold {
        render_mini_piece(frame, inner, kind, block_char);
    }
}

/// Render the next piece queue
fn render_next_queue(frame: &mut Frame, area: Rect, queue: &[TetrominoType], block_char: &str) {
    let block = Block::default()
        .title(" NEXT ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if queue.is_empty() {
        return;
    }

    let piece_areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(3); queue.len()])
        .split(inner);

    for (i, &kind) in queue.iter().enumerate() {
        render_mini_piece(frame, piece_areas[i], kind, block_char);
    }
}

/// Render a small piece preview (for hold and next queue)
fn render_mini_piece(frame: &mut Frame, area: Rect, kind: TetrominoType, block_char: &str) {
    if area.height < 1 || area.width < 4 {
        return;
    }

    let color = kind.color();
    let shape = kind.shape();
    let cells = shape.cells();

    let min_x = cells.iter().map(|(x, _)| *x).min().unwrap_or(0);
    let min_y = cells.iter().map(|(_, y)| *y).min().unwrap_or(0);

    // Every spawn shape fits in 4x2
    let lines: Vec<Line> = (0..2)
        .map(|row| {
            let spans: Vec<Span> = (0..4)
                .map(|col| {
                    if cells.contains(&(min_x + col, min_y + row)) {
                        Span::styled(block_char.to_string(), Style::default().fg(color))
                    } else {
                        Span::raw(EMPTY)
                    }
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
}

/// Render the local board with piece, ghost and walkers
fn render_board(frame: &mut Frame, area: Rect, game: &Game, settings: &Settings, bot_on: bool) {
    let (block_char, ghost_char) = settings.visual.block_chars();
    let show_ghost = settings.visual.show_ghost;

    let title = if bot_on { " BOT " } else { " YOU " };
    let block = Block::default()
        .title(title)
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if bot_on { Color::Cyan } else { Color::White }));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let top = -(VISIBLE_BUFFER as i32);
    let lines: Vec<Line> = (top..BOARD_HEIGHT as i32)
        .map(|y| {
            let spans: Vec<Span> = (0..BOARD_WIDTH as i32)
                .map(|x| match glyph_at(game, x, y, show_ghost) {
                    Glyph::Empty => Span::raw(EMPTY),
                    Glyph::Block(color) => Span::styled(block_char, Style::default().fg(color)),
                    Glyph::Ghost(color) => Span::styled(ghost_char, Style::default().fg(color).dim()),
                    Glyph::Walker => Span::styled(WALKER, Style::default().fg(WALKER_COLOR).bold()),
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

fn stat_lines(label: &'static str, value: String, color: Color) -> [Line<'static>; 2] {
    [
        Line::from(Span::styled(label, Style::default().fg(Color::Gray))),
        Line::from(Span::styled(value, Style::default().fg(color).bold())),
    ]
}

/// Render stats panel
fn render_stats(frame: &mut Frame, area: Rect, game: &Game, extra: &[Line<'static>]) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines = Vec::new();
    lines.extend(stat_lines("SCORE", game.score.points.to_string(), Color::Yellow));
    lines.extend(stat_lines("LINES", game.score.lines.to_string(), Color::Green));
    lines.extend(stat_lines("STOMPS", game.score.stomps.to_string(), Color::LightRed));
    if !extra.is_empty() {
        lines.push(Line::raw(""));
        lines.extend(extra.iter().cloned());
    }

    frame.render_widget(Paragraph::new(lines), inner);
}

fn battle_stats(session: &BattleSession) -> Vec<Line<'static>> {
    let role = if session.slot().is_host() { "HOST" } else { "GUEST" };
    let mut lines = vec![Line::styled(
        format!("{} ({})", role, session.slot()),
        Style::default().fg(Color::Cyan).bold(),
    )];
    lines.extend(stat_lines("WINS", session.match_wins().to_string(), Color::Magenta));
    lines.extend(stat_lines(
        "SENT",
        session.accounting().lines_sent_total().to_string(),
        Color::Red,
    ));
    let pending = session.accounting().pending_garbage();
    if pending > 0 {
        lines.push(Line::styled(
            format!("+{} incoming", pending),
            Style::default().fg(GARBAGE_COLOR).bold(),
        ));
    }
    lines
}

fn status_line(session: &BattleSession, now: f64) -> Line<'static> {
    match session.phase() {
        RoomState::Waiting if !session.opponent().present => {
            Line::styled("Waiting for an opponent to join", Style::default().fg(Color::Yellow))
        }
        RoomState::Waiting => Line::styled("Lobby", Style::default().fg(Color::Yellow)),
        RoomState::Countdown => {
            let remaining = session.countdown_remaining(now).unwrap_or(0.0);
            Line::styled(
                format!("Starting in {:.1}s", remaining),
                Style::default().fg(Color::Green),
            )
        }
        RoomState::Playing => Line::styled("Fight!", Style::default().fg(Color::Red).bold()),
    }
}

/// Render countdown overlay (just colored text, no border)
fn render_countdown(frame: &mut Frame, area: Rect, count: u8) {
    let text = match count {
        0 => "GO!".to_string(),
        n => n.to_string(),
    };

    let color = match count {
        3 => Color::Red,
        2 => Color::Yellow,
        1 => Color::Green,
        _ => Color::Cyan,
    };

    let text_area = center_rect(area, 4, 1);

    let paragraph = Paragraph::new(Line::styled(text, Style::default().fg(color).bold()))
        .alignment(Alignment::Center);

    frame.render_widget(paragraph, text_area);
}

/// Render an overlay popup
fn render_overlay(frame: &mut Frame, area: Rect, title: &str, subtitle: &str) {
    let popup_area = center_rect(area, 24, 5);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .style(Style::default().bg(Color::Black));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let text = vec![
        Line::styled(title.to_string(), Style::default().fg(Color::Yellow).bold()),
        Line::raw(""),
        Line::styled(subtitle.to_string(), Style::default().fg(Color::Gray)),
    ];

    let paragraph = Paragraph::new(text).alignment(Alignment::Center);
    frame.render_widget(paragraph, inner);
}

fn ready_span(ready: bool) -> Span<'static> {
    if ready {
        Span::styled("READY", Style::default().fg(Color::Green).bold())
    } else {
        Span::styled("NOT READY", Style::default().fg(Color::Yellow).bold())
    }
}

/// Render the lobby popup with both players' ready flags
fn render_lobby(frame: &mut Frame, area: Rect, session: &BattleSession) {
    let popup_area = center_rect(area, 40, 9);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(" LOBBY ")
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .style(Style::default().bg(Color::Black));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let opponent = session.opponent();
    let opponent_line = if opponent.present {
        Line::from(vec![Span::raw("Opponent: "), ready_span(opponent.ready)])
    } else {
        Line::styled("Opponent: not here yet", Style::default().fg(Color::DarkGray))
    };

    let lines = vec![
        Line::raw(""),
        Line::from(vec![Span::raw("You: "), ready_span(session.is_ready())]),
        opponent_line,
        Line::raw(""),
        Line::styled(
            format!("Wins {} - {}", session.match_wins(), opponent.match_wins),
            Style::default().fg(Color::Magenta),
        ),
        Line::raw(""),
        if session.is_ready() {
            Line::styled("Waiting for opponent...", Style::default().fg(Color::DarkGray))
        } else {
            Line::styled("Press ready to start", Style::default().fg(Color::Cyan))
        },
    ];

    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), inner);
}

/// Render the mirrored opponent board
fn render_opponent_board(frame: &mut Frame, area: Rect, opponent: &OpponentView, block_char: &str) {
    let title = if opponent.present { " RIVAL " } else { " EMPTY SLOT " };
    let block = Block::default()
        .title(title)
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    frame.render_widget(Paragraph::new(mirror_lines(&opponent.board, block_char)), inner);
}

fn mirror_lines(board: &Board, block_char: &str) -> Vec<Line<'static>> {
    board
        .rows()
        .iter()
        .map(|row| {
            let spans: Vec<Span> = row
                .iter()
                .map(|&cell| match cell_color(cell) {
                    Some(color) => Span::styled(block_char.to_string(), Style::default().fg(color)),
                    None => Span::raw(EMPTY),
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

/// Render opponent stats
fn render_opponent_stats(frame: &mut Frame, area: Rect, opponent: &OpponentView) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines = Vec::new();
    lines.extend(stat_lines("SCORE", opponent.score.to_string(), Color::White));
    lines.extend(stat_lines("STOMPS", opponent.stomps.to_string(), Color::LightRed));
    lines.extend(stat_lines("WINS", opponent.match_wins.to_string(), Color::Magenta));
    lines.push(Line::raw(""));
    lines.push(Line::from(ready_span(opponent.ready)));

    frame.render_widget(Paragraph::new(lines), inner);
}
