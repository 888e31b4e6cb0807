//! Keyboard input with DAS (Delayed Auto Shift) and ARR (Auto Repeat Rate)
//!
//! Uses a polling-based approach that doesn't rely on key release events,
//! which are unreliable on Linux terminals.

use crate::game::Action;
use crate::settings::Settings;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, ModifierKeyCode};
use std::time::{Duration, Instant};

/// Time after which we consider a key "released" if no repeat received
const KEY_TIMEOUT: Duration = Duration::from_millis(100);

/// What a key press asks the app to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Game(Action),
    Ready,
    ToggleBot,
    Quit,
}

#[derive(Debug, Clone)]
struct KeyPressState {
    first_press: Instant,
    last_seen: Instant,
    das_triggered: bool,
    last_repeat: Option<Instant>,
}

impl KeyPressState {
    fn new(now: Instant) -> Self {
        Self {
            first_press: now,
            last_seen: now,
            das_triggered: false,
            last_repeat: None,
        }
    }
}

/// Key bindings resolved to key codes - supports multiple keys per command
#[derive(Debug, Clone)]
pub struct KeyBindings {
    pub move_left: Vec<KeyCode>,
    pub move_right: Vec<KeyCode>,
    pub soft_drop: Vec<KeyCode>,
    pub hard_drop: Vec<KeyCode>,
    pub rotate: Vec<KeyCode>,
    pub hold: Vec<KeyCode>,
    pub ready: Vec<KeyCode>,
    pub toggle_bot: Vec<KeyCode>,
    pub quit: Vec<KeyCode>,
}

impl KeyBindings {
    /// Parse a key string into KeyCode, None if it names no key
    fn parse_key(s: &str) -> Option<KeyCode> {
        let lower = s.to_lowercase();
        let code = match lower.as_str() {
            "left" => KeyCode::Left,
            "right" => KeyCode::Right,
            "up" => KeyCode::Up,
            "down" => KeyCode::Down,
            "space" => KeyCode::Char(' '),
            "enter" => KeyCode::Enter,
            "tab" => KeyCode::Tab,
            "esc" | "escape" => KeyCode::Esc,
            "shift" => KeyCode::Modifier(ModifierKeyCode::LeftShift),
            "ctrl" | "control" => KeyCode::Modifier(ModifierKeyCode::LeftControl),
            "alt" => KeyCode::Modifier(ModifierKeyCode::LeftAlt),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => KeyCode::Char(c),
                    _ => return None,
                }
            }
        };
        Some(code)
    }

    /// Parse a list of key strings into KeyCodes, skipping unknown names
    fn parse_keys(keys: &[String]) -> Vec<KeyCode> {
        keys.iter().filter_map(|s| Self::parse_key(s)).collect()
    }

    /// Create keybindings from settings
    pub fn from_settings(settings: &Settings) -> Self {
        let keys = &settings.keys;
        Self {
            move_left: Self::parse_keys(&keys.move_left),
            move_right: Self::parse_keys(&keys.move_right),
            soft_drop: Self::parse_keys(&keys.soft_drop),
            hard_drop: Self::parse_keys(&keys.hard_drop),
            rotate: Self::parse_keys(&keys.rotate),
            hold: Self::parse_keys(&keys.hold),
            ready: Self::parse_keys(&keys.ready),
            toggle_bot: Self::parse_keys(&keys.toggle_bot),
            quit: Self::parse_keys(&keys.quit),
        }
    }
}

/// Input handler with DAS/ARR support
pub struct InputHandler {
    left_state: Option<KeyPressState>,
    right_state: Option<KeyPressState>,
    down_state: Option<KeyPressState>,
    bindings: KeyBindings,
    das: Duration,
    arr: Duration,
    soft_drop_repeat: Duration,
}

impl InputHandler {
    /// Create input handler from settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            left_state: None,
            right_state: None,
            down_state: None,
            bindings: KeyBindings::from_settings(settings),
            das: Duration::from_millis(settings.gameplay.das_ms),
            arr: Duration::from_millis(settings.gameplay.arr_ms),
            soft_drop_repeat: Duration::from_millis(settings.gameplay.soft_drop_interval_ms),
        }
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    /// Handle a key press event - returns immediate commands
    pub fn key_down(&mut self, key: KeyEvent) -> Vec<Command> {
        self.key_down_at(key, Instant::now())
    }

    fn key_down_at(&mut self, key: KeyEvent, now: Instant) -> Vec<Command> {
        // Handle Ctrl+C for quit
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return vec![Command::Quit];
        }

        let code = normalize_key(key.code);
        let bindings = &self.bindings;

        let command = if bindings.move_left.contains(&code) {
            self.right_state = None;
            if let Some(state) = &mut self.left_state {
                state.last_seen = now;
                return Vec::new();
            }
            self.left_state = Some(KeyPressState::new(now));
            Command::Game(Action::MoveLeft)
        } else if bindings.move_right.contains(&code) {
            self.left_state = None;
            if let Some(state) = &mut self.right_state {
                state.last_seen = now;
                return Vec::new();
            }
            self.right_state = Some(KeyPressState::new(now));
            Command::Game(Action::MoveRight)
        } else if bindings.soft_drop.contains(&code) {
            if let Some(state) = &mut self.down_state {
                state.last_seen = now;
                return Vec::new();
            }
            self.down_state = Some(KeyPressState::new(now));
            Command::Game(Action::SoftDrop)
        } else if bindings.hard_drop.contains(&code) {
            Command::Game(Action::HardDrop)
        } else if bindings.rotate.contains(&code) {
            Command::Game(Action::Rotate)
        } else if bindings.hold.contains(&code) {
            Command::Game(Action::Hold)
        } else if bindings.ready.contains(&code) {
            Command::Ready
        } else if bindings.toggle_bot.contains(&code) {
            Command::ToggleBot
        } else if bindings.quit.contains(&code) {
            Command::Quit
        } else {
            return Vec::new();
        };

        vec![command]
    }

    /// Handle a key release event (may not be called on Linux)
    pub fn key_up(&mut self, key: KeyEvent) {
        let code = normalize_key(key.code);

        if self.bindings.move_left.contains(&code) {
            self.left_state = None;
        } else if self.bindings.move_right.contains(&code) {
            self.right_state = None;
        } else if self.bindings.soft_drop.contains(&code) {
            self.down_state = None;
        }
    }

    /// Update held keys and return repeat actions (call every frame)
    pub fn update(&mut self) -> Vec<Action> {
        self.update_at(Instant::now())
    }

    fn update_at(&mut self, now: Instant) -> Vec<Action> {
        for state in [&mut self.left_state, &mut self.right_state, &mut self.down_state] {
            if state
                .as_ref()
                .is_some_and(|s| now.duration_since(s.last_seen) > KEY_TIMEOUT)
            {
                *state = None;
            }
        }

        let mut actions = Vec::new();
        let (das, arr) = (self.das, self.arr);

        if let Some(state) = &mut self.left_state {
            if repeat_due(state, now, das, arr) {
                actions.push(Action::MoveLeft);
            }
        }
        if let Some(state) = &mut self.right_state {
            if repeat_due(state, now, das, arr) {
                actions.push(Action::MoveRight);
            }
        }
        // Soft drop repeats right away at its own rate
        if let Some(state) = &mut self.down_state {
            if repeat_due(state, now, Duration::ZERO, self.soft_drop_repeat) {
                actions.push(Action::SoftDrop);
            }
        }

        actions
    }

    /// Clear all held keys
    pub fn clear(&mut self) {
        self.left_state = None;
        self.right_state = None;
        self.down_state = None;
    }
}

/// DAS/ARR logic for a held key, returns true if the action should repeat
fn repeat_due(state: &mut KeyPressState, now: Instant, das: Duration, arr: Duration) -> bool {
    if now.duration_since(state.first_press) < das {
        return false;
    }

    match state.last_repeat {
        None if !state.das_triggered => {
            state.das_triggered = true;
            state.last_repeat = Some(now);
            das > Duration::ZERO
        }
        Some(last) if now.duration_since(last) >= arr => {
            state.last_repeat = Some(now);
            true
        }
        _ => false,
    }
}

/// Normalize key codes for consistent handling
fn normalize_key(code: KeyCode) -> KeyCode {
    match code {
        KeyCode::Char(c) => KeyCode::Char(c.to_ascii_lowercase()),
        other => other,
    }
}

/// Display name of a key for the help line
pub fn key_name(code: &KeyCode) -> String {
    match code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_ascii_uppercase().to_string(),
        KeyCode::Modifier(ModifierKeyCode::LeftShift) => "Shift".to_string(),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn handler() -> InputHandler {
        InputHandler::from_settings(&Settings::default())
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(KeyBindings::parse_key("Space"), Some(KeyCode::Char(' ')));
        assert_eq!(KeyBindings::parse_key("ESC"), Some(KeyCode::Esc));
        assert_eq!(KeyBindings::parse_key("x"), Some(KeyCode::Char('x')));
        assert_eq!(KeyBindings::parse_key("nonsense"), None);
    }

    #[test]
    fn test_default_bindings() {
        let mut input = handler();
        assert_eq!(
            input.key_down(press(KeyCode::Char(' '))),
            vec![Command::Game(Action::HardDrop)]
        );
        assert_eq!(
            input.key_down(press(KeyCode::Up)),
            vec![Command::Game(Action::Rotate)]
        );
        assert_eq!(input.key_down(press(KeyCode::Enter)), vec![Command::Ready]);
        assert_eq!(
            input.key_down(press(KeyCode::Char('B'))),
            vec![Command::ToggleBot]
        );
        assert!(input.key_down(press(KeyCode::F(5))).is_empty());
    }

    #[test]
    fn test_ctrl_c_quits() {
        let mut input = handler();
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(input.key_down(key), vec![Command::Quit]);
    }

    #[test]
    fn test_held_move_fires_once_until_das() {
        let mut input = handler();
        let start = Instant::now();
        assert_eq!(
            input.key_down_at(press(KeyCode::Left), start),
            vec![Command::Game(Action::MoveLeft)]
        );
        // Terminal key repeat keeps the key alive without new moves
        let t = start + Duration::from_millis(80);
        assert!(input.key_down_at(press(KeyCode::Left), t).is_empty());
        assert!(input.update_at(t).is_empty());

        let t = start + Duration::from_millis(160);
        input.key_down_at(press(KeyCode::Left), t);
        let t = start + Duration::from_millis(175);
        assert_eq!(input.update_at(t), vec![Action::MoveLeft]);
    }

    #[test]
    fn test_opposite_direction_cancels() {
        let mut input = handler();
        let start = Instant::now();
        input.key_down_at(press(KeyCode::Left), start);
        assert_eq!(
            input.key_down_at(press(KeyCode::Right), start),
            vec![Command::Game(Action::MoveRight)]
        );
        assert!(input.left_state.is_none());
    }

    #[test]
    fn test_released_key_stops_repeating() {
        let mut input = handler();
        let start = Instant::now();
        input.key_down_at(press(KeyCode::Down), start);
        assert!(input.update_at(start + Duration::from_millis(500)).is_empty());
        assert!(input.down_state.is_none());
    }
}
