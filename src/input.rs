//! Key bindings: arrows or WASD move the cursor, plus the place/rotate/swap keys.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Action from a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CursorUp,
    CursorDown,
    CursorLeft,
    CursorRight,
    Place,
    RotateLeft,
    RotateRight,
    Swap,
    Chat,
    Quit,
    None,
}

/// Map key event to game action. Letters are case-insensitive; Ctrl-C always quits.
pub fn key_to_action(key: KeyEvent) -> Action {
    let KeyEvent { code, modifiers, .. } = key;
    if modifiers == KeyModifiers::CONTROL && code == KeyCode::Char('c') {
        return Action::Quit;
    }
    if !(modifiers.is_empty() || modifiers == KeyModifiers::SHIFT) {
        return Action::None;
    }
    let code = match code {
        KeyCode::Char(c) => KeyCode::Char(c.to_ascii_lowercase()),
        other => other,
    };
    match code {
        KeyCode::Esc => Action::Quit,
        KeyCode::Up | KeyCode::Char('w') => Action::CursorUp,
        KeyCode::Down | KeyCode::Char('s') => Action::CursorDown,
        KeyCode::Left | KeyCode::Char('a') => Action::CursorLeft,
        KeyCode::Right | KeyCode::Char('d') => Action::CursorRight,
        KeyCode::Enter | KeyCode::Char('x') => Action::Place,
        KeyCode::Char('q' | 'e' | ']') => Action::RotateLeft,
        KeyCode::Char('z' | 'c' | '[') => Action::RotateRight,
        KeyCode::Char(' ' | 'r') => Action::Swap,
        KeyCode::Char('t') => Action::Chat,
        _ => Action::None,
    }
}
