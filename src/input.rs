use crate::app::InputMode;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    NextForm,
    PrevForm,
    Down,
    Up,
    Top,
    Bottom,
    Activate,
    ToggleSwitch,
    ToggleCollapse,
    ToggleHelp,
    SubmitInput,
    CancelInput,
    Backspace,
    ClearInput,
    InputChar(char),
}

pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    match mode {
        InputMode::Normal => map_normal_mode_key(key),
        InputMode::Editing => map_editing_mode_key(key),
    }
}

fn map_normal_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('b') | KeyCode::Esc => Some(Action::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Quit),
        KeyCode::Char('j') if key.modifiers.is_empty() => Some(Action::Down),
        KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') if key.modifiers.is_empty() => Some(Action::Up),
        KeyCode::Up => Some(Action::Up),
        KeyCode::Char('g') | KeyCode::Home => Some(Action::Top),
        KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
        KeyCode::BackTab => Some(Action::PrevForm),
        KeyCode::Tab if key.modifiers.contains(KeyModifiers::SHIFT) => Some(Action::PrevForm),
        KeyCode::Tab | KeyCode::Right => Some(Action::NextForm),
        KeyCode::Left => Some(Action::PrevForm),
        KeyCode::Enter => Some(Action::Activate),
        KeyCode::Char(' ') => Some(Action::ToggleSwitch),
        KeyCode::Char('c') if key.modifiers.is_empty() => Some(Action::ToggleCollapse),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        _ => None,
    }
}

fn map_editing_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::CancelInput),
        KeyCode::Enter => Some(Action::SubmitInput),
        KeyCode::Char('m') | KeyCode::Char('j')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(Action::SubmitInput)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::ClearInput)
        }
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}
