use crate::presets::Preset;
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, BufRead, Write};

/// キー入力に対応する操作
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuAction {
    /// プリセットを選択
    Preset(Preset),
    /// 録音 → 文字起こし → 言語モデルで設定生成
    Voice,
    /// 説明文を入力 → 言語モデルで設定生成
    Describe,
    /// 再生中チェーンのパラメータ画面
    Tweak,
    /// オーディオサーバーを停止
    Stop,
    /// 終了
    Exit,
    /// 割り当てのないキー
    Unknown(char),
}

impl MenuAction {
    /// キー文字から操作を決める
    pub fn from_key(key: char) -> Self {
        if let Some(preset) = Preset::from_key(key) {
            return MenuAction::Preset(preset);
        }
        match key.to_ascii_lowercase() {
            'g' => MenuAction::Voice,
            't' => MenuAction::Describe,
            'p' => MenuAction::Tweak,
            's' => MenuAction::Stop,
            'x' | 'q' => MenuAction::Exit,
            _ => MenuAction::Unknown(key),
        }
    }

    /// crossterm のキーイベントから操作を決める（文字キー以外は None）
    pub fn from_event(key: KeyEvent) -> Option<Self> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        match key.code {
            // raw mode では Ctrl+C がシグナルにならないので、ここで終了扱いにする
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(MenuAction::Exit)
            }
            KeyCode::Char(c) => Some(MenuAction::from_key(c)),
            KeyCode::Esc => Some(MenuAction::Exit),
            _ => None,
        }
    }
}

/// メニュー表示用の行
pub fn menu_lines() -> Vec<String> {
    let mut lines: Vec<String> = Preset::ALL
        .iter()
        .map(|preset| format!("{} - {}", preset.key(), preset.label()))
        .collect();
    lines.push("g - GPT (voice)".to_string());
    lines.push("t - GPT (typed)".to_string());
    lines.push("p - Parameters".to_string());
    lines.push("s - Stop".to_string());
    lines.push("x - Exit".to_string());
    lines
}

/// メニューを表示
pub fn print_menu() {
    println!();
    println!("=== fx-pedal ===");
    for line in menu_lines() {
        println!("  {}", line);
    }
    println!();
}

/// raw mode で1キーだけ読む
///
/// 読み終わったら（エラー時も）端末の状態を元に戻す。
pub fn read_key() -> Result<KeyEvent> {
    enable_raw_mode().context("raw mode への切り替えに失敗")?;
    let result = wait_for_key();
    let restore = disable_raw_mode().context("端末設定の復元に失敗");
    let key = result?;
    restore?;
    Ok(key)
}

fn wait_for_key() -> Result<KeyEvent> {
    loop {
        if let Event::Key(key) = event::read().context("キー入力の読み込みに失敗")? {
            if key.kind == KeyEventKind::Press {
                return Ok(key);
            }
        }
    }
}

/// 1行入力（通常モード）
pub fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush().context("標準出力のフラッシュに失敗")?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("標準入力の読み込みに失敗")?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_key() {
        assert_eq!(
            MenuAction::from_key('1'),
            MenuAction::Preset(Preset::StereoReverb)
        );
        assert_eq!(MenuAction::from_key('2'), MenuAction::Preset(Preset::Chorus));
        assert_eq!(MenuAction::from_key('g'), MenuAction::Voice);
        assert_eq!(MenuAction::from_key('G'), MenuAction::Voice);
        assert_eq!(MenuAction::from_key('t'), MenuAction::Describe);
        assert_eq!(MenuAction::from_key('p'), MenuAction::Tweak);
        assert_eq!(MenuAction::from_key('s'), MenuAction::Stop);
        assert_eq!(MenuAction::from_key('x'), MenuAction::Exit);
        assert_eq!(MenuAction::from_key('z'), MenuAction::Unknown('z'));
    }

    #[test]
    fn test_from_event() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(MenuAction::from_event(ctrl_c), Some(MenuAction::Exit));

        let plain_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE);
        assert_eq!(MenuAction::from_event(plain_c), Some(MenuAction::Unknown('c')));

        let enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(MenuAction::from_event(enter), None);
    }

    #[test]
    fn test_menu_lines_cover_every_key() {
        let lines = menu_lines();
        assert_eq!(lines[0], "1 - Stereoverb");
        assert_eq!(lines[1], "2 - Chorus");
        for line in &lines {
            let key = line.chars().next().unwrap();
            assert!(
                !matches!(MenuAction::from_key(key), MenuAction::Unknown(_)),
                "{} に操作が割り当てられていない",
                line
            );
        }
    }
}
