use crate::audio_server::{lock_or_recover, SharedChain};
use crate::fx_chain::NodeSnapshot;
use crate::types::{EffectKind, ParamSpec};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;

/// 1回のキー操作で動かす量（範囲に対する割合）
const STEPS_PER_RANGE: f32 = 50.0;

/// パラメータ画面の1行
#[derive(Clone, Debug, PartialEq)]
pub struct ParamRow {
    pub node: usize,
    pub kind: EffectKind,
    pub spec: ParamSpec,
    pub value: f32,
}

/// スナップショットを1パラメータ1行に展開
pub fn param_rows(snapshot: &[NodeSnapshot]) -> Vec<ParamRow> {
    snapshot
        .iter()
        .enumerate()
        .flat_map(|(node, entry)| {
            entry.params.iter().map(move |(spec, value)| ParamRow {
                node,
                kind: entry.kind,
                spec: *spec,
                value: *value,
            })
        })
        .collect()
}

/// 値を1ステップ動かす（範囲内に丸める）
pub fn step_value(spec: &ParamSpec, value: f32, steps: i32) -> f32 {
    let step = (spec.max - spec.min) / STEPS_PER_RANGE;
    spec.clamp(value + step * steps as f32)
}

/// 値を 0.0～1.0 の比率に変換
fn value_ratio(spec: &ParamSpec, value: f32) -> f64 {
    if spec.max <= spec.min {
        return 0.0;
    }
    (((value - spec.min) / (spec.max - spec.min)) as f64).clamp(0.0, 1.0)
}

/// 再生中チェーンのパラメータ調整画面
pub struct ParamScreen {
    chain: SharedChain,
    selected: usize,
}

impl ParamScreen {
    pub fn new(chain: SharedChain) -> Self {
        Self { chain, selected: 0 }
    }

    fn snapshot(&self) -> Vec<NodeSnapshot> {
        lock_or_recover(&self.chain).snapshot()
    }

    /// 画面を表示（q / Esc でメニューに戻る）
    pub fn run(&mut self) -> Result<()> {
        // ターミナルを初期化
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.event_loop(&mut terminal);

        // ターミナルをリストア
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        loop {
            let rows = param_rows(&self.snapshot());
            if !rows.is_empty() && self.selected >= rows.len() {
                self.selected = rows.len() - 1;
            }

            terminal.draw(|f| self.draw(f, &rows))?;

            if !event::poll(Duration::from_millis(200))? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
                KeyCode::Char('z') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    // Ctrl+Z でプロセスを一時停止
                    disable_raw_mode()?;
                    execute!(io::stdout(), LeaveAlternateScreen)?;

                    #[cfg(unix)]
                    {
                        use nix::sys::signal::{self, Signal};
                        let _ = signal::raise(Signal::SIGTSTP);
                    }

                    // 再開後にターミナルを再初期化
                    enable_raw_mode()?;
                    execute!(io::stdout(), EnterAlternateScreen)?;
                    terminal.clear()?;
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    self.selected = self.selected.saturating_sub(1);
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    if self.selected + 1 < rows.len() {
                        self.selected += 1;
                    }
                }
                KeyCode::Left | KeyCode::Char('h') => self.adjust(&rows, -1),
                KeyCode::Right | KeyCode::Char('l') => self.adjust(&rows, 1),
                KeyCode::PageDown => self.adjust(&rows, -10),
                KeyCode::PageUp => self.adjust(&rows, 10),
                KeyCode::Char('r') => {
                    if let Some(row) = rows.get(self.selected) {
                        lock_or_recover(&self.chain).reset_node(row.node);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn adjust(&self, rows: &[ParamRow], steps: i32) {
        let Some(row) = rows.get(self.selected) else {
            return;
        };
        let value = step_value(&row.spec, row.value, steps);
        if let Err(e) = lock_or_recover(&self.chain).set_param(row.node, row.spec.name, value) {
            log::warn!("パラメータ変更に失敗: {}", e);
        }
    }

    /// 画面を描画
    fn draw(&self, f: &mut Frame, rows: &[ParamRow]) {
        let block = Block::default()
            .title("fx-pedal - parameters (↑↓ 選択 / ←→ 調整 / r 既定値 / q 戻る)")
            .borders(Borders::ALL);

        if rows.is_empty() {
            let paragraph = Paragraph::new("エフェクトがありません（ドライ出力）").block(block);
            f.render_widget(paragraph, f.area());
            return;
        }

        let inner_area = block.inner(f.area());
        f.render_widget(block, f.area());

        let constraints: Vec<Constraint> = rows.iter().map(|_| Constraint::Length(1)).collect();
        let lines = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(inner_area);

        for (i, row) in rows.iter().enumerate() {
            if i < lines.len() {
                self.draw_row(f, lines[i], row, i == self.selected);
            }
        }
    }

    /// 1パラメータ分の行を描画
    fn draw_row(&self, f: &mut Frame, area: Rect, row: &ParamRow, selected: bool) {
        let sections = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(24), Constraint::Min(0)])
            .split(area);

        let label_style = if selected {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        let label = Line::from(vec![
            Span::styled(if selected { "> " } else { "  " }, label_style),
            Span::styled(format!("{}.{}", row.kind, row.spec.name), label_style),
        ]);
        f.render_widget(Paragraph::new(label), sections[0]);

        let gauge_color = if selected { Color::Cyan } else { Color::Blue };
        let gauge = Gauge::default()
            .label(format!(
                "{:.3} ({} - {})",
                row.value, row.spec.min, row.spec.max
            ))
            .gauge_style(Style::default().fg(gauge_color))
            .ratio(value_ratio(&row.spec, row.value));
        f.render_widget(gauge, sections[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx_chain::build_fx_chain;
    use crate::presets::Preset;

    #[test]
    fn test_param_rows_flatten() {
        let chain = build_fx_chain(&Preset::Chorus.config(), 44100).unwrap();
        let rows = param_rows(&chain.snapshot());
        let expected =
            EffectKind::Chorus.param_specs().len() + EffectKind::Reverb.param_specs().len();
        assert_eq!(rows.len(), expected);
        assert_eq!(rows[0].node, 0);
        assert_eq!(rows[0].kind, EffectKind::Chorus);
        assert_eq!(rows.last().unwrap().node, 1);
    }

    #[test]
    fn test_step_value_clamps() {
        let spec = EffectKind::Reverb.param_spec("mix").copied().unwrap();
        assert!((step_value(&spec, 0.5, 1) - 0.52).abs() < 1e-6);
        assert_eq!(step_value(&spec, 0.99, 10), 1.0);
        assert_eq!(step_value(&spec, 0.01, -10), 0.0);
    }

    #[test]
    fn test_value_ratio() {
        let spec = EffectKind::Lowpass.param_spec("cutoff").copied().unwrap();
        assert_eq!(value_ratio(&spec, 20.0), 0.0);
        assert_eq!(value_ratio(&spec, 20000.0), 1.0);
    }
}
