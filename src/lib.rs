//! fx-pedal - キー操作で切り替えるエフェクトペダル
//!
//! 端末から1キーを読み取り、固定プリセットまたは言語モデルが自然言語の
//! 説明文から生成したエフェクトチェーン設定を選んで、マイク入力を
//! エフェクトチェーンに通して出力デバイスへリアルタイムに流します。
//!
//! # 主な機能
//!
//! - **プリセット**: ステレオリバーブ、コーラスなどの固定設定
//! - **GPTエフェクト**: 説明文（入力または音声）から設定辞書を生成
//! - **エフェクトチェーン**: リバーブ・コーラス・ディレイ・ディストーション・ローパス
//! - **パラメータ画面**: 再生中のチェーンをその場で調整
//! - **デバイス選択**: デバイス名の部分一致で入出力デバイスを選ぶ
//!
//! # アーキテクチャ
//!
//! ```text
//! [Key] → [Menu] → [Controller] ─┬─ [Preset] ──────────────────────┐
//!                                └─ [Recorder] → [Whisper] → [LLM] ─┤
//!                                                                   ↓
//!                                                              [FxConfig]
//!                                                                   ↓
//! [Mic] → [AudioServer input] → [SampleFifo] → [FxChain] → [AudioServer output]
//! ```
//!
//! # 使用例
//!
//! ```
//! use fx_pedal::fx_chain::build_fx_chain;
//! use fx_pedal::presets::Preset;
//!
//! let mut chain = build_fx_chain(&Preset::StereoReverb.config(), 44100).unwrap();
//! let frame = chain.process(0.25);
//! assert!(frame.left.is_finite() && frame.right.is_finite());
//! ```

pub mod audio_server;
pub mod buffer;
pub mod config;
pub mod controller;
pub mod device;
pub mod dsp;
pub mod fx_chain;
pub mod llm;
pub mod menu;
pub mod presets;
pub mod recorder;
pub mod tui;
pub mod types;
pub mod whisper_api;
