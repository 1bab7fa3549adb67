//! エフェクトノード
//!
//! 全ノードはステレオフレーム単位で1サンプルずつ処理する。
//! パラメータは [`EffectKind::param_specs`] の定義に従って範囲内に丸められる。

pub mod chorus;
pub mod delay;
pub mod distortion;
pub mod filter;
pub mod reverb;

use crate::types::{EffectKind, EffectSpec};

pub use chorus::Chorus;
pub use delay::Delay;
pub use distortion::Distortion;
pub use filter::Lowpass;
pub use reverb::Reverb;

/// ステレオ1フレーム
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub right: f32,
}

impl Frame {
    pub const SILENCE: Frame = Frame {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// モノラル → ステレオ
    pub fn mono(sample: f32) -> Self {
        Self {
            left: sample,
            right: sample,
        }
    }

    /// ドライ/ウェットのミックス
    pub fn mix(dry: Frame, wet: Frame, mix: f32) -> Frame {
        Frame {
            left: dry.left * (1.0 - mix) + wet.left * mix,
            right: dry.right * (1.0 - mix) + wet.right * mix,
        }
    }

    /// ステレオ → モノラル
    pub fn to_mono(self) -> f32 {
        (self.left + self.right) * 0.5
    }
}

/// エフェクトノードの共通トレイト
pub trait EffectNode: Send {
    /// ノードの種類
    fn kind(&self) -> EffectKind;

    /// 1フレームを処理
    fn process(&mut self, input: Frame) -> Frame;

    /// 現在のパラメータ値
    fn param(&self, name: &str) -> Option<f32>;

    /// パラメータを設定（範囲内に丸める）
    ///
    /// 未知のパラメータ名なら `false` を返す。
    fn set_param(&mut self, name: &str, value: f32) -> bool;

    /// 内部状態（ディレイバッファ等）をクリア
    fn reset(&mut self);
}

/// 設定からノードを生成
pub fn create_node(spec: &EffectSpec, sample_rate: u32) -> Box<dyn EffectNode> {
    let sample_rate = sample_rate as f32;
    let mut node: Box<dyn EffectNode> = match spec.kind {
        EffectKind::Reverb => Box::new(Reverb::new(sample_rate)),
        EffectKind::Chorus => Box::new(Chorus::new(sample_rate)),
        EffectKind::Delay => Box::new(Delay::new(sample_rate)),
        EffectKind::Distortion => Box::new(Distortion::new(sample_rate)),
        EffectKind::Lowpass => Box::new(Lowpass::new(sample_rate)),
    };
    for (name, &value) in &spec.params {
        node.set_param(name, value);
    }
    node
}

/// 分数遅延に対応したリングバッファ
#[derive(Clone, Debug)]
pub(crate) struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(max_delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay_samples.max(1) + 2],
            write_pos: 0,
        }
    }

    /// 最大遅延（サンプル）
    pub fn max_delay(&self) -> f32 {
        (self.buffer.len() - 2) as f32
    }

    /// 書き込み
    pub fn push(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// `delay` サンプル前の値を線形補間で読み出す（最後に書き込んだ値が delay=1）
    pub fn read(&self, delay: f32) -> f32 {
        let len = self.buffer.len();
        let delay = delay.clamp(1.0, self.max_delay());
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;

        let idx_a = (self.write_pos + len - whole) % len;
        let idx_b = (self.write_pos + len - whole - 1) % len;
        let a = self.buffer[idx_a];
        let b = self.buffer[idx_b];
        a + (b - a) * frac
    }

    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }
}

/// 共通のパラメータ設定処理
pub(crate) fn clamp_param(
    kind: EffectKind,
    name: &str,
    value: f32,
) -> Option<(&'static str, f32)> {
    kind.param_spec(name).map(|spec| (spec.name, spec.clamp(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_line_integer_delay() {
        let mut line = DelayLine::new(8);
        for i in 1..=5 {
            line.push(i as f32);
        }
        assert_eq!(line.read(1.0), 5.0);
        assert_eq!(line.read(3.0), 3.0);
    }

    #[test]
    fn test_delay_line_fractional_delay() {
        let mut line = DelayLine::new(8);
        line.push(0.0);
        line.push(1.0);
        // delay=1 → 1.0, delay=2 → 0.0 の中間
        assert!((line.read(1.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_frame_mix() {
        let dry = Frame::new(1.0, 1.0);
        let wet = Frame::new(0.0, -1.0);
        assert_eq!(Frame::mix(dry, wet, 0.0), dry);
        assert_eq!(Frame::mix(dry, wet, 1.0), wet);
        assert_eq!(Frame::mix(dry, wet, 0.5), Frame::new(0.5, 0.0));
    }

    #[test]
    fn test_create_node_applies_params() {
        let spec = EffectSpec::with_defaults(EffectKind::Delay).with("time", 0.5);
        let node = create_node(&spec, 48000);
        assert_eq!(node.kind(), EffectKind::Delay);
        assert_eq!(node.param("time"), Some(0.5));
    }
}
