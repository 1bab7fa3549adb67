use super::{clamp_param, DelayLine, EffectNode, Frame};
use crate::types::EffectKind;
use std::f32::consts::TAU;

/// 中心遅延 (ms)
const BASE_DELAY_MS: f32 = 15.0;
/// depth=1 あたりの揺れ幅 (ms)
const DEPTH_MS_PER_UNIT: f32 = 1.5;

/// ステレオコーラス
///
/// LFOで遅延時間を揺らしたディレイライン。左右でLFOの位相を90度ずらす。
pub struct Chorus {
    sample_rate: f32,
    line_l: DelayLine,
    line_r: DelayLine,
    phase: f32,
    depth: f32,
    rate: f32,
    feedback: f32,
    mix: f32,
}

impl Chorus {
    pub fn new(sample_rate: f32) -> Self {
        let max_spec = EffectKind::Chorus
            .param_spec("depth")
            .map(|spec| spec.max)
            .unwrap_or(5.0);
        let max_delay_ms = BASE_DELAY_MS + max_spec * DEPTH_MS_PER_UNIT;
        let max_samples = (max_delay_ms / 1000.0 * sample_rate).ceil() as usize + 1;

        let mut chorus = Self {
            sample_rate,
            line_l: DelayLine::new(max_samples),
            line_r: DelayLine::new(max_samples),
            phase: 0.0,
            depth: 0.0,
            rate: 0.0,
            feedback: 0.0,
            mix: 0.0,
        };
        for spec in EffectKind::Chorus.param_specs() {
            chorus.set_param(spec.name, spec.default);
        }
        chorus
    }

    fn delay_samples(&self, phase: f32) -> f32 {
        let delay_ms = BASE_DELAY_MS + self.depth * DEPTH_MS_PER_UNIT * phase.sin();
        delay_ms / 1000.0 * self.sample_rate
    }
}

impl EffectNode for Chorus {
    fn kind(&self) -> EffectKind {
        EffectKind::Chorus
    }

    fn process(&mut self, input: Frame) -> Frame {
        let wet_l = self.line_l.read(self.delay_samples(self.phase));
        let wet_r = self.line_r.read(self.delay_samples(self.phase + TAU / 4.0));

        self.line_l.push(input.left + wet_l * self.feedback);
        self.line_r.push(input.right + wet_r * self.feedback);

        self.phase += TAU * self.rate / self.sample_rate;
        if self.phase >= TAU {
            self.phase -= TAU;
        }

        Frame::mix(input, Frame::new(wet_l, wet_r), self.mix)
    }

    fn param(&self, name: &str) -> Option<f32> {
        match EffectKind::Chorus.param_spec(name)?.name {
            "depth" => Some(self.depth),
            "rate" => Some(self.rate),
            "feedback" => Some(self.feedback),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: f32) -> bool {
        match clamp_param(EffectKind::Chorus, name, value) {
            Some(("depth", v)) => self.depth = v,
            Some(("rate", v)) => self.rate = v,
            Some(("feedback", v)) => self.feedback = v,
            Some(("mix", v)) => self.mix = v,
            _ => return false,
        }
        true
    }

    fn reset(&mut self) {
        self.line_l.clear();
        self.line_r.clear();
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wet_signal_is_delayed() {
        let mut chorus = Chorus::new(48000.0);
        chorus.set_param("mix", 1.0);
        chorus.set_param("depth", 0.0);
        chorus.set_param("feedback", 0.0);

        let first = chorus.process(Frame::mono(1.0));
        assert_eq!(first, Frame::SILENCE);

        // 15ms @ 48kHz = 720 サンプル後にインパルスが出る
        let mut found = None;
        for i in 1..2000 {
            let out = chorus.process(Frame::SILENCE);
            if out.left > 0.5 {
                found = Some(i);
                break;
            }
        }
        assert_eq!(found, Some(720));
    }

    #[test]
    fn test_depth_clamped() {
        let mut chorus = Chorus::new(44100.0);
        chorus.set_param("depth", 100.0);
        assert_eq!(chorus.param("depth"), Some(5.0));
        // 最大depthでもバッファ範囲内で読み出せる
        for _ in 0..44100 {
            let out = chorus.process(Frame::mono(0.5));
            assert!(out.left.is_finite() && out.right.is_finite());
        }
    }
}
