use super::{clamp_param, EffectNode, Frame};
use crate::types::EffectKind;
use std::f32::consts::TAU;

/// 1次ローパスフィルタ
pub struct Lowpass {
    sample_rate: f32,
    coeff: f32,
    state_l: f32,
    state_r: f32,
    cutoff: f32,
    mix: f32,
}

impl Lowpass {
    pub fn new(sample_rate: f32) -> Self {
        let mut lowpass = Self {
            sample_rate,
            coeff: 0.0,
            state_l: 0.0,
            state_r: 0.0,
            cutoff: 0.0,
            mix: 0.0,
        };
        for spec in EffectKind::Lowpass.param_specs() {
            lowpass.set_param(spec.name, spec.default);
        }
        lowpass
    }

    fn update_coeff(&mut self) {
        // ナイキスト周波数を超えないようにする
        let cutoff = self.cutoff.min(self.sample_rate * 0.49);
        self.coeff = (-TAU * cutoff / self.sample_rate).exp();
    }
}

impl EffectNode for Lowpass {
    fn kind(&self) -> EffectKind {
        EffectKind::Lowpass
    }

    fn process(&mut self, input: Frame) -> Frame {
        self.state_l = input.left * (1.0 - self.coeff) + self.state_l * self.coeff;
        self.state_r = input.right * (1.0 - self.coeff) + self.state_r * self.coeff;
        Frame::mix(input, Frame::new(self.state_l, self.state_r), self.mix)
    }

    fn param(&self, name: &str) -> Option<f32> {
        match EffectKind::Lowpass.param_spec(name)?.name {
            "cutoff" => Some(self.cutoff),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: f32) -> bool {
        match clamp_param(EffectKind::Lowpass, name, value) {
            Some(("cutoff", v)) => {
                self.cutoff = v;
                self.update_coeff();
            }
            Some(("mix", v)) => self.mix = v,
            _ => return false,
        }
        true
    }

    fn reset(&mut self) {
        self.state_l = 0.0;
        self.state_r = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms_after(lowpass: &mut Lowpass, freq: f32, sample_rate: f32) -> f32 {
        let n = sample_rate as usize;
        let mut sum = 0.0;
        for i in 0..n {
            let x = (TAU * freq * i as f32 / sample_rate).sin();
            let y = lowpass.process(Frame::mono(x)).left;
            sum += y * y;
        }
        (sum / n as f32).sqrt()
    }

    #[test]
    fn test_attenuates_high_frequencies() {
        let mut low = Lowpass::new(48000.0);
        low.set_param("cutoff", 500.0);
        let low_rms = rms_after(&mut low, 100.0, 48000.0);

        let mut high = Lowpass::new(48000.0);
        high.set_param("cutoff", 500.0);
        let high_rms = rms_after(&mut high, 10000.0, 48000.0);

        assert!(low_rms > high_rms * 5.0);
    }

    #[test]
    fn test_dc_passes() {
        let mut lowpass = Lowpass::new(44100.0);
        let mut out = Frame::SILENCE;
        for _ in 0..44100 {
            out = lowpass.process(Frame::mono(1.0));
        }
        assert!((out.left - 1.0).abs() < 1e-3);
    }
}
