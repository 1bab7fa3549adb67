use super::{clamp_param, EffectNode, Frame};
use crate::types::EffectKind;

/// コムフィルタの遅延長（44.1kHz基準）
const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
/// オールパスフィルタの遅延長（44.1kHz基準）
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];
/// 右チャンネルの遅延長オフセット
const STEREO_SPREAD: usize = 23;

const FIXED_GAIN: f32 = 0.015;
const SCALE_WET: f32 = 3.0;
const SCALE_DAMP: f32 = 0.4;
const SCALE_ROOM: f32 = 0.28;
const OFFSET_ROOM: f32 = 0.7;

#[derive(Clone, Debug)]
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    filter_store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
            filter_store: 0.0,
        }
    }

    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filter_store = output * (1.0 - damp) + self.filter_store * damp;
        self.buffer[self.index] = input + self.filter_store * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.filter_store = 0.0;
        self.index = 0;
    }
}

#[derive(Clone, Debug)]
struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = input + buffered * 0.5;
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }

    fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.index = 0;
    }
}

/// Freeverb 方式のステレオリバーブ
///
/// 左右それぞれ並列コムフィルタ8本 + 直列オールパス4本。
/// 右チャンネルは遅延長を少しずらして広がりを出す。
pub struct Reverb {
    combs_l: Vec<Comb>,
    combs_r: Vec<Comb>,
    allpasses_l: Vec<Allpass>,
    allpasses_r: Vec<Allpass>,
    size: f32,
    damp: f32,
    width: f32,
    mix: f32,
}

impl Reverb {
    pub fn new(sample_rate: f32) -> Self {
        let scale = |len: usize| ((len as f32) * sample_rate / 44100.0).round() as usize;

        let mut reverb = Self {
            combs_l: COMB_TUNING.iter().map(|&n| Comb::new(scale(n))).collect(),
            combs_r: COMB_TUNING
                .iter()
                .map(|&n| Comb::new(scale(n + STEREO_SPREAD)))
                .collect(),
            allpasses_l: ALLPASS_TUNING.iter().map(|&n| Allpass::new(scale(n))).collect(),
            allpasses_r: ALLPASS_TUNING
                .iter()
                .map(|&n| Allpass::new(scale(n + STEREO_SPREAD)))
                .collect(),
            size: 0.0,
            damp: 0.0,
            width: 0.0,
            mix: 0.0,
        };
        for spec in EffectKind::Reverb.param_specs() {
            reverb.set_param(spec.name, spec.default);
        }
        reverb
    }
}

impl EffectNode for Reverb {
    fn kind(&self) -> EffectKind {
        EffectKind::Reverb
    }

    fn process(&mut self, input: Frame) -> Frame {
        let feedback = self.size * SCALE_ROOM + OFFSET_ROOM;
        let damp = self.damp * SCALE_DAMP;
        let mono_in = (input.left + input.right) * FIXED_GAIN;

        let mut out_l = 0.0;
        let mut out_r = 0.0;
        for comb in &mut self.combs_l {
            out_l += comb.process(mono_in, feedback, damp);
        }
        for comb in &mut self.combs_r {
            out_r += comb.process(mono_in, feedback, damp);
        }
        for allpass in &mut self.allpasses_l {
            out_l = allpass.process(out_l);
        }
        for allpass in &mut self.allpasses_r {
            out_r = allpass.process(out_r);
        }

        let wet1 = SCALE_WET * (self.width / 2.0 + 0.5);
        let wet2 = SCALE_WET * ((1.0 - self.width) / 2.0);
        let wet = Frame::new(out_l * wet1 + out_r * wet2, out_r * wet1 + out_l * wet2);

        Frame::mix(input, wet, self.mix)
    }

    fn param(&self, name: &str) -> Option<f32> {
        match EffectKind::Reverb.param_spec(name)?.name {
            "size" => Some(self.size),
            "damp" => Some(self.damp),
            "width" => Some(self.width),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: f32) -> bool {
        match clamp_param(EffectKind::Reverb, name, value) {
            Some(("size", v)) => self.size = v,
            Some(("damp", v)) => self.damp = v,
            Some(("width", v)) => self.width = v,
            Some(("mix", v)) => self.mix = v,
            _ => return false,
        }
        true
    }

    fn reset(&mut self) {
        self.combs_l.iter_mut().for_each(Comb::clear);
        self.combs_r.iter_mut().for_each(Comb::clear);
        self.allpasses_l.iter_mut().for_each(Allpass::clear);
        self.allpasses_r.iter_mut().for_each(Allpass::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_mix_is_passthrough() {
        let mut reverb = Reverb::new(44100.0);
        reverb.set_param("mix", 0.0);
        let out = reverb.process(Frame::new(0.3, -0.2));
        assert_eq!(out, Frame::new(0.3, -0.2));
    }

    #[test]
    fn test_impulse_produces_tail() {
        let mut reverb = Reverb::new(44100.0);
        reverb.set_param("mix", 1.0);
        reverb.process(Frame::mono(1.0));

        // 最短のコム遅延を過ぎれば残響が出る
        let tail: f32 = (0..4410)
            .map(|_| reverb.process(Frame::SILENCE).left.abs())
            .sum();
        assert!(tail > 0.0);

        reverb.reset();
        let after_reset = reverb.process(Frame::SILENCE);
        assert_eq!(after_reset, Frame::SILENCE);
    }

    #[test]
    fn test_output_stays_bounded() {
        let mut reverb = Reverb::new(48000.0);
        reverb.set_param("size", 1.0);
        reverb.set_param("damp", 0.0);
        reverb.set_param("mix", 1.0);
        let mut peak: f32 = 0.0;
        for i in 0..48000 {
            let x = (i as f32 * 0.05).sin() * 0.5;
            let out = reverb.process(Frame::mono(x));
            peak = peak.max(out.left.abs()).max(out.right.abs());
        }
        assert!(peak.is_finite());
        assert!(peak < 50.0);
    }

    #[test]
    fn test_param_aliases_and_clamp() {
        let mut reverb = Reverb::new(44100.0);
        assert!(reverb.set_param("bal", 2.0));
        assert_eq!(reverb.param("mix"), Some(1.0));
        assert!(!reverb.set_param("pitch", 0.1));
    }
}
