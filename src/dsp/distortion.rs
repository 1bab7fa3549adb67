use super::{clamp_param, EffectNode, Frame};
use crate::types::EffectKind;

/// ソフトクリップ型ディストーション
///
/// `y = (1 + k) * x / (1 + k * |x|)`, `k = 2 * drive / (1 - drive)` で歪ませ、
/// slope で決まる1次ローパスで高域を落とす。
pub struct Distortion {
    state_l: f32,
    state_r: f32,
    drive: f32,
    slope: f32,
    level: f32,
    mix: f32,
}

impl Distortion {
    pub fn new(_sample_rate: f32) -> Self {
        let mut distortion = Self {
            state_l: 0.0,
            state_r: 0.0,
            drive: 0.0,
            slope: 0.0,
            level: 0.0,
            mix: 0.0,
        };
        for spec in EffectKind::Distortion.param_specs() {
            distortion.set_param(spec.name, spec.default);
        }
        distortion
    }

    fn shape(&self, x: f32) -> f32 {
        let k = 2.0 * self.drive / (1.0 - self.drive);
        (1.0 + k) * x / (1.0 + k * x.abs())
    }
}

impl EffectNode for Distortion {
    fn kind(&self) -> EffectKind {
        EffectKind::Distortion
    }

    fn process(&mut self, input: Frame) -> Frame {
        let shaped_l = self.shape(input.left);
        let shaped_r = self.shape(input.right);

        self.state_l = shaped_l * (1.0 - self.slope) + self.state_l * self.slope;
        self.state_r = shaped_r * (1.0 - self.slope) + self.state_r * self.slope;

        let wet = Frame::new(self.state_l * self.level, self.state_r * self.level);
        Frame::mix(input, wet, self.mix)
    }

    fn param(&self, name: &str) -> Option<f32> {
        match EffectKind::Distortion.param_spec(name)?.name {
            "drive" => Some(self.drive),
            "slope" => Some(self.slope),
            "level" => Some(self.level),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: f32) -> bool {
        match clamp_param(EffectKind::Distortion, name, value) {
            Some(("drive", v)) => self.drive = v,
            Some(("slope", v)) => self.slope = v,
            Some(("level", v)) => self.level = v,
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
