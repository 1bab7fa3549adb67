use super::{clamp_param, DelayLine, EffectNode, Frame};
use crate::types::EffectKind;

/// フィードバックディレイ（左右独立）
pub struct Delay {
    sample_rate: f32,
    line_l: DelayLine,
    line_r: DelayLine,
    time: f32,
    feedback: f32,
    mix: f32,
}

impl Delay {
    pub fn new(sample_rate: f32) -> Self {
        let max_time = EffectKind::Delay
            .param_spec("time")
            .map(|spec| spec.max)
            .unwrap_or(2.0);
        let max_samples = (max_time * sample_rate).ceil() as usize + 1;

        let mut delay = Self {
            sample_rate,
            line_l: DelayLine::new(max_samples),
            line_r: DelayLine::new(max_samples),
            time: 0.0,
            feedback: 0.0,
            mix: 0.0,
        };
        for spec in EffectKind::Delay.param_specs() {
            delay.set_param(spec.name, spec.default);
        }
        delay
    }
}

impl EffectNode for Delay {
    fn kind(&self) -> EffectKind {
        EffectKind::Delay
    }

    fn process(&mut self, input: Frame) -> Frame {
        let delay_samples = self.time * self.sample_rate;
        let wet_l = self.line_l.read(delay_samples);
        let wet_r = self.line_r.read(delay_samples);

        self.line_l.push(input.left + wet_l * self.feedback);
        self.line_r.push(input.right + wet_r * self.feedback);

        Frame::mix(input, Frame::new(wet_l, wet_r), self.mix)
    }

    fn param(&self, name: &str) -> Option<f32> {
        match EffectKind::Delay.param_spec(name)?.name {
            "time" => Some(self.time),
            "feedback" => Some(self.feedback),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    fn set_param(&mut self, name: &str, value: f32) -> bool {
        match clamp_param(EffectKind::Delay, name, value) {
            Some(("time", v)) => self.time = v,
            Some(("feedback", v)) => self.feedback = v,
            Some(("mix", v)) => self.mix = v,
            _ => return false,
        }
        true
    }

    fn reset(&mut self) {
        self.line_l.clear();
        self.line_r.clear();
    }
}
