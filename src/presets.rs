use crate::types::{EffectKind, EffectSpec, FxConfig};
use std::fmt;

/// 固定プリセット
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    /// 広がりのあるステレオリバーブ
    StereoReverb,
    /// コーラス + 軽いリバーブ
    Chorus,
    /// 短いディレイ（スラップバック）
    Slapback,
    /// 歪み + トーン
    Crunch,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::StereoReverb,
        Preset::Chorus,
        Preset::Slapback,
        Preset::Crunch,
    ];

    /// 表示名
    pub fn name(&self) -> &'static str {
        match self {
            Preset::StereoReverb => "stereo reverb",
            Preset::Chorus => "chorus",
            Preset::Slapback => "slapback",
            Preset::Crunch => "crunch",
        }
    }

    /// メニューのラベル
    pub fn label(&self) -> &'static str {
        match self {
            Preset::StereoReverb => "Stereoverb",
            Preset::Chorus => "Chorus",
            Preset::Slapback => "Slapback",
            Preset::Crunch => "Crunch",
        }
    }

    /// 割り当てキー
    pub fn key(&self) -> char {
        match self {
            Preset::StereoReverb => '1',
            Preset::Chorus => '2',
            Preset::Slapback => '3',
            Preset::Crunch => '4',
        }
    }

    pub fn from_key(key: char) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.key() == key)
    }

    /// 名前で検索（大文字小文字・区切り文字を区別しない）
    pub fn find(name: &str) -> Option<Self> {
        let wanted: String = name
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        Self::ALL.into_iter().find(|preset| {
            let own: String = preset.name().chars().filter(|c| c.is_alphanumeric()).collect();
            own == wanted || preset.label().to_lowercase() == wanted
        })
    }

    /// プリセットの設定辞書
    pub fn config(&self) -> FxConfig {
        let effects = match self {
            Preset::StereoReverb => vec![EffectSpec::with_defaults(EffectKind::Reverb)
                .with("size", 0.85)
                .with("damp", 0.4)
                .with("width", 1.0)
                .with("mix", 0.45)],
            Preset::Chorus => vec![
                EffectSpec::with_defaults(EffectKind::Chorus)
                    .with("depth", 2.5)
                    .with("rate", 0.6)
                    .with("feedback", 0.3)
                    .with("mix", 0.5),
                EffectSpec::with_defaults(EffectKind::Reverb)
                    .with("size", 0.4)
                    .with("mix", 0.2),
            ],
            Preset::Slapback => vec![EffectSpec::with_defaults(EffectKind::Delay)
                .with("time", 0.12)
                .with("feedback", 0.15)
                .with("mix", 0.4)],
            Preset::Crunch => vec![
                EffectSpec::with_defaults(EffectKind::Distortion)
                    .with("drive", 0.8)
                    .with("slope", 0.6)
                    .with("level", 0.4),
                EffectSpec::with_defaults(EffectKind::Lowpass).with("cutoff", 4500.0),
            ],
        };
        FxConfig::new(effects)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_unique() {
        for preset in Preset::ALL {
            assert_eq!(Preset::from_key(preset.key()), Some(preset));
        }
        assert_eq!(Preset::from_key('9'), None);
    }

    #[test]
    fn test_find_by_name() {
        assert_eq!(Preset::find("stereo reverb"), Some(Preset::StereoReverb));
        assert_eq!(Preset::find("Stereo-Reverb"), Some(Preset::StereoReverb));
        assert_eq!(Preset::find("stereoverb"), Some(Preset::StereoReverb));
        assert_eq!(Preset::find("CHORUS"), Some(Preset::Chorus));
        assert_eq!(Preset::find("flanger"), None);
    }

    #[test]
    fn test_presets_are_not_empty() {
        for preset in Preset::ALL {
            assert!(!preset.config().is_empty(), "{} が空", preset);
        }
    }

    #[test]
    fn test_stereo_reverb_values() {
        let config = Preset::StereoReverb.config();
        assert_eq!(config.len(), 1);
        assert_eq!(config.effects[0].kind, EffectKind::Reverb);
        assert_eq!(config.effects[0].param("size"), 0.85);
        assert_eq!(config.effects[0].param("mix"), 0.45);
    }
}
