use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// エフェクトノードの種類
///
/// 設定辞書のキー（エフェクト名）に対応する。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// ステレオリバーブ (Freeverb)
    Reverb,
    /// ステレオコーラス
    Chorus,
    /// フィードバックディレイ
    Delay,
    /// ディストーション
    Distortion,
    /// ローパスフィルタ
    Lowpass,
}

/// パラメータの定義（名前・範囲・デフォルト値）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParamSpec {
    const fn new(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            min,
            max,
            default,
        }
    }

    /// 値を範囲内に収める
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }
}

const REVERB_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("size", 0.0, 1.0, 0.5),
    ParamSpec::new("damp", 0.0, 1.0, 0.5),
    ParamSpec::new("width", 0.0, 1.0, 1.0),
    ParamSpec::new("mix", 0.0, 1.0, 0.5),
];

const CHORUS_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("depth", 0.0, 5.0, 1.0),
    ParamSpec::new("rate", 0.05, 5.0, 0.8),
    ParamSpec::new("feedback", 0.0, 0.95, 0.25),
    ParamSpec::new("mix", 0.0, 1.0, 0.5),
];

const DELAY_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("time", 0.001, 2.0, 0.25),
    ParamSpec::new("feedback", 0.0, 0.95, 0.3),
    ParamSpec::new("mix", 0.0, 1.0, 0.5),
];

const DISTORTION_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("drive", 0.0, 0.99, 0.75),
    ParamSpec::new("slope", 0.0, 0.99, 0.5),
    ParamSpec::new("level", 0.0, 1.0, 0.5),
    ParamSpec::new("mix", 0.0, 1.0, 1.0),
];

const LOWPASS_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("cutoff", 20.0, 20000.0, 2000.0),
    ParamSpec::new("mix", 0.0, 1.0, 1.0),
];

impl EffectKind {
    pub const ALL: [EffectKind; 5] = [
        EffectKind::Reverb,
        EffectKind::Chorus,
        EffectKind::Delay,
        EffectKind::Distortion,
        EffectKind::Lowpass,
    ];

    /// 正規名
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Reverb => "reverb",
            EffectKind::Chorus => "chorus",
            EffectKind::Delay => "delay",
            EffectKind::Distortion => "distortion",
            EffectKind::Lowpass => "lowpass",
        }
    }

    /// エフェクト名から種類を判定
    ///
    /// 大文字小文字・区切り文字（`-`, 空白）を区別せず、別名も受け付ける。
    ///
    /// ```
    /// # use fx_pedal::types::EffectKind;
    /// assert_eq!(EffectKind::from_name("Stereo Reverb"), Some(EffectKind::Reverb));
    /// assert_eq!(EffectKind::from_name("echo"), Some(EffectKind::Delay));
    /// assert_eq!(EffectKind::from_name("wah"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = normalize_name(name);
        let kind = match normalized.as_str() {
            "reverb" | "stereo_reverb" | "stereoverb" | "steroverb" | "freeverb" | "strev"
            | "reverberation" => EffectKind::Reverb,
            "chorus" | "stereo_chorus" => EffectKind::Chorus,
            "delay" | "echo" | "stereo_delay" | "slapback" => EffectKind::Delay,
            "distortion" | "disto" | "overdrive" | "fuzz" | "drive" => EffectKind::Distortion,
            "lowpass" | "low_pass" | "lpf" | "filter" | "tone" => EffectKind::Lowpass,
            _ => return None,
        };
        Some(kind)
    }

    /// パラメータ定義の一覧
    pub fn param_specs(&self) -> &'static [ParamSpec] {
        match self {
            EffectKind::Reverb => REVERB_PARAMS,
            EffectKind::Chorus => CHORUS_PARAMS,
            EffectKind::Delay => DELAY_PARAMS,
            EffectKind::Distortion => DISTORTION_PARAMS,
            EffectKind::Lowpass => LOWPASS_PARAMS,
        }
    }

    /// 名前でパラメータ定義を取得
    pub fn param_spec(&self, name: &str) -> Option<&'static ParamSpec> {
        let normalized = normalize_name(name);
        let normalized = match normalized.as_str() {
            // よく使われる別名
            "bal" | "balance" | "wet" | "dry_wet" => "mix",
            "room" | "room_size" | "roomsize" | "revtime" => "size",
            "delay" | "delay_time" | "seconds" => "time",
            "freq" | "frequency" => "cutoff",
            "gain" | "volume" | "mul" => "level",
            "speed" => "rate",
            other => other,
        };
        self.param_specs().iter().find(|spec| spec.name == normalized)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// 1つのエフェクトノードの設定
#[derive(Clone, Debug, PartialEq)]
pub struct EffectSpec {
    pub kind: EffectKind,
    /// パラメータ名 → 値（解決済み・範囲内）
    pub params: BTreeMap<String, f32>,
}

impl EffectSpec {
    /// 全パラメータがデフォルト値の設定
    pub fn with_defaults(kind: EffectKind) -> Self {
        let params = kind
            .param_specs()
            .iter()
            .map(|spec| (spec.name.to_string(), spec.default))
            .collect();
        Self { kind, params }
    }

    /// 生のパラメータ辞書から設定を作成
    ///
    /// 未知のパラメータは捨て、範囲外の値は丸め、欠けている値はデフォルトで補う。
    pub fn resolve(kind: EffectKind, raw: &BTreeMap<String, f32>) -> Self {
        let mut spec = Self::with_defaults(kind);
        for (name, &value) in raw {
            match kind.param_spec(name) {
                Some(param) => {
                    spec.params.insert(param.name.to_string(), param.clamp(value));
                }
                None => {
                    log::warn!("{}: 未知のパラメータを無視します: {}", kind, name);
                }
            }
        }
        spec
    }

    /// builder風にパラメータを上書き
    pub fn with(mut self, name: &str, value: f32) -> Self {
        if let Some(param) = self.kind.param_spec(name) {
            self.params.insert(param.name.to_string(), param.clamp(value));
        }
        self
    }

    /// パラメータ値（未設定ならデフォルト）
    pub fn param(&self, name: &str) -> f32 {
        self.params.get(name).copied().unwrap_or_else(|| {
            self.kind
                .param_spec(name)
                .map(|spec| spec.default)
                .unwrap_or(0.0)
        })
    }
}

/// エフェクトチェーンの設定辞書
///
/// プリセットと言語モデルの出力で共通の形。JSONでは
/// `{"reverb": {"size": 0.8}, "delay": {"time": 0.3}}` のように
/// エフェクト名 → パラメータ辞書 の順序付きマップとして表現し、
/// 記述順がチェーンの接続順になる。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FxConfig {
    pub effects: Vec<EffectSpec>,
}

impl FxConfig {
    pub fn new(effects: Vec<EffectSpec>) -> Self {
        Self { effects }
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// 表示用の1行JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Serialize for FxConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.effects.len()))?;
        for effect in &self.effects {
            map.serialize_entry(effect.kind.name(), &effect.params)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FxConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FxConfigVisitor)
    }
}

struct FxConfigVisitor;

impl<'de> Visitor<'de> for FxConfigVisitor {
    type Value = FxConfig;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of effect name to parameter map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut effects = Vec::new();
        while let Some(name) = access.next_key::<String>()? {
            let Some(kind) = EffectKind::from_name(&name) else {
                // 値の形は問わずに読み飛ばす
                access.next_value::<de::IgnoredAny>()?;
                log::warn!("未知のエフェクトを無視します: {}", name);
                continue;
            };
            let raw: Option<BTreeMap<String, f32>> = access
                .next_value()
                .map_err(|e| de::Error::custom(format!("{}: {}", name, e)))?;
            effects.push(EffectSpec::resolve(kind, &raw.unwrap_or_default()));
        }
        Ok(FxConfig { effects })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_aliases() {
        assert_eq!(EffectKind::from_name("reverb"), Some(EffectKind::Reverb));
        assert_eq!(EffectKind::from_name("STEREO-REVERB"), Some(EffectKind::Reverb));
        assert_eq!(EffectKind::from_name(" disto "), Some(EffectKind::Distortion));
        assert_eq!(EffectKind::from_name("low pass"), Some(EffectKind::Lowpass));
        assert_eq!(EffectKind::from_name("harmonizer"), None);
    }

    #[test]
    fn test_every_kind_has_mix() {
        for kind in EffectKind::ALL {
            assert!(kind.param_spec("mix").is_some(), "{} に mix がない", kind);
            for spec in kind.param_specs() {
                assert!(spec.min <= spec.default && spec.default <= spec.max);
            }
        }
    }

    #[test]
    fn test_resolve_clamps_and_fills_defaults() {
        let mut raw = BTreeMap::new();
        raw.insert("size".to_string(), 3.0);
        raw.insert("bal".to_string(), 0.2);
        raw.insert("shimmer".to_string(), 1.0);

        let spec = EffectSpec::resolve(EffectKind::Reverb, &raw);
        assert_eq!(spec.param("size"), 1.0);
        assert_eq!(spec.param("mix"), 0.2);
        assert_eq!(spec.param("damp"), 0.5);
        assert!(!spec.params.contains_key("shimmer"));
    }

    #[test]
    fn test_deserialize_keeps_document_order() {
        let json = r#"{"reverb": {"size": 0.9}, "delay": {"time": 0.1}, "chorus": {}}"#;
        let config: FxConfig = serde_json::from_str(json).unwrap();
        let kinds: Vec<EffectKind> = config.effects.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EffectKind::Reverb, EffectKind::Delay, EffectKind::Chorus]
        );
        assert_eq!(config.effects[1].param("time"), 0.1);
    }

    #[test]
    fn test_deserialize_skips_unknown_effects_and_accepts_null() {
        let json = r#"{"wah": {"q": 2}, "lowpass": null, "echo": {"feedback": 0.5}}"#;
        let config: FxConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.len(), 2);
        assert_eq!(config.effects[0].kind, EffectKind::Lowpass);
        assert_eq!(config.effects[0].param("cutoff"), 2000.0);
        assert_eq!(config.effects[1].kind, EffectKind::Delay);
    }

    #[test]
    fn test_deserialize_skips_unknown_effect_with_any_value_shape() {
        let json = r#"{"wah": {"mode": "auto", "on": true}, "reverb": {"size": 0.8}, "loop": [1]}"#;
        let config: FxConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.len(), 1);
        assert_eq!(config.effects[0].kind, EffectKind::Reverb);
        assert_eq!(config.effects[0].param("size"), 0.8);
    }

    #[test]
    fn test_deserialize_rejects_non_numeric_params() {
        let json = r#"{"reverb": {"size": "big"}}"#;
        assert!(serde_json::from_str::<FxConfig>(json).is_err());
    }

    #[test]
    fn test_serialize_uses_canonical_names() {
        let config = FxConfig::new(vec![
            EffectSpec::with_defaults(EffectKind::Delay).with("time", 0.5),
            EffectSpec::with_defaults(EffectKind::Reverb),
        ]);
        let json = config.to_json();
        assert!(json.starts_with(r#"{"delay":"#));
        let back: FxConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
