use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// APIキーを読む環境変数
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub whisper: WhisperConfig,
    #[serde(default)]
    pub record: RecordConfig,
    #[serde(default)]
    pub menu: MenuConfig,
}

/// オーディオサーバー設定
///
/// 入出力デバイスはデバイス名の部分一致で選ぶ。
/// 見つからない場合はシステムのデフォルトデバイスを使う。
///
/// # デフォルト値
///
/// - `input_device`: "default"
/// - `output_device`: "Scarlett" (Scarlett 2i2 USB)
/// - `sample_rate`: 44100 Hz
/// - `max_latency_ms`: 50 ms
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    #[serde(default = "default_input_device")]
    pub input_device: String,
    #[serde(default = "default_output_device")]
    pub output_device: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u32,
}

/// 言語モデル設定（説明文 → エフェクト設定）
///
/// # デフォルト値
///
/// - `model`: "gpt-4o-mini"
/// - `endpoint`: OpenAI chat completions
/// - `temperature`: 0.2
/// - `timeout_seconds`: 30 秒
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// 省略時は環境変数 OPENAI_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// OpenAI Whisper API 設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhisperConfig {
    /// 省略時は環境変数 OPENAI_API_KEY
    pub api_key: Option<String>,
    /// Whisper モデル名（通常 "whisper-1"）
    #[serde(default = "default_whisper_model")]
    pub model: String,
    /// 言語コード（"ja", "en" など）。省略可能
    pub language: Option<String>,
    #[serde(default = "default_whisper_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// 録音方式
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordBackendType {
    /// `arecord` コマンド (ALSA)
    Arecord,
    /// cpal で直接録音
    Cpal,
}

/// 音声入力（録音）設定
///
/// # デフォルト値
///
/// - `backend`: "arecord"
/// - `device_match`: "USB PnP Sound Device"
/// - `fallback_device`: "default"
/// - `duration_secs`: 4 秒
/// - `timeout_secs`: 5 秒（これを過ぎても録音コマンドが終わらなければ強制終了）
/// - `sample_rate`: 44100 Hz
/// - `output_dir`: "./recordings"
/// - `keep_recordings`: false（文字起こし後に録音ファイルを削除）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordConfig {
    #[serde(default = "default_record_backend")]
    pub backend: RecordBackendType,
    #[serde(default = "default_record_device_match")]
    pub device_match: String,
    #[serde(default = "default_input_device")]
    pub fallback_device: String,
    #[serde(default = "default_record_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_record_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_record_output_dir")]
    pub output_dir: String,
    #[serde(default)]
    pub keep_recordings: bool,
}

/// メニュー設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MenuConfig {
    /// 入力が空のときに使う説明文
    #[serde(default = "default_description")]
    pub default_description: String,
}

// Default functions
fn default_input_device() -> String {
    "default".to_string()
}

fn default_output_device() -> String {
    "Scarlett".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_max_latency_ms() -> u32 {
    50
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_whisper_model() -> String {
    "whisper-1".to_string()
}

fn default_whisper_endpoint() -> String {
    "https://api.openai.com/v1/audio/transcriptions".to_string()
}

fn default_record_backend() -> RecordBackendType {
    RecordBackendType::Arecord
}

fn default_record_device_match() -> String {
    "USB PnP Sound Device".to_string()
}

fn default_record_duration_secs() -> u64 {
    4
}

fn default_record_timeout_secs() -> u64 {
    5
}

fn default_record_output_dir() -> String {
    "./recordings".to_string()
}

fn default_description() -> String {
    "a short delay and a stereo reverb".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: default_input_device(),
            output_device: default_output_device(),
            sample_rate: default_sample_rate(),
            max_latency_ms: default_max_latency_ms(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
            endpoint: default_llm_endpoint(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_whisper_model(),
            language: None,
            endpoint: default_whisper_endpoint(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            backend: default_record_backend(),
            device_match: default_record_device_match(),
            fallback_device: default_input_device(),
            duration_secs: default_record_duration_secs(),
            timeout_secs: default_record_timeout_secs(),
            sample_rate: default_sample_rate(),
            output_dir: default_record_output_dir(),
            keep_recordings: false,
        }
    }
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            default_description: default_description(),
        }
    }
}

impl LlmConfig {
    /// APIキー（設定ファイル優先、なければ環境変数）
    pub fn resolve_api_key(&self) -> Result<String> {
        resolve_api_key(self.api_key.as_deref())
    }
}

impl WhisperConfig {
    /// APIキー（設定ファイル優先、なければ環境変数）
    pub fn resolve_api_key(&self) -> Result<String> {
        resolve_api_key(self.api_key.as_deref())
    }
}

fn resolve_api_key(configured: Option<&str>) -> Result<String> {
    match configured {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .with_context(|| {
                format!(
                    "APIキーが設定されていません (設定ファイルの api_key または環境変数 {})",
                    API_KEY_ENV
                )
            }),
    }
}

impl Config {
    /// 設定ファイルから読み込み
    ///
    /// TOML形式の設定ファイルをパースしてConfig構造体を生成する。
    ///
    /// # Errors
    ///
    /// ファイルの読み込みまたはパースに失敗した場合にエラーを返す。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("設定ファイルの読み込みに失敗: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "設定ファイルのパースに失敗")?;
        Ok(config)
    }

    /// デフォルト設定をファイルに書き出し
    ///
    /// 既存のファイルは上書きされる。
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Config::default();
        let content =
            toml::to_string_pretty(&config).with_context(|| "設定のシリアライズに失敗")?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("設定ファイルの書き込みに失敗: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// 設定ファイルがあれば読み込み、なければデフォルトを使用
    ///
    /// # Errors
    ///
    /// ファイルが存在するがパースに失敗した場合にエラーを返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            log::warn!(
                "設定ファイルが見つかりません。デフォルト設定を使用します: {:?}",
                path.as_ref()
            );
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.output_device, "Scarlett");
        assert_eq!(config.record.backend, RecordBackendType::Arecord);
        assert_eq!(config.record.device_match, "USB PnP Sound Device");
        assert_eq!(config.record.duration_secs, 4);
        assert_eq!(config.record.timeout_secs, 5);
        assert_eq!(config.whisper.model, "whisper-1");
        assert_eq!(
            config.menu.default_description,
            "a short delay and a stereo reverb"
        );
    }

    #[test]
    fn test_write_and_read_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        Config::write_default(path).unwrap();

        let config = Config::from_file(path).unwrap();
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_custom_config() {
        let toml_content = r#"
[audio]
input_device = "USB PnP"
output_device = "bcm2835"
sample_rate = 48000
max_latency_ms = 20

[llm]
api_key = "sk-test"
model = "gpt-4o"
temperature = 0.7

[whisper]
language = "ja"

[record]
backend = "cpal"
duration_secs = 3
output_dir = "/tmp/rec"
keep_recordings = true

[menu]
default_description = "huge cathedral reverb"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.audio.input_device, "USB PnP");
        assert_eq!(config.audio.output_device, "bcm2835");
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.max_latency_ms, 20);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.temperature, 0.7);
        assert_eq!(config.llm.resolve_api_key().unwrap(), "sk-test");
        assert_eq!(config.whisper.language.as_deref(), Some("ja"));
        assert_eq!(config.record.backend, RecordBackendType::Cpal);
        assert_eq!(config.record.duration_secs, 3);
        assert_eq!(config.record.timeout_secs, 5);
        assert_eq!(config.record.output_dir, "/tmp/rec");
        assert!(config.record.keep_recordings);
        assert_eq!(config.menu.default_description, "huge cathedral reverb");
    }

    #[test]
    fn test_load_or_default_nonexistent() {
        let config = Config::load_or_default("nonexistent_file.toml").unwrap();
        assert_eq!(config.audio.sample_rate, 44100);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[audio\nsample_rate = ").unwrap();
        temp_file.flush().unwrap();
        assert!(Config::load_or_default(temp_file.path()).is_err());
    }
}
