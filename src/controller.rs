use crate::audio_server::{AudioServer, SharedChain};
use crate::config::Config;
use crate::llm::{describe_to_config, EffectGenerator, OpenAiEffectGenerator};
use crate::menu::{self, MenuAction};
use crate::presets::Preset;
use crate::recorder::{create_recorder, Recorder};
use crate::tui::ParamScreen;
use crate::types::FxConfig;
use crate::whisper_api::{SpeechToText, WhisperClient};
use anyhow::{Context, Result};

/// エフェクトチェーンを鳴らす先
pub trait EffectOutput {
    /// 設定を適用して（再）起動
    fn apply(&mut self, config: &FxConfig) -> Result<()>;

    /// 停止
    fn stop(&mut self);

    /// 再生中のチェーン
    fn chain(&self) -> Option<SharedChain>;
}

impl EffectOutput for AudioServer {
    fn apply(&mut self, config: &FxConfig) -> Result<()> {
        self.start(config).map(|_| ())
    }

    fn stop(&mut self) {
        AudioServer::stop(self);
    }

    fn chain(&self) -> Option<SharedChain> {
        AudioServer::chain(self)
    }
}

/// メニューループの継続/終了
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Continue,
    Exit,
}

/// キー操作をエフェクト選択に振り分ける
pub struct Controller {
    output: Box<dyn EffectOutput>,
    generator: Option<Box<dyn EffectGenerator>>,
    stt: Option<Box<dyn SpeechToText>>,
    recorder: Box<dyn Recorder>,
    default_description: String,
    keep_recordings: bool,
}

impl Controller {
    pub fn new(
        output: Box<dyn EffectOutput>,
        generator: Option<Box<dyn EffectGenerator>>,
        stt: Option<Box<dyn SpeechToText>>,
        recorder: Box<dyn Recorder>,
        default_description: String,
    ) -> Self {
        Self {
            output,
            generator,
            stt,
            recorder,
            default_description,
            keep_recordings: false,
        }
    }

    /// 文字起こし後も録音ファイルを残す
    pub fn with_keep_recordings(mut self, keep: bool) -> Self {
        self.keep_recordings = keep;
        self
    }

    /// 設定から各バックエンドを用意
    ///
    /// APIキーがない場合は言語モデル/文字起こしを無効にして起動する。
    pub fn from_config(config: &Config) -> Result<Self> {
        let server = AudioServer::new(&config.audio).context("オーディオサーバーの初期化に失敗")?;

        let generator: Option<Box<dyn EffectGenerator>> =
            match OpenAiEffectGenerator::new(&config.llm) {
                Ok(generator) => Some(Box::new(generator)),
                Err(e) => {
                    log::warn!("言語モデルは使用できません: {:#}", e);
                    None
                }
            };

        let stt: Option<Box<dyn SpeechToText>> = match WhisperClient::new(&config.whisper) {
            Ok(client) => Some(Box::new(client)),
            Err(e) => {
                log::warn!("文字起こしは使用できません: {:#}", e);
                None
            }
        };

        Ok(Self::new(
            Box::new(server),
            generator,
            stt,
            create_recorder(&config.record),
            config.menu.default_description.clone(),
        )
        .with_keep_recordings(config.record.keep_recordings))
    }

    /// 1つの操作を実行
    pub async fn handle(&mut self, action: MenuAction) -> Result<LoopState> {
        match action {
            MenuAction::Preset(preset) => self.select_preset(preset)?,
            MenuAction::Voice => self.select_from_voice().await?,
            MenuAction::Describe => {
                let description = menu::read_line("effect> ")?;
                self.select_from_description(&description).await?;
            }
            MenuAction::Tweak => self.tweak()?,
            MenuAction::Stop => self.stop(),
            MenuAction::Exit => {
                self.stop();
                return Ok(LoopState::Exit);
            }
            MenuAction::Unknown(key) => {
                log::debug!("割り当てのないキー: {:?}", key);
            }
        }
        Ok(LoopState::Continue)
    }

    /// プリセットを選択
    pub fn select_preset(&mut self, preset: Preset) -> Result<()> {
        log::info!("プリセット: {}", preset);
        self.apply(&preset.config())
    }

    /// 説明文から設定を生成して適用（空なら既定の説明文）
    pub async fn select_from_description(&mut self, description: &str) -> Result<()> {
        let description = if description.trim().is_empty() {
            self.default_description.clone()
        } else {
            description.trim().to_string()
        };

        let generator = self
            .generator
            .as_deref()
            .context("言語モデルが設定されていません (api_key / OPENAI_API_KEY)")?;
        let config = describe_to_config(generator, &description).await?;
        self.apply(&config)
    }

    /// 録音 → 文字起こし → 設定生成 → 適用
    pub async fn select_from_voice(&mut self) -> Result<()> {
        let stt = self
            .stt
            .as_deref()
            .context("文字起こしが設定されていません (api_key / OPENAI_API_KEY)")?;

        println!("recording");
        let path = self.recorder.record().await?;
        println!("done recording");

        let transcribed = stt.transcribe_file(&path).await;
        if !self.keep_recordings {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                log::warn!("録音ファイルの削除に失敗: {:?}: {}", path, e);
            }
        }
        let text = transcribed?;
        if text.trim().is_empty() {
            anyhow::bail!("音声から説明文を認識できませんでした");
        }
        println!("{}", text);

        self.select_from_description(&text).await
    }

    /// 設定辞書を表示してオーディオサーバーを起動し直す
    pub fn apply(&mut self, config: &FxConfig) -> Result<()> {
        println!("{}", config.to_json());
        self.output.apply(config)
    }

    pub fn stop(&mut self) {
        self.output.stop();
    }

    /// パラメータ画面を開く
    pub fn tweak(&mut self) -> Result<()> {
        let Some(chain) = self.output.chain() else {
            println!("エフェクトが動作していません");
            return Ok(());
        };
        ParamScreen::new(chain.clone()).run()?;

        let config = crate::audio_server::lock_or_recover(&chain).to_config();
        println!("{}", config.to_json());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EffectKind;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingOutput {
        applied: Arc<Mutex<Vec<FxConfig>>>,
        stopped: Arc<Mutex<usize>>,
    }

    impl EffectOutput for RecordingOutput {
        fn apply(&mut self, config: &FxConfig) -> Result<()> {
            self.applied.lock().unwrap().push(config.clone());
            Ok(())
        }

        fn stop(&mut self) {
            *self.stopped.lock().unwrap() += 1;
        }

        fn chain(&self) -> Option<SharedChain> {
            None
        }
    }

    struct EchoGenerator {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EffectGenerator for EchoGenerator {
        async fn generate(&self, description: &str) -> Result<String> {
            self.seen.lock().unwrap().push(description.to_string());
            Ok(r#"{"delay": {"time": 0.1}, "reverb": {"mix": 0.3}}"#.to_string())
        }
    }

    struct FixedStt(String);

    #[async_trait]
    impl SpeechToText for FixedStt {
        async fn transcribe_file(&self, _path: &Path) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FakeRecorder(PathBuf);

    #[async_trait]
    impl Recorder for FakeRecorder {
        async fn record(&self) -> Result<PathBuf> {
            std::fs::write(&self.0, b"RIFF")?;
            Ok(self.0.clone())
        }
    }

    struct Harness {
        _temp_dir: TempDir,
        recording: PathBuf,
        controller: Controller,
        applied: Arc<Mutex<Vec<FxConfig>>>,
        stopped: Arc<Mutex<usize>>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    fn harness(with_generator: bool, transcript: &str) -> Harness {
        let output = RecordingOutput::default();
        let applied = output.applied.clone();
        let stopped = output.stopped.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let generator: Option<Box<dyn EffectGenerator>> = if with_generator {
            Some(Box::new(EchoGenerator { seen: seen.clone() }))
        } else {
            None
        };

        let temp_dir = TempDir::new().unwrap();
        let recording = temp_dir.path().join("voice.wav");

        let controller = Controller::new(
            Box::new(output),
            generator,
            Some(Box::new(FixedStt(transcript.to_string()))),
            Box::new(FakeRecorder(recording.clone())),
            "a short delay and a stereo reverb".to_string(),
        );

        Harness {
            _temp_dir: temp_dir,
            recording,
            controller,
            applied,
            stopped,
            seen,
        }
    }

    #[tokio::test]
    async fn test_preset_key_applies_preset() {
        let mut h = harness(true, "");
        let state = h
            .controller
            .handle(MenuAction::Preset(Preset::Chorus))
            .await
            .unwrap();
        assert_eq!(state, LoopState::Continue);
        assert_eq!(h.applied.lock().unwrap().as_slice(), &[Preset::Chorus.config()]);
    }

    #[tokio::test]
    async fn test_empty_description_uses_default() {
        let mut h = harness(true, "");
        h.controller.select_from_description("  ").await.unwrap();
        assert_eq!(
            h.seen.lock().unwrap().as_slice(),
            &["a short delay and a stereo reverb".to_string()]
        );
        let applied = h.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].effects[0].kind, EffectKind::Delay);
    }

    #[tokio::test]
    async fn test_voice_flow_passes_transcript() {
        let mut h = harness(true, "slow chorus with echo");
        h.controller.handle(MenuAction::Voice).await.unwrap();
        assert_eq!(
            h.seen.lock().unwrap().as_slice(),
            &["slow chorus with echo".to_string()]
        );
        assert_eq!(h.applied.lock().unwrap().len(), 1);
        // 文字起こしが済んだ録音は残さない
        assert!(!h.recording.exists());
    }

    #[tokio::test]
    async fn test_voice_flow_keeps_recording_when_configured() {
        let mut h = harness(true, "slow chorus with echo");
        h.controller = h.controller.with_keep_recordings(true);
        h.controller.select_from_voice().await.unwrap();
        assert!(h.recording.exists());
    }

    #[tokio::test]
    async fn test_voice_flow_rejects_empty_transcript() {
        let mut h = harness(true, "   ");
        assert!(h.controller.select_from_voice().await.is_err());
        assert!(h.applied.lock().unwrap().is_empty());
        assert!(!h.recording.exists());
    }

    #[tokio::test]
    async fn test_missing_generator_is_error() {
        let mut h = harness(false, "");
        assert!(h.controller.select_from_description("reverb").await.is_err());
        assert!(h.applied.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_and_exit() {
        let mut h = harness(true, "");
        assert_eq!(
            h.controller.handle(MenuAction::Stop).await.unwrap(),
            LoopState::Continue
        );
        assert_eq!(
            h.controller.handle(MenuAction::Exit).await.unwrap(),
            LoopState::Exit
        );
        assert_eq!(*h.stopped.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_key_and_tweak_without_chain() {
        let mut h = harness(true, "");
        assert_eq!(
            h.controller.handle(MenuAction::Unknown('?')).await.unwrap(),
            LoopState::Continue
        );
        // 動作中のチェーンがなければ画面を開かない
        h.controller.tweak().unwrap();
        assert!(h.applied.lock().unwrap().is_empty());
    }
}
