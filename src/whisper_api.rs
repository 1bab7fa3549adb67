use crate::config::WhisperConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::path::Path;

/// 音声ファイル → テキスト
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// WAVファイルを文字起こし
    async fn transcribe_file(&self, path: &Path) -> Result<String>;
}

/// OpenAI Whisper API レスポンス
#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

/// OpenAI Whisper API クライアント
pub struct WhisperClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    language: Option<String>,
    endpoint: String,
}

impl WhisperClient {
    pub fn new(config: &WhisperConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Whisper API HTTPクライアント作成失敗")?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            language: config.language.clone(),
            endpoint: config.endpoint.clone(),
        })
    }

    /// Whisper APIを呼び出して文字起こし
    async fn transcribe_audio(&self, wav_data: Vec<u8>, file_name: String) -> Result<String> {
        let part = multipart::Part::bytes(wav_data)
            .file_name(file_name)
            .mime_str("audio/wav")?;

        let mut form = multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        if let Some(ref language) = self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .context("Whisper API リクエスト失敗")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Whisper API エラー: {} - {}", status, error_text);
        }

        let whisper_response: WhisperResponse = response
            .json::<WhisperResponse>()
            .await
            .context("Whisper API レスポンスパース失敗")?;

        Ok(whisper_response.text.trim().to_string())
    }
}

#[async_trait]
impl SpeechToText for WhisperClient {
    async fn transcribe_file(&self, path: &Path) -> Result<String> {
        let wav_data = tokio::fs::read(path)
            .await
            .with_context(|| format!("録音ファイルの読み込みに失敗: {:?}", path))?;
        if wav_data.is_empty() {
            anyhow::bail!("録音ファイルが空です: {:?}", path);
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        log::debug!("Whisper API: {} バイトを送信", wav_data.len());
        let text = self.transcribe_audio(wav_data, file_name).await?;
        log::info!("文字起こし結果: {}", text);
        Ok(text)
    }
}

/// PCMデータをWAVフォーマットに変換（16bit モノラル）
pub fn pcm_to_wav(pcm_data: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("WAVライター作成失敗")?;

        for &sample in pcm_data {
            writer.write_sample(sample).context("WAV書き込み失敗")?;
        }

        writer.finalize().context("WAV finalize失敗")?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_to_wav_header() {
        let wav = pcm_to_wav(&[0, 1000, -1000, 0], 16000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // ヘッダ44バイト + 4サンプル × 2バイト
        assert_eq!(wav.len(), 44 + 8);

        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let config = WhisperConfig {
            api_key: Some("sk-test".to_string()),
            ..WhisperConfig::default()
        };
        let client = WhisperClient::new(&config).unwrap();
        let result = client
            .transcribe_file(Path::new("/nonexistent/voice.wav"))
            .await;
        assert!(result.is_err());
    }
}
