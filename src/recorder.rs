use crate::audio_server::lock_or_recover;
use crate::config::{RecordBackendType, RecordConfig};
use crate::device::{find_device, find_hw_id, list_input_devices, DeviceEntry};
use crate::whisper_api::pcm_to_wav;
use anyhow::{Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 音声コマンドの録音
#[async_trait]
pub trait Recorder: Send + Sync {
    /// 一定時間録音してWAVファイルのパスを返す
    async fn record(&self) -> Result<PathBuf>;
}

/// 設定に応じた録音方式を作成
pub fn create_recorder(config: &RecordConfig) -> Box<dyn Recorder> {
    match config.backend {
        RecordBackendType::Arecord => Box::new(ArecordRecorder::new(config.clone())),
        RecordBackendType::Cpal => Box::new(CpalRecorder::new(config.clone())),
    }
}

/// 録音ファイルのパスを作成（出力ディレクトリがなければ作る）
fn recording_path(output_dir: &str) -> Result<PathBuf> {
    let output_dir = Path::new(output_dir);
    if !output_dir.exists() {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("出力ディレクトリの作成に失敗: {:?}", output_dir))?;
    }
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    Ok(output_dir.join(format!("voice_{}.wav", timestamp)))
}

/// `arecord` コマンドで録音
pub struct ArecordRecorder {
    config: RecordConfig,
    program: String,
    leading_args: Vec<String>,
}

impl ArecordRecorder {
    pub fn new(config: RecordConfig) -> Self {
        Self {
            config,
            program: "arecord".to_string(),
            leading_args: Vec::new(),
        }
    }

    /// 録音コマンドを差し替える（`leading_args` は arecord の引数の前に付く）
    pub fn with_command(mut self, program: &str, leading_args: &[&str]) -> Self {
        self.program = program.to_string();
        self.leading_args = leading_args.iter().map(|arg| arg.to_string()).collect();
        self
    }

    /// 録音デバイス名（`-D` の値）を決める
    fn resolve_device(&self) -> String {
        let devices = match list_input_devices() {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("入力デバイス一覧の取得に失敗: {}", e);
                Vec::new()
            }
        };
        resolve_arecord_device(
            &devices,
            &self.config.device_match,
            &self.config.fallback_device,
        )
    }
}

/// デバイス一覧から `device_match` を含むデバイスの hw 識別子を探す
///
/// 見つからなければ `fallback` を使う。
pub fn resolve_arecord_device(
    devices: &[DeviceEntry],
    device_match: &str,
    fallback: &str,
) -> String {
    match find_hw_id(devices, device_match) {
        Some(hw_id) => hw_id,
        None => {
            log::warn!(
                "録音デバイス '{}' が見つかりません。'{}' を使用します",
                device_match,
                fallback
            );
            fallback.to_string()
        }
    }
}

/// arecord の引数
pub fn arecord_args(
    device: &str,
    duration_secs: u64,
    sample_rate: u32,
    path: &Path,
) -> Vec<String> {
    vec![
        "-D".to_string(),
        device.to_string(),
        "-d".to_string(),
        duration_secs.to_string(),
        "-f".to_string(),
        "S16_LE".to_string(),
        "-r".to_string(),
        sample_rate.to_string(),
        path.to_string_lossy().into_owned(),
    ]
}

#[async_trait]
impl Recorder for ArecordRecorder {
    async fn record(&self) -> Result<PathBuf> {
        let device = self.resolve_device();
        let path = recording_path(&self.config.output_dir)?;
        let args = arecord_args(
            &device,
            self.config.duration_secs,
            self.config.sample_rate,
            &path,
        );

        log::info!("録音開始: {} {}", self.program, args.join(" "));

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.leading_args)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("{} の起動に失敗", self.program))?;

        let timeout =
            Duration::from_secs(self.config.timeout_secs.max(self.config.duration_secs));
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                let status =
                    status.with_context(|| format!("{} の終了待ちに失敗", self.program))?;
                if !status.success() {
                    anyhow::bail!("{} が異常終了しました: {}", self.program, status);
                }
            }
            Err(_) => {
                // 時間内に終わらなければ強制終了（書けた分は使う）
                log::warn!("{} が {:?} 以内に終了しないため停止します", self.program, timeout);
                child
                    .kill()
                    .await
                    .with_context(|| format!("{} の停止に失敗", self.program))?;
            }
        }

        if !path.exists() {
            anyhow::bail!("録音ファイルが作成されていません: {:?}", path);
        }

        log::info!("録音終了: {:?}", path);
        Ok(path)
    }
}

/// cpal で直接録音
pub struct CpalRecorder {
    config: RecordConfig,
}

impl CpalRecorder {
    pub fn new(config: RecordConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Recorder for CpalRecorder {
    async fn record(&self) -> Result<PathBuf> {
        let config = self.config.clone();
        let path = recording_path(&config.output_dir)?;

        log::info!("録音開始: {}秒", config.duration_secs);

        // cpal::Stream は Send ではないため専用スレッドで録音する
        let samples = tokio::task::spawn_blocking(move || record_blocking(&config))
            .await
            .context("録音タスクの実行に失敗")??;

        let wav = pcm_to_wav(&samples, self.config.sample_rate)?;
        tokio::fs::write(&path, wav)
            .await
            .with_context(|| format!("録音ファイルの書き込みに失敗: {:?}", path))?;

        log::info!(
            "録音終了: {:?} ({}サンプル)",
            path,
            samples.len()
        );
        Ok(path)
    }
}

fn record_blocking(config: &RecordConfig) -> Result<Vec<i16>> {
    let host = cpal::default_host();

    let devices: Vec<cpal::Device> = host.input_devices()?.collect();
    let entries: Vec<DeviceEntry> = devices
        .iter()
        .enumerate()
        .map(|(index, device)| DeviceEntry::new(index, device.name().unwrap_or_default()))
        .collect();
    let device = match find_device(&entries, &config.device_match) {
        Some(entry) => devices
            .get(entry.index)
            .cloned()
            .context("入力デバイスが見つかりません")?,
        None => host
            .default_input_device()
            .context("デフォルト入力デバイスが見つかりません")?,
    };

    log::info!("録音デバイス: {:?}", device.name());

    let default_config = device
        .default_input_config()
        .context("デフォルト入力設定が取得できません")?;
    let stream_config = cpal::StreamConfig {
        channels: default_config.channels(),
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let recorded: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));

    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => build_capture::<f32>(&device, &stream_config, recorded.clone())?,
        cpal::SampleFormat::I16 => build_capture::<i16>(&device, &stream_config, recorded.clone())?,
        cpal::SampleFormat::U16 => build_capture::<u16>(&device, &stream_config, recorded.clone())?,
        cpal::SampleFormat::I32 => build_capture::<i32>(&device, &stream_config, recorded.clone())?,
        format => anyhow::bail!("サポートされていないサンプルフォーマット: {:?}", format),
    };

    stream.play().context("録音ストリームの開始に失敗")?;
    std::thread::sleep(Duration::from_secs(config.duration_secs));
    drop(stream);

    let samples = std::mem::take(&mut *lock_or_recover(&recorded));
    if samples.is_empty() {
        anyhow::bail!("録音データがありません");
    }
    Ok(samples)
}

fn build_capture<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    recorded: Arc<Mutex<Vec<i16>>>,
) -> Result<cpal::Stream>
where
    T: SizedSample + Sample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;

    let data_callback = move |data: &[T], _info: &cpal::InputCallbackInfo| {
        let mut buffer = lock_or_recover(&recorded);
        buffer.extend(data.chunks(channels).map(|frame| {
            let sum: f32 = frame.iter().map(|&s| s.to_sample::<f32>()).sum();
            let mono = (sum / frame.len() as f32).clamp(-1.0, 1.0);
            (mono * i16::MAX as f32) as i16
        }));
    };

    let error_callback = move |err| {
        log::error!("録音ストリームエラー: {}", err);
    };

    device
        .build_input_stream(config, data_callback, error_callback, None)
        .context("録音ストリームの構築に失敗")
}
