use crate::buffer::SampleFifo;
use crate::config::AudioConfig;
use crate::device::{find_device, DeviceEntry};
use crate::dsp::Frame;
use crate::fx_chain::{build_fx_chain, FxChain};
use crate::types::FxConfig;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::{Arc, Mutex, MutexGuard};

/// 再生中のエフェクトチェーン（パラメータ画面と共有）
pub type SharedChain = Arc<Mutex<FxChain>>;

/// マイク入力 → エフェクトチェーン → 出力デバイス のリアルタイム処理
///
/// 入力ストリームのコールバックでモノラルにダウンミックスしたサンプルを
/// FIFOに積み、出力ストリームのコールバックで取り出してチェーンに通す。
pub struct AudioServer {
    input_device: Device,
    output_device: Device,
    sample_rate: u32,
    max_latency_ms: u32,
    input_stream: Option<Stream>,
    output_stream: Option<Stream>,
    chain: Option<SharedChain>,
}

impl AudioServer {
    /// デバイスを選択してサーバーを作成（まだ起動しない）
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let output_devices: Vec<Device> = host.output_devices()?.collect();
        let output_device = match select_device(&output_devices, &config.output_device) {
            Some(device) => device,
            None => {
                if config.output_device != "default" {
                    log::warn!(
                        "出力デバイス '{}' が見つかりません。デフォルトを使用します",
                        config.output_device
                    );
                }
                host.default_output_device()
                    .context("デフォルト出力デバイスが見つかりません")?
            }
        };

        let input_devices: Vec<Device> = host.input_devices()?.collect();
        let input_device = match select_device(&input_devices, &config.input_device) {
            Some(device) => device,
            None => {
                if config.input_device != "default" {
                    log::warn!(
                        "入力デバイス '{}' が見つかりません。デフォルトを使用します",
                        config.input_device
                    );
                }
                host.default_input_device()
                    .context("デフォルト入力デバイスが見つかりません")?
            }
        };

        log::info!("出力デバイス: {:?}", output_device.name());
        log::info!("入力デバイス: {:?}", input_device.name());

        Ok(Self {
            input_device,
            output_device,
            sample_rate: config.sample_rate,
            max_latency_ms: config.max_latency_ms,
            input_stream: None,
            output_stream: None,
            chain: None,
        })
    }

    /// エフェクトチェーンを構築してストリームを開始
    ///
    /// 既に動作中の場合は停止してから新しいチェーンで起動し直す。
    pub fn start(&mut self, config: &FxConfig) -> Result<SharedChain> {
        self.stop();

        let chain = Arc::new(Mutex::new(build_fx_chain(config, self.sample_rate)?));
        let fifo = Arc::new(Mutex::new(SampleFifo::with_latency(
            self.sample_rate,
            self.max_latency_ms,
        )));

        let input_default = self
            .input_device
            .default_input_config()
            .context("デフォルト入力設定が取得できません")?;
        let output_default = self
            .output_device
            .default_output_config()
            .context("デフォルト出力設定が取得できません")?;

        log::info!(
            "入力デバイス設定: {:?}, {}Hz, {}ch",
            input_default.sample_format(),
            input_default.sample_rate().0,
            input_default.channels()
        );
        log::info!(
            "出力デバイス設定: {:?}, {}Hz, {}ch",
            output_default.sample_format(),
            output_default.sample_rate().0,
            output_default.channels()
        );

        let input_config = StreamConfig {
            channels: input_default.channels(),
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let output_config = StreamConfig {
            channels: output_default.channels(),
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let input_stream = match input_default.sample_format() {
            SampleFormat::F32 => self.build_input_stream::<f32>(&input_config, fifo.clone())?,
            SampleFormat::I16 => self.build_input_stream::<i16>(&input_config, fifo.clone())?,
            SampleFormat::U16 => self.build_input_stream::<u16>(&input_config, fifo.clone())?,
            SampleFormat::I32 => self.build_input_stream::<i32>(&input_config, fifo.clone())?,
            format => anyhow::bail!("サポートされていない入力サンプルフォーマット: {:?}", format),
        };

        let output_stream = match output_default.sample_format() {
            SampleFormat::F32 => {
                self.build_output_stream::<f32>(&output_config, fifo, chain.clone())?
            }
            SampleFormat::I16 => {
                self.build_output_stream::<i16>(&output_config, fifo, chain.clone())?
            }
            SampleFormat::U16 => {
                self.build_output_stream::<u16>(&output_config, fifo, chain.clone())?
            }
            format => anyhow::bail!("サポートされていない出力サンプルフォーマット: {:?}", format),
        };

        output_stream.play().context("出力ストリームの再生開始に失敗")?;
        input_stream.play().context("入力ストリームの再生開始に失敗")?;

        self.input_stream = Some(input_stream);
        self.output_stream = Some(output_stream);
        self.chain = Some(chain.clone());

        log::info!(
            "オーディオサーバーを開始しました ({}Hz, エフェクト{}個)",
            self.sample_rate,
            config.len()
        );

        Ok(chain)
    }

    /// 入力ストリームを構築
    fn build_input_stream<T>(
        &self,
        config: &StreamConfig,
        fifo: Arc<Mutex<SampleFifo>>,
    ) -> Result<Stream>
    where
        T: SizedSample + Sample + Send + 'static,
        f32: FromSample<T>,
    {
        let channels = config.channels.max(1) as usize;
        let mut mono: Vec<f32> = Vec::new();

        let data_callback = move |data: &[T], _info: &cpal::InputCallbackInfo| {
            // インターリーブされたデータをモノラルにダウンミックス
            mono.clear();
            mono.extend(data.chunks(channels).map(downmix_frame));

            lock_or_recover(&fifo).push_slice(&mono);
        };

        let error_callback = move |err| {
            log::error!("入力ストリームエラー: {}", err);
        };

        let stream = self
            .input_device
            .build_input_stream(config, data_callback, error_callback, None)
            .context("入力ストリームの構築に失敗")?;

        Ok(stream)
    }

    /// 出力ストリームを構築
    fn build_output_stream<T>(
        &self,
        config: &StreamConfig,
        fifo: Arc<Mutex<SampleFifo>>,
        chain: SharedChain,
    ) -> Result<Stream>
    where
        T: SizedSample + Sample + FromSample<f32> + Send + 'static,
    {
        let channels = config.channels.max(1) as usize;
        let mut reported_drops: u64 = 0;

        let data_callback = move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
            let mut fifo = lock_or_recover(&fifo);
            let mut chain = lock_or_recover(&chain);

            for frame in data.chunks_mut(channels) {
                // 入力が足りない分は無音として扱う
                let input = fifo.pop().unwrap_or(0.0);
                write_output_frame(frame, chain.process(input));
            }

            // 最大遅延1回分以上捨てたら報告
            let dropped = fifo.dropped();
            if dropped - reported_drops >= fifo.capacity() as u64 {
                log::warn!(
                    "入力が出力より速いため古いサンプルを破棄しました (累計{}サンプル)",
                    dropped
                );
                reported_drops = dropped;
            }
        };

        let error_callback = move |err| {
            log::error!("出力ストリームエラー: {}", err);
        };

        let stream = self
            .output_device
            .build_output_stream(config, data_callback, error_callback, None)
            .context("出力ストリームの構築に失敗")?;

        Ok(stream)
    }

    /// ストリームを停止
    pub fn stop(&mut self) {
        let was_running = self.is_running();
        self.input_stream = None;
        self.output_stream = None;
        self.chain = None;
        if was_running {
            log::info!("オーディオサーバーを停止しました");
        }
    }

    pub fn is_running(&self) -> bool {
        self.output_stream.is_some()
    }

    /// 再生中のチェーン
    pub fn chain(&self) -> Option<SharedChain> {
        self.chain.clone()
    }
}

impl Drop for AudioServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// インターリーブされた入力1フレームをモノラルの f32 にする
fn downmix_frame<T>(frame: &[T]) -> f32
where
    T: Sample,
    f32: FromSample<T>,
{
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|&sample| sample.to_sample::<f32>()).sum();
    (sum / frame.len() as f32).clamp(-1.0, 1.0)
}

/// 処理済みフレームを出力デバイスの1フレームに書き込む
///
/// 1ch はモノラル、2ch 以上は 0=左 1=右 それ以降はモノラル。
fn write_output_frame<T>(frame: &mut [T], processed: Frame)
where
    T: Sample + FromSample<f32>,
{
    if frame.len() == 1 {
        frame[0] = T::from_sample(processed.to_mono().clamp(-1.0, 1.0));
        return;
    }
    for (ch, sample) in frame.iter_mut().enumerate() {
        let value = match ch {
            0 => processed.left,
            1 => processed.right,
            _ => processed.to_mono(),
        };
        *sample = T::from_sample(value.clamp(-1.0, 1.0));
    }
}

/// 名前の部分一致でデバイスを選ぶ（"default" や空文字は None）
fn select_device(devices: &[Device], wanted: &str) -> Option<Device> {
    if wanted.trim().is_empty() || wanted == "default" {
        return None;
    }
    let entries: Vec<DeviceEntry> = devices
        .iter()
        .enumerate()
        .map(|(index, device)| DeviceEntry::new(index, device.name().unwrap_or_default()))
        .collect();
    let entry = find_device(&entries, wanted)?;
    devices.get(entry.index).cloned()
}

/// オーディオコールバック内でのロック（poison は無視して続行）
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
