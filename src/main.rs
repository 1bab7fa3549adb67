use anyhow::{Context, Result};
use env_logger::Env;
use fx_pedal::config::Config;
use fx_pedal::controller::{Controller, LoopState};
use fx_pedal::device;
use fx_pedal::menu::{self, MenuAction};
use fx_pedal::presets::Preset;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[tokio::main]
async fn main() -> Result<()> {
    // ロガーを初期化
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    // コマンドライン引数をパース
    let args: Vec<String> = std::env::args().collect();

    // デバイス一覧表示モード
    if args.len() > 1 && args[1] == "--show-interfaces" {
        device::print_devices()?;
        return Ok(());
    }

    // 設定ファイル生成モード
    if args.len() > 1 && args[1] == "--generate-config" {
        let config_path = if args.len() > 2 {
            args[2].as_str()
        } else {
            "config.toml"
        };
        Config::write_default(config_path)?;
        println!("設定ファイルを生成しました: {}", config_path);
        return Ok(());
    }

    // 起動時に選ぶプリセット
    let initial_preset = match args.iter().position(|arg| arg == "--preset") {
        Some(idx) => {
            let name = args
                .get(idx + 1)
                .context("--preset にはプリセット名が必要です")?;
            let preset = Preset::find(name)
                .with_context(|| format!("プリセットが見つかりません: {}", name))?;
            Some(preset)
        }
        None => None,
    };

    // 設定ファイルのパス（--preset の値は除く）
    let config_path = args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(idx, arg)| !arg.starts_with("--") && args[idx - 1] != "--preset")
        .map(|(_, arg)| arg.as_str())
        .unwrap_or("config.toml");

    let config = Config::load_or_default(config_path)?;

    log::info!("fx-pedal を起動します");
    log::debug!("設定: {:?}", config);

    // Ctrl+C ハンドラを設定（raw mode 外で押された場合）
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        log::info!("停止シグナルを受信しました...");
        running_clone.store(false, Ordering::SeqCst);
    })?;

    let mut controller = Controller::from_config(&config)?;

    if let Some(preset) = initial_preset {
        if let Err(e) = controller.select_preset(preset) {
            log::error!("プリセットの起動に失敗: {:#}", e);
        }
    }

    menu::print_menu();

    // メインループ: 1キーずつ処理
    while running.load(Ordering::SeqCst) {
        let key = menu::read_key()?;
        let Some(action) = MenuAction::from_event(key) else {
            continue;
        };
        log::debug!("キー: {:?} → {:?}", key.code, action);

        match controller.handle(action).await {
            Ok(LoopState::Exit) => break,
            Ok(LoopState::Continue) => {}
            Err(e) => {
                // 1つの操作の失敗でループは止めない
                log::error!("{:?} の実行に失敗: {:#}", action, e);
            }
        }

        if matches!(action, MenuAction::Tweak) {
            menu::print_menu();
        }
    }

    controller.stop();
    log::info!("fx-pedal を終了しました");

    Ok(())
}
