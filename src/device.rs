use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait};
use regex_lite::Regex;
use std::sync::OnceLock;

/// OSが報告するデバイス（番号と名前）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceEntry {
    pub index: usize,
    pub name: String,
}

impl DeviceEntry {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

/// 出力デバイス一覧
pub fn list_output_devices() -> Result<Vec<DeviceEntry>> {
    let host = cpal::default_host();
    let entries = host
        .output_devices()?
        .enumerate()
        .map(|(index, device)| DeviceEntry::new(index, device.name().unwrap_or_default()))
        .collect();
    Ok(entries)
}

/// 入力デバイス一覧
pub fn list_input_devices() -> Result<Vec<DeviceEntry>> {
    let host = cpal::default_host();
    let entries = host
        .input_devices()?
        .enumerate()
        .map(|(index, device)| DeviceEntry::new(index, device.name().unwrap_or_default()))
        .collect();
    Ok(entries)
}

/// 名前に `needle` を含む最初のデバイスの番号（大文字小文字は区別しない）
///
/// ```
/// # use fx_pedal::device::{find_device_index, DeviceEntry};
/// let devices = vec![
///     DeviceEntry::new(1, "vc4-hdmi-1: MAI PCM i2s-hifi-0 (hw:2,0)"),
///     DeviceEntry::new(2, "Scarlett 2i2 USB: Audio (hw:3,0)"),
///     DeviceEntry::new(3, "pulse"),
/// ];
/// assert_eq!(find_device_index(&devices, "Scarlett"), Some(2));
/// assert_eq!(find_device_index(&devices, "Focusrite"), None);
/// ```
pub fn find_device_index(devices: &[DeviceEntry], needle: &str) -> Option<usize> {
    find_device(devices, needle).map(|entry| entry.index)
}

/// 名前に `needle` を含む最初のデバイス
pub fn find_device<'a>(devices: &'a [DeviceEntry], needle: &str) -> Option<&'a DeviceEntry> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    devices
        .iter()
        .find(|entry| entry.name.to_lowercase().contains(&needle))
}

fn hw_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^()]*)\)[^()]*$").expect("valid regex"))
}

/// デバイス名の最後の括弧の中身を取り出す
///
/// `"USB PnP Sound Device: Audio (hw:3,0)"` → `"hw:3,0"`
pub fn extract_hw_id(name: &str) -> Option<String> {
    hw_id_regex()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|id| !id.is_empty())
}

/// `needle` を含むデバイスの hw 識別子（arecord の `-D` に渡す値）
pub fn find_hw_id(devices: &[DeviceEntry], needle: &str) -> Option<String> {
    find_device(devices, needle).and_then(|entry| extract_hw_id(&entry.name))
}

/// 入出力デバイス一覧を表示
pub fn print_devices() -> Result<()> {
    let host = cpal::default_host();
    let default_output = host.default_output_device().and_then(|d| d.name().ok());
    let default_input = host.default_input_device().and_then(|d| d.name().ok());

    println!("=== 利用可能な出力デバイス ===");
    for entry in list_output_devices()? {
        let marker = if default_output.as_deref() == Some(entry.name.as_str()) {
            " (デフォルト)"
        } else {
            ""
        };
        println!("  [{}] {}{}", entry.index, entry.name, marker);
    }
    println!();

    println!("=== 利用可能な入力デバイス ===");
    for entry in list_input_devices()? {
        let marker = if default_input.as_deref() == Some(entry.name.as_str()) {
            " (デフォルト)"
        } else {
            ""
        };
        println!("  [{}] {}{}", entry.index, entry.name, marker);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_devices() -> Vec<DeviceEntry> {
        vec![
            DeviceEntry::new(1, "vc4-hdmi-1: MAI PCM i2s-hifi-0 (hw:2,0)"),
            DeviceEntry::new(2, "Scarlett 2i2 USB: Audio (hw:3,0)"),
            DeviceEntry::new(3, "USB PnP Sound Device: Audio (hw:4,0)"),
            DeviceEntry::new(4, "pulse"),
            DeviceEntry::new(5, "default"),
        ]
    }

    #[test]
    fn test_find_device_index() {
        let devices = sample_devices();
        assert_eq!(find_device_index(&devices, "Scarlett"), Some(2));
        assert_eq!(find_device_index(&devices, "scarlett"), Some(2));
        assert_eq!(find_device_index(&devices, "pulse"), Some(4));
        assert_eq!(find_device_index(&devices, "Behringer"), None);
        assert_eq!(find_device_index(&devices, "  "), None);
    }

    #[test]
    fn test_extract_hw_id() {
        assert_eq!(
            extract_hw_id("USB PnP Sound Device: Audio (hw:3,0)"),
            Some("hw:3,0".to_string())
        );
        assert_eq!(
            extract_hw_id("Weird (thing) Device (hw:1,2) "),
            Some("hw:1,2".to_string())
        );
        assert_eq!(extract_hw_id("pulse"), None);
        assert_eq!(extract_hw_id("empty ()"), None);
    }

    #[test]
    fn test_find_hw_id() {
        let devices = sample_devices();
        assert_eq!(
            find_hw_id(&devices, "USB PnP Sound Device"),
            Some("hw:4,0".to_string())
        );
        assert_eq!(find_hw_id(&devices, "pulse"), None);
        assert_eq!(find_hw_id(&devices, "missing"), None);
    }
}
