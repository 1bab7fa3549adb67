use crate::dsp::{create_node, EffectNode, Frame};
use crate::types::{EffectKind, EffectSpec, FxConfig, ParamSpec};
use anyhow::Result;

/// パラメータ画面表示用のノード状態
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSnapshot {
    pub kind: EffectKind,
    /// (定義, 現在値)
    pub params: Vec<(ParamSpec, f32)>,
}

/// 直列接続されたエフェクトノード列
///
/// 入力はモノラル（マイク）、出力はステレオにミックスしたフレーム。
pub struct FxChain {
    nodes: Vec<Box<dyn EffectNode>>,
}

/// 設定辞書からエフェクトチェーンを構築
///
/// 設定の記述順にノードを生成して直列に接続する。
/// 空の設定はドライ信号をそのまま出力するチェーンになる。
///
/// # Examples
///
/// ```
/// # use fx_pedal::fx_chain::build_fx_chain;
/// # use fx_pedal::presets::Preset;
/// let mut chain = build_fx_chain(&Preset::Chorus.config(), 44100).unwrap();
/// assert_eq!(chain.len(), 2);
/// let frame = chain.process(0.1);
/// assert!(frame.left.is_finite());
/// ```
pub fn build_fx_chain(config: &FxConfig, sample_rate: u32) -> Result<FxChain> {
    if sample_rate == 0 {
        anyhow::bail!("サンプルレートが不正です: {}", sample_rate);
    }

    let nodes: Vec<Box<dyn EffectNode>> = config
        .effects
        .iter()
        .map(|spec| create_node(spec, sample_rate))
        .collect();

    log::debug!(
        "エフェクトチェーン構築: {} ({}Hz)",
        config
            .effects
            .iter()
            .map(|e| e.kind.name())
            .collect::<Vec<_>>()
            .join(" -> "),
        sample_rate
    );

    Ok(FxChain { nodes })
}

impl FxChain {
    /// 1サンプル処理
    pub fn process(&mut self, input: f32) -> Frame {
        self.nodes
            .iter_mut()
            .fold(Frame::mono(input), |frame, node| node.process(frame))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// ノードのパラメータを変更
    pub fn set_param(&mut self, node: usize, name: &str, value: f32) -> Result<()> {
        let count = self.nodes.len();
        let target = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| anyhow::anyhow!("ノード番号が範囲外です: {} (全{}個)", node, count))?;
        if !target.set_param(name, value) {
            anyhow::bail!("{} に {} というパラメータはありません", target.kind(), name);
        }
        Ok(())
    }

    /// ノードのパラメータを既定値に戻し、内部状態（残響など）もクリア
    pub fn reset_node(&mut self, node: usize) {
        let Some(target) = self.nodes.get_mut(node) else {
            return;
        };
        for spec in target.kind().param_specs() {
            target.set_param(spec.name, spec.default);
        }
        target.reset();
    }

    /// 現在のパラメータ一覧
    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes
            .iter()
            .map(|node| {
                let kind = node.kind();
                let params = kind
                    .param_specs()
                    .iter()
                    .map(|spec| (*spec, node.param(spec.name).unwrap_or(spec.default)))
                    .collect();
                NodeSnapshot { kind, params }
            })
            .collect()
    }

    /// 現在の状態を設定辞書に戻す
    pub fn to_config(&self) -> FxConfig {
        let effects = self
            .snapshot()
            .into_iter()
            .map(|node| EffectSpec {
                kind: node.kind,
                params: node
                    .params
                    .into_iter()
                    .map(|(spec, value)| (spec.name.to_string(), value))
                    .collect(),
            })
            .collect();
        FxConfig::new(effects)
    }
}
