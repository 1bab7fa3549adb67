use crate::config::LlmConfig;
use crate::types::{EffectKind, FxConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 説明文からエフェクト設定（テキスト）を生成するバックエンド
#[async_trait]
pub trait EffectGenerator: Send + Sync {
    /// 自然言語の説明文を送り、モデルの生の応答テキストを返す
    async fn generate(&self, description: &str) -> Result<String>;
}

/// 説明文 → 設定辞書
pub async fn describe_to_config(
    generator: &dyn EffectGenerator,
    description: &str,
) -> Result<FxConfig> {
    let description = description.trim();
    if description.is_empty() {
        anyhow::bail!("説明文が空です");
    }

    log::info!("エフェクト生成リクエスト: {}", description);
    let reply = generator.generate(description).await?;
    log::debug!("言語モデル応答: {}", reply);

    parse_fx_config(&reply)
        .with_context(|| format!("言語モデルの応答を設定として解釈できません: {}", reply))
}

/// OpenAI Chat Completions API を使うバックエンド
pub struct OpenAiEffectGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
}

impl OpenAiEffectGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("言語モデル用HTTPクライアント作成失敗")?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl EffectGenerator for OpenAiEffectGenerator {
    async fn generate(&self, description: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt(),
                },
                Message {
                    role: "user".to_string(),
                    content: description.to_string(),
                },
            ],
            temperature: Some(self.temperature),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("言語モデル API リクエスト失敗")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("言語モデル API エラー: {} - {}", status, error_text);
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .context("言語モデル API レスポンスパース失敗")?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .context("言語モデル API の応答が空です")
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// 使えるエフェクトとパラメータ範囲を列挙したシステムプロンプト
pub fn system_prompt() -> String {
    let mut prompt = String::from(
        "You configure a real-time guitar/voice effects pedal. \
         Turn the user's description into an effect chain. \
         Reply with ONE JSON object only, no prose and no code fences. \
         Keys are effect names in processing order, values are objects of parameter values. \
         Use only these effects and parameters (ranges inclusive):\n",
    );
    for kind in EffectKind::ALL {
        let params: Vec<String> = kind
            .param_specs()
            .iter()
            .map(|spec| {
                format!(
                    "{} [{}..{}, default {}]",
                    spec.name, spec.min, spec.max, spec.default
                )
            })
            .collect();
        prompt.push_str(&format!("- {}: {}\n", kind.name(), params.join(", ")));
    }
    prompt.push_str(
        "Example: {\"delay\": {\"time\": 0.12, \"feedback\": 0.2, \"mix\": 0.4}, \
         \"reverb\": {\"size\": 0.8, \"mix\": 0.35}}",
    );
    prompt
}

/// 言語モデルの応答テキストを設定辞書に変換
///
/// コードフェンスや前後の文章を取り除いて最外の `{...}` を取り出し、JSONとして読む。
/// JSONとして読めない場合は Python のリテラル風（シングルクォート、
/// `True`/`False`/`None`）とみなして変換してから読み直す。
///
/// ```
/// # use fx_pedal::llm::parse_fx_config;
/// let config = parse_fx_config("Sure! {'delay': {'time': 0.2}, 'reverb': {'size': 0.9}}").unwrap();
/// assert_eq!(config.len(), 2);
/// ```
pub fn parse_fx_config(text: &str) -> Result<FxConfig> {
    let object = extract_object(text).context("応答にJSONオブジェクトが見つかりません")?;

    let config = match serde_json::from_str::<FxConfig>(object) {
        Ok(config) => config,
        Err(json_err) => {
            let converted = python_literal_to_json(object);
            serde_json::from_str::<FxConfig>(&converted).map_err(|_| {
                anyhow::anyhow!("設定のパースに失敗: {}", json_err)
            })?
        }
    };

    if config.is_empty() {
        anyhow::bail!("使用できるエフェクトが含まれていません");
    }
    Ok(config)
}

/// 最初の `{` から対応する `}` までを取り出す
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => in_string = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Python の辞書リテラルをJSONに寄せる（クォート、`True`/`False`/`None`、末尾カンマ）
fn python_literal_to_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut word = String::new();

    let flush_word = |word: &mut String, out: &mut String| {
        match word.as_str() {
            "True" => out.push_str("true"),
            "False" => out.push_str("false"),
            "None" => out.push_str("null"),
            _ => out.push_str(word),
        }
        word.clear();
    };

    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
                out.push(c);
            } else if c == '\\' {
                escaped = true;
                out.push(c);
            } else if c == quote {
                in_string = None;
                out.push('"');
            } else if c == '"' {
                out.push_str("\\\"");
            } else {
                out.push(c);
            }
            continue;
        }

        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        flush_word(&mut word, &mut out);

        match c {
            '\'' | '"' => {
                in_string = Some(c);
                out.push('"');
            }
            // 末尾カンマ `{'a': 1,}` は落とす
            ',' if matches!(
                chars[i + 1..].iter().find(|next| !next.is_whitespace()),
                Some('}') | Some(']')
            ) => {}
            _ => out.push(c),
        }
    }
    flush_word(&mut word, &mut out);
    out
}
