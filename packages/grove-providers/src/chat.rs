use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

const JSON_ATTEMPTS: usize = 3;

/// Chat completion whose content must be a JSON object. Retries when the content does not parse.
pub async fn complete_json(
	cfg: &grove_config::LlmProviderConfig,
	messages: &[Value],
) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);

	for _ in 0..JSON_ATTEMPTS {
		let body = serde_json::json!({
			"model": cfg.model,
			"temperature": cfg.temperature,
			"messages": messages,
			"response_format": { "type": "json_object" },
		});
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		if let Ok(parsed) = parse_json_content(json) {
			return Ok(parsed);
		}
	}

	Err(eyre::eyre!("Chat completion content is not valid JSON."))
}

pub async fn complete_text(
	cfg: &grove_config::LlmProviderConfig,
	messages: &[Value],
) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_text_content(&json)
}

fn first_choice_content(json: &Value) -> Option<&str> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
}

fn parse_json_content(json: Value) -> Result<Value> {
	if let Some(content) = first_choice_content(&json) {
		let parsed: Value = serde_json::from_str(content)
			.map_err(|_| eyre::eyre!("Chat completion content is not valid JSON."))?;

		return Ok(parsed);
	}
	if json.is_object() && json.get("choices").is_none() {
		return Ok(json);
	}

	Err(eyre::eyre!("Chat completion response is missing JSON content."))
}

fn parse_text_content(json: &Value) -> Result<String> {
	let content = first_choice_content(json)
		.ok_or_else(|| eyre::eyre!("Chat completion response is missing message content."))?;
	let trimmed = content.trim();

	if trimmed.is_empty() {
		return Err(eyre::eyre!("Chat completion returned empty content."));
	}

	Ok(trimmed.to_string())
}
