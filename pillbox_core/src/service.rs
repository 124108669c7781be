//! Hosted webhook services: reminder and log sheets, voice agent, TTS.

use crate::config::WebhookConfig;
use crate::records::{parse_logs, parse_reminders, Parsed};
use crate::{AdherenceRecord, Error, LogEntry, NewMedicine, Result};
use reqwest::blocking::{multipart, Client, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Everything the dispenser asks of the outside world
pub trait CareService: Send + Sync {
    /// Current reminder sheet, validated
    fn fetch_reminders(&self) -> Result<Parsed<NewMedicine>>;

    /// Adherence log sheet, validated
    fn fetch_logs(&self) -> Result<Parsed<AdherenceRecord>>;

    /// Append one dispense to the log sheet
    fn post_log(&self, entry: &LogEntry) -> Result<()>;

    /// Ask the voice agent a question and get its spoken answer
    fn query_agent(&self, language: &str, user_input: &str) -> Result<String>;

    /// Turn text into an audio payload
    fn synthesize(&self, message: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP client for the webhook endpoints
pub struct WebhookClient {
    client: Client,
    urls: WebhookConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentRequest<'a> {
    language_setting: &'a str,
    user_input: &'a str,
}

impl WebhookClient {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            urls: config.clone(),
        })
    }

    fn get_json(&self, url: &str) -> Result<Value> {
        tracing::debug!("GET {}", url);
        let response = check(url, self.client.get(url).send()?)?;
        Ok(response.json()?)
    }
}

/// Turn a non-success status into [`Error::Status`]
fn check(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(Error::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Pull `agentResponse` out of the agent's reply
pub fn agent_reply(body: &Value) -> Result<String> {
    body.get("agentResponse")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::MalformedRecord {
            row: 0,
            reason: "agent reply has no agentResponse text".to_string(),
        })
}

impl CareService for WebhookClient {
    fn fetch_reminders(&self) -> Result<Parsed<NewMedicine>> {
        let body = self.get_json(&self.urls.reminders_url)?;
        parse_reminders(&body)
    }

    fn fetch_logs(&self) -> Result<Parsed<AdherenceRecord>> {
        let body = self.get_json(&self.urls.logs_url)?;
        parse_logs(&body)
    }

    fn post_log(&self, entry: &LogEntry) -> Result<()> {
        let url = &self.urls.log_post_url;
        let fields = entry.to_fields();
        tracing::debug!("POST {} for {}", url, entry.medicine_name);
        check(url, self.client.post(url).query(&fields).send()?)?;
        Ok(())
    }

    fn query_agent(&self, language: &str, user_input: &str) -> Result<String> {
        let url = &self.urls.agent_url;
        let request = AgentRequest {
            language_setting: language,
            user_input,
        };
        let response = check(url, self.client.post(url).json(&request).send()?)?;
        agent_reply(&response.json()?)
    }

    fn synthesize(&self, message: &str) -> Result<Vec<u8>> {
        let url = &self.urls.tts_url;
        let form = multipart::Form::new().text("message", message.to_string());
        let response = check(url, self.client.post(url).multipart(form).send()?)?;
        Ok(response.bytes()?.to_vec())
    }
}

/// In-memory service for tests
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeService {
        pub reminders: Mutex<Vec<NewMedicine>>,
        pub posted: Mutex<Vec<LogEntry>>,
        pub spoken: Mutex<Vec<String>>,
        pub offline: Mutex<bool>,
    }

    impl FakeService {
        pub fn set_offline(&self, offline: bool) {
            *self.offline.lock().unwrap() = offline;
        }

        fn online(&self) -> Result<()> {
            if *self.offline.lock().unwrap() {
                return Err(Error::Other("service offline".into()));
            }
            Ok(())
        }
    }

    impl CareService for FakeService {
        fn fetch_reminders(&self) -> Result<Parsed<NewMedicine>> {
            self.online()?;
            Ok(Parsed {
                records: self.reminders.lock().unwrap().clone(),
                rejected: Vec::new(),
            })
        }

        fn fetch_logs(&self) -> Result<Parsed<AdherenceRecord>> {
            self.online()?;
            let records = self
                .posted
                .lock()
                .unwrap()
                .iter()
                .enumerate()
                .map(|(i, entry)| AdherenceRecord {
                    row_number: i as u64 + 2,
                    entry: entry.clone(),
                })
                .collect();
            Ok(Parsed {
                records,
                rejected: Vec::new(),
            })
        }

        fn post_log(&self, entry: &LogEntry) -> Result<()> {
            self.online()?;
            self.posted.lock().unwrap().push(entry.clone());
            Ok(())
        }

        fn query_agent(&self, _language: &str, user_input: &str) -> Result<String> {
            self.online()?;
            Ok(format!("You asked: {user_input}"))
        }

        fn synthesize(&self, message: &str) -> Result<Vec<u8>> {
            self.online()?;
            self.spoken.lock().unwrap().push(message.to_string());
            Ok(message.as_bytes().to_vec())
        }
    }
}
