#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use campus_session::client::{
    AuthClient, ClientHooks, LoginRedirect, Navigator, Notice, Notifier,
};
use campus_session::config::{Config, ConfigV1};
use campus_session::startup::build_client;
use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde_json::{json, Value};

/// Parses a test config pointing at `base_url`. `extra` is appended as
/// additional top-level YAML sections.
pub fn build_config(base_url: &str, extra: &str) -> ConfigV1 {
    build_config_with_timeout(base_url, 3000, extra)
}

pub fn build_config_with_timeout(base_url: &str, timeout_in_ms: u64, extra: &str) -> ConfigV1 {
    let yaml = format!(
        r#"
version: "1.0.0"
backend:
  base_url: "{base_url}"
  timeout_in_ms: {timeout_in_ms}
logging:
  level: "warn"
  format: "json"
{extra}
"#
    );

    let config: Config = Figment::new()
        .merge(Yaml::string(&yaml))
        .extract()
        .expect("Failed to parse integration test config");

    match config {
        Config::ConfigV1(cfg) => cfg,
    }
}

/// Collects redirects and notices instead of showing them.
#[derive(Default)]
pub struct Recorder {
    redirects: Mutex<Vec<String>>,
    notices: Mutex<Vec<Notice>>,
}

impl Recorder {
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Navigator for Recorder {
    fn current_location(&self) -> Option<String> {
        Some("/dashboard".to_string())
    }

    fn redirect(&self, target: &LoginRedirect) {
        self.redirects.lock().unwrap().push(target.to_uri());
    }
}

impl Notifier for Recorder {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

pub fn client_for(config: &ConfigV1) -> (AuthClient, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let hooks = ClientHooks {
        navigator: recorder.clone(),
        prompter: None,
        notifier: recorder.clone(),
    };
    let client = build_client(config, hooks).expect("client should build");
    (client, recorder)
}

pub fn ok_body(data: Value) -> String {
    json!({"code": 0, "message": "ok", "data": data}).to_string()
}
