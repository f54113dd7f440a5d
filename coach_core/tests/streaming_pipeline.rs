//! End-to-end tests of the submit -> worker -> stream -> channel -> dispatcher
//! pipeline against mocked provider endpoints

use coach_core::config::{Config, Endpoints, GenerationParams};
use coach_core::credentials::Credentials;
use coach_core::error::UserInputError;
use coach_core::prelude::*;
use coach_core::registry::{GOOGLE_KEY, OPENROUTER_KEY};
use coach_core::session::ConversationStore;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::runtime::Runtime;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SONOMA_SKY: &str = "Sonoma Sky (OpenRouter)";
const GEMINI_DIRECT: &str = "Gemini 1.5 Flash (Google AI)";

#[derive(Default)]
struct Transcript {
    fragments: Vec<String>,
    failures: Vec<String>,
    enabled_count: usize,
    closed: Vec<ConversationEntry>,
    statuses: Vec<Status>,
    resets: usize,
}

impl Renderer for Transcript {
    fn entry_added(&mut self, _entry: &ConversationEntry) {}
    fn entry_opened(&mut self, _entry: &ConversationEntry) {}
    fn fragment_appended(&mut self, fragment: &str) {
        self.fragments.push(fragment.to_string());
    }
    fn failure_appended(&mut self, message: &str) {
        self.failures.push(message.to_string());
    }
    fn entry_closed(&mut self, entry: &ConversationEntry) {
        self.closed.push(entry.clone());
    }
    fn status_changed(&mut self, status: &Status) {
        self.statuses.push(status.clone());
    }
    fn controls_changed(&mut self, enabled: bool) {
        if enabled {
            self.enabled_count += 1;
        }
    }
    fn voice_changed(&mut self, _state: VoiceState) {}
    fn transcript_reset(&mut self, _entries: &[ConversationEntry]) {
        self.resets += 1;
    }
}

struct Harness {
    server: MockServer,
    rt: Runtime,
    store_dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let rt = Runtime::new().unwrap();
        let server = rt.block_on(MockServer::start());
        Self {
            server,
            rt,
            store_dir: TempDir::new().unwrap(),
        }
    }

    fn dispatcher(&self, credentials: Credentials, model: &str) -> Dispatcher<Transcript> {
        let config = Config {
            personal_context: "I build minimalist web apps.".to_string(),
            selected_model: model.to_string(),
            ..Config::default()
        };
        let context = ProviderContext::new(
            ModelRegistry::default(),
            credentials,
            Endpoints {
                openrouter_url: self.server.uri(),
                gemini_url: self.server.uri(),
            },
            GenerationParams::default(),
        )
        .unwrap();
        Dispatcher::new(config, Arc::new(context), self.rt.handle().clone(), Transcript::default())
            .with_store(ConversationStore::new(self.store_dir.path()))
    }

    fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server));
    }

    fn verify(&self) {
        self.rt.block_on(self.server.verify());
    }

    fn request_bodies(&self) -> Vec<serde_json::Value> {
        self.rt
            .block_on(self.server.received_requests())
            .unwrap_or_default()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }
}

fn all_keys() -> Credentials {
    Credentials::default()
        .with(OPENROUTER_KEY, "sk-or-test")
        .with(GOOGLE_KEY, "g-test")
}

fn openrouter_sse(fragments: &[&str]) -> String {
    let mut body = String::from(": OPENROUTER PROCESSING\n\n");
    body.push_str(&format!(
        "data: {}\n\n",
        json!({"choices": [{"delta": {"role": "assistant"}}]})
    ));
    for fragment in fragments {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"index": 0, "delta": {"content": fragment}}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

/// Tick like the interactive thread until the worker has re-enabled controls
fn run_until_ready(d: &mut Dispatcher<Transcript>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        d.tick();
        if !d.is_generating() {
            return;
        }
        assert!(Instant::now() < deadline, "generation did not finish");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_openrouter_answer_streams_into_one_entry() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-or-test"))
            .and(body_partial_json(json!({
                "model": "openrouter/sonoma-sky-alpha",
                "stream": true,
                "max_tokens": 1000
            })))
            .respond_with(sse_response(openrouter_sse(&["I ", "focus on ", "growth."])))
            .expect(1),
    );

    let mut d = h.dispatcher(all_keys(), SONOMA_SKY);
    d.submit_text("What are your weaknesses?").unwrap();
    run_until_ready(&mut d);
    h.verify();

    let entries = d.session().entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].speaker, Speaker::User);
    assert_eq!(entries[0].text, "What are your weaknesses?");
    assert_eq!(entries[1].speaker, Speaker::Assistant);
    assert_eq!(entries[1].tag, EntryTag::Ask);
    assert_eq!(entries[1].text, "I focus on growth.");
    assert!(!entries[1].interrupted);

    let transcript = d.renderer();
    assert_eq!(transcript.fragments, vec!["I ", "focus on ", "growth."]);
    assert_eq!(transcript.enabled_count, 1);
    assert_eq!(transcript.closed.len(), 1);
    assert_eq!(d.status().text, format!("Ready ({})", SONOMA_SKY));

    let prompt = h.request_bodies()[0]["messages"][0]["content"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(prompt.contains("--- CANDIDATE CONTEXT ---\nI build minimalist web apps."));
    assert!(prompt.ends_with("QUESTION: What are your weaknesses?"));
}

#[test]
fn test_gemini_answer_streams() {
    let h = Harness::new();
    let item = |text: &str| json!({"candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]});
    let body = format!(
        "data: {}\r\n\r\ndata: {}\r\n\r\ndata: {}\r\n\r\n",
        item("Hello"),
        item(" world"),
        json!({"candidates": [{"finishReason": "STOP"}]})
    );
    h.mount(
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash-latest:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "g-test"))
            .respond_with(sse_response(body))
            .expect(1),
    );

    let mut d = h.dispatcher(all_keys(), GEMINI_DIRECT);
    d.submit_text("Tell me about yourself").unwrap();
    run_until_ready(&mut d);
    h.verify();

    assert_eq!(d.session().entries()[1].text, "Hello world");
    assert_eq!(d.renderer().enabled_count, 1);
}

#[test]
fn test_missing_credential_reports_key_and_sends_nothing() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0),
    );

    let credentials = Credentials::default().with(OPENROUTER_KEY, "sk-or-test");
    let mut d = h.dispatcher(credentials, GEMINI_DIRECT);
    d.submit_text("Why this company?").unwrap();
    run_until_ready(&mut d);
    h.verify();

    let errors: Vec<&ConversationEntry> = d
        .session()
        .entries()
        .iter()
        .filter(|e| e.tag == EntryTag::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].text.contains(GOOGLE_KEY));
    assert_eq!(d.renderer().enabled_count, 1);
    assert!(d.controls_enabled());
}

#[test]
fn test_evaluation_without_question_sends_nothing() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0),
    );

    let mut d = h.dispatcher(all_keys(), SONOMA_SKY);
    d.toggle_evaluation_mode();
    d.submit_text("I work too hard.").unwrap();
    run_until_ready(&mut d);
    h.verify();

    let last = d.session().entries().last().unwrap();
    assert_eq!(last.tag, EntryTag::Error);
    assert_eq!(last.text, UserInputError::NoPendingQuestion.to_string());
}

#[test]
fn test_evaluation_critiques_answer_to_last_question() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(sse_response(openrouter_sse(&["Be ", "specific."])))
            .expect(2),
    );

    let mut d = h.dispatcher(all_keys(), SONOMA_SKY);
    d.submit_text("What are your weaknesses?").unwrap();
    run_until_ready(&mut d);

    assert_eq!(d.toggle_evaluation_mode(), PromptMode::Evaluate);
    d.submit_text("I work too hard.").unwrap();
    run_until_ready(&mut d);
    h.verify();

    let entries = d.session().entries();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[2].tag, EntryTag::Evaluate);
    assert_eq!(entries[3].speaker, Speaker::AssistantEvaluation);
    assert_eq!(entries[3].text, "Be specific.");
    assert_eq!(d.last_question(), Some("What are your weaknesses?"));

    let bodies = h.request_bodies();
    let prompt = bodies[1]["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.contains("--- INTERVIEW QUESTION ---\nWhat are your weaknesses?"));
    assert!(prompt.contains("--- CANDIDATE ANSWER ---\nI work too hard."));
}

#[test]
fn test_http_error_keeps_error_status() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("{\"error\":\"bad key\"}"))
            .expect(1),
    );

    let mut d = h.dispatcher(all_keys(), SONOMA_SKY);
    d.submit_text("Hi?").unwrap();
    run_until_ready(&mut d);
    h.verify();

    let answer = &d.session().entries()[1];
    assert!(answer.interrupted);
    assert!(answer.text.starts_with("API returned HTTP 401"));
    assert_eq!(
        d.status(),
        &Status::new("API connection failed", Severity::Error)
    );
    assert_eq!(d.renderer().enabled_count, 1);
    assert_eq!(
        d.renderer().statuses[0].text,
        format!("Generating with {}...", SONOMA_SKY)
    );
}

#[test]
fn test_in_band_error_keeps_partial_answer() {
    let h = Harness::new();
    let body = format!(
        "data: {}\n\ndata: {}\n\ndata: {}\n\n",
        json!({"choices": [{"delta": {"content": "Partial"}}]}),
        json!({"error": {"message": "upstream overloaded", "code": 502}}),
        json!({"choices": [{"delta": {"content": "never shown"}}]}),
    );
    h.mount(Mock::given(method("POST")).respond_with(sse_response(body)));

    let mut d = h.dispatcher(all_keys(), SONOMA_SKY);
    d.submit_text("Hi?").unwrap();
    run_until_ready(&mut d);

    let answer = &d.session().entries()[1];
    assert_eq!(
        answer.text,
        "Partial\nOpenRouter error: upstream overloaded (code 502)"
    );
    assert_eq!(d.renderer().fragments, vec!["Partial"]);
    assert_eq!(d.renderer().failures.len(), 1);
}

#[test]
fn test_second_submit_rejected_while_streaming() {
    let h = Harness::new();
    h.mount(
        Mock::given(method("POST"))
            .respond_with(
                sse_response(openrouter_sse(&["slow"])).set_delay(Duration::from_millis(300)),
            )
            .expect(2),
    );

    let mut d = h.dispatcher(all_keys(), SONOMA_SKY);
    d.submit_text("First").unwrap();
    assert_eq!(d.submit_text("Second"), Err(UserInputError::Busy));
    d.tick();
    assert_eq!(d.submit_text("Third"), Err(UserInputError::Busy));

    run_until_ready(&mut d);
    let questions: Vec<String> = h
        .request_bodies()
        .iter()
        .map(|b| b["messages"][0]["content"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(questions.len(), 1);
    assert!(questions[0].contains("QUESTION: First"));
    assert_eq!(d.session().len(), 2);
    assert_eq!(d.renderer().enabled_count, 1);

    d.submit_text("Fourth").unwrap();
    run_until_ready(&mut d);
    assert_eq!(d.renderer().enabled_count, 2);
    assert_eq!(h.request_bodies().len(), 2);
    h.verify();
}

#[test]
fn test_export_clear_import_round_trip() -> anyhow::Result<()> {
    let h = Harness::new();
    h.mount(Mock::given(method("POST")).respond_with(sse_response(openrouter_sse(&["Because ", "I care."]))));

    let mut d = h.dispatcher(all_keys(), SONOMA_SKY);
    d.submit_text("Why gaming?").unwrap();
    run_until_ready(&mut d);
    let before: Vec<ConversationEntry> = d.session().entries().to_vec();

    let saved = d.export(None)?;
    d.clear()?;
    assert!(d.session().is_empty());
    assert_eq!(d.last_question(), None);

    assert_eq!(d.import(&saved)?, before.len());
    for (restored, original) in d.session().entries().iter().zip(&before) {
        assert!(restored.same_content(original));
    }
    assert_eq!(d.last_question(), Some("Why gaming?"));
    assert_eq!(d.renderer().resets, 2);

    let listed = d.saved_conversations()?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Why gaming?");
    Ok(())
}
