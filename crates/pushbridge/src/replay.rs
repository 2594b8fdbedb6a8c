//! Script-driven replay through a [`PushBridge`].
//!
//! Every attached host is a [`ChannelHost`]; after each step its queue is
//! drained and each envelope is written as one JSON line tagged with the
//! receiving host ID.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use pushbridge_core::BridgeError;
use pushbridge_core::message::{ActivationIntent, RawMessage};
use pushbridge_router::metrics::{
    EVENTS_DROPPED_TOTAL, EVENTS_EMITTED_TOTAL, HOST_EMIT_FAILURES_TOTAL, LIFECYCLE_BUFFERED_TOTAL,
    LIFECYCLE_FLUSHED_TOTAL, counter_total,
};
use pushbridge_router::{ChannelHost, HostEnvelope, PushBridge, TokenProvider};
use pushbridge_settings::BridgeSettings;

use crate::script::{Step, parse_line};

/// Token provider that hands out one scripted outcome.
#[derive(Debug, Clone)]
pub struct ScriptedTokenProvider {
    outcome: std::result::Result<String, String>,
}

impl ScriptedTokenProvider {
    /// Provider yielding `token`, or failing with `error` when no token is given.
    pub fn new(token: Option<String>, error: Option<String>) -> Self {
        let outcome = match token {
            Some(token) => Ok(token),
            None => Err(error.unwrap_or_else(|| "no token available".to_owned())),
        };
        Self { outcome }
    }
}

#[async_trait]
impl TokenProvider for ScriptedTokenProvider {
    async fn fetch_token(&self) -> std::result::Result<String, BridgeError> {
        self.outcome.clone().map_err(BridgeError::TokenFetch)
    }
}

/// Counts for one replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Steps parsed and applied.
    pub steps: usize,
    /// Envelopes written.
    pub emitted: usize,
    /// Lines or steps rejected as malformed.
    pub malformed: usize,
}

/// Router counter totals read back from rendered Prometheus text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterTotals {
    /// Events accepted by a host.
    pub emitted: u64,
    /// Events discarded for lack of a host.
    pub dropped: u64,
    /// Lifecycle messages put in the pending slot.
    pub buffered: u64,
    /// Buffered lifecycle messages flushed on attach.
    pub flushed: u64,
    /// Emissions a host refused.
    pub emit_failures: u64,
}

impl CounterTotals {
    /// Read the router counters out of `rendered`.
    pub fn from_rendered(rendered: &str) -> Self {
        Self {
            emitted: counter_total(rendered, EVENTS_EMITTED_TOTAL),
            dropped: counter_total(rendered, EVENTS_DROPPED_TOTAL),
            buffered: counter_total(rendered, LIFECYCLE_BUFFERED_TOTAL),
            flushed: counter_total(rendered, LIFECYCLE_FLUSHED_TOTAL),
            emit_failures: counter_total(rendered, HOST_EMIT_FAILURES_TOTAL),
        }
    }
}

#[derive(Serialize)]
struct PrintedEnvelope<'a> {
    host: &'a str,
    #[serde(flatten)]
    envelope: &'a HostEnvelope,
}

struct HostTap {
    id: String,
    rx: Option<mpsc::Receiver<HostEnvelope>>,
}

/// Feeds script steps through a bridge and prints what hosts receive.
pub struct Replay<W> {
    bridge: PushBridge,
    settings: Arc<BridgeSettings>,
    hosts: Vec<HostTap>,
    out: W,
    summary: ReplaySummary,
}

impl<W: Write> Replay<W> {
    /// Fresh bridge configured from `settings`, printing to `out`.
    pub fn new(settings: Arc<BridgeSettings>, out: W) -> Self {
        Self {
            bridge: PushBridge::new(&settings),
            settings,
            hosts: Vec::new(),
            out,
            summary: ReplaySummary::default(),
        }
    }

    /// Run every line of `script`. Malformed lines are logged with their
    /// line number and skipped.
    pub async fn run_script(&mut self, script: &str) -> Result<ReplaySummary> {
        for (idx, line) in script.lines().enumerate() {
            let line_no = idx + 1;
            match parse_line(line) {
                Ok(None) => continue,
                Ok(Some(step)) => {
                    self.summary.steps += 1;
                    if let Err(e) = self.apply(step).await {
                        warn!(line = line_no, error = %e, "script step rejected");
                        self.summary.malformed += 1;
                    }
                }
                Err(e) => {
                    warn!(line = line_no, error = %e, "skipping malformed script line");
                    self.summary.malformed += 1;
                }
            }
            self.drain().context("Failed to write replay output")?;
        }
        self.out.flush().context("Failed to flush replay output")?;
        Ok(self.summary)
    }

    async fn apply(&mut self, step: Step) -> pushbridge_core::Result<()> {
        debug!(?step, "applying script step");
        match step {
            Step::Message { message } => {
                let raw = RawMessage::from_value(message)?;
                let _ = self.bridge.receiver().on_message(raw);
            }
            Step::Token { value } => {
                let _ = self.bridge.receiver().on_token_refresh(&value);
            }
            Step::TokenError { error } => {
                let _ = self.bridge.receiver().on_token_error(&error);
            }
            Step::Attach { host_id } => {
                let (host, rx) = ChannelHost::new(host_id.clone(), self.settings.host.channel_capacity);
                self.hosts.push(HostTap { id: host_id, rx: Some(rx) });
                let _ = self.bridge.lifecycle().attach(host);
            }
            Step::Detach { host_id: Some(id) } => {
                let _ = self.bridge.lifecycle().detach_host(&id);
            }
            Step::Detach { host_id: None } => {
                let _ = self.bridge.lifecycle().detach();
            }
            Step::Close { host_id } => {
                for tap in self.hosts.iter_mut().filter(|t| t.id == host_id) {
                    tap.rx = None;
                }
            }
            Step::Tap { extras } => {
                let intent = ActivationIntent::new(extras);
                let _ = self.bridge.lifecycle().on_activation(&intent);
            }
            Step::Register { token, error } => {
                let provider = Arc::new(ScriptedTokenProvider::new(token, error));
                let _ = self.bridge.registrar(provider, &self.settings).register().await;
            }
        }
        Ok(())
    }

    fn drain(&mut self) -> io::Result<()> {
        for tap in &mut self.hosts {
            let Some(rx) = tap.rx.as_mut() else { continue };
            while let Ok(envelope) = rx.try_recv() {
                let line = PrintedEnvelope {
                    host: &tap.id,
                    envelope: &envelope,
                };
                write_line(&mut self.out, &line)?;
                self.summary.emitted += 1;
            }
        }
        Ok(())
    }
}

fn write_line(out: &mut impl Write, value: &impl Serialize) -> io::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)
}

/// Read a script file.
pub async fn load_script(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script: {}", path.display()))
}
