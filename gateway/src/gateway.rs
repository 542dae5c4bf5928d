//! Owns the backend subprocess and wires the interceptor into the
//! forwarding pipeline.

use ipg_guard::config::{GuardConfig, JudgeMode};
use ipg_guard::policy::PolicyEngine;
use ipg_guard::risk::{DeterministicJudge, NetworkJudge, RiskOracle};
use ipg_guard::sanitizer::Sanitizer;
use ipg_guard::taint::TaintTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use crate::config::{BackendConfig, GatewayConfig, RiskAccumulationConfig};
use crate::interceptor::{intercept, InterceptionOutcome};
use crate::ledger::ForensicLedger;
use crate::session::SessionStore;
use crate::warrant::WarrantAuthority;

/// All process-wide state, constructed once in `main` and shared by
/// `Arc` across every task. No ambient globals: every piece of mutable
/// state here has exactly one owner.
pub struct Gateway {
    pub session_store: SessionStore,
    pub ledger: ForensicLedger,
    pub authority: WarrantAuthority,
    pub policy: PolicyEngine,
    pub judge: Arc<dyn RiskOracle>,
    pub taint: TaintTracker,
    pub sanitizer: Sanitizer,
    pub risk_accumulation: RiskAccumulationConfig,
    backend_shutdown_grace: Duration,
    child: Mutex<Child>,
    /// One lock guards the entire write+read cycle so that under concurrent
    /// callers, no caller can read the response written for another's
    /// request -- stdin and stdout are never locked independently.
    backend_io: Mutex<BackendIo>,
}

struct BackendIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

fn build_judge(guard: &GuardConfig) -> Arc<dyn RiskOracle> {
    match guard.judge.mode {
        JudgeMode::Deterministic => Arc::new(DeterministicJudge::new(guard.judge.mock_rules.clone())),
        JudgeMode::Network => {
            let endpoint = guard
                .judge
                .oracle_endpoint
                .clone()
                .expect("network judge mode requires an oracle_endpoint");
            Arc::new(NetworkJudge::new(
                endpoint,
                Duration::from_millis(guard.judge.oracle_timeout_ms),
            ))
        }
    }
}

impl Gateway {
    pub async fn start(config: GatewayConfig) -> anyhow::Result<Self> {
        let authority = WarrantAuthority::load(&config.warrant)?;
        let ledger = ForensicLedger::open(config.ledger.path.clone(), config.ledger.fsync).await?;
        let taint = TaintTracker::from_config(&config.guard.taint)?;
        let policy = PolicyEngine::new(config.guard.policy.clone());
        let judge = build_judge(&config.guard);

        let mut child = spawn_backend(&config.backend)?;
        let child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("backend subprocess has no stdin"))?;
        let child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("backend subprocess has no stdout"))?;

        Ok(Self {
            session_store: SessionStore::new(),
            ledger,
            authority,
            policy,
            judge,
            taint,
            sanitizer: Sanitizer::new(),
            risk_accumulation: config.risk_accumulation,
            backend_shutdown_grace: Duration::from_secs(config.backend.shutdown_grace_secs),
            child: Mutex::new(child),
            backend_io: Mutex::new(BackendIo {
                stdin: child_stdin,
                stdout: BufReader::new(child_stdout),
            }),
        })
    }

    /// Handle one raw inbound JSON-RPC line end to end: intercept, forward
    /// to the backend (unless denied), sanitize the response, and return
    /// the line to send upstream.
    pub async fn handle_message(&self, raw: &str) -> String {
        match intercept(self, raw).await {
            InterceptionOutcome::Deny(response) => response,
            InterceptionOutcome::Forward(line) => self.forward_to_backend(&line).await,
        }
    }

    /// Write `line` and read the matching response line, both under one
    /// lock -- a concurrent caller can only observe this cycle as atomic,
    /// never interleave its own write between this write and this read.
    async fn forward_to_backend(&self, line: &str) -> String {
        let mut io = self.backend_io.lock().await;
        if let Err(e) = io.stdin.write_all(line.as_bytes()).await {
            tracing::error!(error = %e, "failed writing to backend stdin");
            return String::new();
        }
        if let Err(e) = io.stdin.write_all(b"\n").await {
            tracing::error!(error = %e, "failed writing newline to backend stdin");
            return String::new();
        }
        let mut response = String::new();
        match io.stdout.read_line(&mut response).await {
            Ok(0) => {
                tracing::error!("backend subprocess closed stdout");
                String::new()
            }
            Ok(_) => {
                let (sanitized, redactions) = self.sanitizer.sanitize(response.trim_end());
                if redactions > 0 {
                    tracing::info!(redactions, "sanitized backend response");
                }
                sanitized
            }
            Err(e) => {
                tracing::error!(error = %e, "failed reading backend stdout");
                String::new()
            }
        }
    }

    /// Close stdin, give the backend a grace period, then kill it.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        {
            let mut io = self.backend_io.lock().await;
            let _ = io.stdin.shutdown().await;
        }
        let mut child = self.child.lock().await;
        match tokio::time::timeout(self.backend_shutdown_grace, child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                tracing::warn!("backend did not exit within grace period, killing");
                child.kill().await?;
                Ok(())
            }
        }
    }
}

fn spawn_backend(config: &BackendConfig) -> anyhow::Result<Child> {
    let child = tokio::process::Command::new(&config.command)
        .args(&config.args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::inherit())
        .spawn()?;
    Ok(child)
}
